use crate::planner::PlanningConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub query: Option<String>,
    pub fallback_query: Option<String>,
    /// Discovery query or comma separated literal list.
    pub params: Option<String>,
    pub order_by: Option<String>,
    #[serde(default = "default_split_count")]
    pub split_count: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            query: None,
            fallback_query: None,
            params: None,
            order_by: None,
            split_count: default_split_count(),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct ConnectionSettings {
    pub driver: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_split_count() -> usize {
    1
}

const ENV_PREFIX: &str = "IGLOO_SQL";

impl Settings {
    /// Loads the file named by `IGLOO_SQL_CONFIG_PATH`, if present, then
    /// `IGLOO_SQL__SECTION__KEY` environment overrides.
    pub fn new() -> Result<Self, config::ConfigError> {
        let config_file_path = std::env::var("IGLOO_SQL_CONFIG_PATH")
            .unwrap_or_else(|_| "crates/connectors/sql/config/default.toml".to_string());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&config_file_path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        s.try_deserialize()
    }

    /// Loads an explicit settings file, which must exist.
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        s.try_deserialize()
    }

    /// Builds settings from job-level key/value properties such as
    /// `source.query` or `connection.url`.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        for (key, value) in properties {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }
        builder.build()?.try_deserialize()
    }

    pub fn planning_config(&self) -> PlanningConfig {
        PlanningConfig {
            input_query: self.source.query.clone(),
            fallback_query: self.source.fallback_query.clone(),
            params: self.source.params.clone(),
            parameters: None,
            order_by: self.source.order_by.clone(),
        }
    }
}
