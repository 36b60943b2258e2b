use tracing_subscriber::EnvFilter;

/// Dependencies that are chatty at `debug` and below.
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("sqlparser", "warn"),
    ("datafusion", "warn"),
    ("datafusion_optimizer", "warn"),
    ("datafusion_datasource", "warn"),
    ("arrow", "warn"),
];

/// Builds the filter from `RUST_LOG` when set, otherwise from `level` with
/// the quiet overrides applied.
pub fn build_env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|(target, lvl)| format!("{}={}", target, lvl)));
    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("Invalid tracing filter '{}': {}", filter_str, e))
}

/// Installs a stderr subscriber so stdout stays free for row output.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = build_env_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = build_env_filter("debug").unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("datafusion=warn"));
    }
}
