use crate::client::DatabaseClient;
use crate::planner::{PartitionPlanner, PlanningConfig};
use crate::reader::PartitionReader;
use crate::split::PartitionSpec;
use igloo_common::Result;
use std::sync::Arc;

/// The core trait for any Igloo data source connector.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Plans the source into splits. Called once per job on the coordinator.
    async fn get_splits(&self, split_hint: usize) -> Result<Vec<PartitionSpec>>;

    /// Opens one split for reading. Called once per split on a worker.
    async fn read_split(&self, split: PartitionSpec) -> Result<PartitionReader>;
}

/// A connector over the result of one SQL query.
pub struct SqlConnector {
    client: Arc<dyn DatabaseClient>,
    config: PlanningConfig,
}

impl SqlConnector {
    pub fn new(client: Arc<dyn DatabaseClient>, config: PlanningConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Connector for SqlConnector {
    async fn get_splits(&self, split_hint: usize) -> Result<Vec<PartitionSpec>> {
        PartitionPlanner::new(self.client.clone()).plan(&self.config, split_hint).await
    }

    async fn read_split(&self, split: PartitionSpec) -> Result<PartitionReader> {
        PartitionReader::open(self.client.as_ref(), split).await
    }
}
