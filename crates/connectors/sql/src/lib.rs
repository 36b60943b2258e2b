//! SQL connector crate
//!
//! Reads the result of an arbitrary SQL query as independent partitions.
//! The coordinator plans the query once with [`PartitionPlanner`]; every
//! worker then reads its [`PartitionSpec`] with a [`PartitionReader`] on a
//! connection of its own.
//!
//! # Example
//! ```rust,no_run
//! use igloo_connector_sql::{Connector, MemoryClient, PlanningConfig, SqlConnector};
//! use std::sync::Arc;
//!
//! # async fn run() -> igloo_common::Result<()> {
//! let client = Arc::new(MemoryClient::new());
//! let connector = SqlConnector::new(client, PlanningConfig::new("select * from events"));
//! for split in connector.get_splits(4).await? {
//!     let mut reader = connector.read_split(split).await?;
//!     while let Some((key, record)) = reader.next().await? {
//!         println!("{} {:?}", key, record.values());
//!     }
//!     reader.close().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod embedded;
pub mod logging;
pub mod memory;
pub mod planner;
pub mod reader;
pub mod split;

pub use client::{Connection, Cursor, DatabaseClient, Row};
pub use connector::{Connector, SqlConnector};
pub use embedded::EmbeddedClient;
pub use memory::MemoryClient;
pub use planner::{PartitionPlanner, PlanningConfig, SplitStrategy};
pub use reader::{PartitionReader, ReaderState};
pub use split::PartitionSpec;
