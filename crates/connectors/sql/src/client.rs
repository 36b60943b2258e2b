//! The database capability consumed by the planner and the partition readers.
//!
//! The connector never speaks a wire protocol itself. Anything that can open
//! a connection, run a query with positional bind values and hand back a
//! forward-only cursor can back it.

use async_trait::async_trait;
use igloo_common::{Result, Value};

/// One complete row as produced by a [`Cursor`].
pub type Row = Vec<Value>;

/// Opens connections to the remote database.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// A single connection. Never shared between partitions.
#[async_trait]
pub trait Connection: Send {
    /// Submits `sql` with positional bind values and returns its cursor.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn Cursor>>;

    /// Releases the connection. Callers invoke this at most once.
    async fn close(&mut self) -> Result<()>;
}

/// Forward-only iteration over a result set.
#[async_trait]
pub trait Cursor: Send {
    fn column_count(&self) -> usize;

    /// Fetches the next row. A row is either returned whole or not at all.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Terminates the outstanding query.
    async fn close(&mut self) -> Result<()>;
}
