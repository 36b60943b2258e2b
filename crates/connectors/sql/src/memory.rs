//! A scripted, in-process [`DatabaseClient`].
//!
//! Results are registered per query text (and optionally per bind values)
//! instead of being computed, which makes it suitable for exercising the
//! planner and the readers without a database. Failures can be injected
//! at connect time, at query submission and in the middle of a result set.

use crate::client::{Connection, Cursor, DatabaseClient, Row};
use async_trait::async_trait;
use igloo_common::{Error, Result, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Scripted {
    Rows {
        columns: usize,
        rows: Vec<Row>,
        /// Fail instead of returning the row at this index.
        fail_at: Option<(usize, String)>,
    },
    Fail(String),
}

#[derive(Debug, Clone)]
struct Entry {
    sql: String,
    params: Option<Vec<Value>>,
    result: Scripted,
}

#[derive(Default)]
struct Inner {
    entries: RwLock<Vec<Entry>>,
    executed: RwLock<Vec<(String, Vec<Value>)>>,
    refuse_connections: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Cloning shares the registry and the counters.
#[derive(Clone, Default)]
pub struct MemoryClient {
    inner: Arc<Inner>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `sql` with `rows`, whatever values are bound.
    pub async fn register(&self, sql: impl Into<String>, columns: usize, rows: Vec<Row>) {
        self.push(sql.into(), None, Scripted::Rows { columns, rows, fail_at: None }).await;
    }

    /// Answers `sql` with `rows` only when exactly `params` are bound.
    /// Takes precedence over [`register`](Self::register).
    pub async fn register_with_params(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
        columns: usize,
        rows: Vec<Row>,
    ) {
        self.push(sql.into(), Some(params), Scripted::Rows { columns, rows, fail_at: None }).await;
    }

    /// Returns the first `after` rows of `rows`, then fails.
    pub async fn register_failing_after(
        &self,
        sql: impl Into<String>,
        columns: usize,
        rows: Vec<Row>,
        after: usize,
        message: impl Into<String>,
    ) {
        let fail_at = Some((after, message.into()));
        self.push(sql.into(), None, Scripted::Rows { columns, rows, fail_at }).await;
    }

    /// Rejects `sql` at submission.
    pub async fn fail_query(&self, sql: impl Into<String>, message: impl Into<String>) {
        self.push(sql.into(), None, Scripted::Fail(message.into())).await;
    }

    /// Makes every later `connect` fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn connections_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Counts every `close` call, so a double release shows up here.
    pub fn connections_closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Queries submitted so far, in order, with their bind values.
    pub async fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.inner.executed.read().await.clone()
    }

    async fn push(&self, sql: String, params: Option<Vec<Value>>, result: Scripted) {
        let mut entries = self.inner.entries.write().await;
        entries.retain(|e| !(e.sql == sql && e.params == params));
        entries.push(Entry { sql, params, result });
    }

    async fn lookup(&self, sql: &str, params: &[Value]) -> Option<Scripted> {
        let entries = self.inner.entries.read().await;
        let exact = entries.iter().find(|e| e.sql == sql && e.params.as_deref() == Some(params));
        let any = || entries.iter().find(|e| e.sql == sql && e.params.is_none());
        exact.or_else(any).map(|e| e.result.clone())
    }
}

#[async_trait]
impl DatabaseClient for MemoryClient {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(Error::execution("connect", "connection refused"));
        }
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection { client: self.clone(), open: true }))
    }
}

struct MemoryConnection {
    client: MemoryClient,
    open: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn Cursor>> {
        if !self.open {
            return Err(Error::state("connection is closed"));
        }
        self.client.inner.executed.write().await.push((sql.to_string(), params.to_vec()));
        match self.client.lookup(sql, params).await {
            Some(Scripted::Rows { columns, rows, fail_at }) => Ok(Box::new(MemoryCursor {
                query: sql.to_string(),
                columns,
                rows: rows.into(),
                returned: 0,
                fail_at,
            })),
            Some(Scripted::Fail(message)) => Err(Error::execution(sql, message)),
            None => Err(Error::execution(sql, "no result registered for query")),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.client.inner.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryCursor {
    query: String,
    columns: usize,
    rows: VecDeque<Row>,
    returned: usize,
    fail_at: Option<(usize, String)>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    fn column_count(&self) -> usize {
        self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some((at, message)) = &self.fail_at {
            if self.returned == *at {
                return Err(Error::execution(&self.query, message));
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.returned += 1;
        }
        Ok(row)
    }

    async fn close(&mut self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}
