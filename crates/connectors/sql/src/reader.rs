//! Per-worker reader for a single partition.

use crate::client::{Connection, Cursor, DatabaseClient};
use crate::split::PartitionSpec;
use async_stream::try_stream;
use futures::Stream;
use igloo_common::{Error, Record, Result};
use tracing::{debug, warn};

/// Lifecycle of a [`PartitionReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Constructed, no connection yet.
    Created,
    /// Query submitted, no row read yet.
    Opened,
    /// At least one row read.
    Streaming,
    /// The cursor has no further rows.
    Exhausted,
    /// Handles released. Terminal.
    Closed,
}

/// Streams the rows of one partition from its own connection.
///
/// `next` overwrites a single [`Record`] in place; the borrow it returns
/// ends before the following call, so callers copy whatever they keep.
pub struct PartitionReader {
    spec: PartitionSpec,
    connection: Option<Box<dyn Connection>>,
    cursor: Option<Box<dyn Cursor>>,
    record: Record,
    n_columns: usize,
    rows_read: u64,
    exhausted: bool,
    state: ReaderState,
}

impl PartitionReader {
    pub fn new(spec: PartitionSpec) -> Self {
        Self {
            spec,
            connection: None,
            cursor: None,
            record: Record::default(),
            n_columns: 0,
            rows_read: 0,
            exhausted: false,
            state: ReaderState::Created,
        }
    }

    /// Connects and submits the partition's query.
    pub async fn open(client: &dyn DatabaseClient, spec: PartitionSpec) -> Result<Self> {
        let mut reader = Self::new(spec);
        reader.connect(client).await?;
        Ok(reader)
    }

    /// Moves a `Created` reader to `Opened`.
    ///
    /// No retry happens here. If the query cannot be submitted the
    /// connection is released before the error is returned.
    pub async fn connect(&mut self, client: &dyn DatabaseClient) -> Result<()> {
        if self.state != ReaderState::Created {
            return Err(Error::state(format!("cannot open a reader in state {:?}", self.state)));
        }
        let query = self.spec.effective_query();
        let mut connection = client.connect().await?;
        let cursor = match connection.execute(&query, self.spec.bind_params()).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, split = %self.spec, "partition query failed");
                if let Err(close_err) = connection.close().await {
                    warn!(error = %close_err, "failed to close connection after open failure");
                }
                return Err(e);
            }
        };
        self.n_columns = cursor.column_count();
        self.record = Record::with_columns(self.n_columns);
        self.connection = Some(connection);
        self.cursor = Some(cursor);
        self.state = ReaderState::Opened;
        debug!(split = %self.spec, columns = self.n_columns, "opened partition reader");
        Ok(())
    }

    /// Reads the next row and its key.
    ///
    /// Keys start at the split's start offset and grow by one per row.
    /// Returns `None` once the partition is exhausted, on every later call
    /// too.
    pub async fn next(&mut self) -> Result<Option<(u64, &Record)>> {
        match self.state {
            ReaderState::Closed => return Err(Error::state("read from a closed partition reader")),
            ReaderState::Created => return Err(Error::state("read from a reader that was never opened")),
            ReaderState::Exhausted => return Ok(None),
            ReaderState::Opened | ReaderState::Streaming => {}
        }

        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::state("partition reader has no cursor"))?;
        let row = match cursor.next_row().await? {
            Some(row) => row,
            None => {
                self.finish().await;
                return Ok(None);
            }
        };
        if row.len() != self.n_columns {
            return Err(Error::execution(
                self.spec.effective_query(),
                format!("row has {} columns, expected {}", row.len(), self.n_columns),
            ));
        }

        let key = self.spec.start_offset() + self.rows_read;
        for (i, value) in row.into_iter().enumerate() {
            self.record.set(i, value)?;
        }
        self.rows_read += 1;
        self.state = ReaderState::Streaming;
        Ok(Some((key, &self.record)))
    }

    async fn finish(&mut self) {
        self.exhausted = true;
        self.state = ReaderState::Exhausted;
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close().await {
                warn!(error = %e, "failed to close exhausted cursor");
            }
        }
        debug!(split = %self.spec, rows = self.rows_read, "partition exhausted");
    }

    /// Fraction of the partition read so far, in `[0, 1]`.
    ///
    /// Splits without a declared length only report completion.
    pub fn progress(&self) -> f64 {
        if self.exhausted {
            return 1.0;
        }
        match self.spec.length() {
            Some(0) => 1.0,
            Some(width) => (self.rows_read as f64 / width as f64).min(1.0),
            None => 0.0,
        }
    }

    /// Releases the cursor and the connection. Closing again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ReaderState::Closed {
            return Ok(());
        }
        self.state = ReaderState::Closed;

        let mut first_err = None;
        if let Some(mut cursor) = self.cursor.take() {
            if let Err(e) = cursor.close().await {
                first_err.get_or_insert(e);
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                first_err.get_or_insert(e);
            }
        }
        debug!(split = %self.spec, rows = self.rows_read, "closed partition reader");
        match first_err {
            Some(e) => {
                warn!(error = %e, "partition reader closed with errors");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Rows returned so far.
    pub fn pos(&self) -> u64 {
        self.rows_read
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn column_count(&self) -> usize {
        self.n_columns
    }

    pub fn spec(&self) -> &PartitionSpec {
        &self.spec
    }

    /// Turns the reader into a stream of owned rows.
    ///
    /// The reader is closed once the partition is exhausted and also before
    /// a read error is yielded.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<(u64, Record)>> + Send {
        try_stream! {
            loop {
                let item = self.next().await.map(|row| row.map(|(key, record)| (key, record.clone())));
                match item {
                    Ok(Some(item)) => yield item,
                    Ok(None) => break,
                    Err(e) => {
                        if let Err(close_err) = self.close().await {
                            warn!(error = %close_err, "failed to close reader after read error");
                        }
                        Err::<(), Error>(e)?;
                    }
                }
            }
            self.close().await?;
        }
    }
}

impl Drop for PartitionReader {
    fn drop(&mut self) {
        if self.connection.is_some() {
            warn!(split = %self.spec, "partition reader dropped without close");
        }
    }
}
