//! An in-process analytical database backed by DataFusion.
//!
//! Tables are registered up front (CSV files or record batches) and every
//! connection shares the same session. Placeholders are DataFusion's
//! `$1..$n`.

use crate::client::{Connection, Cursor, DatabaseClient, Row};
use async_trait::async_trait;
use chrono::DateTime;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::execution::context::SessionContext;
use datafusion::physical_plan::SendableRecordBatchStream;
use datafusion::prelude::{CsvReadOptions, SessionConfig};
use datafusion::scalar::ScalarValue;
use futures::StreamExt;
use igloo_common::{Error, Result, Value};
use tracing::debug;

#[derive(Clone)]
pub struct EmbeddedClient {
    ctx: SessionContext,
}

impl Default for EmbeddedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedClient {
    pub fn new() -> Self {
        // A single target partition keeps unordered scans in insertion order
        let config = SessionConfig::new().with_target_partitions(1);
        Self { ctx: SessionContext::new_with_config(config) }
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    pub async fn register_csv(&self, name: &str, path: &str) -> Result<()> {
        self.ctx
            .register_csv(name, path, CsvReadOptions::new())
            .await
            .map_err(|e| Error::configuration(format!("failed to register table {} from {}: {}", name, path, e)))?;
        debug!(table = name, path, "registered csv table");
        Ok(())
    }

    pub fn register_batch(&self, name: &str, batch: RecordBatch) -> Result<()> {
        self.ctx
            .register_batch(name, batch)
            .map_err(|e| Error::configuration(format!("failed to register table {}: {}", name, e)))?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseClient for EmbeddedClient {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(EmbeddedConnection { ctx: Some(self.ctx.clone()) }))
    }
}

struct EmbeddedConnection {
    ctx: Option<SessionContext>,
}

#[async_trait]
impl Connection for EmbeddedConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn Cursor>> {
        let ctx = self.ctx.as_ref().ok_or_else(|| Error::state("connection is closed"))?;
        let mut df = ctx.sql(sql).await.map_err(|e| Error::execution(sql, e))?;
        if !params.is_empty() {
            let scalars: Vec<ScalarValue> = params.iter().map(value_to_scalar).collect();
            df = df.with_param_values(scalars).map_err(|e| Error::execution(sql, e))?;
        }
        let column_count = df.schema().fields().len();
        let stream = df.execute_stream().await.map_err(|e| Error::execution(sql, e))?;
        Ok(Box::new(EmbeddedCursor {
            query: sql.to_string(),
            column_count,
            stream: Some(stream),
            batch: None,
            row: 0,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.ctx = None;
        Ok(())
    }
}

struct EmbeddedCursor {
    query: String,
    column_count: usize,
    stream: Option<SendableRecordBatchStream>,
    batch: Option<RecordBatch>,
    row: usize,
}

#[async_trait]
impl Cursor for EmbeddedCursor {
    fn column_count(&self) -> usize {
        self.column_count
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(batch) = &self.batch {
                if self.row < batch.num_rows() {
                    let row = batch
                        .columns()
                        .iter()
                        .map(|array| ScalarValue::try_from_array(array, self.row).map(scalar_to_value))
                        .collect::<std::result::Result<Row, _>>()
                        .map_err(|e| Error::execution(&self.query, e))?;
                    self.row += 1;
                    return Ok(Some(row));
                }
            }
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Ok(None),
            };
            match stream.next().await {
                Some(Ok(batch)) => {
                    self.batch = Some(batch);
                    self.row = 0;
                }
                Some(Err(e)) => return Err(Error::execution(&self.query, e)),
                None => {
                    self.stream = None;
                    self.batch = None;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the stream cancels the running plan
        self.stream = None;
        self.batch = None;
        Ok(())
    }
}

pub fn value_to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::Boolean(b) => ScalarValue::Boolean(Some(*b)),
        Value::Integer(i) => ScalarValue::Int64(Some(*i)),
        Value::Float(f) => ScalarValue::Float64(Some(*f)),
        Value::Text(s) => ScalarValue::Utf8(Some(s.clone())),
        Value::Binary(b) => ScalarValue::Binary(Some(b.clone())),
        Value::Timestamp(ts) => ScalarValue::TimestampMicrosecond(Some(ts.and_utc().timestamp_micros()), None),
        Value::Decimal { unscaled, precision, scale } => {
            ScalarValue::Decimal128(Some(*unscaled), *precision, *scale)
        }
    }
}

pub fn scalar_to_value(scalar: ScalarValue) -> Value {
    match scalar {
        ScalarValue::Boolean(v) => v.map_or(Value::Null, Value::Boolean),
        ScalarValue::Int8(v) => v.map_or(Value::Null, |v| Value::Integer(v.into())),
        ScalarValue::Int16(v) => v.map_or(Value::Null, |v| Value::Integer(v.into())),
        ScalarValue::Int32(v) => v.map_or(Value::Null, |v| Value::Integer(v.into())),
        ScalarValue::Int64(v) => v.map_or(Value::Null, Value::Integer),
        ScalarValue::UInt8(v) => v.map_or(Value::Null, |v| Value::Integer(v.into())),
        ScalarValue::UInt16(v) => v.map_or(Value::Null, |v| Value::Integer(v.into())),
        ScalarValue::UInt32(v) => v.map_or(Value::Null, |v| Value::Integer(v.into())),
        ScalarValue::UInt64(v) => v.map_or(Value::Null, |v| match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Decimal { unscaled: v.into(), precision: 20, scale: 0 },
        }),
        ScalarValue::Float32(v) => v.map_or(Value::Null, |v| Value::Float(v.into())),
        ScalarValue::Float64(v) => v.map_or(Value::Null, Value::Float),
        ScalarValue::Utf8(v) | ScalarValue::LargeUtf8(v) | ScalarValue::Utf8View(v) => {
            v.map_or(Value::Null, Value::Text)
        }
        ScalarValue::Binary(v)
        | ScalarValue::LargeBinary(v)
        | ScalarValue::BinaryView(v)
        | ScalarValue::FixedSizeBinary(_, v) => v.map_or(Value::Null, Value::Binary),
        ScalarValue::Decimal128(v, precision, scale) => {
            v.map_or(Value::Null, |unscaled| Value::Decimal { unscaled, precision, scale })
        }
        ScalarValue::TimestampSecond(v, _) => timestamp(v.and_then(|s| DateTime::from_timestamp(s, 0))),
        ScalarValue::TimestampMillisecond(v, _) => timestamp(v.and_then(DateTime::from_timestamp_millis)),
        ScalarValue::TimestampMicrosecond(v, _) => timestamp(v.and_then(DateTime::from_timestamp_micros)),
        ScalarValue::TimestampNanosecond(v, _) => timestamp(v.map(DateTime::from_timestamp_nanos)),
        ScalarValue::Date32(v) => timestamp(v.and_then(|days| DateTime::from_timestamp(i64::from(days) * 86_400, 0))),
        other if other.is_null() => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

fn timestamp(ts: Option<DateTime<chrono::Utc>>) -> Value {
    ts.map_or(Value::Null, |ts| Value::Timestamp(ts.naive_utc()))
}
