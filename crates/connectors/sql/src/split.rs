//! Partition descriptions handed from the planner to the workers.

use igloo_common::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One independently executable unit of the overall query.
///
/// All splits of one planning run have the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionSpec {
    /// Query template plus the positional values bound into it.
    Parameterized { query: String, params: Vec<Value> },
    /// Base query restricted to the row offsets `[start, end)`.
    Ranged {
        query: String,
        start: u64,
        end: u64,
        order_by: Option<String>,
    },
}

impl PartitionSpec {
    pub fn parameterized(query: impl Into<String>, params: Vec<Value>) -> Self {
        PartitionSpec::Parameterized { query: query.into(), params }
    }

    pub fn ranged(query: impl Into<String>, start: u64, end: u64) -> Self {
        PartitionSpec::Ranged { query: query.into(), start, end, order_by: None }
    }

    /// Orders the wrapped result before paging so that ranges stay disjoint.
    pub fn with_order_by(self, columns: Option<String>) -> Self {
        match self {
            PartitionSpec::Ranged { query, start, end, .. } => {
                PartitionSpec::Ranged { query, start, end, order_by: columns }
            }
            other => other,
        }
    }

    /// The base query or template this split was derived from.
    pub fn base_query(&self) -> &str {
        match self {
            PartitionSpec::Parameterized { query, .. } | PartitionSpec::Ranged { query, .. } => query,
        }
    }

    /// First row key emitted by a reader of this split.
    pub fn start_offset(&self) -> u64 {
        match self {
            PartitionSpec::Parameterized { .. } => 0,
            PartitionSpec::Ranged { start, .. } => *start,
        }
    }

    /// Declared number of rows, known only for ranged splits.
    pub fn length(&self) -> Option<u64> {
        match self {
            PartitionSpec::Parameterized { .. } => None,
            PartitionSpec::Ranged { start, end, .. } => Some(end.saturating_sub(*start)),
        }
    }

    pub fn bind_params(&self) -> &[Value] {
        match self {
            PartitionSpec::Parameterized { params, .. } => params,
            PartitionSpec::Ranged { .. } => &[],
        }
    }

    /// The SQL text actually submitted for this split.
    pub fn effective_query(&self) -> String {
        match self {
            PartitionSpec::Parameterized { query, .. } => query.clone(),
            PartitionSpec::Ranged { query, start, end, order_by } => {
                range_query(query, *start, end.saturating_sub(*start), order_by.as_deref())
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionSpec::Parameterized { params, .. } => {
                let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "params [{}]", rendered.join(", "))
            }
            PartitionSpec::Ranged { start, end, .. } => write!(f, "rows [{}, {})", start, end),
        }
    }
}

/// Wraps `base` so that it returns its row count.
pub fn count_query(base: &str) -> String {
    format!("SELECT COUNT(*) FROM (\n{}\n) AS count_wrapper", base)
}

/// Wraps `base` so that it returns `limit` rows starting at row `offset`.
pub fn range_query(base: &str, offset: u64, limit: u64, order_by: Option<&str>) -> String {
    let order = match order_by {
        Some(columns) if !columns.trim().is_empty() => format!(" ORDER BY {}", columns.trim()),
        _ => String::new(),
    };
    format!(
        "SELECT * FROM (\n{}\n) AS range_wrapper{} LIMIT {} OFFSET {}",
        base, order, limit, offset
    )
}
