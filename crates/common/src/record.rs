//! Positional row values shared by the planner and the partition readers.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed cell as returned by the database client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    Timestamp(NaiveDateTime),
    /// Fixed point number stored as `unscaled * 10^-scale`.
    Decimal { unscaled: i128, precision: u8, scale: i8 },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Decimal { unscaled, scale: 0, .. } => i64::try_from(*unscaled).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Binary(bytes) => {
                write!(f, "\\x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::Decimal { unscaled, scale, .. } => write!(f, "{}", format_decimal(*unscaled, *scale)),
        }
    }
}

fn format_decimal(unscaled: i128, scale: i8) -> String {
    if scale <= 0 {
        let mut digits = unscaled.to_string();
        if unscaled != 0 {
            digits.extend(std::iter::repeat('0').take(scale.unsigned_abs() as usize));
        }
        return digits;
    }
    let scale = scale as usize;
    let digits = unscaled.unsigned_abs().to_string();
    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let sign = if unscaled < 0 { "-" } else { "" };
    format!("{}{}.{}", sign, int_part, frac_part)
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

/// A fixed-width row addressed by column position.
///
/// A reader keeps one `Record` per partition and overwrites its slots on
/// every call to `next`, so the width never changes after construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Creates a record of `n` null slots.
    pub fn with_columns(n: usize) -> Self {
        Self { values: vec![Value::Null; n] }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Overwrites the slot at `index`.
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let width = self.values.len();
        let slot = self.values.get_mut(index).ok_or_else(|| {
            Error::state(format!("column index {} out of range for record of width {}", index, width))
        })?;
        *slot = value;
        Ok(())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_record_set_and_get() {
        let mut record = Record::with_columns(3);
        assert_eq!(record.len(), 3);
        assert!(record.iter().all(Value::is_null));

        record.set(0, Value::Integer(1)).unwrap();
        record.set(2, "x".into()).unwrap();

        assert_eq!(record.get(0), Some(&Value::Integer(1)));
        assert_eq!(record.get(1), Some(&Value::Null));
        assert_eq!(record.get(2).and_then(Value::as_str), Some("x"));
        assert_eq!(record.get(3), None);
    }

    #[test]
    fn test_record_set_out_of_range() {
        let mut record = Record::with_columns(1);
        let err = record.set(1, Value::Integer(5)).unwrap_err();
        assert!(matches!(err, Error::State(_)));
        // Width is unchanged after the failed write
        assert_eq!(record.values(), &[Value::Null]);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Binary(vec![0x0a, 0xff]).to_string(), "\\x0aff");
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(12, 30, 0).unwrap();
        assert_eq!(Value::Timestamp(ts).to_string(), "2024-03-01 12:30:00");
    }

    #[test]
    fn test_decimal_display() {
        let dec = |unscaled, scale| Value::Decimal { unscaled, precision: 10, scale };
        assert_eq!(dec(12345, 2).to_string(), "123.45");
        assert_eq!(dec(-5, 3).to_string(), "-0.005");
        assert_eq!(dec(7, 0).to_string(), "7");
        assert_eq!(dec(7, -2).to_string(), "700");
        assert_eq!(dec(0, -2).to_string(), "0");
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Integer(42).as_i64(), Some(42));
        assert_eq!(Value::Decimal { unscaled: 10, precision: 38, scale: 0 }.as_i64(), Some(10));
        assert_eq!(Value::Decimal { unscaled: 10, precision: 38, scale: 1 }.as_i64(), None);
        assert_eq!(Value::Text("1".to_string()).as_i64(), None);
    }

    #[test]
    fn test_record_survives_bincode() {
        let record = Record::from(vec![
            Value::Integer(1),
            Value::Decimal { unscaled: -42, precision: 5, scale: 1 },
            Value::Null,
        ]);
        let bytes = bincode::serialize(&record).unwrap();
        let decoded: Record = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
