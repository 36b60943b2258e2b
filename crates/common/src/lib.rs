//! Common crate
//!
//! Shared types and error handling for Igloo.
//!
//! # Example
//! ```rust
//! use igloo_common::{Error, Record, Value};
//!
//! let mut record = Record::with_columns(2);
//! record.set(0, Value::Integer(7)).unwrap();
//! assert_eq!(record.get(0), Some(&Value::Integer(7)));
//!
//! let err = Error::configuration("missing input query");
//! assert!(!err.is_retryable());
//! ```

pub mod error;
pub mod record;

pub use error::{Error, Result};
pub use record::{Record, Value};
