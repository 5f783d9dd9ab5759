//! Data models for spendlog.
//!
//! Typed values and rows shared by every storage backend, plus the expense
//! record the services build on top of them.

mod expense;
mod row;
mod value;

pub use expense::{DEFAULT_CATEGORY, Expense};
pub use row::{Filter, Row};
pub use value::{ColumnType, Value, format_timestamp, parse_timestamp};
