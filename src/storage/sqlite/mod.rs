//! `SQLite` storage backend and shared storage infrastructure.
//!
//! ## Module Structure
//!
//! - [`connection`]: lock acquisition with poison recovery, connection pragmas
//! - [`metrics`]: shared operation metrics used by every backend
//! - `backend`: [`SqliteBackend`], executing built statements with named parameters

mod backend;
mod connection;
mod metrics;

pub use backend::SqliteBackend;
pub use connection::{BUSY_TIMEOUT_MS, acquire_lock, configure_connection};
pub use metrics::{record_operation_metrics, status_label};
