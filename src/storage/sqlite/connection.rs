//! Shared lock and connection handling.
//!
//! Both the `SQLite` backend and the in-memory backend keep their state
//! behind a `std::sync::Mutex`; [`acquire_lock`] is the single place where
//! poisoning is handled.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Busy timeout applied to every `SQLite` connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// the inner value is recovered and a warning is logged. Row vectors and
/// connections stay structurally valid across a panicking reader.
///
/// # Examples
///
/// ```
/// use std::sync::Mutex;
/// use spendlog::storage::sqlite::acquire_lock;
///
/// let mutex = Mutex::new(vec![1, 2, 3]);
/// let guard = acquire_lock(&mutex);
/// assert_eq!(guard.len(), 3);
/// ```
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Storage mutex was poisoned, recovering");
            metrics::counter!("storage_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for concurrent use.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to [`BUSY_TIMEOUT_MS`] on lock contention
///
/// The busy timeout is the only bound on how long a statement can wait for
/// the database; `SQLite` has no network round trip to time out.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns the resulting mode as a row; in-memory databases
    // answer "memory" and that is fine.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| Error::OperationFailed {
            operation: "configure_sqlite".to_string(),
            cause: e.to_string(),
        })?;

    Ok(())
}
