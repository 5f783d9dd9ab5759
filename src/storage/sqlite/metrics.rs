//! Shared metrics recording for storage backends.

use std::time::Instant;

/// Records operation metrics for storage operations.
///
/// Two series are recorded per call:
/// 1. `storage_operations_total` - counter by backend, operation and status
/// 2. `storage_operation_duration_ms` - latency histogram with the same labels
///
/// # Arguments
///
/// * `backend` - Backend name (`memory`, `sqlite`, `postgres`)
/// * `operation` - Operation name (`insert`, `select`, ...)
/// * `start` - Operation start time from `Instant::now()`
/// * `status` - `"success"` or `"error"`
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Maps a result to the status label used by [`record_operation_metrics`].
#[must_use]
pub const fn status_label<T>(result: &crate::Result<T>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_record_operation_metrics_without_recorder() {
        // No recorder is installed in unit tests; recording must be a no-op.
        let start = Instant::now();
        record_operation_metrics("sqlite", "select", start, "success");
        record_operation_metrics("sqlite", "select", start, "error");
    }

    #[test]
    fn test_status_label() {
        let ok: crate::Result<()> = Ok(());
        let err: crate::Result<()> = Err(Error::InvalidInput("x".to_string()));
        assert_eq!(status_label(&ok), "success");
        assert_eq!(status_label(&err), "error");
    }
}
