//! Benign-interrupt classification.
//!
//! When a stream consumer disconnects elsewhere in the process, the
//! resulting cancellation can surface inside an unrelated checkpoint write
//! as a closed-connection or interrupted I/O error.  Those are expected,
//! not faults: the checkpoint is at most one page behind and the next
//! resume re-scans that page.  Classification walks the wrapped-error
//! chain and pattern-matches known interruption signatures.

use std::error::Error;
use std::io;

/// Substrings that identify a closed/cancelled connection when the error
/// type itself is opaque (driver-internal wrappers).
const BENIGN_MESSAGE_PATTERNS: &[&str] = &[
    "connection closed",
    "connection reset",
    "broken pipe",
    "operation was interrupted",
    "task was cancelled",
];

/// True when any cause in the chain is an interruption/cancellation
/// signature rather than a real persistence fault.
pub fn is_benign_interrupt(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        if let Some(sqlx_err) = e.downcast_ref::<sqlx::Error>() {
            if matches!(sqlx_err, sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed) {
                return true;
            }
        }
        let msg = e.to_string().to_lowercase();
        if BENIGN_MESSAGE_PATTERNS.iter().any(|p| msg.contains(p)) {
            return true;
        }
        current = e.source();
    }
    false
}
