//! Progress reporting for export workers.

use crate::job::JobToken;

/// Receives progress messages from running exports.
pub trait ProgressReporter: Send + Sync {
    /// `count` is the number of features written so far, when known.
    fn message(&self, job: &JobToken, msg: &str, count: Option<u64>);
}

/// Forwards progress to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn message(&self, job: &JobToken, msg: &str, count: Option<u64>) {
        match count {
            Some(rows) => tracing::info!(job = %job, rows, "{msg}"),
            None => tracing::info!(job = %job, "{msg}"),
        }
    }
}
