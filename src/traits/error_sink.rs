//! Sink for failures nobody is waiting on

use tracing::error;

use crate::error::CompetencyError;
use crate::models::SubjectId;

/// Receives updates the sync loop gave up on.
///
/// The caller of the original mutation has already moved on with an
/// optimistic result, so these never propagate as `Err`.
pub trait ErrorSink: Send + Sync {
    fn report(&self, subject: &SubjectId, error: &CompetencyError);
}

/// Default sink: logs at error level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, subject: &SubjectId, err: &CompetencyError) {
        error!(subject = %subject, error = %err, "Pending update dropped");
    }
}
