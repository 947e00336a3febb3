//! Translation of pipeline errors into the client-facing failure outcome.

use sf_core::{Error, ErrorCode, PipelineStage};

/// How a failed run is reported and whether the queue should try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureClass {
    pub code: ErrorCode,
    pub retryable: bool,
}

/// Classify a failed run.
///
/// Only running out of time while rendering is worth another attempt;
/// everything else fails the job for good.
pub fn classify_failure(err: &Error) -> FailureClass {
    match err {
        Error::SegmentTimeout { .. }
        | Error::JobTimeout {
            stage: PipelineStage::Render,
            ..
        } => FailureClass {
            code: ErrorCode::SegmentTimeout,
            retryable: true,
        },
        Error::JobTimeout { .. }
        | Error::SegmentRender { .. }
        | Error::Concat(_)
        | Error::Trim(_)
        | Error::Validation(_)
        | Error::NotFound { .. }
        | Error::Conflict(_)
        | Error::Database { .. }
        | Error::Io { .. }
        | Error::Tool { .. }
        | Error::ToolTimeout { .. }
        | Error::Storage(_)
        | Error::Internal(_) => FailureClass {
            code: ErrorCode::VideoGenerationFailed,
            retryable: false,
        },
    }
}
