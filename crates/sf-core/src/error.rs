//! Unified error type for the stillforge application.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for API handlers to derive an HTTP status code via [`Error::http_status`] and
//! for the job orchestrator to classify a failed run.

use std::fmt;
use std::time::Duration;

use crate::job::PipelineStage;

/// Unified error type covering all failure modes in stillforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "object").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation (bad duration, unsatisfiable plan, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The entity exists but is not in a state that allows the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run or exited non-zero.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool exceeded its time budget and was killed.
    #[error("Tool error [{tool}]: timed out after {timeout:?}")]
    ToolTimeout {
        /// Name of the tool that timed out.
        tool: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// Rendering a single segment exceeded the per-segment timeout.
    #[error("Segment {segment_index} timed out after {timeout:?}")]
    SegmentTimeout {
        /// Zero-based index of the segment in the plan.
        segment_index: usize,
        /// The per-segment budget that was exceeded.
        timeout: Duration,
    },

    /// The codec service failed to render a segment for a non-timeout reason.
    #[error("Segment {segment_index} render failed: {message}")]
    SegmentRender {
        /// Zero-based index of the segment in the plan.
        segment_index: usize,
        /// Diagnostic text captured from the codec service.
        message: String,
    },

    /// Joining the rendered segments failed.
    #[error("Concat error: {0}")]
    Concat(String),

    /// Probing or trimming the assembled output failed.
    #[error("Trim error: {0}")]
    Trim(String),

    /// The whole job exceeded its overall time budget.
    #[error("Job timed out after {timeout:?} during {stage}")]
    JobTimeout {
        /// The pipeline stage that was running when the budget ran out.
        stage: PipelineStage,
        /// The job-level budget that was exceeded.
        timeout: Duration,
    },

    /// A blob store read or write failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } | Error::ToolTimeout { .. } => 502,
            Error::SegmentTimeout { .. } | Error::JobTimeout { .. } => 504,
            Error::SegmentRender { .. } | Error::Concat(_) | Error::Trim(_) => 500,
            Error::Storage(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Validation(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::Database { .. } => "database_error",
            Error::Io { .. } => "io_error",
            Error::Tool { .. } => "tool_error",
            Error::ToolTimeout { .. } => "tool_timeout",
            Error::SegmentTimeout { .. } => "segment_timeout",
            Error::SegmentRender { .. } => "segment_render_error",
            Error::Concat(_) => "concat_error",
            Error::Trim(_) => "trim_error",
            Error::JobTimeout { .. } => "job_timeout",
            Error::Storage(_) => "storage_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Storage`].
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("job", "abc-123");
        assert_eq!(err.to_string(), "job not found: abc-123");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("duration_seconds must be between 1 and 600".into());
        assert_eq!(
            err.to_string(),
            "Validation error: duration_seconds must be between 1 and 600"
        );
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn conflict_display() {
        let err = Error::Conflict("job is not completed".into());
        assert_eq!(err.to_string(), "Conflict: job is not completed");
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn database_display() {
        let err = Error::database("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn tool_timeout_display() {
        let err = Error::ToolTimeout {
            tool: "ffmpeg".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: timed out after 5s");
        assert_eq!(err.code(), "tool_timeout");
    }

    #[test]
    fn segment_errors_display() {
        let err = Error::SegmentTimeout {
            segment_index: 2,
            timeout: Duration::from_secs(300),
        };
        assert_eq!(err.to_string(), "Segment 2 timed out after 300s");

        let err = Error::SegmentRender {
            segment_index: 0,
            message: "Invalid data found when processing input".into(),
        };
        assert!(err.to_string().starts_with("Segment 0 render failed"));
    }

    #[test]
    fn job_timeout_names_stage() {
        let err = Error::JobTimeout {
            stage: PipelineStage::Concat,
            timeout: Duration::from_secs(1800),
        };
        assert_eq!(err.to_string(), "Job timed out after 1800s during concat");
        assert_eq!(err.http_status(), 504);
    }

    #[test]
    fn storage_display() {
        let err = Error::storage("object missing");
        assert_eq!(err.to_string(), "Storage error: object missing");
        assert_eq!(err.code(), "storage_error");
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
