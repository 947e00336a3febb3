//! Job-domain enums: record kinds, lifecycle states, failure codes, camera
//! motion presets and pipeline stages.
//!
//! Every enum has a stable lowercase text form (except [`ErrorCode`], which is
//! upper snake case) used both by serde and by the flat job record store, so
//! `Display` and `FromStr` always agree with the JSON representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Hard ceiling on the requested and delivered video duration, in seconds.
pub const MAX_VIDEO_DURATION_SECS: u32 = 600;

/// Smallest accepted requested duration, in seconds.
pub const MIN_VIDEO_DURATION_SECS: u32 = 1;

/// Upper bound (inclusive) for randomly drawn render seeds.
pub const MAX_SEED: u32 = 2_147_483_647;

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// What a job record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// A stored source image. Immutable once created.
    Upload,
    /// A request to synthesize a video from an upload.
    Video,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "video" => Ok(Self::Video),
            other => Err(Error::Validation(format!("unknown job kind: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// Upload jobs are created directly in `Uploaded`. Video jobs move
/// `Queued -> Running -> Succeeded | Failed`, and a retried job goes back
/// from `Failed` to `Running` for its next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether the current attempt has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(Self::Uploaded),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown job status: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Client-facing failure classification stored on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A segment (or the render stage) ran out of time. Worth retrying.
    SegmentTimeout,
    /// Any other failure.
    VideoGenerationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SegmentTimeout => "SEGMENT_TIMEOUT",
            Self::VideoGenerationFailed => "VIDEO_GENERATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEGMENT_TIMEOUT" => Ok(Self::SegmentTimeout),
            "VIDEO_GENERATION_FAILED" => Ok(Self::VideoGenerationFailed),
            other => Err(Error::Validation(format!("unknown error code: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CameraMotion
// ---------------------------------------------------------------------------

/// Camera movement applied uniformly to every segment of a job.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CameraMotion {
    Static,
    #[default]
    SlowPushIn,
    SlowPullOut,
}

impl CameraMotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::SlowPushIn => "slow_push_in",
            Self::SlowPullOut => "slow_pull_out",
        }
    }
}

impl fmt::Display for CameraMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraMotion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "slow_push_in" => Ok(Self::SlowPushIn),
            "slow_pull_out" => Ok(Self::SlowPullOut),
            other => Err(Error::Validation(format!(
                "unknown camera motion: {other} (expected static, slow_push_in or slow_pull_out)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStage
// ---------------------------------------------------------------------------

/// The step of a video job currently executing. Used to attribute job-level
/// timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Fetch,
    Plan,
    Render,
    Concat,
    Enforce,
    Upload,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Plan => "plan",
            Self::Render => "render",
            Self::Concat => "concat",
            Self::Enforce => "enforce",
            Self::Upload => "upload",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_matches_serde() {
        for status in [
            JobStatus::Uploaded,
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn error_code_is_upper_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::SegmentTimeout).unwrap(),
            "\"SEGMENT_TIMEOUT\""
        );
        assert_eq!(
            "VIDEO_GENERATION_FAILED".parse::<ErrorCode>().unwrap(),
            ErrorCode::VideoGenerationFailed
        );
    }

    #[test]
    fn camera_motion_defaults_to_push_in() {
        assert_eq!(CameraMotion::default(), CameraMotion::SlowPushIn);
        let parsed: CameraMotion = serde_json::from_str("\"slow_pull_out\"").unwrap();
        assert_eq!(parsed, CameraMotion::SlowPullOut);
        assert_eq!(parsed.to_string(), "slow_pull_out");
    }

    #[test]
    fn unknown_text_is_validation_error() {
        assert!(matches!(
            "orbit".parse::<CameraMotion>(),
            Err(Error::Validation(_))
        ));
        assert!("cancelled".parse::<JobStatus>().is_err());
        assert!("image".parse::<JobKind>().is_err());
    }

    #[test]
    fn stage_display() {
        assert_eq!(PipelineStage::Render.to_string(), "render");
        assert_eq!(PipelineStage::Enforce.to_string(), "enforce");
    }
}
