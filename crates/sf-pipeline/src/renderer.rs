//! Segment renderer: one codec invocation per plan entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sf_av::{render_still, StillClip, ToolRegistry, ToolRunner};
use sf_core::config::RenderConfig;
use sf_core::{Error, Result};

use crate::planner::SegmentPlanEntry;

/// Renders plan entries from a still image.
///
/// Frame size, frame rate, codec and pixel format come from one
/// [`RenderConfig`] so every segment of a job can be stream-copied together.
pub struct SegmentRenderer {
    runner: Arc<dyn ToolRunner>,
    tools: Arc<ToolRegistry>,
    render: RenderConfig,
}

impl SegmentRenderer {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: Arc<ToolRegistry>, render: RenderConfig) -> Self {
        Self {
            runner,
            tools,
            render,
        }
    }

    /// Render `entry` into `output`.
    ///
    /// # Errors
    ///
    /// - [`Error::SegmentTimeout`] if the codec exceeds the per-segment budget.
    /// - [`Error::SegmentRender`] for any other failure.
    ///
    /// On error nothing is left at `output`.
    pub async fn render_segment(
        &self,
        image: &Path,
        entry: &SegmentPlanEntry,
        style: &str,
        output: &Path,
    ) -> Result<PathBuf> {
        let clip = StillClip {
            duration_sec: entry.duration_sec,
            seed: entry.seed,
            camera_motion: entry.camera_motion,
            subject_lock: entry.subject_lock,
            style: style.to_string(),
        };
        let timeout = self.render.segment_timeout();

        let result = render_still(
            self.runner.as_ref(),
            &self.tools,
            &self.render,
            image,
            &clip,
            output,
            timeout,
        )
        .await;

        let err = match result {
            Ok(_) if output.exists() => return Ok(output.to_path_buf()),
            Ok(_) => Error::SegmentRender {
                segment_index: entry.segment_index,
                message: format!("codec produced no output at {}", output.display()),
            },
            Err(Error::ToolTimeout { .. }) => Error::SegmentTimeout {
                segment_index: entry.segment_index,
                timeout,
            },
            Err(Error::Tool { message, .. }) => Error::SegmentRender {
                segment_index: entry.segment_index,
                message,
            },
            Err(other) => Error::SegmentRender {
                segment_index: entry.segment_index,
                message: other.to_string(),
            },
        };

        if output.exists() {
            if let Err(e) = std::fs::remove_file(output) {
                tracing::warn!("failed to remove partial segment {}: {e}", output.display());
            }
        }
        tracing::warn!(segment_index = entry.segment_index, "segment render failed: {err}");
        Err(err)
    }
}
