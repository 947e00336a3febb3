//! The render half of a video job: segments, concat and duration ceiling.
//!
//! Shared by the job orchestrator and the local `render` command, neither of
//! which needs the other's persistence concerns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sf_av::{ToolRegistry, ToolRunner, Workspace};
use sf_core::config::RenderConfig;
use sf_core::{PipelineStage, Result};

use crate::concat::Concatenator;
use crate::context::{checkpoint, ProgressSender, StageTracker};
use crate::enforcer::{DurationEnforcer, Enforcement};
use crate::planner::{SegmentBounds, SegmentPlan};
use crate::renderer::SegmentRenderer;

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    /// Assembled video inside the workspace.
    pub output: PathBuf,
    pub segment_count: usize,
    pub enforcement: Enforcement,
}

impl RenderOutcome {
    pub fn duration_sec(&self) -> f64 {
        self.enforcement.final_duration()
    }
}

pub struct RenderPipeline {
    renderer: SegmentRenderer,
    concatenator: Concatenator,
    enforcer: DurationEnforcer,
    bounds: SegmentBounds,
}

impl RenderPipeline {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        tools: Arc<ToolRegistry>,
        render: &RenderConfig,
    ) -> Self {
        let assembly = render.assembly_timeout();
        Self {
            renderer: SegmentRenderer::new(runner.clone(), tools.clone(), render.clone()),
            concatenator: Concatenator::new(runner.clone(), tools.clone(), assembly),
            enforcer: DurationEnforcer::new(runner, tools, assembly),
            bounds: SegmentBounds::from_config(render),
        }
    }

    /// Segment bounds plans for this pipeline must use.
    pub fn bounds(&self) -> SegmentBounds {
        self.bounds
    }

    /// Render every entry of `plan` from `image`, join the segments and
    /// enforce the duration ceiling. Intermediate files live in `workspace`.
    ///
    /// Segments render strictly in plan order; the first failure aborts the
    /// run and nothing rendered so far is handed to the concatenator.
    pub async fn run(
        &self,
        image: &Path,
        plan: &SegmentPlan,
        style: &str,
        workspace: &Workspace,
        progress: &ProgressSender,
        stage: &StageTracker,
    ) -> Result<RenderOutcome> {
        stage.enter(PipelineStage::Render);
        let count = plan.len();
        let mut segments = Vec::with_capacity(count);
        for entry in &plan.entries {
            let path = workspace.segment_path(entry.segment_index);
            tracing::debug!(
                segment_index = entry.segment_index,
                duration_sec = entry.duration_sec,
                "rendering segment"
            );
            segments.push(
                self.renderer
                    .render_segment(image, entry, style, &path)
                    .await?,
            );
            progress.send(
                checkpoint::segment(entry.segment_index, count),
                PipelineStage::Render,
            );
        }

        stage.enter(PipelineStage::Concat);
        let output = workspace.output();
        self.concatenator
            .concat(&segments, &workspace.manifest_path(), &output)
            .await?;
        progress.send(checkpoint::CONCATENATED, PipelineStage::Concat);

        stage.enter(PipelineStage::Enforce);
        let enforcement = self.enforcer.enforce(&output).await?;
        progress.send(checkpoint::ENFORCED, PipelineStage::Enforce);

        Ok(RenderOutcome {
            output,
            segment_count: count,
            enforcement,
        })
    }
}
