//! # sf-pipeline
//!
//! The video-generation job pipeline.
//!
//! This crate provides:
//!
//! - **[`planner`]** -- splits a requested duration into bounded segments.
//! - **[`SegmentRenderer`]** -- renders one segment per codec invocation,
//!   under a per-segment timeout.
//! - **[`Concatenator`]** -- joins segments with a stream copy.
//! - **[`DurationEnforcer`]** -- probes the output and trims it to the
//!   600 s ceiling.
//! - **[`RenderPipeline`]** -- render, concat and enforce in one workspace.
//! - **[`JobOrchestrator`]** -- runs a stored video job end to end, records
//!   progress and outcome, and classifies failures ([`classify_failure`]).

pub mod concat;
pub mod context;
pub mod enforcer;
pub mod failure;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod renderer;

pub use concat::Concatenator;
pub use context::{checkpoint, ProgressSender, StageTracker};
pub use enforcer::{DurationEnforcer, Enforcement};
pub use failure::{classify_failure, FailureClass};
pub use orchestrator::{JobOrchestrator, OrchestratorServices, VideoJobOutcome, VideoJobRequest};
pub use pipeline::{RenderOutcome, RenderPipeline};
pub use planner::{
    build_plan, draw_seed, plan_durations, validate_duration, PlanOptions, SegmentBounds,
    SegmentPlan, SegmentPlanEntry,
};
pub use renderer::SegmentRenderer;
