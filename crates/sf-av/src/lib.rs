//! # sf-av
//!
//! Video processing and external tool management for stillforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`], [`ToolRunner`]) -- async builder
//!   with timeout support, behind a trait so tests can script the tools.
//! - **Workspace management** ([`Workspace`]) -- per-job scratch directory.
//! - **Action functions** ([`actions`]) -- still-image rendering, stream-copy
//!   concat, duration probing and lossless trimming.

pub mod actions;
pub mod command;
pub mod tools;
pub mod workspace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command::{ProcessRunner, ToolCommand, ToolOutput, ToolRunner};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;

pub use actions::{concat_copy, probe_duration, render_still, trim_in_place, StillClip};
