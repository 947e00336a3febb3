//! Application context shared by route handlers and workers.

use std::sync::Arc;

use sf_av::{ToolRegistry, ToolRunner};
use sf_core::config::Config;
use sf_core::events::EventBus;
use sf_db::DbPool;
use sf_pipeline::OrchestratorServices;
use sf_storage::BlobStore;

/// Application context shared by all request handlers (via Axum state) and
/// by the worker pool.
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool (job records and task queue).
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Broadcast event bus for SSE.
    pub event_bus: Arc<EventBus>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Runs ffmpeg/ffprobe invocations.
    pub runner: Arc<dyn ToolRunner>,
    /// Uploaded images and rendered videos.
    pub blobs: Arc<dyn BlobStore>,
}

impl AppContext {
    /// Bucket holding uploads and results.
    pub fn bucket(&self) -> &str {
        &self.config.storage.bucket
    }

    /// Handles for a job orchestrator sharing this context's resources.
    pub fn orchestrator_services(&self) -> OrchestratorServices {
        OrchestratorServices {
            pool: self.db.clone(),
            blobs: self.blobs.clone(),
            tools: self.tools.clone(),
            runner: self.runner.clone(),
            render: self.config.render.clone(),
            bucket: self.config.storage.bucket.clone(),
            events: Some(self.event_bus.clone()),
        }
    }
}
