//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a throwaway database and blob root,
//! a scripted ffmpeg/ffprobe runner, and a full [`AppContext`]. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use sf_av::testing::ScriptedRunner;
use sf_core::config::Config;
use sf_db::{DbPool, PooledConnection};
use sf_pipeline::JobOrchestrator;
use sf_server::{build_context, build_router, AppContext};
use tempfile::TempDir;

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub runner: Arc<ScriptedRunner>,
    _dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new() -> Self {
        Self::with_runner(ScriptedRunner::new(), |_| {})
    }

    /// Create a harness around a scripted runner and a config tweak.
    pub fn with_runner(runner: ScriptedRunner, configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = Config::default();
        config.storage.root = dir.path().join("blobs");
        config.render.scratch_dir = Some(dir.path().join("scratch"));
        config.worker.backoff_secs = vec![0];
        configure(&mut config);

        let db = sf_db::init_pool(&dir.path().join("stillforge.db"))
            .expect("failed to create database");
        let runner = Arc::new(runner);
        let ctx = build_context(
            config,
            db.clone(),
            ScriptedRunner::registry(),
            runner.clone(),
        );

        Self {
            ctx,
            db,
            runner,
            _dir: dir,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Start serving this harness on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Run one worker iteration. Returns whether a task was processed.
    pub async fn work_once(&self) -> bool {
        let orchestrator = JobOrchestrator::new(self.ctx.orchestrator_services());
        sf_server::worker::process_next(&self.ctx, &orchestrator, "test-worker")
            .await
            .expect("worker iteration failed")
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> PooledConnection {
        sf_db::get_conn(&self.db).expect("failed to get db connection")
    }
}
