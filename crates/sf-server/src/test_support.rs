//! Throwaway contexts for handler and worker tests.

use std::sync::Arc;

use sf_av::testing::ScriptedRunner;
use sf_core::config::Config;
use tempfile::TempDir;

use crate::{build_context, AppContext};

/// Context with a temp database and blob root and a well-behaved scripted
/// runner.
pub fn test_context() -> (TempDir, AppContext) {
    test_context_with(ScriptedRunner::new(), |_| {})
}

pub fn test_context_with(
    runner: ScriptedRunner,
    configure: impl FnOnce(&mut Config),
) -> (TempDir, AppContext) {
    test_context_shared(Arc::new(runner), configure)
}

/// Like [`test_context_with`], keeping a handle on the runner for call
/// inspection.
pub fn test_context_shared(
    runner: Arc<ScriptedRunner>,
    configure: impl FnOnce(&mut Config),
) -> (TempDir, AppContext) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.root = dir.path().join("blobs");
    config.render.scratch_dir = Some(dir.path().join("scratch"));
    configure(&mut config);

    let db = sf_db::init_pool(&dir.path().join("stillforge.db")).unwrap();
    let ctx = build_context(config, db, ScriptedRunner::registry(), runner);
    (dir, ctx)
}
