//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, blob storage, rendering, workers and external
//! tools. Every section defaults sensibly so a completely empty `{}` file is
//! valid. A handful of deployment settings can be overridden from the
//! environment via [`Config::apply_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub render: RenderConfig,
    pub worker: WorkerConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Override settings from process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Override settings using an arbitrary variable lookup.
    ///
    /// Unparseable numeric values are logged and ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STILLFORGE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("STILLFORGE_PORT") {
            set_parsed("STILLFORGE_PORT", &v, &mut self.server.port);
        }
        if let Some(v) = lookup("STILLFORGE_DB_PATH") {
            self.server.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("STILLFORGE_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("STILLFORGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("STILLFORGE_PUBLIC_BASE_URL") {
            self.storage.public_base_url = v;
        }
        if let Some(v) = lookup("JOB_MAX_TIMEOUT_SECONDS") {
            set_parsed("JOB_MAX_TIMEOUT_SECONDS", &v, &mut self.render.job_timeout_secs);
        }
        if let Some(v) = lookup("SEGMENT_MAX_TIMEOUT_SECONDS") {
            set_parsed(
                "SEGMENT_MAX_TIMEOUT_SECONDS",
                &v,
                &mut self.render.segment_timeout_secs,
            );
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.storage.bucket.is_empty() {
            warnings.push("storage.bucket is empty".into());
        }
        if self.storage.public_base_url.ends_with('/') {
            warnings.push(
                "storage.public_base_url has a trailing slash; result URLs will contain '//'"
                    .into(),
            );
        }

        let r = &self.render;
        if r.segment_min_secs == 0 || r.segment_min_secs > r.segment_max_secs {
            warnings.push(format!(
                "render segment bounds [{}, {}] are invalid; long jobs cannot be planned",
                r.segment_min_secs, r.segment_max_secs
            ));
        }
        if r.width % 2 != 0 || r.height % 2 != 0 {
            warnings.push(format!(
                "render size {}x{} is odd; {} requires even dimensions",
                r.width, r.height, r.pixel_format
            ));
        }
        if r.fps == 0 {
            warnings.push("render.fps is 0".into());
        }
        if r.job_timeout_secs < r.segment_timeout_secs {
            warnings.push(format!(
                "render.job_timeout_secs ({}) is shorter than render.segment_timeout_secs ({})",
                r.job_timeout_secs, r.segment_timeout_secs
            ));
        }

        if self.worker.concurrency == 0 {
            warnings.push("worker.concurrency is 0; no jobs will be processed".into());
        }
        if self.worker.max_retries > 0 && self.worker.backoff_secs.is_empty() {
            warnings.push("worker.backoff_secs is empty; retries will run immediately".into());
        }

        warnings
    }
}

fn set_parsed<T: std::str::FromStr>(key: &str, raw: &str, target: &mut T) {
    match raw.trim().parse() {
        Ok(v) => *target = v,
        Err(_) => tracing::warn!("Ignoring {key}={raw:?}: not a valid number"),
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            db_path: PathBuf::from("./data/stillforge.db"),
        }
    }
}

/// Blob store settings. The bucket is a directory under `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub bucket: String,
    /// Prefix for client-facing result URLs: `{public_base_url}/{bucket}/{key}`.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/blobs"),
            bucket: "videos".into(),
            public_base_url: "http://localhost:9000".into(),
        }
    }
}

/// Segment rendering parameters and time budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub pixel_format: String,
    pub segment_min_secs: u32,
    pub segment_max_secs: u32,
    pub segment_timeout_secs: u64,
    pub job_timeout_secs: u64,
    /// Budget for each concat, probe and trim invocation.
    pub assembly_timeout_secs: u64,
    /// Parent directory for per-job scratch workspaces. System temp if unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            video_codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
            segment_min_secs: 20,
            segment_max_secs: 60,
            segment_timeout_secs: 300,
            job_timeout_secs: 1800,
            assembly_timeout_secs: 600,
            scratch_dir: None,
        }
    }
}

impl RenderConfig {
    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn assembly_timeout(&self) -> Duration {
        Duration::from_secs(self.assembly_timeout_secs)
    }
}

/// Background worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// Delay before retry N is `backoff_secs[N-1]`; the last entry repeats.
    pub backoff_secs: Vec<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval_ms: 500,
            max_retries: 3,
            backoff_secs: vec![2, 4, 8],
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}
