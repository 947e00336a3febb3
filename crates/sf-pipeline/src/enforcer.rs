//! Duration enforcer: keeps the delivered video under the hard ceiling.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sf_av::{probe_duration, trim_in_place, ToolRegistry, ToolRunner};
use sf_core::{Error, Result, MAX_VIDEO_DURATION_SECS};

/// What the enforcer did to a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Enforcement {
    /// Already compliant; untouched.
    WithinLimit { duration: f64 },
    /// Cut down to the ceiling with a stream copy.
    Trimmed { original: f64, trimmed: f64 },
}

impl Enforcement {
    /// Duration of the file after enforcement.
    pub fn final_duration(&self) -> f64 {
        match *self {
            Self::WithinLimit { duration } => duration,
            Self::Trimmed { trimmed, .. } => trimmed,
        }
    }

    pub fn was_trimmed(&self) -> bool {
        matches!(self, Self::Trimmed { .. })
    }
}

pub struct DurationEnforcer {
    runner: Arc<dyn ToolRunner>,
    tools: Arc<ToolRegistry>,
    max_secs: f64,
    timeout: Duration,
}

impl DurationEnforcer {
    /// Enforcer with the standard 600 s ceiling.
    pub fn new(runner: Arc<dyn ToolRunner>, tools: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self::with_ceiling(runner, tools, f64::from(MAX_VIDEO_DURATION_SECS), timeout)
    }

    pub fn with_ceiling(
        runner: Arc<dyn ToolRunner>,
        tools: Arc<ToolRegistry>,
        max_secs: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            tools,
            max_secs,
            timeout,
        }
    }

    /// Probe `path` and trim it in place if it runs past the ceiling.
    ///
    /// Idempotent on compliant files. Every failure is reported as
    /// [`Error::Trim`].
    pub async fn enforce(&self, path: &Path) -> Result<Enforcement> {
        let original = self.probe(path).await?;
        if original <= self.max_secs {
            return Ok(Enforcement::WithinLimit { duration: original });
        }

        tracing::info!(
            duration_sec = original,
            max_secs = self.max_secs,
            "output exceeds ceiling; trimming"
        );
        trim_in_place(
            self.runner.as_ref(),
            &self.tools,
            path,
            self.max_secs,
            self.timeout,
        )
        .await
        .map_err(trim_error)?;

        let trimmed = self.probe(path).await?;
        if trimmed > self.max_secs {
            return Err(Error::Trim(format!(
                "trimmed output is {trimmed:.3}s, still above the {}s ceiling",
                self.max_secs
            )));
        }
        Ok(Enforcement::Trimmed { original, trimmed })
    }

    async fn probe(&self, path: &Path) -> Result<f64> {
        probe_duration(self.runner.as_ref(), &self.tools, path, self.timeout)
            .await
            .map_err(trim_error)
    }
}

fn trim_error(e: Error) -> Error {
    match e {
        Error::Tool { tool, message } => Error::Trim(format!("{tool}: {message}")),
        other => Error::Trim(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_av::testing::{CallKind, ScriptedRunner};

    const T: Duration = Duration::from_secs(60);

    fn enforcer(runner: Arc<ScriptedRunner>) -> DurationEnforcer {
        DurationEnforcer::new(runner, Arc::new(ScriptedRunner::registry()), T)
    }

    #[tokio::test]
    async fn compliant_file_is_untouched_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output.mp4");
        ScriptedRunner::write_media(&out, 130.0).unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let enforcer = enforcer(runner.clone());

        for _ in 0..3 {
            let result = enforcer.enforce(&out).await.unwrap();
            assert_eq!(result, Enforcement::WithinLimit { duration: 130.0 });
        }
        assert_eq!(runner.count(CallKind::Trim), 0);
        assert_eq!(ScriptedRunner::media_duration(&out), Some(130.0));
    }

    #[tokio::test]
    async fn exactly_at_ceiling_is_compliant() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output.mp4");
        ScriptedRunner::write_media(&out, 600.0).unwrap();
        let result = enforcer(Arc::new(ScriptedRunner::new()))
            .enforce(&out)
            .await
            .unwrap();
        assert!(!result.was_trimmed());
    }

    #[tokio::test]
    async fn overlong_file_is_trimmed_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output.mp4");
        ScriptedRunner::write_media(&out, 600.4).unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let result = enforcer(runner.clone()).enforce(&out).await.unwrap();

        assert_eq!(
            result,
            Enforcement::Trimmed {
                original: 600.4,
                trimmed: 600.0
            }
        );
        assert_eq!(result.final_duration(), 600.0);
        assert_eq!(ScriptedRunner::media_duration(&out), Some(600.0));
        assert!(!dir.path().join("output_trimmed.mp4").exists());

        let (_, args) = runner
            .calls()
            .into_iter()
            .find(|(k, _)| *k == CallKind::Trim)
            .unwrap();
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "600.000"));

        // A second pass is a no-op.
        let again = enforcer(runner.clone()).enforce(&out).await.unwrap();
        assert!(!again.was_trimmed());
        assert_eq!(runner.count(CallKind::Trim), 1);
    }

    #[tokio::test]
    async fn trim_that_misses_the_ceiling_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output.mp4");
        ScriptedRunner::write_media(&out, 640.0).unwrap();
        let runner = Arc::new(ScriptedRunner::new().trim_overshoot(1.5));

        let err = enforcer(runner.clone()).enforce(&out).await.unwrap_err();

        assert!(matches!(err, Error::Trim(ref m) if m.contains("601.500s")));
        assert_eq!(runner.count(CallKind::Trim), 1);
    }

    #[tokio::test]
    async fn probe_failure_is_trim_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output.mp4");
        ScriptedRunner::write_media(&out, 10.0).unwrap();
        let err = enforcer(Arc::new(ScriptedRunner::new().fail_probe()))
            .enforce(&out)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Trim(_)));
    }
}
