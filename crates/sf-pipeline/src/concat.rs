//! Concatenator: joins rendered segments without re-encoding.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sf_av::{concat_copy, ToolRegistry, ToolRunner};
use sf_core::{Error, Result};

pub struct Concatenator {
    runner: Arc<dyn ToolRunner>,
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Concatenator {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self {
            runner,
            tools,
            timeout,
        }
    }

    /// Join `segments`, in order, into `output`.
    ///
    /// A single segment is moved into place without invoking the codec.
    /// Every failure, including a timeout, is reported as [`Error::Concat`].
    pub async fn concat(&self, segments: &[PathBuf], manifest: &Path, output: &Path) -> Result<()> {
        match segments {
            [] => Err(Error::Concat("no segments to concatenate".into())),
            [only] => std::fs::rename(only, output).map_err(|e| {
                Error::Concat(format!(
                    "failed to move {} to {}: {e}",
                    only.display(),
                    output.display()
                ))
            }),
            _ => concat_copy(
                self.runner.as_ref(),
                &self.tools,
                segments,
                manifest,
                output,
                self.timeout,
            )
            .await
            .map_err(|e| match e {
                Error::Tool { message, .. } => Error::Concat(message),
                other => Error::Concat(other.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_av::testing::{CallKind, ScriptedRunner};

    const T: Duration = Duration::from_secs(60);

    fn segments(dir: &Path, lengths: &[f64]) -> Vec<PathBuf> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, secs)| {
                let p = dir.join(format!("segment_{i:03}.mp4"));
                ScriptedRunner::write_media(&p, *secs).unwrap();
                p
            })
            .collect()
    }

    fn concatenator(runner: Arc<ScriptedRunner>) -> Concatenator {
        Concatenator::new(runner, Arc::new(ScriptedRunner::registry()), T)
    }

    #[tokio::test]
    async fn manifest_follows_segment_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let segs = segments(dir.path(), &[44.0, 43.0, 43.0]);
        let manifest = dir.path().join("segments.txt");
        let out = dir.path().join("output.mp4");

        concatenator(runner.clone())
            .concat(&segs, &manifest, &out)
            .await
            .unwrap();

        let listed: Vec<String> = std::fs::read_to_string(&manifest)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        let expected: Vec<String> = segs
            .iter()
            .map(|p| format!("file '{}'", p.display()))
            .collect();
        assert_eq!(listed, expected);
        assert_eq!(ScriptedRunner::media_duration(&out), Some(130.0));
        assert_eq!(runner.count(CallKind::Concat), 1);
    }

    #[tokio::test]
    async fn single_segment_is_moved() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let segs = segments(dir.path(), &[10.0]);
        let out = dir.path().join("output.mp4");

        concatenator(runner.clone())
            .concat(&segs, &dir.path().join("segments.txt"), &out)
            .await
            .unwrap();

        assert_eq!(runner.count(CallKind::Concat), 0);
        assert!(!segs[0].exists());
        assert_eq!(ScriptedRunner::media_duration(&out), Some(10.0));
    }

    #[tokio::test]
    async fn empty_list_is_concat_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = concatenator(Arc::new(ScriptedRunner::new()))
            .concat(&[], &dir.path().join("m.txt"), &dir.path().join("o.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Concat(_)));
    }

    #[tokio::test]
    async fn codec_failure_is_concat_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().fail_concat("Non-monotonous DTS"));
        let segs = segments(dir.path(), &[30.0, 31.0]);

        let err = concatenator(runner)
            .concat(&segs, &dir.path().join("m.txt"), &dir.path().join("o.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Concat(m) if m.contains("Non-monotonous DTS")), "{err:?}");
    }
}
