//! Per-job scratch workspace.
//!
//! A [`Workspace`] owns a temporary directory holding the downloaded source
//! image, the rendered segments, the concat manifest and the assembled
//! output. Everything is removed when the workspace is dropped.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch directory for one job attempt.
///
/// # Example
///
/// ```no_run
/// use sf_av::Workspace;
///
/// let workspace = Workspace::new(None, "job-42").unwrap();
/// let first = workspace.segment_path(0);
/// // ... render into `first`, concat into workspace.output() ...
/// workspace.finalize(std::path::Path::new("/tmp/final.mp4")).unwrap();
/// ```
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a workspace under `parent` (system temp dir if `None`).
    /// `label` is embedded in the directory name to ease debugging.
    pub fn new(parent: Option<&Path>, label: &str) -> sf_core::Result<Self> {
        let prefix = format!("stillforge-{label}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let temp_dir = match parent {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| sf_core::Error::Internal(format!("failed to create workspace: {e}")))?;

        Ok(Self { temp_dir })
    }

    /// Path to the scratch directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where the source image is stored. The extension is kept so the codec
    /// can sniff the format.
    pub fn source_path(&self, extension: Option<&str>) -> PathBuf {
        match extension.filter(|e| !e.is_empty()) {
            Some(ext) => self.temp_dir.path().join(format!("source.{ext}")),
            None => self.temp_dir.path().join("source"),
        }
    }

    /// Path of the rendered file for segment `index`.
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.temp_dir.path().join(format!("segment_{index:03}.mp4"))
    }

    /// Path of the concat manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.temp_dir.path().join("segments.txt")
    }

    /// Path of the assembled output video.
    pub fn output(&self) -> PathBuf {
        self.temp_dir.path().join("output.mp4")
    }

    /// Move the assembled output to `dest`, then discard the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the output file does not exist or cannot be moved.
    pub fn finalize(self, dest: &Path) -> sf_core::Result<PathBuf> {
        let output = self.output();

        if !output.exists() {
            return Err(sf_core::Error::Internal(format!(
                "output file does not exist: {}",
                output.display()
            )));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Rename within a filesystem, copy across filesystems.
        if std::fs::rename(&output, dest).is_err() {
            std::fs::copy(&output, dest)?;
            let _ = std::fs::remove_file(&output);
        }

        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn workspace_paths() {
        let ws = Workspace::new(None, "abc").unwrap();
        assert!(ws.dir().exists());
        assert!(ws
            .dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("stillforge-abc-"));
        assert!(ws.output().starts_with(ws.dir()));
        assert_eq!(ws.segment_path(7).file_name().unwrap(), "segment_007.mp4");
        assert_eq!(ws.manifest_path().file_name().unwrap(), "segments.txt");
        assert_eq!(ws.source_path(Some("png")).file_name().unwrap(), "source.png");
        assert_eq!(ws.source_path(None).file_name().unwrap(), "source");
    }

    #[test]
    fn workspace_in_custom_parent() {
        let parent = tempfile::tempdir().unwrap();
        let nested = parent.path().join("scratch");
        let ws = Workspace::new(Some(&nested), "job").unwrap();
        assert!(ws.dir().starts_with(&nested));
    }

    #[test]
    fn dropped_workspace_is_removed() {
        let ws = Workspace::new(None, "drop").unwrap();
        let dir = ws.dir().to_path_buf();
        fs::write(ws.segment_path(0), b"x").unwrap();
        drop(ws);
        assert!(!dir.exists());
    }

    #[test]
    fn finalize_moves_output() {
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out/final.mp4");

        let ws = Workspace::new(None, "fin").unwrap();
        fs::write(ws.output(), b"video").unwrap();

        let final_path = ws.finalize(&dest).unwrap();
        assert_eq!(final_path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"video");
    }

    #[test]
    fn finalize_fails_when_output_missing() {
        let dest_dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(None, "missing").unwrap();
        assert!(ws.finalize(&dest_dir.path().join("x.mp4")).is_err());
    }
}
