//! Stream-copy concatenation with the ffmpeg concat demuxer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{ToolCommand, ToolRunner};
use crate::tools::ToolRegistry;

/// One manifest line for `path`. Single quotes are closed, escaped and
/// reopened as the concat demuxer expects.
pub fn manifest_line(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{escaped}'\n")
}

/// Write the concat manifest listing `segments` in order.
pub fn write_concat_manifest(segments: &[PathBuf], manifest: &Path) -> sf_core::Result<()> {
    let body: String = segments.iter().map(|p| manifest_line(p)).collect();
    std::fs::write(manifest, body)?;
    Ok(())
}

pub fn concat_command(ffmpeg: &Path, manifest: &Path, output: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"]);
    cmd.path_arg(manifest);
    cmd.args(["-c", "copy"]);
    cmd.path_arg(output);
    cmd
}

/// Join `segments` into `output` without re-encoding.
pub async fn concat_copy(
    runner: &dyn ToolRunner,
    tools: &ToolRegistry,
    segments: &[PathBuf],
    manifest: &Path,
    output: &Path,
    timeout: Duration,
) -> sf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    write_concat_manifest(segments, manifest)?;

    tracing::info!("concat {} segments -> {:?}", segments.len(), output);

    let mut cmd = concat_command(&ffmpeg.path, manifest, output);
    cmd.timeout(timeout);
    runner.run(&cmd).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_line_plain() {
        assert_eq!(
            manifest_line(Path::new("/tmp/w/segment_000.mp4")),
            "file '/tmp/w/segment_000.mp4'\n"
        );
    }

    #[test]
    fn manifest_line_escapes_quotes() {
        assert_eq!(
            manifest_line(Path::new("/tmp/it's/seg.mp4")),
            "file '/tmp/it'\\''s/seg.mp4'\n"
        );
    }

    #[test]
    fn manifest_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("segments.txt");
        let segments: Vec<PathBuf> = [2, 0, 1]
            .iter()
            .map(|i| PathBuf::from(format!("/s/segment_{i:03}.mp4")))
            .collect();

        write_concat_manifest(&segments, &manifest).unwrap();

        let body = std::fs::read_to_string(&manifest).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(
            lines,
            [
                "file '/s/segment_002.mp4'",
                "file '/s/segment_000.mp4'",
                "file '/s/segment_001.mp4'",
            ]
        );
    }

    #[test]
    fn command_uses_stream_copy() {
        let cmd = concat_command(
            Path::new("ffmpeg"),
            Path::new("/w/segments.txt"),
            Path::new("/w/output.mp4"),
        );
        assert_eq!(
            cmd.get_args(),
            [
                "-y", "-f", "concat", "-safe", "0", "-i", "/w/segments.txt", "-c", "copy",
                "/w/output.mp4"
            ]
        );
    }
}
