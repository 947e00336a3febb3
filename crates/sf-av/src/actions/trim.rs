//! Lossless in-place trimming.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{ToolCommand, ToolRunner};
use crate::tools::ToolRegistry;

/// Sibling path the trimmed copy is written to before replacing the input.
pub fn trimmed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".into());
    let name = match input.extension() {
        Some(ext) => format!("{stem}_trimmed.{}", ext.to_string_lossy()),
        None => format!("{stem}_trimmed"),
    };
    input.with_file_name(name)
}

pub fn trim_command(ffmpeg: &Path, input: &Path, max_secs: f64, output: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(["-y", "-i"]);
    cmd.path_arg(input);
    cmd.arg("-t").arg(format!("{max_secs:.3}"));
    cmd.args(["-c", "copy"]);
    cmd.path_arg(output);
    cmd
}

/// Cut `path` to at most `max_secs` with stream copy, replacing the file
/// atomically. The original is untouched if ffmpeg or the rename fails.
pub async fn trim_in_place(
    runner: &dyn ToolRunner,
    tools: &ToolRegistry,
    path: &Path,
    max_secs: f64,
    timeout: Duration,
) -> sf_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;
    let tmp = trimmed_path(path);

    let mut cmd = trim_command(&ffmpeg.path, path, max_secs, &tmp);
    cmd.timeout(timeout);

    tracing::info!("trim {:?} to {max_secs:.3}s", path);

    if let Err(e) = runner.run(&cmd).await {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
