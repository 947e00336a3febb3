//! Container duration probing via ffprobe.

use std::path::Path;
use std::time::Duration;

use crate::command::{ToolCommand, ToolRunner};
use crate::tools::ToolRegistry;

pub fn duration_command(ffprobe: &Path, input: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffprobe.to_path_buf());
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]);
    cmd.path_arg(input);
    cmd
}

/// Parse the bare duration ffprobe prints with the flags above.
pub fn parse_duration_output(stdout: &str) -> sf_core::Result<f64> {
    let text = stdout.trim();
    match text.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => Err(sf_core::Error::tool(
            "ffprobe",
            format!("unparseable duration output: {text:?}"),
        )),
    }
}

/// Return the container duration of `input` in seconds.
pub async fn probe_duration(
    runner: &dyn ToolRunner,
    tools: &ToolRegistry,
    input: &Path,
    timeout: Duration,
) -> sf_core::Result<f64> {
    let ffprobe = tools.require("ffprobe")?;
    let mut cmd = duration_command(&ffprobe.path, input);
    cmd.timeout(timeout);
    let output = runner.run(&cmd).await?;
    parse_duration_output(&output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration_output("130.033333\n").unwrap(), 130.033333);
        assert_eq!(parse_duration_output("10").unwrap(), 10.0);
    }

    #[test]
    fn rejects_na_and_garbage() {
        assert!(parse_duration_output("N/A").is_err());
        assert!(parse_duration_output("").is_err());
        assert!(parse_duration_output("-3").is_err());
    }

    #[test]
    fn command_layout() {
        let cmd = duration_command(Path::new("ffprobe"), Path::new("/w/output.mp4"));
        assert_eq!(cmd.get_args().last().unwrap(), "/w/output.mp4");
        assert!(cmd.get_args().iter().any(|a| a == "format=duration"));
    }
}
