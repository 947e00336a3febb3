//! Scripted stand-in for ffmpeg/ffprobe.
//!
//! [`ScriptedRunner`] interprets the commands built by [`crate::actions`]
//! well enough to drive the pipeline without the real tools. Every "media"
//! file it writes is a one-line placeholder (`fake-mp4 <seconds>`): renders
//! take the seconds from `-t`, concat sums the manifest entries, trims clamp
//! to `-t`, and probes read the number back. Failures can be injected per
//! render call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::{ToolCommand, ToolOutput, ToolRunner};
use crate::tools::ToolRegistry;

/// What a scripted render call should do.
#[derive(Debug, Clone)]
pub enum RenderFault {
    /// Write a partial file, then report a timeout.
    Timeout,
    /// Exit non-zero with this stderr.
    Exit(String),
    /// Sleep before succeeding (to trip job-level timeouts).
    Delay(Duration),
}

/// Which tool operation a recorded command performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Render,
    Concat,
    Trim,
    Probe,
    Other,
}

#[derive(Default)]
struct State {
    calls: Vec<(CallKind, Vec<String>)>,
    render_faults: HashMap<usize, RenderFault>,
    renders: usize,
    concat_extra_secs: f64,
    trim_extra_secs: f64,
    fail_concat: Option<String>,
    fail_probe: bool,
}

/// Fake [`ToolRunner`] with injectable failures.
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<State>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pointing at placeholder tool paths.
    pub fn registry() -> ToolRegistry {
        ToolRegistry::with_paths([
            ("ffmpeg", Path::new("/scripted/ffmpeg")),
            ("ffprobe", Path::new("/scripted/ffprobe")),
        ])
    }

    /// Inject a fault into the `index`-th render call (0-based).
    pub fn fault_render(self, index: usize, fault: RenderFault) -> Self {
        self.state.lock().render_faults.insert(index, fault);
        self
    }

    /// Make concatenated outputs longer than the sum of their inputs.
    pub fn concat_overshoot(self, extra_secs: f64) -> Self {
        self.state.lock().concat_extra_secs = extra_secs;
        self
    }

    /// Make trimmed outputs overshoot the requested length.
    pub fn trim_overshoot(self, extra_secs: f64) -> Self {
        self.state.lock().trim_extra_secs = extra_secs;
        self
    }

    /// Make every concat call exit non-zero.
    pub fn fail_concat(self, stderr: &str) -> Self {
        self.state.lock().fail_concat = Some(stderr.to_string());
        self
    }

    /// Make every probe call exit non-zero.
    pub fn fail_probe(self) -> Self {
        self.state.lock().fail_probe = true;
        self
    }

    /// Write a placeholder media file of `secs` seconds.
    pub fn write_media(path: &Path, secs: f64) -> std::io::Result<()> {
        std::fs::write(path, format!("{MEDIA_TAG}{secs}"))
    }

    /// Duration of a placeholder media file, if `path` is one.
    pub fn media_duration(path: &Path) -> Option<f64> {
        std::fs::read_to_string(path)
            .ok()?
            .strip_prefix(MEDIA_TAG)?
            .trim()
            .parse()
            .ok()
    }

    /// Arguments of every command run so far, in order.
    pub fn calls(&self) -> Vec<(CallKind, Vec<String>)> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state.lock().calls.iter().filter(|(k, _)| *k == kind).count()
    }

    /// `-t` values of the render calls, in order.
    pub fn rendered_durations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(k, _)| *k == CallKind::Render)
            .filter_map(|(_, args)| flag_value(&args, "-t").map(String::from))
            .collect()
    }
}

const MEDIA_TAG: &str = "fake-mp4 ";

fn classify(cmd: &ToolCommand) -> CallKind {
    let args = cmd.get_args();
    if cmd.tool_name() == "ffprobe" {
        CallKind::Probe
    } else if args.iter().any(|a| a == "-loop") {
        CallKind::Render
    } else if args.iter().any(|a| a == "concat") {
        CallKind::Concat
    } else if args.iter().any(|a| a == "-t") {
        CallKind::Trim
    } else {
        CallKind::Other
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn exit(tool: &str, stderr: &str) -> sf_core::Error {
    sf_core::Error::tool(tool, format!("exited with status exit status: 1: {stderr}"))
}

fn manifest_entries(manifest: &Path) -> std::io::Result<Vec<PathBuf>> {
    let body = std::fs::read_to_string(manifest)?;
    Ok(body
        .lines()
        .filter_map(|l| l.strip_prefix("file '")?.strip_suffix('\'').map(String::from))
        .map(|p| PathBuf::from(p.replace(r"'\''", "'")))
        .collect())
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, cmd: &ToolCommand) -> sf_core::Result<ToolOutput> {
        let kind = classify(cmd);
        let args = cmd.get_args().to_vec();
        let output_path = args.last().map(PathBuf::from).unwrap_or_default();

        let fault = {
            let mut state = self.state.lock();
            state.calls.push((kind, args.clone()));
            if kind == CallKind::Render {
                let index = state.renders;
                state.renders += 1;
                state.render_faults.get(&index).cloned()
            } else {
                None
            }
        };

        match kind {
            CallKind::Render => {
                match fault {
                    Some(RenderFault::Timeout) => {
                        std::fs::write(&output_path, b"partial")?;
                        return Err(sf_core::Error::ToolTimeout {
                            tool: cmd.tool_name(),
                            timeout: cmd.get_timeout(),
                        });
                    }
                    Some(RenderFault::Exit(stderr)) => return Err(exit("ffmpeg", &stderr)),
                    Some(RenderFault::Delay(d)) => tokio::time::sleep(d).await,
                    None => {}
                }
                let secs: f64 = flag_value(&args, "-t")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.0);
                Self::write_media(&output_path, secs)?;
            }
            CallKind::Concat => {
                if let Some(stderr) = self.state.lock().fail_concat.clone() {
                    return Err(exit("ffmpeg", &stderr));
                }
                let manifest = flag_value(&args, "-i").map(PathBuf::from).unwrap_or_default();
                let entries = manifest_entries(&manifest)?;
                let extra = self.state.lock().concat_extra_secs;
                let total = entries
                    .iter()
                    .map(|p| Self::media_duration(p).unwrap_or(0.0))
                    .sum::<f64>()
                    + extra;
                Self::write_media(&output_path, total)?;
            }
            CallKind::Trim => {
                let input = flag_value(&args, "-i").map(PathBuf::from).unwrap_or_default();
                let limit: f64 = flag_value(&args, "-t")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(f64::MAX);
                let current = Self::media_duration(&input)
                    .ok_or_else(|| exit("ffmpeg", "Invalid data found when processing input"))?;
                let extra = self.state.lock().trim_extra_secs;
                Self::write_media(&output_path, current.min(limit) + extra)?;
            }
            CallKind::Probe => {
                if self.state.lock().fail_probe {
                    return Err(exit("ffprobe", "moov atom not found"));
                }
                let secs = Self::media_duration(&output_path)
                    .ok_or_else(|| exit("ffprobe", "Invalid data found when processing input"))?;
                return Ok(ToolOutput {
                    exit_code: Some(0),
                    stdout: format!("{secs:.6}\n"),
                    stderr: String::new(),
                });
            }
            CallKind::Other => {}
        }

        Ok(ToolOutput {
            exit_code: Some(0),
            ..ToolOutput::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{concat_copy, probe_duration, trim_in_place};

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn concat_then_trim_tracks_durations() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new().concat_overshoot(1.5);
        let tools = ScriptedRunner::registry();

        let segments: Vec<PathBuf> = (0..2).map(|i| dir.path().join(format!("s{i}.mp4"))).collect();
        ScriptedRunner::write_media(&segments[0], 30.0).unwrap();
        ScriptedRunner::write_media(&segments[1], 30.0).unwrap();

        let out = dir.path().join("out.mp4");
        let manifest = dir.path().join("segments.txt");
        concat_copy(&runner, &tools, &segments, &manifest, &out, T).await.unwrap();
        assert_eq!(probe_duration(&runner, &tools, &out, T).await.unwrap(), 61.5);

        trim_in_place(&runner, &tools, &out, 60.0, T).await.unwrap();
        assert_eq!(probe_duration(&runner, &tools, &out, T).await.unwrap(), 60.0);
        assert_eq!(runner.count(CallKind::Concat), 1);
        assert_eq!(runner.count(CallKind::Trim), 1);
        assert_eq!(runner.count(CallKind::Probe), 2);
    }

    #[tokio::test]
    async fn probe_of_non_media_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.mp4");
        std::fs::write(&path, b"partial").unwrap();
        let runner = ScriptedRunner::new();
        let err = probe_duration(&runner, &ScriptedRunner::registry(), &path, T)
            .await
            .unwrap_err();
        assert!(matches!(err, sf_core::Error::Tool { .. }));
    }
}
