//! Render a still image into a fixed-length H.264 clip.

use std::path::Path;
use std::time::Duration;

use sf_core::config::RenderConfig;
use sf_core::CameraMotion;

use crate::command::{ToolCommand, ToolOutput, ToolRunner};
use crate::tools::ToolRegistry;

/// Zoom factor reached at the end of a push-in (or left at the start of a
/// pull-out).
const MAX_ZOOM: f64 = 1.15;

/// Per-clip parameters. Encoding settings come from [`RenderConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct StillClip {
    pub duration_sec: u32,
    pub seed: u32,
    pub camera_motion: CameraMotion,
    pub subject_lock: bool,
    pub style: String,
}

/// Build the `-vf` filter graph for a clip.
pub fn still_filter(render: &RenderConfig, clip: &StillClip) -> String {
    let (w, h) = (render.width, render.height);
    let mut filter = format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}");

    let frames = u64::from(clip.duration_sec.max(1)) * u64::from(render.fps.max(1));
    let delta = MAX_ZOOM - 1.0;
    let zoom = match clip.camera_motion {
        CameraMotion::Static => None,
        CameraMotion::SlowPushIn => Some(format!("1+{delta:.3}*on/{frames}")),
        CameraMotion::SlowPullOut => Some(format!("{MAX_ZOOM:.3}-{delta:.3}*on/{frames}")),
    };
    if let Some(z) = zoom {
        filter.push_str(&format!(
            ",zoompan=z='{z}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={w}x{h}:fps={}",
            render.fps
        ));
    }

    filter.push_str(&format!(",format={}", render.pixel_format));
    filter
}

/// Text written into the clip's `comment` metadata tag.
pub fn clip_comment(clip: &StillClip) -> String {
    format!(
        "stillforge seed={} camera_motion={} subject_lock={} style={}",
        clip.seed, clip.camera_motion, clip.subject_lock, clip.style
    )
}

/// Build the ffmpeg invocation rendering `image` into `output`.
pub fn still_command(
    ffmpeg: &Path,
    render: &RenderConfig,
    image: &Path,
    clip: &StillClip,
    output: &Path,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(["-y", "-loop", "1", "-i"]);
    cmd.path_arg(image);
    cmd.arg("-vf").arg(still_filter(render, clip));
    cmd.arg("-t").arg(clip.duration_sec.to_string());
    cmd.arg("-r").arg(render.fps.to_string());
    cmd.arg("-c:v").arg(render.video_codec.as_str());
    cmd.arg("-pix_fmt").arg(render.pixel_format.as_str());
    cmd.arg("-metadata").arg(format!("comment={}", clip_comment(clip)));
    cmd.path_arg(output);
    cmd
}

/// Render one clip, bounded by `timeout`.
///
/// Errors are returned as produced by the runner: a timeout surfaces as
/// [`sf_core::Error::ToolTimeout`].
pub async fn render_still(
    runner: &dyn ToolRunner,
    tools: &ToolRegistry,
    render: &RenderConfig,
    image: &Path,
    clip: &StillClip,
    output: &Path,
    timeout: Duration,
) -> sf_core::Result<ToolOutput> {
    let ffmpeg = tools.require("ffmpeg")?;
    let mut cmd = still_command(&ffmpeg.path, render, image, clip, output);
    cmd.timeout(timeout);

    tracing::debug!(
        duration_sec = clip.duration_sec,
        output = %output.display(),
        "rendering still clip"
    );
    runner.run(&cmd).await
}
