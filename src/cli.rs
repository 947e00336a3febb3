use clap::{Parser, Subcommand};
use sf_core::CameraMotion;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "stillforge")]
#[command(author, version, about = "Turn a still image into a video of any length up to ten minutes")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API together with the worker pool
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run only the worker pool
    Worker,

    /// Render one image locally through the segment pipeline
    Render {
        /// Source image
        #[arg(long, required = true)]
        image: PathBuf,

        /// Where to write the MP4 [default: <image stem>_video.mp4 beside the image]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target duration in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u32,

        /// Style tag passed to the renderer
        #[arg(long, default_value = "cinematic")]
        style: String,

        /// Fixed seed (random if omitted)
        #[arg(long)]
        seed: Option<u32>,

        /// Camera motion preset
        #[arg(long, value_parser = parse_camera_motion)]
        camera_motion: Option<CameraMotion>,
    },

    /// Print the segment plan for a duration
    Plan {
        /// Target duration in seconds
        duration: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or defaults if not specified)
        config: Option<PathBuf>,
    },
}

fn parse_camera_motion(s: &str) -> Result<CameraMotion, String> {
    s.parse().map_err(|e: sf_core::Error| e.to_string())
}

/// `<stem>_video.mp4` in the image's directory.
pub fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_else(|| "output".into());
    image.with_file_name(format!("{stem}_video.mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_beside_the_image() {
        assert_eq!(
            default_output_path(Path::new("/photos/cat.png")),
            PathBuf::from("/photos/cat_video.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("beach.jpeg")),
            PathBuf::from("beach_video.mp4")
        );
    }
}
