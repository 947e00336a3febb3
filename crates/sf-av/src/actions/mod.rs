//! ffmpeg/ffprobe actions: still-image rendering, stream-copy concat,
//! duration probing and lossless trimming.

mod concat;
mod probe;
mod still;
mod trim;

pub use concat::{concat_command, concat_copy, manifest_line, write_concat_manifest};
pub use probe::{duration_command, parse_duration_output, probe_duration};
pub use still::{clip_comment, render_still, still_command, still_filter, StillClip};
pub use trim::{trim_command, trim_in_place, trimmed_path};
