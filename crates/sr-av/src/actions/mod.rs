//! One async function per ffmpeg invocation in a render.
//!
//! Each action has a matching `*_args` builder so the exact command line can
//! be asserted without running ffmpeg.

pub mod audio;
pub mod clip;
pub mod compose;

pub use audio::{master_narration, mix_music, pad_narration};
pub use clip::{render_clip, ClipSource, ClipSpec, OverlaySpec};
pub use compose::{compose_video, mux_final, ComposeSpec};

/// Arguments every ffmpeg invocation starts with.
pub(crate) fn base_args() -> Vec<String> {
    ["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub(crate) fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}
