//! Render one scene into a fixed-duration, silent clip.

use std::path::{Path, PathBuf};

use sr_core::{BlendMode, Effect};

use super::{base_args, path_arg};
use crate::command::ToolCommand;
use crate::filters::{self, num, EncodeSettings, FrameSpec};
use crate::tools::ToolRegistry;

/// Where a clip's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipSource {
    /// Still image animated by a motion effect.
    Image { path: PathBuf, effect: Effect },
    /// Video, with the last frame held for `freeze_secs` when it runs short.
    Video { path: PathBuf, freeze_secs: f64 },
    /// Plain slate standing in for a scene whose visual was unavailable.
    Slate,
}

/// Overlay composited over the base frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    pub path: PathBuf,
    pub blend: BlendMode,
}

/// Everything needed to render one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSpec {
    pub source: ClipSource,
    pub overlay: Option<OverlaySpec>,
    /// Exact clip length in seconds, already frame-aligned.
    pub duration: f64,
    pub frame: FrameSpec,
}

/// Build the ffmpeg arguments for [`render_clip`].
pub fn clip_args(spec: &ClipSpec, encode: &EncodeSettings, output: &Path) -> Vec<String> {
    let frame = &spec.frame;
    let duration = num(spec.duration);
    let mut args = base_args();

    let base_chain = match &spec.source {
        ClipSource::Image { path, effect } => {
            args.extend([
                "-loop".into(),
                "1".into(),
                "-framerate".into(),
                frame.fps.to_string(),
                "-t".into(),
                duration.clone(),
                "-i".into(),
                path_arg(path),
            ]);
            filters::image_chain(*effect, frame, spec.duration)
        }
        ClipSource::Video { path, freeze_secs } => {
            args.extend(["-i".into(), path_arg(path)]);
            filters::video_chain(frame, *freeze_secs)
        }
        ClipSource::Slate => {
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                filters::slate_source(frame, spec.duration),
            ]);
            "format=yuv420p".to_string()
        }
    };

    let graph = match &spec.overlay {
        None => format!("[0:v]{base_chain}[v]"),
        Some(overlay) => {
            args.extend([
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                path_arg(&overlay.path),
            ]);
            format!(
                "[0:v]{base_chain},format=gbrp[base];[1:v]{}[ovl];[base][ovl]{},format=yuv420p[v]",
                filters::overlay_prep(frame),
                filters::blend(overlay.blend)
            )
        }
    };

    args.extend([
        "-filter_complex".into(),
        graph,
        "-map".into(),
        "[v]".into(),
        "-an".into(),
        "-t".into(),
        duration,
        "-r".into(),
        frame.fps.to_string(),
    ]);
    args.extend(encode.video_args());
    args.push(path_arg(output));
    args
}

/// Render `spec` to `output` (an `.mp4` in the job workspace).
pub async fn render_clip(
    tools: &ToolRegistry,
    spec: &ClipSpec,
    encode: &EncodeSettings,
    output: &Path,
) -> sr_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::debug!(
        duration = spec.duration,
        overlay = spec.overlay.is_some(),
        "render clip {:?}",
        output
    );

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(clip_args(spec, encode, output));
    cmd.timeout(ffmpeg.timeout);
    cmd.execute().await?;

    Ok(())
}
