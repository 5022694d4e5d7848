//! Final video composition and muxing.
//!
//! [`compose_video`] is the only re-encode after clip rendering: it
//! concatenates the clips through a filter graph, burns captions, and draws
//! the watermark in one pass. [`mux_final`] then copies that video stream and
//! encodes only the audio.

use std::path::{Path, PathBuf};

use super::{base_args, path_arg};
use crate::command::ToolCommand;
use crate::filters::{self, num, EncodeSettings, FrameSpec, WatermarkSpec};
use crate::tools::ToolRegistry;

/// Inputs to [`compose_video`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeSpec {
    /// Clips in timeline order.
    pub clips: Vec<PathBuf>,
    /// ASS file name, relative to `workdir`.
    pub captions: Option<String>,
    pub watermark: Option<WatermarkSpec>,
    pub frame: FrameSpec,
    /// Working directory for ffmpeg, normally the job workspace.
    pub workdir: PathBuf,
}

/// Build the filter graph for [`compose_video`]. The output label is `[outv]`.
pub fn compose_graph(spec: &ComposeSpec) -> String {
    let mut graph = filters::concat_video(spec.clips.len(), &spec.frame);

    let mut post = Vec::new();
    if let Some(ref captions) = spec.captions {
        post.push(filters::subtitles(captions));
    }
    // Watermark goes last so captions never cover it.
    if let Some(ref watermark) = spec.watermark {
        post.push(filters::watermark(watermark, &spec.frame));
    }

    if post.is_empty() {
        graph.push_str(";[cat]null[outv]");
    } else {
        graph.push_str(&format!(";[cat]{}[outv]", post.join(",")));
    }
    graph
}

/// Build the ffmpeg arguments for [`compose_video`].
pub fn compose_args(spec: &ComposeSpec, encode: &EncodeSettings, output: &Path) -> Vec<String> {
    let mut args = base_args();
    for clip in &spec.clips {
        args.extend(["-i".into(), path_arg(clip)]);
    }
    args.extend([
        "-filter_complex".into(),
        compose_graph(spec),
        "-map".into(),
        "[outv]".into(),
        "-an".into(),
    ]);
    args.extend(encode.video_args());
    args.push(path_arg(output));
    args
}

/// Concatenate clips and apply captions and watermark.
pub async fn compose_video(
    tools: &ToolRegistry,
    spec: &ComposeSpec,
    encode: &EncodeSettings,
    output: &Path,
) -> sr_core::Result<()> {
    if spec.clips.is_empty() {
        return Err(sr_core::Error::pipeline("assemble", "no clips to concatenate"));
    }
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(
        clips = spec.clips.len(),
        captions = spec.captions.is_some(),
        watermark = spec.watermark.is_some(),
        "compose video {:?}",
        output
    );

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(compose_args(spec, encode, output));
    cmd.current_dir(&spec.workdir);
    cmd.timeout(ffmpeg.timeout);
    cmd.execute().await?;

    Ok(())
}

/// Build the ffmpeg arguments for [`mux_final`].
pub fn mux_args(
    video: &Path,
    audio: &Path,
    duration: f64,
    encode: &EncodeSettings,
    output: &Path,
) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".into(),
        path_arg(video),
        "-i".into(),
        path_arg(audio),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        encode.audio_bitrate.clone(),
        "-t".into(),
        num(duration),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output),
    ]);
    args
}

/// Pair the composed video with the mixed audio.
pub async fn mux_final(
    tools: &ToolRegistry,
    video: &Path,
    audio: &Path,
    duration: f64,
    encode: &EncodeSettings,
    output: &Path,
) -> sr_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(duration, "mux final video {:?}", output);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(mux_args(video, audio, duration, encode, output));
    cmd.timeout(ffmpeg.timeout);
    cmd.execute().await?;

    Ok(())
}
