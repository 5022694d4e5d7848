//! Narration padding, mastering, and background music mixing.
//!
//! Intermediate tracks are 44.1 kHz stereo PCM WAV so lengths stay
//! sample-exact until the final AAC encode in the mux.

use std::path::{Path, PathBuf};

use super::{base_args, path_arg};
use crate::command::ToolCommand;
use crate::filters::{self, sample_count};
use crate::tools::ToolRegistry;

const PCM_ARGS: [&str; 2] = ["-c:a", "pcm_s16le"];

/// Build the ffmpeg arguments for [`pad_narration`].
pub fn pad_args(input: Option<&Path>, duration: f64, output: &Path) -> Vec<String> {
    let mut args = base_args();
    match input {
        Some(path) => args.extend(["-i".into(), path_arg(path)]),
        None => args.extend([
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            filters::silence_source(),
        ]),
    }
    args.extend([
        "-filter_complex".into(),
        format!("[0:a]{}[a]", filters::pad_audio(sample_count(duration))),
        "-map".into(),
        "[a]".into(),
    ]);
    args.extend(PCM_ARGS.map(String::from));
    args.push(path_arg(output));
    args
}

/// Write a track of exactly `duration` seconds: the narration followed by
/// silence, or pure silence when `input` is `None`.
pub async fn pad_narration(
    tools: &ToolRegistry,
    input: Option<&Path>,
    duration: f64,
    output: &Path,
) -> sr_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::debug!(duration, silent = input.is_none(), "pad narration {:?}", output);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(pad_args(input, duration, output));
    cmd.timeout(ffmpeg.timeout);
    cmd.execute().await?;

    Ok(())
}

/// Build the ffmpeg arguments for [`master_narration`].
pub fn master_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
    let mut args = base_args();
    for input in inputs {
        args.extend(["-i".into(), path_arg(input)]);
    }
    args.extend([
        "-filter_complex".into(),
        filters::master_narration(inputs.len()),
        "-map".into(),
        "[a]".into(),
    ]);
    args.extend(PCM_ARGS.map(String::from));
    args.push(path_arg(output));
    args
}

/// Concatenate padded per-scene tracks, compress, and attenuate.
pub async fn master_narration(
    tools: &ToolRegistry,
    inputs: &[PathBuf],
    output: &Path,
) -> sr_core::Result<()> {
    if inputs.is_empty() {
        return Err(sr_core::Error::pipeline("audio", "no narration tracks to master"));
    }
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(tracks = inputs.len(), "master narration {:?}", output);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(master_args(inputs, output));
    cmd.timeout(ffmpeg.timeout);
    cmd.execute().await?;

    Ok(())
}

/// Build the ffmpeg arguments for [`mix_music`].
pub fn mix_args(
    narration: &Path,
    music: &Path,
    gain: f64,
    duration: f64,
    output: &Path,
) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".into(),
        path_arg(narration),
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        path_arg(music),
        "-filter_complex".into(),
        filters::mix_music(gain, sample_count(duration)),
        "-map".into(),
        "[a]".into(),
    ]);
    args.extend(PCM_ARGS.map(String::from));
    args.push(path_arg(output));
    args
}

/// Lay looped music under the narration and trim to `duration`.
pub async fn mix_music(
    tools: &ToolRegistry,
    narration: &Path,
    music: &Path,
    gain: f64,
    duration: f64,
    output: &Path,
) -> sr_core::Result<()> {
    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(gain, duration, "mix background music {:?}", output);

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.args(mix_args(narration, music, gain, duration, output));
    cmd.timeout(ffmpeg.timeout);
    cmd.execute().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_with_narration_reads_input() {
        let args = pad_args(
            Some(Path::new("/w/scene-000-audio.mp3")),
            4.0,
            Path::new("/w/scene-000-pad.wav"),
        );
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/w/scene-000-audio.mp3");
        assert!(args.iter().any(|a| a.contains("apad=whole_len=176400")));
        assert!(args.contains(&"pcm_s16le".to_string()));
    }

    #[test]
    fn pad_without_narration_is_silence_of_same_length() {
        let args = pad_args(None, 4.0, Path::new("/w/scene-001-pad.wav"));
        assert!(args.contains(&"anullsrc=r=44100:cl=stereo".to_string()));
        assert!(args.iter().any(|a| a.contains("atrim=end_sample=176400")));
    }

    #[test]
    fn master_lists_every_track_in_order() {
        let inputs = vec![PathBuf::from("/w/a.wav"), PathBuf::from("/w/b.wav")];
        let args = master_args(&inputs, Path::new("/w/narration.wav"));
        let order: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && args[i - 1] == "-i")
            .map(|(_, a)| a)
            .collect();
        assert_eq!(order, vec!["/w/a.wav", "/w/b.wav"]);
    }

    #[test]
    fn music_is_looped_input() {
        let args = mix_args(
            Path::new("/w/narration.wav"),
            Path::new("/w/music.mp3"),
            0.3,
            15.0,
            Path::new("/w/mixed.wav"),
        );
        let i = args.iter().position(|a| a == "-stream_loop").unwrap();
        assert_eq!(args[i + 1], "-1");
        assert_eq!(args[i + 3], "/w/music.mp3");
    }

    #[tokio::test]
    async fn master_rejects_empty_input() {
        let err = master_narration(&ToolRegistry::default(), &[], Path::new("/w/n.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, sr_core::Error::Pipeline { .. }));
    }
}
