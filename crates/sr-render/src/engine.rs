//! The media engine seam.
//!
//! Every external media-processing invocation the pipeline makes goes
//! through [`MediaEngine`], so stages can be exercised against a mock engine
//! and the ffmpeg command lines stay in `sr-av`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sr_av::actions::ComposeSpec;
use sr_av::{ClipSpec, EncodeSettings, ToolRegistry};
use sr_core::Result;

/// Media operations used by the render stages.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Render one silent clip of exactly `spec.duration`.
    async fn render_clip(&self, spec: &ClipSpec, output: &Path) -> Result<()>;

    /// Pad (or replace with silence) a narration track to `duration`.
    async fn pad_narration(&self, input: Option<&Path>, duration: f64, output: &Path)
        -> Result<()>;

    /// Concatenate padded tracks, then compress and attenuate.
    async fn master_narration(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Mix looped music under the narration, trimmed to `duration`.
    async fn mix_music(
        &self,
        narration: &Path,
        music: &Path,
        gain: f64,
        duration: f64,
        output: &Path,
    ) -> Result<()>;

    /// Concatenate clips and burn captions and watermark.
    async fn compose(&self, spec: &ComposeSpec, output: &Path) -> Result<()>;

    /// Pair the composed video with the final audio.
    async fn mux(&self, video: &Path, audio: &Path, duration: f64, output: &Path) -> Result<()>;
}

/// [`MediaEngine`] backed by ffmpeg and ffprobe.
pub struct FfmpegEngine {
    tools: Arc<ToolRegistry>,
    encode: EncodeSettings,
}

impl FfmpegEngine {
    pub fn new(tools: Arc<ToolRegistry>, encode: EncodeSettings) -> Self {
        Self { tools, encode }
    }

    /// Fail early when a required tool is missing.
    pub fn check(&self) -> Result<()> {
        self.tools.require("ffmpeg")?;
        self.tools.require("ffprobe")?;
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        sr_av::probe_duration(&self.tools, path).await
    }

    async fn render_clip(&self, spec: &ClipSpec, output: &Path) -> Result<()> {
        sr_av::render_clip(&self.tools, spec, &self.encode, output).await
    }

    async fn pad_narration(
        &self,
        input: Option<&Path>,
        duration: f64,
        output: &Path,
    ) -> Result<()> {
        sr_av::pad_narration(&self.tools, input, duration, output).await
    }

    async fn master_narration(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        sr_av::master_narration(&self.tools, inputs, output).await
    }

    async fn mix_music(
        &self,
        narration: &Path,
        music: &Path,
        gain: f64,
        duration: f64,
        output: &Path,
    ) -> Result<()> {
        sr_av::mix_music(&self.tools, narration, music, gain, duration, output).await
    }

    async fn compose(&self, spec: &ComposeSpec, output: &Path) -> Result<()> {
        sr_av::compose_video(&self.tools, spec, &self.encode, output).await
    }

    async fn mux(&self, video: &Path, audio: &Path, duration: f64, output: &Path) -> Result<()> {
        sr_av::mux_final(&self.tools, video, audio, duration, &self.encode, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tools_fail_check() {
        let engine = FfmpegEngine::new(Arc::new(ToolRegistry::default()), EncodeSettings::default());
        let err = engine.check().unwrap_err();
        assert!(matches!(err, sr_core::Error::Tool { .. }));
        let err = engine
            .probe_duration(Path::new("/tmp/missing.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, sr_core::Error::Tool { .. }));
    }
}
