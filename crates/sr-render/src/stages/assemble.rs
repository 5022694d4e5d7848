//! Final composition and mux.

use std::sync::Arc;

use async_trait::async_trait;
use sr_av::actions::ComposeSpec;
use sr_av::WatermarkSpec;
use sr_core::{Error, Result};

use super::{AssembledVideo, Assembler, RenderedClip, StageContext};
use crate::engine::MediaEngine;

/// Concatenates clips in slot order, burns captions and watermark, then
/// pairs the result with the mixed audio.
pub struct DefaultAssembler {
    engine: Arc<dyn MediaEngine>,
    watermark: Option<WatermarkSpec>,
}

impl DefaultAssembler {
    pub fn new(engine: Arc<dyn MediaEngine>, watermark: Option<WatermarkSpec>) -> Self {
        Self { engine, watermark }
    }
}

#[async_trait]
impl Assembler for DefaultAssembler {
    async fn assemble(
        &self,
        ctx: &StageContext,
        clips: &[RenderedClip],
        captions: Option<&str>,
        audio: &std::path::Path,
    ) -> Result<AssembledVideo> {
        let duration: f64 = clips.iter().map(|c| c.duration).sum();

        let spec = ComposeSpec {
            clips: clips.iter().map(|c| c.path.clone()).collect(),
            captions: captions.map(str::to_string),
            watermark: self.watermark.clone(),
            frame: ctx.frame,
            workdir: ctx.workdir().to_path_buf(),
        };
        let video = ctx.workspace.file("video.mp4");
        self.engine.compose(&spec, &video).await?;

        let output = ctx.workspace.file("final.mp4");
        self.engine.mux(&video, audio, duration, &output).await?;

        let size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(Error::pipeline("assemble", "final video is missing or empty"));
        }

        tracing::info!(job_id = %ctx.job_id, duration, clips = clips.len(), bytes = size, "assembled final video");
        Ok(AssembledVideo {
            path: output,
            duration,
            clip_count: clips.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stage_context, EngineCall, MockEngine};
    use std::path::PathBuf;

    fn clips(durations: &[f64]) -> Vec<RenderedClip> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| RenderedClip {
                slot: i,
                scene_index: i,
                path: PathBuf::from(format!("/w/scene-{i:03}-clip.mp4")),
                duration: *d,
            })
            .collect()
    }

    #[tokio::test]
    async fn duration_is_sum_of_clips() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let watermark = WatermarkSpec {
            text: "storyreel".into(),
            opacity: 0.35,
            font_file: None,
        };
        let assembler = DefaultAssembler::new(engine.clone(), Some(watermark));

        let video = assembler
            .assemble(&ctx, &clips(&[4.0, 6.0, 5.0]), Some("captions.ass"), &ctx.workspace.file("mixed.wav"))
            .await
            .unwrap();
        assert_eq!(video.duration, 15.0);
        assert_eq!(video.clip_count, 3);

        let calls = engine.calls();
        match &calls[0] {
            EngineCall::Compose { spec, .. } => {
                assert_eq!(spec.clips.len(), 3);
                assert_eq!(spec.captions.as_deref(), Some("captions.ass"));
                assert!(spec.watermark.is_some());
                assert_eq!(spec.workdir, ctx.workdir());
            }
            other => panic!("expected compose, got {other:?}"),
        }
        assert!(matches!(calls[1], EngineCall::Mux { duration, .. } if duration == 15.0));
    }

    #[tokio::test]
    async fn mux_failure_propagates() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        engine.fail_on("mux");
        let err = DefaultAssembler::new(engine, None)
            .assemble(&ctx, &clips(&[1.0]), None, &ctx.workspace.file("n.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
