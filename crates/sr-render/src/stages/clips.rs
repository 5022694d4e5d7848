//! Per-scene clip rendering.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use sr_av::actions::OverlaySpec;
use sr_av::ClipSpec;
use sr_core::{Overlay, Result};

use super::{ClipRenderer, RenderedClip, StageContext, TimelineSlot};
use crate::engine::MediaEngine;
use crate::progress::ProgressSpan;

const OVERLAY_EXTENSIONS: [&str; 3] = ["mp4", "mov", "webm"];

/// Renders slots through the media engine, a bounded number at a time.
pub struct DefaultClipRenderer {
    engine: Arc<dyn MediaEngine>,
    overlays_dir: Option<PathBuf>,
    concurrency: usize,
}

impl DefaultClipRenderer {
    pub fn new(engine: Arc<dyn MediaEngine>, overlays_dir: Option<PathBuf>, concurrency: usize) -> Self {
        Self {
            engine,
            overlays_dir,
            concurrency: concurrency.max(1),
        }
    }

    /// Locate an overlay in the library. Unknown overlays are dropped with a
    /// warning rather than failing the clip.
    fn overlay_spec(&self, overlay: &Overlay) -> Option<OverlaySpec> {
        let dir = self.overlays_dir.as_ref()?;
        let id = overlay.id.trim();
        let safe = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !safe {
            tracing::warn!(overlay = %overlay.id, "ignoring overlay with invalid id");
            return None;
        }

        let found = OVERLAY_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{id}.{ext}")))
            .find(|p| p.is_file());
        match found {
            Some(path) => Some(OverlaySpec {
                path,
                blend: overlay.category.blend_mode(),
            }),
            None => {
                tracing::warn!(overlay = %overlay.id, "overlay not found in {:?}", dir);
                None
            }
        }
    }

    async fn render_slot(&self, ctx: &StageContext, slot: usize, entry: &TimelineSlot) -> Result<RenderedClip> {
        let spec = ClipSpec {
            source: entry.source.clone(),
            overlay: entry.overlay.as_ref().and_then(|o| self.overlay_spec(o)),
            duration: entry.duration,
            frame: ctx.frame,
        };
        let output = ctx.workspace.scene_file(entry.scene_index, "clip", "mp4");
        self.engine.render_clip(&spec, &output).await?;

        Ok(RenderedClip {
            slot,
            scene_index: entry.scene_index,
            path: output,
            duration: entry.duration,
        })
    }
}

#[async_trait]
impl ClipRenderer for DefaultClipRenderer {
    async fn render(
        &self,
        ctx: &StageContext,
        slots: &[TimelineSlot],
        progress: &ProgressSpan<'_>,
    ) -> Result<Vec<RenderedClip>> {
        tracing::info!(job_id = %ctx.job_id, clips = slots.len(), "rendering clips");

        let pending: Vec<_> = slots
            .iter()
            .enumerate()
            .map(|(slot, entry)| async move {
                let clip = self.render_slot(ctx, slot, entry).await?;
                progress.tick();
                Ok::<_, sr_core::Error>(clip)
            })
            .collect();
        stream::iter(pending)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSender;
    use crate::testing::{stage_context, EngineCall, MockEngine};
    use sr_av::ClipSource;
    use sr_core::{BlendMode, OverlayCategory};

    fn slot(scene_index: usize, duration: f64) -> TimelineSlot {
        TimelineSlot {
            scene_index,
            source: ClipSource::Slate,
            overlay: None,
            audio: None,
            text: String::new(),
            word_timestamps: Vec::new(),
            duration,
        }
    }

    #[tokio::test]
    async fn clips_come_back_in_slot_order() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let renderer = DefaultClipRenderer::new(engine.clone(), None, 2);

        let slots = vec![slot(0, 4.0), slot(2, 6.0), slot(3, 5.0)];
        let sender = ProgressSender::noop();
        let span = sender.span("clips", 30.0, 70.0, slots.len());
        let clips = renderer.render(&ctx, &slots, &span).await.unwrap();

        assert_eq!(clips.iter().map(|c| c.slot).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(clips.iter().map(|c| c.scene_index).collect::<Vec<_>>(), vec![0, 2, 3]);
        assert!(clips[1].path.ends_with("scene-002-clip.mp4"));
        assert_eq!(engine.count("clip"), 3);
    }

    #[tokio::test]
    async fn engine_failure_fails_the_stage() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        engine.fail_on("clip");
        let renderer = DefaultClipRenderer::new(engine, None, 2);

        let sender = ProgressSender::noop();
        let span = sender.span("clips", 30.0, 70.0, 1);
        let err = renderer.render(&ctx, &[slot(0, 1.0)], &span).await.unwrap_err();
        assert!(matches!(err, sr_core::Error::Tool { .. }));
    }

    #[tokio::test]
    async fn overlays_resolve_from_library() {
        let scratch = tempfile::tempdir().unwrap();
        let library = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join("sparkle.webm"), b"x").unwrap();

        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let renderer = DefaultClipRenderer::new(engine.clone(), Some(library.path().to_path_buf()), 1);

        let mut with_overlay = slot(0, 2.0);
        with_overlay.overlay = Some(Overlay {
            id: "sparkle".into(),
            category: OverlayCategory::Light,
        });
        let mut missing = slot(1, 2.0);
        missing.overlay = Some(Overlay {
            id: "../../etc/passwd".into(),
            category: OverlayCategory::Other,
        });

        let sender = ProgressSender::noop();
        let span = sender.span("clips", 30.0, 70.0, 2);
        renderer.render(&ctx, &[with_overlay, missing], &span).await.unwrap();

        let overlays: Vec<Option<OverlaySpec>> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Clip { spec, .. } => Some(spec.overlay),
                _ => None,
            })
            .collect();
        assert_eq!(
            overlays[0],
            Some(OverlaySpec {
                path: library.path().join("sparkle.webm"),
                blend: BlendMode::Screen,
            })
        );
        assert_eq!(overlays[1], None);
    }
}
