//! Asset resolution and timeline planning.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sr_av::ClipSource;
use sr_core::config::SkippedScenePolicy;
use sr_core::{Error, Result, Scene, Visual};

use super::{AssetResolver, ResolvedScene, StageContext, TimelineSlot};
use crate::engine::MediaEngine;
use crate::fetch::{extension_for, AssetFetcher};
use crate::progress::ProgressSpan;

/// Fetches visuals and narration with bounded, order-preserving fan-out.
pub struct DefaultAssetResolver {
    engine: Arc<dyn MediaEngine>,
    fetcher: Arc<dyn AssetFetcher>,
    concurrency: usize,
}

impl DefaultAssetResolver {
    pub fn new(engine: Arc<dyn MediaEngine>, fetcher: Arc<dyn AssetFetcher>, concurrency: usize) -> Self {
        Self {
            engine,
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    async fn resolve_scene(&self, ctx: &StageContext, index: usize, scene: &Scene) -> ResolvedScene {
        let (audio, audio_failed) = self.fetch_audio(ctx, index, scene).await;

        let measured = match &audio {
            Some(path) => match self.engine.probe_duration(path).await {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::warn!(job_id = %ctx.job_id, scene = index, "narration probe failed: {e}");
                    None
                }
            },
            None => None,
        };
        let duration = ctx
            .frame
            .quantize(measured.unwrap_or_else(|| scene.nominal_duration()));

        let visual = self.fetch_visual(ctx, index, scene, duration).await;

        ResolvedScene {
            index,
            scene: scene.clone(),
            visual,
            audio,
            audio_failed,
            duration,
        }
    }

    async fn fetch_audio(&self, ctx: &StageContext, index: usize, scene: &Scene) -> (Option<PathBuf>, bool) {
        let Some(url) = scene.audio_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return (None, false);
        };
        let dest = ctx
            .workspace
            .scene_file(index, "audio", &extension_for(url, "mp3"));
        match self.fetcher.fetch(url, &dest).await {
            Ok(_) => (Some(dest), false),
            Err(e) => {
                tracing::warn!(job_id = %ctx.job_id, scene = index, "narration unavailable: {e}");
                (None, true)
            }
        }
    }

    async fn fetch_visual(
        &self,
        ctx: &StageContext,
        index: usize,
        scene: &Scene,
        duration: f64,
    ) -> Option<ClipSource> {
        let Some(visual) = scene.visual() else {
            tracing::warn!(job_id = %ctx.job_id, scene = index, "scene has no visual");
            return None;
        };

        let fallback = if visual.is_video() { "mp4" } else { "png" };
        let dest = ctx
            .workspace
            .scene_file(index, "visual", &extension_for(visual.url(), fallback));
        if let Err(e) = self.fetcher.fetch(visual.url(), &dest).await {
            tracing::warn!(job_id = %ctx.job_id, scene = index, "visual unavailable, scene skippable: {e}");
            return None;
        }

        match visual {
            Visual::Image(_) => Some(ClipSource::Image {
                path: dest,
                effect: scene.effect,
            }),
            Visual::Video(_) => {
                let freeze_secs = match self.engine.probe_duration(&dest).await {
                    Ok(length) if length >= duration => 0.0,
                    Ok(length) => duration - length,
                    Err(e) => {
                        tracing::warn!(job_id = %ctx.job_id, scene = index, "video probe failed: {e}");
                        duration
                    }
                };
                if freeze_secs > 0.0 {
                    tracing::debug!(scene = index, freeze_secs, "video shorter than scene; holding last frame");
                }
                Some(ClipSource::Video {
                    path: dest,
                    freeze_secs,
                })
            }
        }
    }
}

#[async_trait]
impl AssetResolver for DefaultAssetResolver {
    async fn resolve(
        &self,
        ctx: &StageContext,
        scenes: &[Scene],
        progress: &ProgressSpan<'_>,
    ) -> Result<Vec<ResolvedScene>> {
        let pending: Vec<_> = scenes
            .iter()
            .enumerate()
            .map(|(index, scene)| async move {
                let r = self.resolve_scene(ctx, index, scene).await;
                progress.tick();
                r
            })
            .collect();
        let resolved = stream::iter(pending)
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        Ok(resolved)
    }
}

/// Decide which scenes occupy the final timeline.
///
/// A scene whose visual failed keeps its slot as a slate under
/// [`SkippedScenePolicy::Slate`] when its narration or text still has
/// something to contribute; otherwise the slot is absent. At least one scene
/// must have a real visual.
pub fn plan_timeline(resolved: Vec<ResolvedScene>, policy: SkippedScenePolicy) -> Result<Vec<TimelineSlot>> {
    if !resolved.iter().any(|r| r.visual.is_some()) {
        return Err(Error::pipeline(
            "resolve",
            "no renderable scenes: every visual failed to resolve",
        ));
    }

    let mut slots = Vec::with_capacity(resolved.len());
    for r in resolved {
        let (source, overlay) = match r.visual {
            Some(source) => (source, r.scene.overlay),
            None => {
                let contributes = !r.audio_failed && (r.audio.is_some() || !r.scene.text.trim().is_empty());
                if policy == SkippedScenePolicy::Omit || !contributes {
                    tracing::info!(scene = r.index, order = r.scene.order, "scene omitted from timeline");
                    continue;
                }
                (ClipSource::Slate, None)
            }
        };

        slots.push(TimelineSlot {
            scene_index: r.index,
            source,
            overlay,
            audio: r.audio,
            text: r.scene.text,
            word_timestamps: r.scene.word_timestamps,
            duration: r.duration,
        });
    }

    Ok(slots)
}
