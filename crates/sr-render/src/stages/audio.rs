//! Narration mastering and background music.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use sr_core::{MusicSettings, Result};

use super::{AudioMixer, StageContext, TimelineSlot};
use crate::engine::MediaEngine;
use crate::fetch::{extension_for, AssetFetcher};

/// Pads each slot's narration to the slot length, masters the result, and
/// lays music underneath when requested.
pub struct DefaultAudioMixer {
    engine: Arc<dyn MediaEngine>,
    fetcher: Arc<dyn AssetFetcher>,
    concurrency: usize,
}

impl DefaultAudioMixer {
    pub fn new(engine: Arc<dyn MediaEngine>, fetcher: Arc<dyn AssetFetcher>, concurrency: usize) -> Self {
        Self {
            engine,
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch the music track. A failure leaves the render narration-only.
    async fn fetch_music(&self, ctx: &StageContext, music: &MusicSettings) -> Option<PathBuf> {
        let dest = ctx
            .workspace
            .file(&format!("music.{}", extension_for(&music.url, "mp3")));
        match self.fetcher.fetch(&music.url, &dest).await {
            Ok(_) => Some(dest),
            Err(e) => {
                tracing::warn!(job_id = %ctx.job_id, "background music unavailable, continuing without: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl AudioMixer for DefaultAudioMixer {
    async fn mix(&self, ctx: &StageContext, slots: &[TimelineSlot]) -> Result<PathBuf> {
        let pending: Vec<_> = slots
            .iter()
            .map(|slot| async move {
                let output = ctx.workspace.scene_file(slot.scene_index, "pad", "wav");
                self.engine
                    .pad_narration(slot.audio.as_deref(), slot.duration, &output)
                    .await?;
                Ok::<_, sr_core::Error>(output)
            })
            .collect();
        let padded: Vec<PathBuf> = stream::iter(pending)
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let narration = ctx.workspace.file("narration.wav");
        self.engine.master_narration(&padded, &narration).await?;

        let Some(music) = ctx.settings.music.as_ref().filter(|m| m.gain > 0.0) else {
            return Ok(narration);
        };
        let Some(track) = self.fetch_music(ctx, music).await else {
            return Ok(narration);
        };

        let total: f64 = slots.iter().map(|s| s.duration).sum();
        let mixed = ctx.workspace.file("mixed.wav");
        self.engine
            .mix_music(&narration, &track, music.gain, total, &mixed)
            .await?;
        Ok(mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stage_context, EngineCall, MockEngine, MockFetcher};
    use sr_av::ClipSource;

    fn slot(scene_index: usize, audio: Option<&str>, duration: f64) -> TimelineSlot {
        TimelineSlot {
            scene_index,
            source: ClipSource::Slate,
            overlay: None,
            audio: audio.map(PathBuf::from),
            text: String::new(),
            word_timestamps: Vec::new(),
            duration,
        }
    }

    fn mixer(engine: &Arc<MockEngine>, fetcher: &Arc<MockFetcher>) -> DefaultAudioMixer {
        DefaultAudioMixer::new(engine.clone(), fetcher.clone(), 4)
    }

    #[tokio::test]
    async fn silent_slots_are_padded_with_silence() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let fetcher = Arc::new(MockFetcher::new());

        let slots = vec![slot(0, Some("/w/a.mp3"), 4.0), slot(1, None, 6.0)];
        let out = mixer(&engine, &fetcher).mix(&ctx, &slots).await.unwrap();
        assert!(out.ends_with("narration.wav"));

        let pads: Vec<(Option<PathBuf>, f64)> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Pad { input, duration, .. } => Some((input, duration)),
                _ => None,
            })
            .collect();
        assert_eq!(pads, vec![(Some(PathBuf::from("/w/a.mp3")), 4.0), (None, 6.0)]);
        assert_eq!(engine.count("master"), 1);
        assert_eq!(engine.count("mix"), 0);
    }

    #[tokio::test]
    async fn music_is_mixed_over_full_length() {
        let scratch = tempfile::tempdir().unwrap();
        let mut ctx = stage_context(scratch.path());
        ctx.settings.music = Some(MusicSettings {
            url: "https://cdn.test/bed.mp3".into(),
            gain: 0.3,
        });
        let engine = Arc::new(MockEngine::new());
        let fetcher = Arc::new(MockFetcher::new());

        let slots = vec![slot(0, None, 4.0), slot(1, None, 6.0), slot(2, None, 5.0)];
        let out = mixer(&engine, &fetcher).mix(&ctx, &slots).await.unwrap();
        assert!(out.ends_with("mixed.wav"));

        let mix = engine
            .calls()
            .into_iter()
            .find_map(|c| match c {
                EngineCall::Mix { gain, duration, .. } => Some((gain, duration)),
                _ => None,
            })
            .unwrap();
        assert_eq!(mix, (0.3, 15.0));
    }

    #[tokio::test]
    async fn unreachable_music_falls_back_to_narration() {
        let scratch = tempfile::tempdir().unwrap();
        let mut ctx = stage_context(scratch.path());
        ctx.settings.music = Some(MusicSettings {
            url: "https://cdn.test/fail.mp3".into(),
            gain: 0.5,
        });
        let engine = Arc::new(MockEngine::new());
        let fetcher = Arc::new(MockFetcher::new());

        let out = mixer(&engine, &fetcher)
            .mix(&ctx, &[slot(0, None, 2.0)])
            .await
            .unwrap();
        assert!(out.ends_with("narration.wav"));
        assert_eq!(engine.count("mix"), 0);
    }
}
