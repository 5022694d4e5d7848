//! The render pipeline: resolve, plan, clips, captions, audio, assemble.

use std::sync::Arc;

use sr_av::WatermarkSpec;
use sr_core::config::{Config, SkippedScenePolicy};
use sr_core::{Result, Scene};

use crate::captions::{self, CaptionScene};
use crate::engine::MediaEngine;
use crate::fetch::AssetFetcher;
use crate::progress::ProgressSender;
use crate::stages::{
    plan_timeline, AssembledVideo, Assembler, AssetResolver, AudioMixer, ClipRenderer,
    DefaultAssembler, DefaultAssetResolver, DefaultAudioMixer, DefaultClipRenderer, StageContext,
    TimelineSlot,
};

/// Name of the subtitle file inside the job workspace.
pub const CAPTIONS_FILE: &str = "captions.ass";

/// Runs the render stages for one job, in order.
pub struct RenderPipeline {
    resolver: Arc<dyn AssetResolver>,
    clips: Arc<dyn ClipRenderer>,
    audio: Arc<dyn AudioMixer>,
    assembler: Arc<dyn Assembler>,
    skipped_scenes: SkippedScenePolicy,
}

impl RenderPipeline {
    /// Default stages over `engine` and `fetcher`, configured from `config`.
    pub fn new(engine: Arc<dyn MediaEngine>, fetcher: Arc<dyn AssetFetcher>, config: &Config) -> Self {
        let render = &config.render;
        let watermark = config.watermark.enabled.then(|| WatermarkSpec {
            text: config.watermark.text.clone(),
            opacity: config.watermark.opacity,
            font_file: config.watermark.font_file.clone(),
        });

        Self {
            resolver: Arc::new(DefaultAssetResolver::new(
                engine.clone(),
                fetcher.clone(),
                render.fetch_concurrency,
            )),
            clips: Arc::new(DefaultClipRenderer::new(
                engine.clone(),
                render.overlays_dir.clone(),
                render.clip_concurrency,
            )),
            audio: Arc::new(DefaultAudioMixer::new(
                engine.clone(),
                fetcher,
                render.clip_concurrency,
            )),
            assembler: Arc::new(DefaultAssembler::new(engine, watermark)),
            skipped_scenes: render.skipped_scenes,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn AssetResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_clip_renderer(mut self, clips: Arc<dyn ClipRenderer>) -> Self {
        self.clips = clips;
        self
    }

    pub fn with_audio_mixer(mut self, audio: Arc<dyn AudioMixer>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_assembler(mut self, assembler: Arc<dyn Assembler>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Render `scenes` (already in story order) into the job workspace.
    pub async fn run(
        &self,
        ctx: &StageContext,
        scenes: &[Scene],
        progress: &ProgressSender,
    ) -> Result<AssembledVideo> {
        tracing::info!(job_id = %ctx.job_id, story_id = %ctx.story_id, scenes = scenes.len(), "render started");

        let span = progress.span("resolve", 5.0, 30.0, scenes.len());
        let resolved = self.resolver.resolve(ctx, scenes, &span).await?;
        log_stage(30.0, "resolve");

        let slots = plan_timeline(resolved, self.skipped_scenes)?;
        tracing::info!(job_id = %ctx.job_id, slots = slots.len(), "timeline planned");

        let span = progress.span("clips", 30.0, 70.0, slots.len());
        let clips = self.clips.render(ctx, &slots, &span).await?;
        log_stage(70.0, "clips");

        let captions = self.write_captions(ctx, &slots).await?;
        progress.send(72.0, "captions");
        log_stage(72.0, "captions");

        let audio = self.audio.mix(ctx, &slots).await?;
        progress.send(85.0, "audio");
        log_stage(85.0, "audio");

        let video = self
            .assembler
            .assemble(ctx, &clips, captions.then_some(CAPTIONS_FILE), &audio)
            .await?;
        progress.send(95.0, "assemble");
        log_stage(95.0, "assemble");

        Ok(video)
    }

    /// Compile the caption timeline and write the ASS file when captions
    /// are enabled and there is something to show.
    async fn write_captions(&self, ctx: &StageContext, slots: &[TimelineSlot]) -> Result<bool> {
        let Some(style) = ctx.settings.captions.as_ref() else {
            return Ok(false);
        };

        let scenes: Vec<CaptionScene<'_>> = slots
            .iter()
            .map(|s| CaptionScene {
                text: &s.text,
                words: &s.word_timestamps,
                duration: s.duration,
            })
            .collect();
        let timeline = captions::compile(&scenes);
        if timeline.is_empty() {
            tracing::debug!(job_id = %ctx.job_id, "no caption words; skipping subtitles");
            return Ok(false);
        }

        let ass = captions::render_ass(&timeline, style, &ctx.frame);
        tokio::fs::write(ctx.workspace.file(CAPTIONS_FILE), ass).await?;
        tracing::debug!(job_id = %ctx.job_id, words = timeline.events.len(), "captions written");
        Ok(true)
    }
}

fn log_stage(pct: f64, stage: &str) {
    tracing::info!("[{:.0}%] Completed: {}", pct, stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scene, stage_context, EngineCall, MockEngine, MockFetcher};
    use parking_lot::Mutex;
    use sr_av::ClipSource;

    fn pipeline(engine: &Arc<MockEngine>) -> RenderPipeline {
        RenderPipeline::new(engine.clone(), Arc::new(MockFetcher::new()), &Config::default())
    }

    fn narrated(order: u32, text: &str, secs: f64) -> Scene {
        let mut s = scene(order, text);
        s.audio_url = Some(format!("https://cdn.test/voice-{order}.mp3#d={secs}"));
        s
    }

    #[tokio::test]
    async fn three_scenes_concatenate_in_order() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let scenes = vec![
            narrated(0, "one two three", 4.0),
            narrated(1, "four five", 6.0),
            narrated(2, "six", 5.0),
        ];

        let video = pipeline(&engine)
            .run(&ctx, &scenes, &ProgressSender::noop())
            .await
            .unwrap();
        assert_eq!(video.duration, 15.0);
        assert_eq!(video.clip_count, 3);

        let compose = engine
            .calls()
            .into_iter()
            .find_map(|c| match c {
                EngineCall::Compose { spec, .. } => Some(spec),
                _ => None,
            })
            .unwrap();
        let names: Vec<String> = compose
            .clips
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["scene-000-clip.mp4", "scene-001-clip.mp4", "scene-002-clip.mp4"]);
        assert_eq!(compose.captions.as_deref(), Some(CAPTIONS_FILE));
        assert!(ctx.workspace.file(CAPTIONS_FILE).is_file());
        assert_eq!(engine.count("mix"), 0);
    }

    #[tokio::test]
    async fn failed_image_becomes_slate_with_captions_at_offset() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let mut broken = narrated(1, "lost picture", 6.0);
        broken.image_url = Some("https://cdn.test/fail.png".into());
        let scenes = vec![narrated(0, "hello there", 4.0), broken, narrated(2, "bye", 5.0)];

        let video = pipeline(&engine)
            .run(&ctx, &scenes, &ProgressSender::noop())
            .await
            .unwrap();
        assert_eq!(video.duration, 15.0);

        let sources: Vec<ClipSource> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Clip { spec, .. } => Some(spec.source),
                _ => None,
            })
            .collect();
        assert_eq!(sources.len(), 3);
        assert!(sources.contains(&ClipSource::Slate));

        let ass = std::fs::read_to_string(ctx.workspace.file(CAPTIONS_FILE)).unwrap();
        // "lost" is the first word of the slate scene and starts at 4s
        assert!(ass.contains("Dialogue: 0,0:00:04.00,"));
    }

    #[tokio::test]
    async fn omit_policy_shortens_video() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let mut config = Config::default();
        config.render.skipped_scenes = SkippedScenePolicy::Omit;
        let pipeline = RenderPipeline::new(engine.clone(), Arc::new(MockFetcher::new()), &config);

        let mut broken = narrated(1, "gone", 6.0);
        broken.image_url = Some("https://cdn.test/fail.png".into());
        let scenes = vec![narrated(0, "kept", 4.0), broken];

        let video = pipeline.run(&ctx, &scenes, &ProgressSender::noop()).await.unwrap();
        assert_eq!(video.duration, 4.0);
        assert_eq!(engine.count("clip"), 1);
    }

    #[tokio::test]
    async fn captions_disabled_writes_no_subtitles() {
        let scratch = tempfile::tempdir().unwrap();
        let mut ctx = stage_context(scratch.path());
        ctx.settings.captions = None;
        let engine = Arc::new(MockEngine::new());

        pipeline(&engine)
            .run(&ctx, &[narrated(0, "quiet", 2.0)], &ProgressSender::noop())
            .await
            .unwrap();
        assert!(!ctx.workspace.file(CAPTIONS_FILE).exists());
    }

    #[tokio::test]
    async fn music_at_zero_volume_is_never_mixed() {
        let scratch = tempfile::tempdir().unwrap();
        let mut ctx = stage_context(scratch.path());
        let mut request = sr_core::RenderRequest::default();
        request.background_music = sr_core::MusicConfig {
            enabled: true,
            url: Some("https://cdn.test/song.mp3".into()),
            volume: 0,
        };
        ctx.settings = request.validate().unwrap();
        let engine = Arc::new(MockEngine::new());

        pipeline(&engine)
            .run(&ctx, &[narrated(0, "hush", 2.0)], &ProgressSender::noop())
            .await
            .unwrap();
        assert_eq!(engine.count("mix"), 0);

        request.background_music.volume = 30;
        ctx.settings = request.validate().unwrap();
        let engine = Arc::new(MockEngine::new());
        pipeline(&engine)
            .run(&ctx, &[narrated(0, "loud", 2.0)], &ProgressSender::noop())
            .await
            .unwrap();
        assert_eq!(engine.count("mix"), 1);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_staged() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        let seen = Arc::new(Mutex::new(Vec::<(f64, String)>::new()));
        let sink = seen.clone();
        let sender = ProgressSender::new(move |pct, stage| sink.lock().push((pct, stage.to_string())));

        pipeline(&engine)
            .run(&ctx, &[narrated(0, "a", 1.0), narrated(1, "b", 1.0)], &sender)
            .await
            .unwrap();

        let seen = seen.lock();
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(seen.first().unwrap(), &(5.0, "resolve".to_string()));
        assert_eq!(seen.last().unwrap(), &(95.0, "assemble".to_string()));
    }

    #[tokio::test]
    async fn engine_failure_aborts_render() {
        let scratch = tempfile::tempdir().unwrap();
        let ctx = stage_context(scratch.path());
        let engine = Arc::new(MockEngine::new());
        engine.fail_on("compose");

        let err = pipeline(&engine)
            .run(&ctx, &[narrated(0, "a", 1.0)], &ProgressSender::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, sr_core::Error::Tool { .. }));
        assert_eq!(engine.count("mux"), 0);
    }
}
