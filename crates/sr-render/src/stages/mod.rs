//! Render stages as capability traits.
//!
//! A render runs resolve, clips, captions, audio, and assemble in sequence.
//! Each stage is a trait object so alternate implementations can be swapped
//! in; the defaults drive a [`MediaEngine`](crate::engine::MediaEngine).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sr_av::{ClipSource, FrameSpec, Workspace};
use sr_core::{JobId, Overlay, RenderSettings, Result, Scene, StoryId, WordTimestamp};

use crate::progress::ProgressSpan;

pub mod assemble;
pub mod audio;
pub mod clips;
pub mod resolve;

pub use assemble::DefaultAssembler;
pub use audio::DefaultAudioMixer;
pub use clips::DefaultClipRenderer;
pub use resolve::{plan_timeline, DefaultAssetResolver};

/// Everything a stage needs to know about the job it is working on.
pub struct StageContext {
    pub job_id: JobId,
    pub story_id: StoryId,
    pub workspace: Arc<Workspace>,
    pub settings: RenderSettings,
    pub frame: FrameSpec,
}

impl StageContext {
    pub fn workdir(&self) -> &Path {
        self.workspace.path()
    }
}

/// A scene after its assets have been fetched.
#[derive(Debug, Clone)]
pub struct ResolvedScene {
    /// Position of the scene in story order.
    pub index: usize,
    pub scene: Scene,
    /// `None` when the visual could not be fetched; the scene is skippable.
    pub visual: Option<ClipSource>,
    /// Local narration, if the scene has audio and it was fetched.
    pub audio: Option<PathBuf>,
    /// The scene had an audio URL but fetching it failed.
    pub audio_failed: bool,
    /// Target on-screen duration, frame-aligned.
    pub duration: f64,
}

/// One clip-sized slot of the final video.
#[derive(Debug, Clone)]
pub struct TimelineSlot {
    /// Index of the source scene in story order.
    pub scene_index: usize,
    pub source: ClipSource,
    pub overlay: Option<Overlay>,
    pub audio: Option<PathBuf>,
    pub text: String,
    pub word_timestamps: Vec<WordTimestamp>,
    pub duration: f64,
}

/// A rendered clip, addressed by its slot position.
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub slot: usize,
    pub scene_index: usize,
    pub path: PathBuf,
    pub duration: f64,
}

/// The assembled, muxed video in the job workspace.
#[derive(Debug, Clone)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub duration: f64,
    pub clip_count: usize,
}

/// Fetches scene inputs and determines true durations.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &StageContext,
        scenes: &[Scene],
        progress: &ProgressSpan<'_>,
    ) -> Result<Vec<ResolvedScene>>;
}

/// Turns timeline slots into fixed-duration clips.
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    /// Returned clips are in slot order regardless of completion order.
    async fn render(
        &self,
        ctx: &StageContext,
        slots: &[TimelineSlot],
        progress: &ProgressSpan<'_>,
    ) -> Result<Vec<RenderedClip>>;
}

/// Builds the final audio track.
#[async_trait]
pub trait AudioMixer: Send + Sync {
    /// Returns the path of a track exactly as long as the slots combined.
    async fn mix(&self, ctx: &StageContext, slots: &[TimelineSlot]) -> Result<PathBuf>;
}

/// Combines clips, captions, and audio into the final video.
#[async_trait]
pub trait Assembler: Send + Sync {
    /// `captions` is the name of an ASS file inside the workspace.
    async fn assemble(
        &self,
        ctx: &StageContext,
        clips: &[RenderedClip],
        captions: Option<&str>,
        audio: &Path,
    ) -> Result<AssembledVideo>;
}
