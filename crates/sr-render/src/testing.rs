//! In-process doubles for the media engine, fetcher, and artifact store.
//!
//! Mock media files are tiny text files. A file whose content contains
//! `#d=<secs>` probes as that many seconds; anything else fails to probe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sr_av::actions::ComposeSpec;
use sr_av::{ClipSpec, FrameSpec, Workspace};
use sr_core::{Effect, Error, JobId, RenderRequest, Result, Scene, SceneId, Story, StoryId, UserId};

use crate::engine::MediaEngine;
use crate::fetch::AssetFetcher;
use crate::stages::StageContext;
use crate::store::ArtifactStore;

/// A scene with an image and no narration.
pub fn scene(order: u32, text: &str) -> Scene {
    Scene {
        id: SceneId::new(),
        order,
        text: text.to_string(),
        image_url: Some(format!("https://cdn.test/scene-{order}.png")),
        video_url: None,
        audio_url: None,
        word_timestamps: Vec::new(),
        effect: Effect::None,
        overlay: None,
        duration: 0.0,
    }
}

/// A story owned by a fresh user.
pub fn story(scenes: Vec<Scene>) -> Story {
    Story {
        id: StoryId::new(),
        user_id: UserId::new(),
        title: "Test story".into(),
        scenes,
    }
}

/// A context with default settings at 1080x1920, 30 fps.
pub fn stage_context(scratch: &Path) -> StageContext {
    let job_id = JobId::new();
    let settings = RenderRequest::default()
        .validate()
        .expect("default request is valid");
    StageContext {
        job_id,
        story_id: StoryId::new(),
        workspace: Arc::new(Workspace::for_job(scratch, job_id).expect("workspace")),
        frame: FrameSpec::new(settings.width, settings.height, 30),
        settings,
    }
}

/// One recorded [`MediaEngine`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Probe(PathBuf),
    Clip { spec: ClipSpec, output: PathBuf },
    Pad { input: Option<PathBuf>, duration: f64, output: PathBuf },
    Master { inputs: Vec<PathBuf>, output: PathBuf },
    Mix { gain: f64, duration: f64, output: PathBuf },
    Compose { spec: ComposeSpec, output: PathBuf },
    Mux { duration: f64, output: PathBuf },
}

impl EngineCall {
    pub fn step(&self) -> &'static str {
        match self {
            EngineCall::Probe(_) => "probe",
            EngineCall::Clip { .. } => "clip",
            EngineCall::Pad { .. } => "pad",
            EngineCall::Master { .. } => "master",
            EngineCall::Mix { .. } => "mix",
            EngineCall::Compose { .. } => "compose",
            EngineCall::Mux { .. } => "mux",
        }
    }
}

/// [`MediaEngine`] that records calls and writes placeholder outputs.
#[derive(Default)]
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    fail_on: Mutex<Option<&'static str>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of the named step fail with a tool error.
    pub fn fail_on(&self, step: &'static str) {
        *self.fail_on.lock() = Some(step);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, step: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.step() == step).count()
    }

    async fn record(&self, call: EngineCall, output: Option<&Path>) -> Result<()> {
        let step = call.step();
        self.calls.lock().push(call);
        if *self.fail_on.lock() == Some(step) {
            return Err(Error::tool("ffmpeg", format!("mock {step} failure")));
        }
        if let Some(output) = output {
            tokio::fs::write(output, b"mock media").await?;
        }
        Ok(())
    }
}

fn probe_marker(content: &str) -> Option<f64> {
    let rest = &content[content.find("#d=")? + 3..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        self.record(EngineCall::Probe(path.to_path_buf()), None).await?;
        let content = tokio::fs::read_to_string(path).await.unwrap_or_default();
        probe_marker(&content)
            .ok_or_else(|| Error::tool("ffprobe", format!("{}: no duration reported", path.display())))
    }

    async fn render_clip(&self, spec: &ClipSpec, output: &Path) -> Result<()> {
        let call = EngineCall::Clip {
            spec: spec.clone(),
            output: output.to_path_buf(),
        };
        self.record(call, Some(output)).await
    }

    async fn pad_narration(&self, input: Option<&Path>, duration: f64, output: &Path) -> Result<()> {
        let call = EngineCall::Pad {
            input: input.map(Path::to_path_buf),
            duration,
            output: output.to_path_buf(),
        };
        self.record(call, Some(output)).await
    }

    async fn master_narration(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let call = EngineCall::Master {
            inputs: inputs.to_vec(),
            output: output.to_path_buf(),
        };
        self.record(call, Some(output)).await
    }

    async fn mix_music(
        &self,
        _narration: &Path,
        _music: &Path,
        gain: f64,
        duration: f64,
        output: &Path,
    ) -> Result<()> {
        let call = EngineCall::Mix {
            gain,
            duration,
            output: output.to_path_buf(),
        };
        self.record(call, Some(output)).await
    }

    async fn compose(&self, spec: &ComposeSpec, output: &Path) -> Result<()> {
        let call = EngineCall::Compose {
            spec: spec.clone(),
            output: output.to_path_buf(),
        };
        self.record(call, Some(output)).await
    }

    async fn mux(&self, _video: &Path, _audio: &Path, duration: f64, output: &Path) -> Result<()> {
        let call = EngineCall::Mux {
            duration,
            output: output.to_path_buf(),
        };
        self.record(call, Some(output)).await
    }
}

/// [`AssetFetcher`] that writes each URL as the file's content.
///
/// URLs containing `fail` are rejected.
#[derive(Default)]
pub struct MockFetcher {
    fetched: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every fetch, to keep jobs in flight during tests.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.fetched.lock().push(url.to_string());
        if url.contains("fail") {
            return Err(Error::fetch(url, "HTTP 404 Not Found"));
        }
        tokio::fs::write(dest, url.as_bytes()).await?;
        Ok(url.len() as u64)
    }
}

/// [`ArtifactStore`] that keeps objects in memory.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    fail_puts: AtomicBool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, source: &Path) -> Result<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Internal("artifact store unavailable".into()));
        }
        let bytes = tokio::fs::read(source).await?;
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        self.deleted.lock().push(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_marker_reads_seconds() {
        assert_eq!(probe_marker("https://cdn/a.mp3#d=4.25"), Some(4.25));
        assert_eq!(probe_marker("https://cdn/a.mp3#d=6&x=1"), Some(6.0));
        assert_eq!(probe_marker("https://cdn/a.mp3"), None);
    }
}
