//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, render, storage, ledger, and tool sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub watermark: WatermarkConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub credits: CreditsConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        let r = &self.render;
        if r.max_concurrent_jobs == 0 {
            warnings.push("render.max_concurrent_jobs is 0; every render will be rejected".into());
        }
        if r.stale_after_secs < 30 {
            warnings.push(format!(
                "render.stale_after_secs is {}; live renders may be reclaimed",
                r.stale_after_secs
            ));
        }
        if r.fetch_concurrency == 0 || r.clip_concurrency == 0 {
            warnings.push("render fan-out of 0 is treated as 1".into());
        }
        if !(1..=120).contains(&r.fps) {
            warnings.push(format!("render.fps {} is outside 1-120", r.fps));
        }
        if r.video_crf > 51 {
            warnings.push(format!("render.video_crf {} exceeds 51", r.video_crf));
        }

        if self.watermark.enabled && self.watermark.text.trim().is_empty() {
            warnings.push("watermark is enabled but watermark.text is empty".into());
        }
        if !(0.0..=1.0).contains(&self.watermark.opacity) {
            warnings.push(format!(
                "watermark.opacity {} is outside 0.0-1.0",
                self.watermark.opacity
            ));
        }

        if !self.storage.public_base_url.starts_with("http://")
            && !self.storage.public_base_url.starts_with("https://")
            && !self.storage.public_base_url.starts_with('/')
        {
            warnings.push(format!(
                "storage.public_base_url '{}' is neither absolute nor root-relative",
                self.storage.public_base_url
            ));
        }

        if self.credits.enabled && self.credits.cost_per_render <= 0 {
            warnings.push("credits are enabled but cost_per_render is not positive".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/storyreel.db"),
            cors_origins: Vec::new(),
        }
    }
}

/// What happens to a scene whose visual could not be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkippedScenePolicy {
    /// Keep the scene's slot on a plain slate so narration and captions stay put.
    #[default]
    Slate,
    /// Drop the scene from the timeline entirely.
    Omit,
}

/// Render pipeline and admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub max_concurrent_jobs: usize,
    pub stale_after_secs: u64,
    pub fetch_concurrency: usize,
    pub clip_concurrency: usize,
    pub fps: u32,
    pub scratch_dir: PathBuf,
    pub overlays_dir: Option<PathBuf>,
    pub skipped_scenes: SkippedScenePolicy,
    pub video_preset: String,
    pub video_crf: u32,
    pub audio_bitrate: String,
    pub tool_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 10,
            stale_after_secs: 120,
            fetch_concurrency: 5,
            clip_concurrency: 5,
            fps: 30,
            scratch_dir: std::env::temp_dir().join("storyreel"),
            overlays_dir: None,
            skipped_scenes: SkippedScenePolicy::Slate,
            video_preset: "veryfast".into(),
            video_crf: 20,
            audio_bitrate: "192k".into(),
            tool_timeout_secs: 600,
        }
    }
}

/// Moving watermark burned into every render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub text: String,
    pub opacity: f32,
    pub font_file: Option<PathBuf>,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text: "storyreel".into(),
            opacity: 0.35,
            font_file: None,
        }
    }
}

/// Durable artifact storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data/media"),
            public_base_url: "/media".into(),
        }
    }
}

/// Remote asset fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Directory that `file://` URLs and bare paths must resolve inside.
    /// Local sources are refused when unset.
    pub local_root: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: format!("storyreel/{}", env!("CARGO_PKG_VERSION")),
            local_root: None,
        }
    }
}

/// Credit ledger integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    pub enabled: bool,
    pub cost_per_render: i64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cost_per_render: 10,
        }
    }
}

/// External tool path overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}
