//! Story domain model and render request settings.
//!
//! Scenes arrive from the content store already produced (visual URL, narration
//! URL, optional word timings). A [`RenderRequest`] is validated once at
//! admission into an immutable [`RenderSettings`] that every stage reads.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::{SceneId, StoryId, UserId};

/// Seconds of reading time per word when no narration timing exists.
pub const SECONDS_PER_WORD: f64 = 0.5;

/// Shortest scene a text-only duration may produce.
pub const MIN_SCENE_SECS: f64 = 1.0;

// ---------------------------------------------------------------------------
// Frame geometry
// ---------------------------------------------------------------------------

/// Output frame shape.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:5")]
    Vertical,
}

impl AspectRatio {
    /// Output `(width, height)` in pixels. Both are even for yuv420p.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Vertical => (1080, 1350),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Square => "1:1",
            AspectRatio::Vertical => "4:5",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Effects and overlays
// ---------------------------------------------------------------------------

/// Motion applied to a still image over the clip's duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    None,
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    PanUp,
    PanDown,
    KenBurns,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::ZoomIn => "zoom_in",
            Effect::ZoomOut => "zoom_out",
            Effect::PanLeft => "pan_left",
            Effect::PanRight => "pan_right",
            Effect::PanUp => "pan_up",
            Effect::PanDown => "pan_down",
            Effect::KenBurns => "ken_burns",
        }
    }
}

impl FromStr for Effect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "" | "none" => Ok(Effect::None),
            "zoom_in" => Ok(Effect::ZoomIn),
            "zoom_out" => Ok(Effect::ZoomOut),
            "pan_left" => Ok(Effect::PanLeft),
            "pan_right" => Ok(Effect::PanRight),
            "pan_up" => Ok(Effect::PanUp),
            "pan_down" => Ok(Effect::PanDown),
            "ken_burns" => Ok(Effect::KenBurns),
            other => Err(Error::Validation(format!("unknown effect '{other}'"))),
        }
    }
}

/// How an overlay is composited onto the base frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Screen,
    Overlay,
    Multiply,
}

impl BlendMode {
    /// Name understood by ffmpeg's `blend` filter.
    pub fn filter_name(self) -> &'static str {
        match self {
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Multiply => "multiply",
        }
    }
}

/// Overlay family, which decides the blend mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayCategory {
    #[default]
    Light,
    Particles,
    Dust,
    Film,
    Grain,
    Vignette,
    #[serde(other)]
    Other,
}

impl OverlayCategory {
    pub fn blend_mode(self) -> BlendMode {
        match self {
            OverlayCategory::Grain => BlendMode::Overlay,
            OverlayCategory::Vignette => BlendMode::Multiply,
            _ => BlendMode::Screen,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayCategory::Light => "light",
            OverlayCategory::Particles => "particles",
            OverlayCategory::Dust => "dust",
            OverlayCategory::Film => "film",
            OverlayCategory::Grain => "grain",
            OverlayCategory::Vignette => "vignette",
            OverlayCategory::Other => "other",
        }
    }

    /// Lenient parse for stored values; unknown categories blend as screen.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => OverlayCategory::Light,
            "particles" => OverlayCategory::Particles,
            "dust" => OverlayCategory::Dust,
            "film" => OverlayCategory::Film,
            "grain" => OverlayCategory::Grain,
            "vignette" => OverlayCategory::Vignette,
            _ => OverlayCategory::Other,
        }
    }
}

/// An overlay asset attached to a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    /// Library identifier, resolved against the overlays directory.
    pub id: String,
    #[serde(default)]
    pub category: OverlayCategory,
}

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

/// One word of narration with its timing relative to the scene start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// The visual source of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum Visual {
    Image(String),
    Video(String),
}

impl Visual {
    pub fn url(&self) -> &str {
        match self {
            Visual::Image(url) | Visual::Video(url) => url,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Visual::Video(_))
    }
}

/// One narrated unit of a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub id: SceneId,
    pub order: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub word_timestamps: Vec<WordTimestamp>,
    #[serde(default)]
    pub effect: Effect,
    #[serde(default)]
    pub overlay: Option<Overlay>,
    /// Stored duration in seconds; 0 when unknown.
    #[serde(default)]
    pub duration: f64,
}

impl Scene {
    /// The scene's visual, preferring video when both URLs are present.
    pub fn visual(&self) -> Option<Visual> {
        let non_empty = |u: &Option<String>| u.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        non_empty(&self.video_url)
            .map(Visual::Video)
            .or_else(|| non_empty(&self.image_url).map(Visual::Image))
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Duration implied by reading the text aloud at two words per second.
    pub fn reading_duration(&self) -> f64 {
        (self.word_count() as f64 * SECONDS_PER_WORD).max(MIN_SCENE_SECS)
    }

    /// Best duration known without probing media: stored value, else reading time.
    pub fn nominal_duration(&self) -> f64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            self.duration
        } else {
            self.reading_duration()
        }
    }
}

/// A story as read from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub id: StoryId,
    pub user_id: UserId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Story {
    /// Scenes sorted by `order`, rejecting empty stories and duplicate orders.
    pub fn ordered_scenes(&self) -> Result<Vec<Scene>> {
        if self.scenes.is_empty() {
            return Err(Error::Validation(format!("story {} has no scenes", self.id)));
        }
        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if !seen.insert(scene.order) {
                return Err(Error::Validation(format!(
                    "story {} has duplicate scene order {}",
                    self.id, scene.order
                )));
            }
        }
        let mut scenes = self.scenes.clone();
        scenes.sort_by_key(|s| s.order);
        Ok(scenes)
    }
}

// ---------------------------------------------------------------------------
// Render request
// ---------------------------------------------------------------------------

/// Vertical placement of captions.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPosition {
    #[default]
    Bottom,
    Center,
    Top,
}

/// Caption options as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct CaptionConfig {
    pub enabled: bool,
    pub font: String,
    /// Font size in pixels; derived from frame height when absent.
    pub font_size: Option<u32>,
    pub primary_color: String,
    pub highlight_color: String,
    pub outline_color: String,
    pub position: CaptionPosition,
    pub words_per_line: usize,
    pub uppercase: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            font: "Arial".into(),
            font_size: None,
            primary_color: "#FFFFFF".into(),
            highlight_color: "#FFD700".into(),
            outline_color: "#000000".into(),
            position: CaptionPosition::Bottom,
            words_per_line: 3,
            uppercase: false,
        }
    }
}

/// Background music options as submitted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct MusicConfig {
    pub enabled: bool,
    pub url: Option<String>,
    /// Percent of original loudness, 0-100.
    pub volume: u8,
}

/// Body of a render request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct RenderRequest {
    pub aspect_ratio: AspectRatio,
    pub captions: CaptionConfig,
    pub background_music: MusicConfig,
}

/// An sRGB colour parsed from `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// ASS colour literal, which stores channels as `&HAABBGGRR`.
    pub fn to_ass(self) -> String {
        format!("&H00{:02X}{:02X}{:02X}", self.b, self.g, self.r)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Validation(format!("invalid colour '{s}', expected #RRGGBB")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| Error::Validation(format!("invalid colour '{s}': {e}")))
        };
        Ok(Rgb {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

/// Validated caption styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
    pub primary: Rgb,
    pub highlight: Rgb,
    pub outline: Rgb,
    pub position: CaptionPosition,
    pub words_per_line: usize,
    pub uppercase: bool,
}

/// Validated background music.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSettings {
    pub url: String,
    /// Linear gain, `volume / 100`.
    pub gain: f64,
}

/// Immutable per-job settings produced once at admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub aspect_ratio: AspectRatio,
    pub width: u32,
    pub height: u32,
    /// `None` when captions are disabled.
    pub captions: Option<CaptionStyle>,
    /// `None` when music is disabled or at zero volume.
    pub music: Option<MusicSettings>,
}

impl RenderRequest {
    /// Validate the request and freeze it into [`RenderSettings`].
    pub fn validate(&self) -> Result<RenderSettings> {
        let (width, height) = self.aspect_ratio.dimensions();

        let captions = if self.captions.enabled {
            let c = &self.captions;
            if c.words_per_line == 0 || c.words_per_line > 10 {
                return Err(Error::Validation(
                    "captions.words_per_line must be between 1 and 10".into(),
                ));
            }
            if c.font.trim().is_empty() {
                return Err(Error::Validation("captions.font must not be empty".into()));
            }
            let font_size = match c.font_size {
                Some(size) if !(8..=300).contains(&size) => {
                    return Err(Error::Validation(
                        "captions.font_size must be between 8 and 300".into(),
                    ));
                }
                Some(size) => size,
                None => (height / 24).max(24),
            };
            Some(CaptionStyle {
                font: c.font.trim().to_string(),
                font_size,
                primary: c.primary_color.parse()?,
                highlight: c.highlight_color.parse()?,
                outline: c.outline_color.parse()?,
                position: c.position,
                words_per_line: c.words_per_line,
                uppercase: c.uppercase,
            })
        } else {
            None
        };

        let m = &self.background_music;
        if m.volume > 100 {
            return Err(Error::Validation(
                "background_music.volume must be between 0 and 100".into(),
            ));
        }
        let music = if m.enabled && m.volume > 0 {
            let url = m
                .url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    Error::Validation("background_music.url is required when enabled".into())
                })?;
            Some(MusicSettings {
                url: url.to_string(),
                gain: f64::from(m.volume) / 100.0,
            })
        } else {
            None
        };

        Ok(RenderSettings {
            aspect_ratio: self.aspect_ratio,
            width,
            height,
            captions,
            music,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(order: u32, text: &str) -> Scene {
        Scene {
            id: SceneId::new(),
            order,
            text: text.into(),
            image_url: Some(format!("https://cdn.example/{order}.png")),
            video_url: None,
            audio_url: None,
            word_timestamps: Vec::new(),
            effect: Effect::None,
            overlay: None,
            duration: 0.0,
        }
    }

    #[test]
    fn aspect_ratio_serde_uses_ratio_strings() {
        let ar: AspectRatio = serde_json::from_str("\"16:9\"").unwrap();
        assert_eq!(ar, AspectRatio::Landscape);
        assert_eq!(ar.dimensions(), (1920, 1080));
        assert_eq!(serde_json::to_string(&AspectRatio::Vertical).unwrap(), "\"4:5\"");
    }

    #[test]
    fn video_takes_precedence_over_image() {
        let mut s = scene(0, "hello");
        s.video_url = Some("https://cdn.example/0.mp4".into());
        assert_eq!(s.visual(), Some(Visual::Video("https://cdn.example/0.mp4".into())));

        s.video_url = Some("  ".into());
        assert!(matches!(s.visual(), Some(Visual::Image(_))));
    }

    #[test]
    fn reading_duration_is_two_words_per_second() {
        let s = scene(0, "one two three four five six seven");
        assert_eq!(s.reading_duration(), 3.5);
        assert_eq!(scene(0, "").reading_duration(), MIN_SCENE_SECS);
    }

    #[test]
    fn nominal_duration_prefers_stored_value() {
        let mut s = scene(0, "one two");
        s.duration = 4.25;
        assert_eq!(s.nominal_duration(), 4.25);
        s.duration = 0.0;
        assert_eq!(s.nominal_duration(), 1.0);
    }

    #[test]
    fn ordered_scenes_sorts_and_rejects_duplicates() {
        let story = Story {
            id: StoryId::new(),
            user_id: UserId::new(),
            title: "t".into(),
            scenes: vec![scene(2, "c"), scene(0, "a"), scene(1, "b")],
        };
        let ordered = story.ordered_scenes().unwrap();
        let orders: Vec<u32> = ordered.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);

        let dup = Story {
            scenes: vec![scene(0, "a"), scene(0, "b")],
            ..story.clone()
        };
        assert!(matches!(dup.ordered_scenes(), Err(Error::Validation(_))));

        let empty = Story {
            scenes: Vec::new(),
            ..story
        };
        assert!(empty.ordered_scenes().is_err());
    }

    #[test]
    fn effect_parses_loosely() {
        assert_eq!("Zoom-In".parse::<Effect>().unwrap(), Effect::ZoomIn);
        assert_eq!("".parse::<Effect>().unwrap(), Effect::None);
        assert!("spin".parse::<Effect>().is_err());
    }

    #[test]
    fn overlay_category_picks_blend_mode() {
        assert_eq!(OverlayCategory::Light.blend_mode(), BlendMode::Screen);
        assert_eq!(OverlayCategory::Grain.blend_mode(), BlendMode::Overlay);
        assert_eq!(OverlayCategory::parse("sparkles"), OverlayCategory::Other);
        assert_eq!(OverlayCategory::Other.blend_mode(), BlendMode::Screen);
    }

    #[test]
    fn rgb_to_ass_swaps_channels() {
        let c: Rgb = "#FFD700".parse().unwrap();
        assert_eq!(c.to_ass(), "&H0000D7FF");
        assert!("#FFF".parse::<Rgb>().is_err());
        assert!("#GGGGGG".parse::<Rgb>().is_err());
    }

    #[test]
    fn default_request_validates() {
        let settings = RenderRequest::default().validate().unwrap();
        assert_eq!((settings.width, settings.height), (1080, 1920));
        let style = settings.captions.unwrap();
        assert_eq!(style.font_size, 80);
        assert!(settings.music.is_none());
    }

    #[test]
    fn zero_volume_music_is_disabled() {
        let req = RenderRequest {
            background_music: MusicConfig {
                enabled: true,
                url: Some("https://cdn.example/song.mp3".into()),
                volume: 0,
            },
            ..Default::default()
        };
        assert!(req.validate().unwrap().music.is_none());
    }

    #[test]
    fn enabled_music_requires_url_and_sane_volume() {
        let mut req = RenderRequest::default();
        req.background_music.enabled = true;
        req.background_music.volume = 30;
        assert!(req.validate().is_err());

        req.background_music.url = Some("https://cdn.example/song.mp3".into());
        let music = req.validate().unwrap().music.unwrap();
        assert!((music.gain - 0.3).abs() < 1e-9);

        req.background_music.volume = 101;
        assert!(req.validate().is_err());
    }

    #[test]
    fn caption_bounds_are_checked() {
        let mut req = RenderRequest::default();
        req.captions.words_per_line = 0;
        assert!(req.validate().is_err());

        req.captions.words_per_line = 3;
        req.captions.font_size = Some(4);
        assert!(req.validate().is_err());

        req.captions.enabled = false;
        assert!(req.validate().unwrap().captions.is_none());
    }
}
