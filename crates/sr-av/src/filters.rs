//! Pure builders for ffmpeg filter expressions.
//!
//! Nothing here touches the filesystem or spawns processes, so every
//! expression the pipeline hands to ffmpeg can be asserted in unit tests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sr_core::{BlendMode, Effect};

/// Sample rate of every intermediate audio track.
pub const SAMPLE_RATE: u32 = 44_100;

/// Sample format and layout shared by all intermediate audio.
const AUDIO_FORMAT: &str = "aformat=sample_fmts=s16:channel_layouts=stereo";

/// Narration gain after compression, leaving headroom for the music bed.
pub const NARRATION_GAIN: f64 = 0.85;

/// Zoom reached at the end of a zoom or Ken Burns move.
const MAX_ZOOM: f64 = 1.25;

/// Fixed zoom for pans so there is room to travel.
const PAN_ZOOM: f64 = 1.2;

/// Images are upscaled before `zoompan` so sub-pixel motion does not jitter.
const MOTION_OVERSCALE: u32 = 2;

// ---------------------------------------------------------------------------
// Frame geometry and encoding
// ---------------------------------------------------------------------------

/// Output frame size and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl FrameSpec {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
        }
    }

    /// Whole frames covering `duration`, never fewer than one.
    pub fn frame_count(&self, duration: f64) -> u64 {
        ((duration * f64::from(self.fps)).round() as u64).max(1)
    }

    /// Snap `duration` to a whole number of frames.
    ///
    /// Clip lengths are always frame-aligned so that the per-scene audio
    /// (sample-aligned) and video tracks stay in lockstep when concatenated.
    pub fn quantize(&self, duration: f64) -> f64 {
        self.frame_count(duration) as f64 / f64::from(self.fps)
    }
}

/// Samples at [`SAMPLE_RATE`] covering `duration`.
pub fn sample_count(duration: f64) -> u64 {
    (duration * f64::from(SAMPLE_RATE)).round().max(0.0) as u64
}

/// x264 settings used for every video encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            preset: "veryfast".into(),
            crf: 20,
            audio_bitrate: "192k".into(),
        }
    }
}

impl EncodeSettings {
    pub fn video_args(&self) -> Vec<String> {
        vec![
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            self.preset.clone(),
            "-crf".into(),
            self.crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ]
    }
}

/// Render a float with at most three decimals and no trailing zeros.
pub fn num(x: f64) -> String {
    let s = format!("{x:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".into()
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// Letterbox into the frame without cropping.
pub fn fit_frame(frame: &FrameSpec) -> String {
    let (w, h) = (frame.width, frame.height);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1"
    )
}

/// Fill `factor` times the frame, cropping the overflow.
pub fn cover_frame(frame: &FrameSpec, factor: u32) -> String {
    let (w, h) = (frame.width * factor, frame.height * factor);
    format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}")
}

/// `zoompan` expressions `(z, x, y)` for a motion effect.
///
/// `p` is elapsed progress in `[0, 1]` computed from the output frame number,
/// so the motion depends only on time within the clip.
fn motion_exprs(effect: Effect, p: &str) -> Option<(String, String, String)> {
    let center_x = "iw/2-(iw/zoom/2)".to_string();
    let center_y = "ih/2-(ih/zoom/2)".to_string();
    let span = num(MAX_ZOOM - 1.0);
    let pan = num(PAN_ZOOM);

    let exprs = match effect {
        Effect::None => return None,
        Effect::ZoomIn => (format!("1+{span}*{p}"), center_x, center_y),
        Effect::ZoomOut => (format!("{}-{span}*{p}", num(MAX_ZOOM)), center_x, center_y),
        Effect::PanLeft => (pan, format!("(iw-iw/zoom)*(1-{p})"), center_y),
        Effect::PanRight => (pan, format!("(iw-iw/zoom)*{p}"), center_y),
        Effect::PanUp => (pan, center_x, format!("(ih-ih/zoom)*(1-{p})")),
        Effect::PanDown => (pan, center_x, format!("(ih-ih/zoom)*{p}")),
        Effect::KenBurns => (
            format!("1+{span}*{p}"),
            format!("(iw-iw/zoom)*{p}"),
            format!("(ih-ih/zoom)*(0.5-0.5*{p})"),
        ),
    };
    Some(exprs)
}

/// Filter chain turning a looped still image into a clip.
pub fn image_chain(effect: Effect, frame: &FrameSpec, duration: f64) -> String {
    let last = frame.frame_count(duration).saturating_sub(1).max(1);
    let progress = format!("min(on/{last},1)");

    match motion_exprs(effect, &progress) {
        None => format!("{},fps={},format=yuv420p", fit_frame(frame), frame.fps),
        Some((z, x, y)) => format!(
            "{},zoompan=z='{z}':x='{x}':y='{y}':d=1:s={}x{}:fps={},setsar=1,format=yuv420p",
            cover_frame(frame, MOTION_OVERSCALE),
            frame.width,
            frame.height,
            frame.fps
        ),
    }
}

/// Filter chain for a video source, holding the last frame for `freeze_secs`.
pub fn video_chain(frame: &FrameSpec, freeze_secs: f64) -> String {
    let mut chain = format!("{},fps={}", fit_frame(frame), frame.fps);
    if freeze_secs > 0.0 {
        chain.push_str(&format!(
            ",tpad=stop_mode=clone:stop_duration={}",
            num(freeze_secs)
        ));
    }
    chain.push_str(",format=yuv420p");
    chain
}

/// lavfi source for a plain slate of `duration` seconds.
pub fn slate_source(frame: &FrameSpec, duration: f64) -> String {
    format!(
        "color=c=black:s={}x{}:r={}:d={}",
        frame.width,
        frame.height,
        frame.fps,
        num(duration)
    )
}

/// Overlay input scaled to the frame and prepared for blending.
pub fn overlay_prep(frame: &FrameSpec) -> String {
    format!(
        "scale={}:{},fps={},format=gbrp",
        frame.width, frame.height, frame.fps
    )
}

/// Full-opacity blend of the overlay onto the base.
pub fn blend(mode: BlendMode) -> String {
    format!("blend=all_mode={}:all_opacity=1", mode.filter_name())
}

/// Per-input normalisation before concatenation.
pub fn normalize_clip(frame: &FrameSpec) -> String {
    format!("fps={},format=yuv420p,setsar=1", frame.fps)
}

/// Filter-graph concatenation of `n` normalised video inputs into `[cat]`.
pub fn concat_video(n: usize, frame: &FrameSpec) -> String {
    let mut graph = String::new();
    for i in 0..n {
        graph.push_str(&format!("[{i}:v]{}[v{i}];", normalize_clip(frame)));
    }
    for i in 0..n {
        graph.push_str(&format!("[v{i}]"));
    }
    graph.push_str(&format!("concat=n={n}:v=1:a=0[cat]"));
    graph
}

/// Burn an ASS subtitle file (path relative to the ffmpeg working dir).
pub fn subtitles(file_name: &str) -> String {
    format!("ass={}", escape_filter_value(file_name))
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Semi-transparent moving text drawn over the finished video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub text: String,
    pub opacity: f32,
    pub font_file: Option<PathBuf>,
}

/// `drawtext` filter whose position is a function of `t` only.
///
/// Each axis is a product of two sinusoids with incommensurate periods, so
/// the path wanders smoothly without visibly repeating, yet two renders of
/// the same video trace the same path.
pub fn watermark(spec: &WatermarkSpec, frame: &FrameSpec) -> String {
    let opacity = spec.opacity.clamp(0.0, 1.0);
    let font_size = (frame.height / 28).max(16);
    let x = "(w-tw)/2+(w-tw)/2*0.9*sin(0.231*t+0.7)*cos(0.071*t)";
    let y = "(h-th)/2+(h-th)/2*0.9*sin(0.173*t+1.9)*cos(0.053*t+0.4)";

    let mut filter = format!(
        "drawtext=text='{}':fontsize={font_size}:fontcolor=white@{}:\
         shadowcolor=black@{}:shadowx=2:shadowy=2",
        sanitize_drawtext(&spec.text),
        num(f64::from(opacity)),
        num(f64::from(opacity) * 0.6),
    );
    if let Some(ref font) = spec.font_file {
        filter.push_str(&format!(
            ":fontfile={}",
            escape_filter_value(&font.to_string_lossy())
        ));
    }
    filter.push_str(&format!(":x='{x}':y='{y}'"));
    filter
}

/// Keep only characters that need no escaping inside `drawtext`.
fn sanitize_drawtext(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || " .-_@#!&+".contains(*c))
        .collect()
}

/// Backslash-escape characters with meaning in filter option values.
fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | '\'' | ',' | ';' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Resample, then pad with silence or trim to exactly `samples`.
pub fn pad_audio(samples: u64) -> String {
    format!(
        "aresample={SAMPLE_RATE},{AUDIO_FORMAT},apad=whole_len={samples},atrim=end_sample={samples}"
    )
}

/// lavfi source of stereo silence.
pub fn silence_source() -> String {
    format!("anullsrc=r={SAMPLE_RATE}:cl=stereo")
}

/// Concatenate `n` narration inputs, compress, and attenuate into `[a]`.
pub fn master_narration(n: usize) -> String {
    let mut graph = String::new();
    for i in 0..n {
        graph.push_str(&format!("[{i}:a]"));
    }
    graph.push_str(&format!(
        "concat=n={n}:v=0:a=1,acompressor=threshold=0.125:ratio=3:attack=20:release=250,volume={}[a]",
        num(NARRATION_GAIN)
    ));
    graph
}

/// Mix narration `[0:a]` with looped music `[1:a]` at `gain` into `[a]`.
///
/// `normalize=0` keeps amix from scaling the narration down by the input count.
pub fn mix_music(gain: f64, samples: u64) -> String {
    format!(
        "[1:a]aresample={SAMPLE_RATE},{AUDIO_FORMAT},volume={}[m];\
         [0:a][m]amix=inputs=2:duration=first:dropout_transition=0:normalize=0,\
         atrim=end_sample={samples}[a]",
        num(gain)
    )
}
