//! # sr-av
//!
//! ffmpeg orchestration for the storyreel render pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Job scratch** ([`Workspace`]) -- a per-job temporary directory removed
//!   on drop, plus a startup sweep for directories left by dead processes.
//! - **Probing** ([`probe`]) -- media duration via ffprobe.
//! - **Filter builders** ([`filters`]) -- pure functions producing ffmpeg
//!   filter expressions (motion, blend, padding, watermark path).
//! - **Action functions** ([`actions`]) -- one ffmpeg invocation per render
//!   step: clip, narration pad/master, music mix, compose, mux.

pub mod actions;
pub mod command;
pub mod filters;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use filters::{EncodeSettings, FrameSpec, WatermarkSpec, SAMPLE_RATE};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;

pub use actions::{
    compose_video, master_narration, mix_music, mux_final, pad_narration, render_clip, ClipSource,
    ClipSpec, ComposeSpec, OverlaySpec,
};
pub use probe::probe_duration;
