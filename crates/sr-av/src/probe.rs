//! Duration probing via ffprobe.
//!
//! Shells out to `ffprobe -show_entries format=duration:stream=duration -of json`
//! and reads the container duration, falling back to the longest stream.

use std::path::Path;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    duration: Option<String>,
}

/// Media duration in seconds.
pub async fn probe_duration(tools: &ToolRegistry, path: &Path) -> sr_core::Result<f64> {
    let ffprobe = tools.require("ffprobe")?;

    let mut cmd = ToolCommand::new(ffprobe.path.clone());
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration:stream=duration",
        "-of",
        "json",
    ]);
    cmd.arg(path.to_string_lossy().as_ref());
    cmd.timeout(ffprobe.timeout);

    let output = cmd.execute().await?;
    parse_duration(&output.stdout)
        .map_err(|msg| sr_core::Error::tool("ffprobe", format!("{}: {msg}", path.display())))
}

/// Extract a positive duration from ffprobe JSON output.
pub fn parse_duration(json: &str) -> Result<f64, String> {
    let out: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("JSON parse error: {e}"))?;

    let parse = |s: &Option<String>| {
        s.as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    };

    if let Some(d) = out.format.as_ref().and_then(|f| parse(&f.duration)) {
        return Ok(d);
    }

    out.streams
        .iter()
        .filter_map(|s| parse(&s.duration))
        .reduce(f64::max)
        .ok_or_else(|| "no duration reported".to_string())
}
