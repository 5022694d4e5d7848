//! ASS subtitle rendering with word-by-word highlight.
//!
//! Words are grouped into short lines. Each word of a line gets its own
//! `Dialogue` event spanning its time on screen, in which that word is drawn
//! in the highlight colour and the rest of the line in the primary colour.

use std::fmt::{self, Write};

use sr_av::FrameSpec;
use sr_core::{CaptionPosition, CaptionStyle};

use super::timeline::{CaptionEvent, CaptionTimeline};

const STYLE_NAME: &str = "Caption";

/// Gap between words, in seconds, that starts a new line.
const LINE_BREAK_GAP: f64 = 0.8;

/// Render `timeline` as a complete `.ass` document sized for `frame`.
pub fn render_ass(timeline: &CaptionTimeline, style: &CaptionStyle, frame: &FrameSpec) -> String {
    let mut out = String::new();
    // fmt::Write for String is infallible.
    write_script(&mut out, timeline, style, frame).ok();
    out
}

fn write_script(
    out: &mut String,
    timeline: &CaptionTimeline,
    style: &CaptionStyle,
    frame: &FrameSpec,
) -> fmt::Result {
    write_header(out, style, frame)?;

    for line in group_lines(&timeline.events, style.words_per_line) {
        for (i, word) in line.iter().enumerate() {
            let end = line.get(i + 1).map_or(word.end, |next| next.start.max(word.end));
            let (start_cs, end_cs) = (centis(word.start), centis(end));
            let end_cs = end_cs.max(start_cs + 1);

            writeln!(
                out,
                "Dialogue: 0,{},{},{STYLE_NAME},,0,0,0,,{}",
                ass_time(start_cs),
                ass_time(end_cs),
                line_text(line, i, style)
            )?;
        }
    }

    Ok(())
}

fn write_header(out: &mut String, style: &CaptionStyle, frame: &FrameSpec) -> fmt::Result {
    let (alignment, margin_v) = match style.position {
        CaptionPosition::Bottom => (2, frame.height * 12 / 100),
        CaptionPosition::Center => (5, 0),
        CaptionPosition::Top => (8, frame.height * 10 / 100),
    };
    let outline_w = (style.font_size / 16).max(2);
    let margin_h = frame.width * 6 / 100;

    writeln!(out, "[Script Info]")?;
    writeln!(out, "ScriptType: v4.00+")?;
    writeln!(out, "PlayResX: {}", frame.width)?;
    writeln!(out, "PlayResY: {}", frame.height)?;
    writeln!(out, "WrapStyle: 0")?;
    writeln!(out, "ScaledBorderAndShadow: yes")?;
    writeln!(out)?;
    writeln!(out, "[V4+ Styles]")?;
    writeln!(
        out,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    )?;
    writeln!(
        out,
        "Style: {STYLE_NAME},{font},{size},{primary},{secondary},{outline},&H80000000,-1,0,0,0,100,100,0,0,1,{outline_w},1,{alignment},{margin_h},{margin_h},{margin_v},1",
        font = style.font.replace(',', " "),
        size = style.font_size,
        primary = style.primary.to_ass(),
        secondary = style.highlight.to_ass(),
        outline = style.outline.to_ass(),
    )?;
    writeln!(out)?;
    writeln!(out, "[Events]")?;
    writeln!(
        out,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    )
}

/// Split events into lines of at most `per_line` words that never cross a
/// sentence end, a scene boundary, or a long pause.
fn group_lines(events: &[CaptionEvent], per_line: usize) -> Vec<&[CaptionEvent]> {
    let per_line = per_line.max(1);
    let mut lines = Vec::new();
    let mut start = 0;

    for i in 0..events.len() {
        let len = i + 1 - start;
        let breaks_after = match events.get(i + 1) {
            None => true,
            Some(next) => {
                len >= per_line
                    || events[i].sentence_end
                    || next.scene != events[i].scene
                    || next.start - events[i].end > LINE_BREAK_GAP
            }
        };
        if breaks_after {
            lines.push(&events[start..=i]);
            start = i + 1;
        }
    }

    lines
}

fn line_text(line: &[CaptionEvent], active: usize, style: &CaptionStyle) -> String {
    line.iter()
        .enumerate()
        .map(|(i, e)| {
            let word = clean_word(&e.word, style.uppercase);
            if i == active {
                format!("{{\\1c{}&}}{word}{{\\r}}", style.highlight.to_ass())
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop characters that ASS treats as override syntax.
fn clean_word(word: &str, uppercase: bool) -> String {
    let cleaned: String = word
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\'))
        .collect();
    if uppercase {
        cleaned.to_uppercase()
    } else {
        cleaned
    }
}

fn centis(secs: f64) -> u64 {
    (secs.max(0.0) * 100.0).round() as u64
}

/// `h:mm:ss.cc`
fn ass_time(cs: u64) -> String {
    format!(
        "{}:{:02}:{:02}.{:02}",
        cs / 360_000,
        (cs / 6_000) % 60,
        (cs / 100) % 60,
        cs % 100
    )
}
