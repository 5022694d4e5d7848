//! Global word-level caption timeline.
//!
//! Per-scene word timings are shifted onto the whole-video timeline by the
//! sum of the preceding clip durations. Scenes without timings get
//! synthesized ones at [`SECONDS_PER_WORD`]. Compilation is a pure function
//! of its input.

use serde::Serialize;
use sr_core::{WordTimestamp, SECONDS_PER_WORD};

/// Lookahead when matching a timed word to the scene text.
const ALIGN_WINDOW: usize = 4;

/// One scene's contribution to the timeline.
#[derive(Debug, Clone, Copy)]
pub struct CaptionScene<'a> {
    pub text: &'a str,
    pub words: &'a [WordTimestamp],
    /// Final on-screen duration of the scene's clip.
    pub duration: f64,
}

/// A word on the whole-video timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionEvent {
    pub word: String,
    pub start: f64,
    pub end: f64,
    /// Position of the scene within the timeline.
    pub scene: usize,
    pub sentence_start: bool,
    pub sentence_end: bool,
}

/// Flat caption schedule, ordered by scene and then by start time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionTimeline {
    pub events: Vec<CaptionEvent>,
    /// Scene texts joined with single spaces.
    pub full_text: String,
    /// Sum of all clip durations.
    pub duration: f64,
}

impl CaptionTimeline {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Build the caption timeline for `scenes` in timeline order.
pub fn compile(scenes: &[CaptionScene<'_>]) -> CaptionTimeline {
    let mut events = Vec::new();
    let mut offset = 0.0;

    for (index, scene) in scenes.iter().enumerate() {
        let duration = scene.duration.max(0.0);
        let tokens: Vec<&str> = scene.text.split_whitespace().collect();

        // Synthesized timings always cover every word; only supplied
        // timings are held to the clip.
        let timed: Vec<(String, f64, f64, bool)> = if scene.words.is_empty() {
            synthesize(&tokens)
        } else {
            let mut timed = align(scene.words, &tokens);
            timed.retain(|(_, start, _, _)| *start < duration);
            for (_, start, end, _) in timed.iter_mut() {
                *start = start.max(0.0);
                *end = end.clamp(*start, duration);
            }
            timed.sort_by(|a, b| a.1.total_cmp(&b.1));
            timed
        };

        let mut sentence_start = true;
        for (word, start, end, ends_sentence) in timed {
            events.push(CaptionEvent {
                word,
                start: offset + start,
                end: offset + end,
                scene: index,
                sentence_start,
                sentence_end: ends_sentence,
            });
            sentence_start = ends_sentence;
        }
        if let Some(last) = events.last_mut().filter(|e| e.scene == index) {
            last.sentence_end = true;
        }

        offset += duration;
    }

    let full_text = scenes
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    CaptionTimeline {
        events,
        full_text,
        duration: offset,
    }
}

/// Timings at two words per second from the start of the scene.
fn synthesize(tokens: &[&str]) -> Vec<(String, f64, f64, bool)> {
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let start = i as f64 * SECONDS_PER_WORD;
            (
                token.to_string(),
                start,
                start + SECONDS_PER_WORD,
                ends_sentence(token),
            )
        })
        .collect()
}

/// Keep the supplied timings, taking sentence punctuation from the matching
/// token of the scene text when the timed word has been stripped of it.
fn align(words: &[WordTimestamp], tokens: &[&str]) -> Vec<(String, f64, f64, bool)> {
    let mut cursor = 0;
    words
        .iter()
        .filter(|w| !w.word.trim().is_empty())
        .map(|w| {
            let word = w.word.trim();
            let key = normalize(word);
            let matched = tokens
                .iter()
                .enumerate()
                .skip(cursor)
                .take(ALIGN_WINDOW)
                .find(|(_, t)| !key.is_empty() && normalize(t) == key)
                .map(|(i, t)| (i, *t));

            let sentence_end = match matched {
                Some((i, token)) => {
                    cursor = i + 1;
                    ends_sentence(token) || ends_sentence(word)
                }
                None => ends_sentence(word),
            };
            let end = if w.end.is_finite() { w.end } else { w.start };
            (word.to_string(), w.start, end, sentence_end)
        })
        .collect()
}

fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn ends_sentence(token: &str) -> bool {
    token
        .trim_end_matches(['"', '\'', ')', ']', '\u{201D}', '\u{2019}'])
        .ends_with(['.', '!', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(word: &str, start: f64, end: f64) -> WordTimestamp {
        WordTimestamp {
            word: word.into(),
            start,
            end,
        }
    }

    #[test]
    fn synthesized_words_cover_half_second_each() {
        let scenes = [CaptionScene {
            text: "one two three four five",
            words: &[],
            duration: 10.0,
        }];
        let tl = compile(&scenes);
        assert_eq!(tl.events.len(), 5);
        for pair in tl.events.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(tl.events[0].start, 0.0);
        assert_eq!(tl.events.last().unwrap().end, 2.5);
    }

    #[test]
    fn offsets_follow_clip_durations() {
        let first = [ts("Hello", 0.2, 0.6), ts("world", 0.7, 1.1)];
        let scenes = [
            CaptionScene {
                text: "Hello world.",
                words: &first,
                duration: 4.0,
            },
            CaptionScene {
                text: "again",
                words: &[],
                duration: 6.0,
            },
        ];
        let tl = compile(&scenes);
        assert_eq!(tl.events[2].word, "again");
        assert_eq!(tl.events[2].start, 4.0);
        assert_eq!(tl.events[2].scene, 1);
        assert_eq!(tl.duration, 10.0);
        assert_eq!(tl.full_text, "Hello world. again");
    }

    #[test]
    fn synthesized_words_survive_a_short_clip() {
        let tl = compile(&[
            CaptionScene {
                text: "one two three four five six seven eight nine ten",
                words: &[],
                duration: 2.0,
            },
            CaptionScene {
                text: "next",
                words: &[],
                duration: 1.0,
            },
        ]);
        assert_eq!(tl.events.len(), 11);
        let first: Vec<&CaptionEvent> = tl.events.iter().filter(|e| e.scene == 0).collect();
        assert_eq!(first.len(), 10);
        assert_eq!(first[9].word, "ten");
        assert_eq!(first[9].start, 4.5);
        assert_eq!(first[9].end - first[0].start, 5.0);
        assert_eq!(tl.events[10].start, 2.0);
        assert_eq!(tl.duration, 3.0);
    }

    #[test]
    fn words_past_clip_end_are_dropped_or_clamped() {
        let words = [ts("a", 0.0, 0.5), ts("b", 1.8, 2.4), ts("c", 2.0, 2.5)];
        let tl = compile(&[CaptionScene {
            text: "a b c",
            words: &words,
            duration: 2.0,
        }]);
        assert_eq!(tl.events.len(), 2);
        assert_eq!(tl.events[1].end, 2.0);
    }

    #[test]
    fn sentence_flags_come_from_text_punctuation() {
        let words = [
            ts("it", 0.0, 0.2),
            ts("rained", 0.2, 0.5),
            ts("then", 0.6, 0.8),
            ts("sun", 0.8, 1.0),
        ];
        let tl = compile(&[CaptionScene {
            text: "It rained. Then, sun!",
            words: &words,
            duration: 3.0,
        }]);
        let flags: Vec<(bool, bool)> = tl
            .events
            .iter()
            .map(|e| (e.sentence_start, e.sentence_end))
            .collect();
        assert_eq!(
            flags,
            vec![(true, false), (false, true), (true, false), (false, true)]
        );
    }

    #[test]
    fn last_word_of_each_scene_ends_sentence() {
        let tl = compile(&[
            CaptionScene {
                text: "no punctuation here",
                words: &[],
                duration: 2.0,
            },
            CaptionScene {
                text: "next",
                words: &[],
                duration: 1.0,
            },
        ]);
        assert!(tl.events[2].sentence_end);
        assert!(tl.events[3].sentence_start);
    }

    #[test]
    fn recompiling_is_byte_identical() {
        let words = [ts("x", 0.1, 0.3)];
        let scenes = [
            CaptionScene {
                text: "x",
                words: &words,
                duration: 1.5,
            },
            CaptionScene {
                text: "y z.",
                words: &[],
                duration: 2.0,
            },
        ];
        let a = serde_json::to_string(&compile(&scenes)).unwrap();
        let b = serde_json::to_string(&compile(&scenes)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_scene_keeps_its_slot() {
        let tl = compile(&[
            CaptionScene {
                text: "",
                words: &[],
                duration: 3.0,
            },
            CaptionScene {
                text: "late",
                words: &[],
                duration: 1.0,
            },
        ]);
        assert_eq!(tl.events.len(), 1);
        assert_eq!(tl.events[0].start, 3.0);
    }
}
