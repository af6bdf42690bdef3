//! Segment free-form meeting notes into speaker-attributed turns.
//!
//! Notes mark each turn with `[<speaker>]: <body>`. The text is cut at every
//! literal `[`, and each piece is split at its first `]: ` into speaker and
//! body. Pieces that fail that split, or whose speaker name is implausibly
//! long (a bracketed aside rather than a tag), are dropped one at a time; the
//! rest of the note is still parsed.
//!
//! A literal `[` inside a body starts a new piece. That piece normally lacks
//! `]: ` and is dropped, truncating the body it interrupted.

use thiserror::Error;
use tracing::debug;

use crate::model::message::{Conversation, Message};

/// Longest speaker name accepted as a real tag, in characters.
pub const MAX_SPEAKER_CHARS: usize = 24;

const MARKER_OPEN: char = '[';
const MARKER_CLOSE: &str = "]: ";

/// Why a single segment produced no message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSegmentError {
    #[error("segment has no `]: ` delimiter")]
    MissingDelimiter,
    #[error("speaker name has {0} characters (max {max})", max = MAX_SPEAKER_CHARS)]
    SpeakerTooLong(usize),
}

/// Counters describing one parse.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub segments_seen: usize,
    pub messages_emitted: usize,
    pub dropped_missing_delimiter: usize,
    pub dropped_speaker_too_long: usize,
}

impl ParseStats {
    pub fn dropped(&self) -> usize {
        self.dropped_missing_delimiter + self.dropped_speaker_too_long
    }
}

/// Parse one segment (the text after a `[`, up to the next `[`).
pub fn parse_segment(segment: &str) -> Result<Message, ParseSegmentError> {
    let (speaker, body) = segment
        .split_once(MARKER_CLOSE)
        .ok_or(ParseSegmentError::MissingDelimiter)?;

    let speaker_chars = speaker.chars().count();
    if speaker_chars > MAX_SPEAKER_CHARS {
        return Err(ParseSegmentError::SpeakerTooLong(speaker_chars));
    }

    Ok(Message::from_speaker(speaker, &collapse_lines(body)))
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c'..='\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Join the lines of `body` with single spaces. `\r\n` is one break and a
/// trailing break adds nothing.
fn collapse_lines(body: &str) -> String {
    body.replace("\r\n", "\n")
        .split_terminator(is_line_break)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a whole note, returning the turns and per-parse counters.
pub fn parse_conversation_with_stats(text: &str) -> (Conversation, ParseStats) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut stats = ParseStats::default();
    let mut conversation = Conversation::new();

    // Anything before the first marker is preamble, not a turn.
    for (idx, segment) in text.split(MARKER_OPEN).enumerate().skip(1) {
        stats.segments_seen += 1;
        match parse_segment(segment) {
            Ok(message) => {
                stats.messages_emitted += 1;
                conversation.push(message);
            }
            Err(err) => {
                match err {
                    ParseSegmentError::MissingDelimiter => stats.dropped_missing_delimiter += 1,
                    ParseSegmentError::SpeakerTooLong(_) => stats.dropped_speaker_too_long += 1,
                }
                debug!(segment = idx, error = %err, "dropping note segment");
            }
        }
    }

    (conversation, stats)
}

/// Parse a whole note into turns.
pub fn parse_conversation(text: &str) -> Conversation {
    parse_conversation_with_stats(text).0
}
