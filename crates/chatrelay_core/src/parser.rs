//! crates/chatrelay_core/src/parser.rs
//!
//! Splits raw message content into typed display segments: plain text and
//! fenced code blocks. Pure and total: any string, including one cut off
//! mid-stream, yields a valid segment sequence. The render layer re-runs
//! this on every frame while text is still arriving, so an unterminated
//! opening fence stays plain text until its closing fence shows up, at
//! which point the same scan naturally reclassifies it as code.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::Segment;

/// Language tag used for fences that omit one.
pub const PLAINTEXT: &str = "plaintext";

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Triple backtick, optional language word, newline, non-greedy body,
    // closing triple backtick.
    FENCE.get_or_init(|| Regex::new(r"(?s)```(\w+)?\n(.*?)```").unwrap())
}

/// Parses message content into an ordered segment sequence.
///
/// Literal `**` emphasis markers are stripped before fence detection, the
/// same normalization the render layer applies everywhere. Note this also
/// rewrites `**` occurring inside code bodies; see DESIGN.md.
pub fn parse(content: &str) -> Vec<Segment> {
    let cleaned = content.replace("**", "");
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in fence_regex().captures_iter(&cleaned) {
        let whole = caps.get(0).unwrap();
        if whole.start() > last {
            segments.push(Segment::Text {
                value: cleaned[last..whole.start()].to_string(),
            });
        }
        let language = caps
            .get(1)
            .map(|tag| tag.as_str())
            .unwrap_or(PLAINTEXT)
            .to_string();
        let body = caps.get(2).map(|body| body.as_str()).unwrap_or("");
        segments.push(Segment::Code {
            language,
            value: body.trim().to_string(),
        });
        last = whole.end();
    }

    if last < cleaned.len() {
        segments.push(Segment::Text {
            value: cleaned[last..].to_string(),
        });
    }
    segments
}

/// Reassembles segments back into fenced source text.
///
/// Code segments regain their fence markers; a `plaintext` tag is treated
/// as the omitted-language case and left off. For content whose code bodies
/// carry no extra surrounding blank lines this inverts [`parse`], modulo
/// the `**` normalization.
pub fn to_text(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text { value } => out.push_str(value),
            Segment::Code { language, value } => {
                let tag = if language == PLAINTEXT { "" } else { language };
                out.push_str("```");
                out.push_str(tag);
                out.push('\n');
                out.push_str(value);
                out.push_str("\n```");
            }
        }
    }
    out
}
