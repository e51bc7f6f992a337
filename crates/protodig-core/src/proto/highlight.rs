//! Semantic spans for rendered `.proto` lines.
//!
//! Presentation layers colour lines using these spans. Only the first match
//! of each kind on a line is marked, which is enough for the one-statement
//! lines the renderer produces.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"".*""#).expect("valid regex"));
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s*=").expect("valid regex"));
static DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s*\{").expect("valid regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W(\d+)\W").expect("valid regex"));

/// What a span marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// A double-quoted string, quotes included
    StringLiteral,
    /// A field or enum value name (left of `=`)
    Identifier,
    /// A message or enum name (left of `{`)
    Declaration,
    /// A field number or enum value
    Number,
}

/// A highlighted byte range within a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Byte range in the line text
    pub range: Range<usize>,
    /// Span kind
    pub kind: SpanKind,
}

/// One line of rendered text with its spans
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighlightedLine {
    /// Line text without the trailing newline
    pub text: String,
    /// Non-overlapping spans ordered by start
    pub spans: Vec<Span>,
}

impl HighlightedLine {
    /// Text covered by `span`
    pub fn slice(&self, span: &Span) -> &str {
        &self.text[span.range.clone()]
    }
}

/// Annotate a single line
pub fn highlight_line(line: &str) -> HighlightedLine {
    let candidates = [
        STRING_LITERAL.find(line).map(|m| (m.range(), SpanKind::StringLiteral)),
        capture(&IDENTIFIER, line).map(|r| (r, SpanKind::Identifier)),
        capture(&DECLARATION, line).map(|r| (r, SpanKind::Declaration)),
        capture(&NUMBER, line).map(|r| (r, SpanKind::Number)),
    ];

    let mut spans: Vec<Span> = Vec::new();
    for (range, kind) in candidates.into_iter().flatten() {
        let overlaps = spans
            .iter()
            .any(|s| range.start < s.range.end && s.range.start < range.end);
        if !overlaps {
            spans.push(Span { range, kind });
        }
    }
    spans.sort_by_key(|s| s.range.start);

    HighlightedLine {
        text: line.to_string(),
        spans,
    }
}

/// Split rendered text into annotated lines
pub fn highlight(text: &str) -> Vec<HighlightedLine> {
    text.split('\n').map(highlight_line).collect()
}

fn capture(re: &Regex, line: &str) -> Option<Range<usize>> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.range())
}
