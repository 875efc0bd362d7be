//! Byte ranges into a document and the one primitive every structural edit goes through.
use regex::Regex;
use serde::Serialize;

use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Span { start, end }
    }

    /// Zero-width span, used as an insertion point.
    pub fn at(pos: usize) -> Self {
        Span {
            start: pos,
            end: pos,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// `text` with this span replaced by `replacement`. Bytes outside the span are kept.
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(text.len() + replacement.len());
        out.push_str(&text[..self.start]);
        out.push_str(replacement);
        out.push_str(&text[self.end..]);
        out
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// First match of `pattern` in `text`.
pub fn locate(text: &str, pattern: &Regex) -> Option<Span> {
    pattern.find(text).map(|m| Span::new(m.start(), m.end()))
}

/// The full line (including its newline) containing the first match of `pattern`.
pub fn locate_line(text: &str, pattern: &Regex) -> Option<Span> {
    locate(text, pattern).map(|span| line_at(text, span.start))
}

/// The line containing byte `pos`, including its trailing newline when present.
pub fn line_at(text: &str, pos: usize) -> Span {
    let start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[pos..]
        .find('\n')
        .map(|i| pos + i + 1)
        .unwrap_or(text.len());
    Span::new(start, end)
}

/// Every line with its span. The span includes the newline; the string does not.
pub fn lines(text: &str) -> impl Iterator<Item = (Span, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let span = Span::new(offset, offset + raw.len());
        offset += raw.len();
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        (span, line.strip_suffix('\r').unwrap_or(line))
    })
}

/// Apply several edits at once. Edits may arrive in any order but must not overlap.
pub fn apply_edits(text: &str, mut edits: Vec<(Span, String)>) -> Result<String, PlanError> {
    edits.sort_by_key(|(span, _)| (span.start, span.end));
    for pair in edits.windows(2) {
        if pair[0].0.overlaps(&pair[1].0) {
            return Err(PlanError::Parse(format!(
                "overlapping edits at bytes {}..{} and {}..{}",
                pair[0].0.start, pair[0].0.end, pair[1].0.start, pair[1].0.end
            )));
        }
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (span, replacement) in edits {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}
