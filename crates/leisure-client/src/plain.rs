//! Plain-text mode: the session holds a bare document string and updates
//! arrive as text replacements.

use leisure_types::{Replacement, TextReplacement};
use tracing::warn;

/// The whole document as one string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlainDocument {
    text: String,
}

impl PlainDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply a batch of replacements.
    ///
    /// Offsets and lengths count characters. Each replacement's offset is
    /// relative to the text left over after the previous one; an offset of
    /// `-1` replaces the whole document. Out-of-range positions clamp.
    pub fn apply(&mut self, replacements: &[Replacement]) {
        let mut out = String::with_capacity(self.text.len());
        let mut rest: &str = &self.text;
        for replacement in replacements {
            let Replacement::Text(TextReplacement {
                offset,
                length,
                text,
            }) = replacement
            else {
                warn!("ignoring block replacement in plain mode");
                continue;
            };
            let (offset, length) = if *offset < 0 {
                (0, rest.chars().count())
            } else {
                (*offset as usize, (*length).max(0) as usize)
            };
            let start = char_to_byte(rest, offset);
            out.push_str(&rest[..start]);
            out.push_str(text);
            let end = char_to_byte(rest, offset.saturating_add(length));
            rest = &rest[end..];
        }
        out.push_str(rest);
        self.text = out;
    }
}

fn char_to_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}
