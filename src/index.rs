//! Paragraph extraction with per character byte offsets.
//!
//! Every character of a paragraph's plain text is tied back to where its
//! encoded bytes live in the markup stream. Offsets and widths are kept as
//! parallel arrays so a character span converts to a byte span without
//! re-encoding anything.

use crate::encoding::Codec;
use regex::bytes::Regex;
use std::ops::Range;
use tracing::{debug, trace, warn};

/// Offset correction for the container flavor the markup came from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVariant {
    /// Legacy MOBI (KF7) markup, offsets are used as is
    #[default]
    Mobi,

    /// KF8 (AZW3) markup, where reader positions trail the stream by two bytes
    Azw3,
}

impl ContainerVariant {
    /// The signed correction added to every offset
    pub fn offset_bias(&self) -> isize {
        match self {
            ContainerVariant::Mobi => 0,
            ContainerVariant::Azw3 => -2,
        }
    }
}

/// One paragraph of plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    text: String,
    offsets: Vec<usize>,
    widths: Vec<usize>,
}

impl Paragraph {
    /// The plain text with markup removed
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Absolute byte offset of each character
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Encoded byte width of each character
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Number of characters
    pub fn char_len(&self) -> usize {
        self.offsets.len()
    }

    /// Offset of the first character
    pub fn start(&self) -> usize {
        self.offsets[0]
    }

    /// Bytes from the first character through the end of the last one
    pub fn byte_len(&self) -> usize {
        self.end() - self.start()
    }

    /// Offset one past the last character's bytes
    pub fn end(&self) -> usize {
        let last = self.offsets.len() - 1;
        self.offsets[last] + self.widths[last]
    }

    /// Converts a character range into an absolute `(start, length)` byte span
    pub fn byte_span(&self, chars: Range<usize>) -> Option<(usize, usize)> {
        if chars.is_empty() || chars.end > self.offsets.len() {
            return None;
        }

        let start = self.offsets[chars.start];
        let last = chars.end - 1;
        let end = self.offsets[last] + self.widths[last];
        Some((start, end - start))
    }
}

/// Splits markup into paragraphs
#[derive(Debug, Clone)]
pub struct ParagraphIndexer {
    paragraph: Regex,
}

impl Default for ParagraphIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl ParagraphIndexer {
    /// Creates an indexer matching `<p>` blocks
    pub fn new() -> Self {
        // A literal pattern: compilation cannot fail
        let paragraph = Regex::new(r"(?is-u)<p(?:\s[^>]*)?>.*?</p\s*>")
            .unwrap_or_else(|e| unreachable!("paragraph pattern: {}", e));
        ParagraphIndexer { paragraph }
    }

    /// Extracts every paragraph with at least one character of text.
    ///
    /// Each character's offset is the position of its first byte in
    /// `markup` plus `bias`, saturating at zero.
    pub fn index(&self, markup: &[u8], codec: Codec, bias: isize) -> Vec<Paragraph> {
        let mut paragraphs = Vec::new();
        let mut invalid = 0usize;

        for block in self.paragraph.find_iter(markup) {
            let mut paragraph = Paragraph {
                text: String::new(),
                offsets: Vec::new(),
                widths: Vec::new(),
            };

            for run in text_runs(block.as_bytes()) {
                let base = block.start() + run.start;
                let errors = codec.decode_with(&block.as_bytes()[run], |c, i, width| {
                    paragraph.text.push(c);
                    paragraph.offsets.push((base + i).saturating_add_signed(bias));
                    paragraph.widths.push(width);
                });

                for err in &errors {
                    trace!(paragraph = paragraphs.len(), run_start = base, %err, "replaced invalid bytes");
                }
                invalid += errors.len();
            }

            if paragraph.offsets.is_empty() {
                continue;
            }

            paragraphs.push(paragraph);
        }

        if invalid > 0 {
            warn!(
                invalid,
                codec = codec.name(),
                "text contained byte sequences invalid for its codec"
            );
        }

        debug!(paragraphs = paragraphs.len(), bias, "indexed paragraphs");
        paragraphs
    }
}

/// Byte ranges of the text strictly between a `>` and the next `<`
fn text_runs(block: &[u8]) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || loop {
        let gt = pos + block.get(pos..)?.iter().position(|&b| b == b'>')?;
        let start = gt + 1;
        let len = block[start..].iter().position(|&b| b == b'<')?;
        pos = start + len;
        if len > 0 {
            return Some(start..start + len);
        }
    })
}
