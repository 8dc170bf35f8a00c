use crate::index::Paragraph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Default number of notable clips
pub const DEFAULT_CLIP_LIMIT: usize = 20;

/// How the notable set is filled when too few paragraphs hold a quotation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ClipPadding {
    /// Lowest unflagged excerpt ids first
    #[default]
    Sequential,

    /// Uniformly random excerpts from a seeded generator
    Seeded(u64),

    /// Uniformly random excerpts from the thread local generator
    Random,
}

/// Excerpts flagged as highlight worthy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotableClips {
    ids: Vec<usize>,
    quoted: usize,
}

impl NotableClips {
    /// Clip excerpt ids in ascending order
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// How many clips came from a quotation rather than padding
    pub fn quoted(&self) -> usize {
        self.quoted
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, excerpt_id: usize) -> bool {
        self.ids.binary_search(&excerpt_id).is_ok()
    }
}

/// Flags paragraphs containing a quotation and pads the set up to
/// `min(limit, paragraphs.len())`.
///
/// Quotations must already be lower cased. When more paragraphs are
/// flagged than the bound allows, the first ones in source order are kept.
///
/// ```
/// use mobi_xray::{select_notable_clips, ClipPadding, Codec, ParagraphIndexer};
///
/// let markup = b"<p>one</p><p>Off with their heads!</p><p>three</p>";
/// let paragraphs = ParagraphIndexer::new().index(markup, Codec::Utf8, 0);
/// let quotes = vec!["off with their heads".to_string()];
///
/// let clips = select_notable_clips(&paragraphs, &quotes, 2, ClipPadding::Sequential);
/// assert_eq!(clips.ids(), &[0, 1]);
/// assert_eq!(clips.quoted(), 1);
/// ```
pub fn select_notable_clips(
    paragraphs: &[Paragraph],
    quotes: &[String],
    limit: usize,
    padding: ClipPadding,
) -> NotableClips {
    let bound = limit.min(paragraphs.len());
    let mut flagged = vec![false; paragraphs.len()];
    let mut ids = Vec::with_capacity(bound);

    if !quotes.is_empty() {
        for (id, paragraph) in paragraphs.iter().enumerate() {
            if ids.len() == bound {
                break;
            }

            let text = paragraph.text().to_lowercase();
            if quotes.iter().any(|q| !q.is_empty() && text.contains(q.as_str())) {
                flagged[id] = true;
                ids.push(id);
            }
        }
    }

    let quoted = ids.len();
    let needed = bound - quoted;
    if needed > 0 {
        let unflagged: Vec<usize> = (0..paragraphs.len()).filter(|&id| !flagged[id]).collect();
        match padding {
            ClipPadding::Sequential => ids.extend_from_slice(&unflagged[..needed]),
            ClipPadding::Seeded(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                ids.extend(unflagged.choose_multiple(&mut rng, needed));
            }
            ClipPadding::Random => {
                let mut rng = rand::thread_rng();
                ids.extend(unflagged.choose_multiple(&mut rng, needed));
            }
        }
    }

    ids.sort_unstable();
    debug!(quoted, padded = needed, bound, "selected notable clips");
    NotableClips { ids, quoted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Codec;
    use crate::index::ParagraphIndexer;

    fn paragraphs(count: usize, quoted: &[usize]) -> Vec<Paragraph> {
        let mut markup = String::new();
        for i in 0..count {
            if quoted.contains(&i) {
                markup.push_str(&format!("<p>{} Down The Rabbit Hole</p>", i));
            } else {
                markup.push_str(&format!("<p>plain {}</p>", i));
            }
        }
        ParagraphIndexer::new().index(markup.as_bytes(), Codec::Utf8, 0)
    }

    fn quotes() -> Vec<String> {
        vec!["down the rabbit hole".to_string()]
    }

    #[test]
    fn test_bound_with_few_paragraphs() {
        let clips = select_notable_clips(&paragraphs(5, &[]), &quotes(), DEFAULT_CLIP_LIMIT, ClipPadding::Sequential);
        assert_eq!(clips.ids(), &[0, 1, 2, 3, 4]);
        assert_eq!(clips.quoted(), 0);
    }

    #[test]
    fn test_bound_with_many_paragraphs() {
        let all = paragraphs(50, &[3, 30]);
        for padding in [ClipPadding::Sequential, ClipPadding::Seeded(7), ClipPadding::Random] {
            let clips = select_notable_clips(&all, &quotes(), DEFAULT_CLIP_LIMIT, padding);
            assert_eq!(clips.len(), 20);
            assert_eq!(clips.quoted(), 2);
            assert!(clips.contains(3));
            assert!(clips.contains(30));
            assert!(clips.ids().windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_quoted_beyond_bound_are_capped() {
        let quoted: Vec<usize> = (0..30).collect();
        let clips = select_notable_clips(&paragraphs(30, &quoted), &quotes(), DEFAULT_CLIP_LIMIT, ClipPadding::Sequential);
        assert_eq!(clips.len(), 20);
        assert_eq!(clips.quoted(), 20);
        assert_eq!(clips.ids(), &(0..20).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_seeded_padding_is_reproducible() {
        let all = paragraphs(100, &[50]);
        let a = select_notable_clips(&all, &quotes(), DEFAULT_CLIP_LIMIT, ClipPadding::Seeded(42));
        let b = select_notable_clips(&all, &quotes(), DEFAULT_CLIP_LIMIT, ClipPadding::Seeded(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_paragraphs() {
        let clips = select_notable_clips(&[], &quotes(), DEFAULT_CLIP_LIMIT, ClipPadding::Random);
        assert!(clips.is_empty());
    }
}
