use crate::clips::{select_notable_clips, ClipPadding, NotableClips, DEFAULT_CLIP_LIMIT};
use crate::container::{BookText, MobiFile};
use crate::entity::{EntityTable, Excerpt, Occurrence};
use crate::index::{ContainerVariant, Paragraph, ParagraphIndexer};
use crate::matcher::EntityMatcher;
use crate::vocabulary::Vocabulary;
use crate::writer::{BookMetadataSummary, XrayWriter, DEFAULT_TOP_MENTIONED};
use crate::Error;
use std::path::Path;
use tracing::info;

/// Settings for an extraction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    variant: ContainerVariant,
    bias: Option<isize>,
    clip_limit: usize,
    clip_padding: ClipPadding,
    top_mentioned: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions::builder().build()
    }
}

impl ExtractOptions {
    /// Initializes a default [ExtractOptionsBuilder]
    pub fn builder() -> ExtractOptionsBuilder {
        ExtractOptionsBuilder::default()
    }

    /// Offset correction applied to every character offset
    pub fn bias(&self) -> isize {
        self.bias.unwrap_or_else(|| self.variant.offset_bias())
    }

    pub fn variant(&self) -> ContainerVariant {
        self.variant
    }

    pub fn clip_limit(&self) -> usize {
        self.clip_limit
    }

    pub fn clip_padding(&self) -> ClipPadding {
        self.clip_padding
    }

    pub fn top_mentioned(&self) -> usize {
        self.top_mentioned
    }
}

#[derive(Debug)]
pub struct ExtractOptionsBuilder {
    variant: ContainerVariant,
    bias: Option<isize>,
    clip_limit: usize,
    clip_padding: ClipPadding,
    top_mentioned: usize,
}

impl Default for ExtractOptionsBuilder {
    fn default() -> Self {
        Self {
            variant: ContainerVariant::Mobi,
            bias: None,
            clip_limit: DEFAULT_CLIP_LIMIT,
            clip_padding: ClipPadding::Sequential,
            top_mentioned: DEFAULT_TOP_MENTIONED,
        }
    }
}

impl ExtractOptionsBuilder {
    /// Container flavor, which determines the offset bias
    pub fn variant(mut self, val: ContainerVariant) -> ExtractOptionsBuilder {
        self.variant = val;
        self
    }

    /// Overrides the bias of the container flavor
    pub fn bias(mut self, val: isize) -> ExtractOptionsBuilder {
        self.bias = Some(val);
        self
    }

    pub fn clip_limit(mut self, val: usize) -> ExtractOptionsBuilder {
        self.clip_limit = val;
        self
    }

    pub fn clip_padding(mut self, val: ClipPadding) -> ExtractOptionsBuilder {
        self.clip_padding = val;
        self
    }

    pub fn top_mentioned(mut self, val: usize) -> ExtractOptionsBuilder {
        self.top_mentioned = val;
        self
    }

    pub fn build(self) -> ExtractOptions {
        ExtractOptions {
            variant: self.variant,
            bias: self.bias,
            clip_limit: self.clip_limit,
            clip_padding: self.clip_padding,
            top_mentioned: self.top_mentioned,
        }
    }
}

/// Everything extracted from one book.
///
/// Each value owns its state, so books can be processed on separate
/// threads. Writes to the same path must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct CompanionData {
    entities: EntityTable,
    excerpts: Vec<Excerpt>,
    clips: NotableClips,
    top_mentioned: usize,
}

impl CompanionData {
    /// Runs the full pipeline over container bytes
    pub fn extract(
        container: &[u8],
        vocabulary: &Vocabulary,
        options: &ExtractOptions,
    ) -> Result<Self, Error> {
        let file = MobiFile::from_slice(container)?;
        let text = file.text()?;
        info!(
            title = %file.title(),
            bytes = text.markup().len(),
            codec = text.codec().name(),
            "read book text"
        );
        CompanionData::from_text(&text, vocabulary, options)
    }

    /// Runs the pipeline over already reconstructed markup
    pub fn from_text(
        text: &BookText,
        vocabulary: &Vocabulary,
        options: &ExtractOptions,
    ) -> Result<Self, Error> {
        let paragraphs = ParagraphIndexer::new().index(text.markup(), text.codec(), options.bias());
        CompanionData::from_paragraphs(&paragraphs, vocabulary, options)
    }

    /// Runs matching and clip selection over indexed paragraphs
    pub fn from_paragraphs(
        paragraphs: &[Paragraph],
        vocabulary: &Vocabulary,
        options: &ExtractOptions,
    ) -> Result<Self, Error> {
        let matcher = EntityMatcher::new(vocabulary)?;
        let mut entities = matcher.entity_table(vocabulary);
        let excerpts = matcher.scan(paragraphs, &mut entities);
        let clips = select_notable_clips(
            paragraphs,
            vocabulary.quotes(),
            options.clip_limit(),
            options.clip_padding(),
        );

        Ok(CompanionData {
            entities,
            excerpts,
            clips,
            top_mentioned: options.top_mentioned(),
        })
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn excerpts(&self) -> &[Excerpt] {
        &self.excerpts
    }

    pub fn clips(&self) -> &NotableClips {
        &self.clips
    }

    /// Every occurrence, grouped by entity
    pub fn occurrences(&self) -> impl Iterator<Item = &Occurrence> + '_ {
        self.entities.occurrences()
    }

    pub fn summary(&self) -> BookMetadataSummary {
        BookMetadataSummary::compute(&self.entities, &self.excerpts, &self.clips)
    }

    /// Writes the X-Ray database to `path`, replacing any existing file
    pub fn write(&self, path: impl AsRef<Path>, provenance: &str) -> Result<BookMetadataSummary, Error> {
        XrayWriter::new(provenance)
            .top_mentioned(self.top_mentioned)
            .write(path, &self.entities, &self.excerpts, &self.clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ExtractOptions::default();
        assert_eq!(options.bias(), 0);
        assert_eq!(options.clip_limit(), 20);
        assert_eq!(options.top_mentioned(), 10);
        assert_eq!(options.clip_padding(), ClipPadding::Sequential);
    }

    #[test]
    fn test_bias_override() {
        let options = ExtractOptions::builder().variant(ContainerVariant::Azw3).build();
        assert_eq!(options.bias(), -2);

        let options = ExtractOptions::builder()
            .variant(ContainerVariant::Azw3)
            .bias(5)
            .build();
        assert_eq!(options.bias(), 5);
    }
}
