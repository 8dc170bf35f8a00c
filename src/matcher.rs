use crate::entity::{EntityTable, Excerpt};
use crate::index::Paragraph;
use crate::vocabulary::Vocabulary;
use crate::Error;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Whole word, case insensitive matcher over every label and alias.
///
/// All names compile into a single alternation with one group per name. A
/// match resolves to the entity of the group that matched, so text the
/// pattern folds to a name (like `ſam` for `Sam`) resolves too. Labels take
/// precedence over aliases of the same name.
///
/// ```
/// use mobi_xray::{ContainerVariant, Codec, EntityDef, EntityMatcher, ParagraphIndexer, Vocabulary};
///
/// let mut vocabulary = Vocabulary::new();
/// vocabulary
///     .add_person(1, EntityDef::new("Alice"))
///     .add_person(2, EntityDef::new("Bob"));
///
/// let markup = b"<p>Alice met Bob near the river.</p><p>Bob loves the river.</p>";
/// let paragraphs = ParagraphIndexer::new().index(markup, Codec::Utf8, ContainerVariant::Mobi.offset_bias());
///
/// let matcher = EntityMatcher::new(&vocabulary)?;
/// let mut entities = matcher.entity_table(&vocabulary);
/// let excerpts = matcher.scan(&paragraphs, &mut entities);
///
/// assert_eq!(entities.get(1).unwrap().mention_count(), 1);
/// assert_eq!(entities.get(2).unwrap().mention_count(), 2);
/// assert_eq!(excerpts[0].related_entities(), &[1, 2]);
/// assert_eq!(excerpts[1].related_entities(), &[2]);
/// # Ok::<(), mobi_xray::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    pattern: Option<Regex>,
    resolve: HashMap<String, u32>,

    /// Entity of each capture group, in group order
    groups: Vec<u32>,
}

impl EntityMatcher {
    /// Compiles the vocabulary. An empty vocabulary compiles no pattern.
    pub fn new(vocabulary: &Vocabulary) -> Result<Self, Error> {
        let mut resolve: HashMap<String, u32> = HashMap::new();
        for (id, _, def) in vocabulary.entities() {
            let key = def.label.trim().to_lowercase();
            if !key.is_empty() {
                resolve.entry(key).or_insert(*id);
            }
        }

        let known: HashSet<u32> = vocabulary.entities().iter().map(|(id, _, _)| *id).collect();
        let labels = resolve.len();
        for alias in vocabulary.aliases() {
            if !known.contains(&alias.entity_id) {
                debug!(alias = %alias.text, id = alias.entity_id, "dropping alias of unknown entity");
                continue;
            }

            let key = alias.text.trim().to_lowercase();
            if !key.is_empty() {
                resolve.entry(key).or_insert(alias.entity_id);
            }
        }

        if resolve.is_empty() {
            debug!("empty vocabulary, no pattern compiled");
            return Ok(EntityMatcher {
                pattern: None,
                resolve,
                groups: Vec::new(),
            });
        }

        // longest first so a name wins over any name it starts with
        let mut names: Vec<&str> = resolve.keys().map(String::as_str).collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut alternation = String::with_capacity(names.iter().map(|n| n.len() + 3).sum());
        let mut groups = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if i != 0 {
                alternation.push('|');
            }
            alternation.push('(');
            alternation.push_str(&regex::escape(name));
            alternation.push(')');
            groups.push(resolve[*name]);
        }

        let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", alternation))
            .case_insensitive(true)
            .size_limit(1 << 26)
            .build()?;

        debug!(
            names = resolve.len(),
            labels,
            aliases = resolve.len() - labels,
            "compiled vocabulary pattern"
        );

        Ok(EntityMatcher {
            pattern: Some(pattern),
            resolve,
            groups,
        })
    }

    /// Creates the entity table the scan accumulates into
    pub fn entity_table(&self, vocabulary: &Vocabulary) -> EntityTable {
        let mut table = EntityTable::new();
        for (id, kind, def) in vocabulary.entities() {
            table.insert(*id, *kind, def.label.as_str(), def.description.as_str(), def.source);
        }
        table
    }

    /// The entity a name refers to, compared lower cased
    pub fn resolve(&self, text: &str) -> Option<u32> {
        self.resolve.get(&text.to_lowercase()).copied()
    }

    /// Scans every paragraph, producing one excerpt per paragraph and
    /// recording occurrences into `entities`
    pub fn scan(&self, paragraphs: &[Paragraph], entities: &mut EntityTable) -> Vec<Excerpt> {
        let mut excerpts = Vec::with_capacity(paragraphs.len());
        let mut mentions = 0usize;

        for (id, paragraph) in paragraphs.iter().enumerate() {
            let mut excerpt = Excerpt::new(id, paragraph.start(), paragraph.byte_len());
            if let Some(pattern) = &self.pattern {
                mentions += self.scan_paragraph(pattern, paragraph, &mut excerpt, entities);
            }
            excerpts.push(excerpt);
        }

        debug!(
            excerpts = excerpts.len(),
            mentions,
            entities = entities.len(),
            "scanned paragraphs"
        );
        excerpts
    }

    fn scan_paragraph(
        &self,
        pattern: &Regex,
        paragraph: &Paragraph,
        excerpt: &mut Excerpt,
        entities: &mut EntityTable,
    ) -> usize {
        let text = paragraph.text();
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut mentions = 0;

        for caps in pattern.captures_iter(text) {
            let Some(m) = caps.get(0) else {
                continue;
            };

            let group = caps.iter().skip(1).position(|g| g.is_some());
            let Some(&entity_id) = group.and_then(|g| self.groups.get(g)) else {
                trace!(text = m.as_str(), "match did not resolve to an entity");
                continue;
            };

            let Some(entity) = entities.get_mut(entity_id) else {
                continue;
            };

            let first = chars.partition_point(|&(i, _)| i < m.start());
            let last = chars.partition_point(|&(i, _)| i < m.end());
            let span = word_span(&chars, first..last);
            let Some((start, byte_len)) = paragraph.byte_span(span) else {
                continue;
            };

            entity.record(excerpt.id, start, byte_len);
            excerpt.relate(entity_id);
            mentions += 1;
        }

        mentions
    }
}

/// Widens a character range to the surrounding whitespace or the paragraph
/// bounds
fn word_span(chars: &[(usize, char)], span: std::ops::Range<usize>) -> std::ops::Range<usize> {
    let mut start = span.start;
    while start > 0 && !chars[start - 1].1.is_whitespace() {
        start -= 1;
    }

    let mut end = span.end;
    while end < chars.len() && !chars[end].1.is_whitespace() {
        end += 1;
    }

    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Codec;
    use crate::index::ParagraphIndexer;
    use crate::vocabulary::EntityDef;

    fn run(vocabulary: &Vocabulary, markup: &str) -> (EntityTable, Vec<Excerpt>) {
        let paragraphs = ParagraphIndexer::new().index(markup.as_bytes(), Codec::Utf8, 0);
        let matcher = EntityMatcher::new(vocabulary).unwrap();
        let mut entities = matcher.entity_table(vocabulary);
        let excerpts = matcher.scan(&paragraphs, &mut entities);
        (entities, excerpts)
    }

    #[test]
    fn test_word_span() {
        let chars: Vec<(usize, char)> = "say \"Bob's\" now".char_indices().collect();
        assert_eq!(word_span(&chars, 5..8), 4..11);
        assert_eq!(word_span(&chars, 0..3), 0..3);
        assert_eq!(word_span(&chars, 12..15), 12..15);
    }

    #[test]
    fn test_whole_words_only() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.add_person(1, EntityDef::new("Al"));
        let (entities, _) = run(&vocabulary, "<p>Alice and Al and AL, but not Hal.</p>");
        assert_eq!(entities.get(1).unwrap().mention_count(), 2);
    }

    #[test]
    fn test_label_beats_alias() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .add_person(1, EntityDef::new("Queen"))
            .add_person(2, EntityDef::new("Alice").alias("queen"));
        let (entities, _) = run(&vocabulary, "<p>The Queen shouted.</p>");
        assert_eq!(entities.get(1).unwrap().mention_count(), 1);
        assert_eq!(entities.get(2).unwrap().mention_count(), 0);
    }

    #[test]
    fn test_longer_name_wins() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .add_person(1, EntityDef::new("Mad"))
            .add_person(2, EntityDef::new("Mad Hatter"));
        let (entities, excerpts) = run(&vocabulary, "<p>The Mad Hatter poured tea.</p>");
        assert_eq!(entities.get(1).unwrap().mention_count(), 0);
        assert_eq!(entities.get(2).unwrap().mention_count(), 1);
        assert_eq!(excerpts[0].related_entities(), &[2]);
    }

    #[test]
    fn test_alias_resolves_and_unknown_dropped() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .add_person(1, EntityDef::new("Alice"))
            .add_alias("Ally", 1)
            .add_alias("Ghost", 42);
        let (entities, _) = run(&vocabulary, "<p>Ally saw a Ghost.</p>");
        assert_eq!(entities.get(1).unwrap().mention_count(), 1);
        assert!(!entities.contains(42));
    }

    #[test]
    fn test_occurrence_spans_whole_word() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.add_person(2, EntityDef::new("Bob"));
        let markup = "<p>Ask Bob's dog.</p>";
        let (entities, excerpts) = run(&vocabulary, markup);

        let occurrence = entities.get(2).unwrap().occurrences()[0];
        let bytes = &markup.as_bytes()[occurrence.start..occurrence.start + occurrence.byte_len];
        assert_eq!(bytes, b"Bob's");
        assert!(excerpts[0].contains(occurrence.start));
    }

    #[test]
    fn test_multibyte_occurrence() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.add_person(1, EntityDef::new("Zoë"));
        let markup = "<p>Café with <b>Zoë</b> today.</p>";
        let (entities, _) = run(&vocabulary, markup);

        let occurrence = entities.get(1).unwrap().occurrences()[0];
        let bytes = &markup.as_bytes()[occurrence.start..occurrence.start + occurrence.byte_len];
        assert_eq!(bytes, "Zoë".as_bytes());
        assert_eq!(occurrence.byte_len, 4);
    }

    #[test]
    fn test_empty_vocabulary_still_produces_excerpts() {
        let vocabulary = Vocabulary::new();
        let matcher = EntityMatcher::new(&vocabulary).unwrap();
        assert!(matcher.pattern.is_none());

        let (entities, excerpts) = run(&vocabulary, "<p>one</p><p>two</p>");
        assert!(entities.is_empty());
        assert_eq!(excerpts.len(), 2);
        assert!(excerpts.iter().all(|e| e.related_entities().is_empty()));
    }

    #[test]
    fn test_case_folded_match_resolves() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .add_person(1, EntityDef::new("Sam"))
            .add_term(2, EntityDef::new("Kiln"));
        let markup = "<p>ſam lit the \u{212A}iln.</p>";
        let (entities, excerpts) = run(&vocabulary, markup);

        let sam = entities.get(1).unwrap();
        assert_eq!(sam.mention_count(), 1);
        let occurrence = sam.occurrences()[0];
        let bytes = &markup.as_bytes()[occurrence.start..occurrence.start + occurrence.byte_len];
        assert_eq!(bytes, "ſam".as_bytes());

        assert_eq!(entities.get(2).unwrap().mention_count(), 1);
        assert_eq!(excerpts[0].related_entities(), &[1, 2]);
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.add_term(5, EntityDef::new("C++ (language)"));
        let matcher = EntityMatcher::new(&vocabulary).unwrap();
        assert_eq!(matcher.resolve("c++ (LANGUAGE)"), Some(5));
    }

    #[test]
    fn test_excerpt_ids_are_distinct() {
        let mut vocabulary = Vocabulary::new();
        vocabulary.add_person(1, EntityDef::new("Bob"));
        let (entities, _) = run(&vocabulary, "<p>Bob, Bob and bob.</p><p>No one.</p><p>Bob.</p>");
        let bob = entities.get(1).unwrap();
        assert_eq!(bob.mention_count(), 4);
        assert_eq!(bob.excerpt_ids(), &[0, 2]);
    }
}
