use crate::vocabulary::{DescriptionSource, EntityKind};
use std::collections::HashMap;

/// One matched mention of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub entity_id: u32,

    /// Absolute byte offset of the word expanded match
    pub start: usize,

    pub byte_len: usize,
}

/// A tracked entity and everything the matcher accumulated for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    id: u32,
    label: String,
    kind: EntityKind,
    description: String,
    source: DescriptionSource,
    excerpt_ids: Vec<usize>,
    occurrences: Vec<Occurrence>,
}

impl Entity {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> DescriptionSource {
        self.source
    }

    /// Number of mentions, always the number of occurrences
    pub fn mention_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Excerpts mentioning the entity, without duplicates, in scan order
    pub fn excerpt_ids(&self) -> &[usize] {
        &self.excerpt_ids
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    pub(crate) fn record(&mut self, excerpt_id: usize, start: usize, byte_len: usize) {
        if self.excerpt_ids.last() != Some(&excerpt_id) && !self.excerpt_ids.contains(&excerpt_id) {
            self.excerpt_ids.push(excerpt_id);
        }

        self.occurrences.push(Occurrence {
            entity_id: self.id,
            start,
            byte_len,
        });
    }
}

/// Index addressed entity storage.
///
/// Entities live in a dense vector in insertion order with a map from id to
/// position. Nothing holds a reference to an entity, only its id.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    entities: Vec<Entity>,
    positions: HashMap<u32, usize>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entity with no mentions. Returns false, leaving the
    /// table untouched, if the id is already present.
    pub fn insert(
        &mut self,
        id: u32,
        kind: EntityKind,
        label: impl Into<String>,
        description: impl Into<String>,
        source: DescriptionSource,
    ) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }

        self.positions.insert(id, self.entities.len());
        self.entities.push(Entity {
            id,
            label: label.into(),
            kind,
            description: description.into(),
            source,
            excerpt_ids: Vec::new(),
            occurrences: Vec::new(),
        });
        true
    }

    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.positions.get(&id).map(|&i| &self.entities[i])
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut Entity> {
        self.positions.get(&id).map(|&i| &mut self.entities[i])
    }

    pub fn contains(&self, id: u32) -> bool {
        self.positions.contains_key(&id)
    }

    /// Entities in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entities of a kind, mentioned or not
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.iter().filter(|e| e.kind == kind).count()
    }

    /// Every occurrence, grouped by entity in insertion order
    pub fn occurrences(&self) -> impl Iterator<Item = &Occurrence> + '_ {
        self.entities.iter().flat_map(|e| e.occurrences.iter())
    }

    /// Ids of the most mentioned entities of a kind, most mentioned first.
    /// Ties keep insertion order.
    pub fn top_mentioned(&self, kind: EntityKind, limit: usize) -> Vec<u32> {
        let mut ranked: Vec<&Entity> = self.entities.iter().filter(|e| e.kind == kind).collect();

        // stable sort keeps insertion order among equal counts
        ranked.sort_by(|a, b| b.mention_count().cmp(&a.mention_count()));
        ranked.into_iter().take(limit).map(|e| e.id).collect()
    }
}

impl<'a> IntoIterator for &'a EntityTable {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One paragraph level unit of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// Sequential id, starting at zero, in source order
    pub id: usize,

    /// Absolute byte offset of the paragraph's first character
    pub start: usize,

    pub byte_len: usize,

    related: Vec<u32>,
}

impl Excerpt {
    pub fn new(id: usize, start: usize, byte_len: usize) -> Self {
        Excerpt {
            id,
            start,
            byte_len,
            related: Vec::new(),
        }
    }

    /// Distinct entities matched in the excerpt, in order of first match
    pub fn related_entities(&self) -> &[u32] {
        &self.related
    }

    /// Returns true if the absolute byte offset falls inside the excerpt
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.start + self.byte_len
    }

    /// Offset one past the excerpt's last byte
    pub fn end(&self) -> usize {
        self.start + self.byte_len
    }

    pub(crate) fn relate(&mut self, entity_id: u32) {
        if !self.related.contains(&entity_id) {
            self.related.push(entity_id);
        }
    }
}
