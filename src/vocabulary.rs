//! The caller supplied vocabulary: entity definitions, extra aliases, and
//! notable quotations.

#[cfg(feature = "json")]
use std::collections::BTreeMap;
use tracing::warn;

/// Kind of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityKind {
    /// A character of the book
    Person,

    /// A place, object, or concept
    Term,
}

impl EntityKind {
    /// Row id of the kind in the `type` table
    pub fn type_id(&self) -> u32 {
        match self {
            EntityKind::Person => 1,
            EntityKind::Term => 2,
        }
    }
}

/// Where an entity's description was taken from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DescriptionSource {
    Kindle,

    #[default]
    Wikipedia,

    Goodreads,
}

impl DescriptionSource {
    /// Row id of the source in the `source` table
    pub fn source_id(&self) -> u32 {
        match self {
            DescriptionSource::Kindle => 0,
            DescriptionSource::Wikipedia => 1,
            DescriptionSource::Goodreads => 2,
        }
    }
}

/// One entity as handed in by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EntityDef {
    /// Canonical label matched in the text
    pub label: String,

    /// Description shown on the entity's card, may be empty
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,

    /// Alternative names that resolve to this entity
    #[cfg_attr(feature = "serde", serde(default))]
    pub aliases: Vec<String>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub source: DescriptionSource,
}

impl EntityDef {
    /// Creates a definition with only a label
    pub fn new(label: impl Into<String>) -> Self {
        EntityDef {
            label: label.into(),
            ..EntityDef::default()
        }
    }

    /// Sets the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds an alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets the description source
    pub fn source(mut self, source: DescriptionSource) -> Self {
        self.source = source;
        self
    }
}

/// An alternative name for an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub text: String,
    pub entity_id: u32,
}

/// The resolved vocabulary of a book.
///
/// Entities keep the order they were added in. Entity id 0 is reserved for
/// the notable clips entity of the database and duplicate ids keep their
/// first definition; both are skipped with a warning.
///
/// ```
/// use mobi_xray::{EntityDef, Vocabulary};
///
/// let mut vocabulary = Vocabulary::new();
/// vocabulary
///     .add_person(1, EntityDef::new("Alice"))
///     .add_term(2, EntityDef::new("River").description("Flows east"))
///     .add_alias("Ally", 1)
///     .add_quote("Down the River");
///
/// assert_eq!(vocabulary.entities().len(), 2);
/// assert_eq!(vocabulary.aliases().count(), 1);
/// assert_eq!(vocabulary.quotes(), &["down the river".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entities: Vec<(u32, EntityKind, EntityDef)>,
    aliases: Vec<Alias>,
    quotes: Vec<String>,
}

impl Vocabulary {
    /// Creates an empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a person
    pub fn add_person(&mut self, id: u32, def: EntityDef) -> &mut Self {
        self.add_entity(id, EntityKind::Person, def)
    }

    /// Adds a term
    pub fn add_term(&mut self, id: u32, def: EntityDef) -> &mut Self {
        self.add_entity(id, EntityKind::Term, def)
    }

    /// Adds an entity of the given kind
    pub fn add_entity(&mut self, id: u32, kind: EntityKind, def: EntityDef) -> &mut Self {
        if id == 0 {
            warn!(label = %def.label, "entity id 0 is reserved, skipping");
        } else if self.entities.iter().any(|(x, _, _)| *x == id) {
            warn!(id, label = %def.label, "duplicate entity id, keeping first");
        } else {
            self.entities.push((id, kind, def));
        }
        self
    }

    /// Adds an alias outside of an entity definition. Aliases naming an
    /// unknown entity are dropped when the matcher is built.
    pub fn add_alias(&mut self, text: impl Into<String>, entity_id: u32) -> &mut Self {
        self.aliases.push(Alias {
            text: text.into(),
            entity_id,
        });
        self
    }

    /// Adds a notable quotation, folded to lower case. Empty quotations
    /// are ignored.
    pub fn add_quote(&mut self, quote: &str) -> &mut Self {
        let quote = quote.trim();
        if !quote.is_empty() {
            self.quotes.push(quote.to_lowercase());
        }
        self
    }

    /// Entity definitions in insertion order
    pub fn entities(&self) -> &[(u32, EntityKind, EntityDef)] {
        &self.entities
    }

    /// Every alias: those of the entity definitions first, then the
    /// standalone ones
    pub fn aliases(&self) -> impl Iterator<Item = Alias> + '_ {
        let defined = self.entities.iter().flat_map(|(id, _, def)| {
            def.aliases.iter().map(move |text| Alias {
                text: text.clone(),
                entity_id: *id,
            })
        });
        defined.chain(self.aliases.iter().cloned())
    }

    /// Lower cased notable quotations
    pub fn quotes(&self) -> &[String] {
        &self.quotes
    }

    /// Returns true if there are no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Parses a vocabulary document.
    ///
    /// ```json
    /// {
    ///   "persons": { "1": { "label": "Alice", "aliases": ["Ally"] } },
    ///   "terms": { "2": { "label": "River", "description": "Flows east" } },
    ///   "aliases": { "The Queen": 1 },
    ///   "quotes": ["down the river"]
    /// }
    /// ```
    ///
    /// Entities are added persons first, each group in ascending id order.
    #[cfg(feature = "json")]
    pub fn from_json_slice(data: &[u8]) -> Result<Self, crate::Error> {
        let doc: VocabularyDocument = serde_json::from_slice(data)?;
        let mut vocabulary = Vocabulary::new();
        for (id, def) in doc.persons {
            vocabulary.add_person(id, def);
        }

        for (id, def) in doc.terms {
            vocabulary.add_term(id, def);
        }

        for (text, id) in doc.aliases {
            vocabulary.add_alias(text, id);
        }

        for quote in &doc.quotes {
            vocabulary.add_quote(quote);
        }

        Ok(vocabulary)
    }
}

#[cfg(feature = "json")]
#[derive(Debug, serde::Deserialize)]
struct VocabularyDocument {
    #[serde(default)]
    persons: BTreeMap<u32, EntityDef>,

    #[serde(default)]
    terms: BTreeMap<u32, EntityDef>,

    #[serde(default)]
    aliases: BTreeMap<String, u32>,

    #[serde(default)]
    quotes: Vec<String>,
}
