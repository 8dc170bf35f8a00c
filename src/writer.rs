//! Serialization of companion data into the X-Ray database.
//!
//! The schema and its reference rows come from a SQL template bundled into
//! the crate. The database is built in a temporary file next to the
//! destination inside a single transaction and only moved into place once
//! committed, so readers never see a partial database.

use crate::clips::NotableClips;
use crate::entity::{EntityTable, Excerpt};
use crate::vocabulary::EntityKind;
use crate::{Error, ErrorKind};
use rusqlite::{params, Connection};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// The bundled schema template
pub const XRAY_TEMPLATE: &str = include_str!("xray_template.sql");

/// Id of the `string` row holding the provenance url
pub const PROVENANCE_STRING_ID: u32 = 21;

/// Id of the synthetic entity that owns every notable clip
pub const NOTABLE_CLIPS_ENTITY_ID: u32 = 0;

/// Default number of entities listed per type as most mentioned
pub const DEFAULT_TOP_MENTIONED: usize = 10;

const INDICES: &str = "
CREATE INDEX idx_entity_excerpt ON entity_excerpt(entity ASC);
CREATE INDEX idx_entity_type ON entity(type ASC);
CREATE INDEX idx_occurrence_start ON occurrence(start ASC);
";

/// Summary row of the `book_metadata` table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookMetadataSummary {
    /// Offset of the first excerpt
    pub start_reading_location: usize,

    /// Offset one past the last excerpt
    pub estimated_reading_length: usize,

    /// Whether any excerpt mentions an entity or is a notable clip
    pub has_excerpts: bool,

    pub person_count: usize,
    pub term_count: usize,
}

impl BookMetadataSummary {
    /// Derives the summary from the extracted sets
    pub fn compute(entities: &EntityTable, excerpts: &[Excerpt], clips: &NotableClips) -> Self {
        BookMetadataSummary {
            start_reading_location: excerpts.first().map_or(0, |e| e.start),
            estimated_reading_length: excerpts.last().map_or(0, Excerpt::end),
            has_excerpts: excerpts
                .iter()
                .any(|e| !e.related_entities().is_empty() || clips.contains(e.id)),
            person_count: entities.count(EntityKind::Person),
            term_count: entities.count(EntityKind::Term),
        }
    }
}

/// Writes X-Ray databases
///
/// ```no_run
/// use mobi_xray::{EntityTable, NotableClips, XrayWriter};
///
/// let entities = EntityTable::new();
/// let summary = XrayWriter::new("https://example.com/book")
///     .top_mentioned(5)
///     .write("XRAY.entities.B000000000.asc", &entities, &[], &NotableClips::default())?;
/// assert!(!summary.has_excerpts);
/// # Ok::<(), mobi_xray::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct XrayWriter<'a> {
    provenance: &'a str,
    template: &'a str,
    top_mentioned: usize,
}

impl<'a> XrayWriter<'a> {
    /// Creates a writer recording `provenance` as the data's origin
    pub fn new(provenance: &'a str) -> Self {
        XrayWriter {
            provenance,
            template: XRAY_TEMPLATE,
            top_mentioned: DEFAULT_TOP_MENTIONED,
        }
    }

    /// Number of most mentioned entities listed per type
    pub fn top_mentioned(mut self, limit: usize) -> Self {
        self.top_mentioned = limit;
        self
    }

    /// Replaces the bundled schema template
    pub fn template(mut self, template: &'a str) -> Self {
        self.template = template;
        self
    }

    /// Replaces whatever is at `path` with a fresh database.
    ///
    /// On failure no file is left at `path`.
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        entities: &EntityTable,
        excerpts: &[Excerpt],
        clips: &NotableClips,
    ) -> Result<BookMetadataSummary, Error> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed existing database"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(path, e)),
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let scratch = tempfile::Builder::new()
            .prefix(".xray-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| Error::io(dir, e))?;

        let summary = BookMetadataSummary::compute(entities, excerpts, clips);
        let mut conn = Connection::open(scratch.path())?;
        self.populate(&mut conn, entities, excerpts, clips, &summary)?;
        conn.close().map_err(|(_, e)| e)?;

        scratch.persist(path).map_err(|e| Error::io(path, e.error))?;

        info!(
            path = %path.display(),
            entities = entities.len(),
            excerpts = excerpts.len(),
            occurrences = entities.occurrences().count(),
            clips = clips.len(),
            "wrote x-ray database"
        );
        Ok(summary)
    }

    fn populate(
        &self,
        conn: &mut Connection,
        entities: &EntityTable,
        excerpts: &[Excerpt],
        clips: &NotableClips,
        summary: &BookMetadataSummary,
    ) -> Result<(), Error> {
        let tx = conn.transaction()?;
        tx.execute_batch(self.template)?;
        check_reference_rows(&tx)?;

        insert_entities(&tx, entities, clips)?;
        insert_excerpts(&tx, excerpts, clips)?;
        insert_occurrences(&tx, entities)?;

        tx.execute(
            "INSERT INTO book_metadata VALUES(?1, ?2, 0, ?3, 0, ?4, ?5, 0, '')",
            params![
                summary.start_reading_location as i64,
                summary.estimated_reading_length as i64,
                summary.has_excerpts,
                summary.person_count as i64,
                summary.term_count as i64,
            ],
        )?;

        tx.execute(
            "UPDATE string SET text = ?1 WHERE id = ?2",
            params![self.provenance, PROVENANCE_STRING_ID],
        )?;

        for kind in [EntityKind::Person, EntityKind::Term] {
            let top = join_ids(entities.top_mentioned(kind, self.top_mentioned));
            tx.execute(
                "UPDATE type SET top_mentioned_entities = ?1 WHERE id = ?2",
                params![top, kind.type_id()],
            )?;
        }

        tx.execute_batch(INDICES)?;
        tx.commit()?;
        Ok(())
    }
}

/// Writes a database with the default settings
pub fn write_xray_db(
    path: impl AsRef<Path>,
    entities: &EntityTable,
    excerpts: &[Excerpt],
    clips: &NotableClips,
    provenance: &str,
) -> Result<BookMetadataSummary, Error> {
    XrayWriter::new(provenance).write(path, entities, excerpts, clips)
}

fn check_reference_rows(conn: &Connection) -> Result<(), Error> {
    let required = [
        ("string", PROVENANCE_STRING_ID),
        ("type", EntityKind::Person.type_id()),
        ("type", EntityKind::Term.type_id()),
        ("entity", NOTABLE_CLIPS_ENTITY_ID),
    ];

    for (table, id) in required {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?1", table);
        let count: i64 = conn.query_row(&sql, [id], |row| row.get(0))?;
        if count == 0 {
            return Err(Error::new(ErrorKind::Schema(format!(
                "template is missing {} row {}",
                table, id
            ))));
        }
    }

    Ok(())
}

fn insert_entities(conn: &Connection, entities: &EntityTable, clips: &NotableClips) -> Result<(), Error> {
    let mut entity = conn.prepare(
        "INSERT INTO entity(id, label, loc_label, type, count, has_info_card) VALUES(?1, ?2, NULL, ?3, ?4, ?5)",
    )?;
    let mut description = conn.prepare(
        "INSERT INTO entity_description(text, source_wildcard, source, entity) VALUES(?1, ?2, ?3, ?4)",
    )?;
    let mut membership = conn.prepare("INSERT INTO entity_excerpt(entity, excerpt) VALUES(?1, ?2)")?;

    for e in entities {
        let has_description = !e.description().is_empty();
        entity.execute(params![
            e.id(),
            e.label(),
            e.kind().type_id(),
            e.mention_count() as i64,
            has_description,
        ])?;

        if has_description {
            description.execute(params![e.description(), e.label(), e.source().source_id(), e.id()])?;
        }

        for &excerpt in e.excerpt_ids() {
            membership.execute(params![e.id(), excerpt as i64])?;
        }
    }

    for &clip in clips.ids() {
        membership.execute(params![NOTABLE_CLIPS_ENTITY_ID, clip as i64])?;
    }

    conn.execute(
        "UPDATE entity SET count = ?1 WHERE id = ?2",
        params![clips.len() as i64, NOTABLE_CLIPS_ENTITY_ID],
    )?;

    Ok(())
}

fn insert_excerpts(conn: &Connection, excerpts: &[Excerpt], clips: &NotableClips) -> Result<(), Error> {
    let mut insert = conn.prepare(
        "INSERT INTO excerpt(id, start, length, image, related_entities, goto) VALUES(?1, ?2, ?3, '', ?4, NULL)",
    )?;

    let mut written = 0usize;
    for excerpt in excerpts {
        if excerpt.related_entities().is_empty() && !clips.contains(excerpt.id) {
            continue;
        }

        insert.execute(params![
            excerpt.id as i64,
            excerpt.start as i64,
            excerpt.byte_len as i64,
            join_ids(excerpt.related_entities().iter().copied()),
        ])?;
        written += 1;
    }

    debug!(written, skipped = excerpts.len() - written, "inserted excerpts");
    Ok(())
}

fn insert_occurrences(conn: &Connection, entities: &EntityTable) -> Result<(), Error> {
    let mut insert = conn.prepare("INSERT INTO occurrence(entity, start, length) VALUES(?1, ?2, ?3)")?;
    for occurrence in entities.occurrences() {
        insert.execute(params![
            occurrence.entity_id,
            occurrence.start as i64,
            occurrence.byte_len as i64,
        ])?;
    }

    Ok(())
}

fn join_ids(ids: impl IntoIterator<Item = u32>) -> String {
    let mut out = String::new();
    let mut buf = itoa::Buffer::new();
    for (i, id) in ids.into_iter().enumerate() {
        if i != 0 {
            out.push(',');
        }
        out.push_str(buf.format(id));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::DescriptionSource;

    fn sample() -> (EntityTable, Vec<Excerpt>) {
        let mut entities = EntityTable::new();
        entities.insert(1, EntityKind::Person, "Alice", "A curious girl", DescriptionSource::Wikipedia);
        entities.insert(2, EntityKind::Person, "Bob", "", DescriptionSource::Wikipedia);
        entities.insert(3, EntityKind::Term, "River", "", DescriptionSource::Kindle);

        let mut first = Excerpt::new(0, 10, 30);
        let second = Excerpt::new(1, 50, 20);
        let mut third = Excerpt::new(2, 80, 25);
        first.relate(1);
        first.relate(2);
        third.relate(2);

        let alice = entities.get_mut(1).unwrap();
        alice.record(0, 10, 5);
        let bob = entities.get_mut(2).unwrap();
        bob.record(0, 20, 3);
        bob.record(2, 85, 3);

        (entities, vec![first, second, third])
    }

    #[test]
    fn test_join_ids() {
        assert_eq!(join_ids([]), "");
        assert_eq!(join_ids([4]), "4");
        assert_eq!(join_ids([4, 10, 200]), "4,10,200");
    }

    #[test]
    fn test_summary() {
        let (entities, excerpts) = sample();
        let summary = BookMetadataSummary::compute(&entities, &excerpts, &NotableClips::default());
        assert_eq!(summary.start_reading_location, 10);
        assert_eq!(summary.estimated_reading_length, 105);
        assert!(summary.has_excerpts);
        assert_eq!(summary.person_count, 2);
        assert_eq!(summary.term_count, 1);
    }

    #[test]
    fn test_write_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("XRAY.entities.B000000000.asc");
        std::fs::write(&path, b"stale").unwrap();

        let (entities, excerpts) = sample();
        XrayWriter::new("https://example.com/book")
            .write(&path, &entities, &excerpts, &NotableClips::default())
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let count = |sql: &str| -> i64 { conn.query_row(sql, [], |r| r.get(0)).unwrap() };

        assert_eq!(count("SELECT COUNT(*) FROM entity WHERE id != 0"), 3);
        assert_eq!(count("SELECT count FROM entity WHERE id = 2"), 2);
        assert_eq!(count("SELECT COUNT(*) FROM entity_description"), 1);
        assert_eq!(count("SELECT COUNT(*) FROM entity_excerpt"), 3);
        assert_eq!(count("SELECT COUNT(*) FROM excerpt"), 2);
        assert_eq!(count("SELECT COUNT(*) FROM occurrence"), 3);
        assert_eq!(count("SELECT COUNT(*) FROM occurrence WHERE entity = 2"), 2);
        assert_eq!(count("SELECT start FROM occurrence WHERE entity = 1"), 10);
        assert_eq!(count("SELECT length FROM occurrence WHERE entity = 1"), 5);
        assert_eq!(count("SELECT MAX(start) FROM occurrence"), 85);
        assert_eq!(count("SELECT COUNT(*) FROM book_metadata"), 1);
        assert_eq!(
            count("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'"),
            3
        );

        let provenance: String = conn
            .query_row("SELECT text FROM string WHERE id = 21", [], |r| r.get(0))
            .unwrap();
        assert_eq!(provenance, "https://example.com/book");

        let top: String = conn
            .query_row("SELECT top_mentioned_entities FROM type WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(top, "2,1");

        let related: String = conn
            .query_row("SELECT related_entities FROM excerpt WHERE id = 0", [], |r| r.get(0))
            .unwrap();
        assert_eq!(related, "1,2");

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_missing_reference_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.asc");
        std::fs::write(&path, b"stale").unwrap();

        let template = "CREATE TABLE string(id INTEGER, language TEXT, text TEXT);";
        let (entities, excerpts) = sample();
        let err = XrayWriter::new("")
            .template(template)
            .write(&path, &entities, &excerpts, &NotableClips::default())
            .unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Schema(_)));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
