/*!

Extract X-Ray companion data from [MOBI](https://wiki.mobileread.com/wiki/MOBI) and AZW3
e-books: the people and terms a book mentions, the paragraphs they appear in, and the exact byte
offset of every mention, written into the SQLite database (`XRAY.entities.<ASIN>.asc`) a Kindle
reads next to the book.

## Features

- ✔ Complete: Decode uncompressed, PalmDOC, and HUFF/CDIC text records
- ✔ Precise: Every character is tied to the byte offset a reader uses for locations
- ✔ Safe: Malformed containers are rejected with typed errors and fuzzed against
- ✔ Atomic: Databases are built off to the side and moved into place once complete
- ✔ Patchable: Rewrite a book's ASIN without disturbing the rest of the container

## Quick Start

Below is the full pipeline over a small book built in memory.

```rust
use mobi_xray::{CompanionData, ContainerBuilder, EntityDef, ExtractOptions, Vocabulary};

let book = ContainerBuilder::new("Example")
    .build(b"<p>Alice met Bob near the river.</p><p>Bob loves the river.</p>");

let mut vocabulary = Vocabulary::new();
vocabulary
    .add_person(1, EntityDef::new("Alice"))
    .add_person(2, EntityDef::new("Bob"));

let data = CompanionData::extract(&book, &vocabulary, &ExtractOptions::default())?;
assert_eq!(data.entities().get(1).unwrap().mention_count(), 1);
assert_eq!(data.entities().get(2).unwrap().mention_count(), 2);
assert_eq!(data.excerpts()[0].related_entities(), &[1, 2]);
assert_eq!(data.excerpts()[1].related_entities(), &[2]);
# Ok::<(), mobi_xray::Error>(())
```

Writing the database is then a single call:

```no_run
# use mobi_xray::{CompanionData, ExtractOptions, Vocabulary};
# let book: Vec<u8> = Vec::new();
# let vocabulary = Vocabulary::new();
# let data = CompanionData::extract(&book, &vocabulary, &ExtractOptions::default())?;
use mobi_xray::xray_file_name;

data.write(xray_file_name("B000000000"), "https://example.com/book")?;
# Ok::<(), mobi_xray::Error>(())
```

## Patching the ASIN

A reader only associates the database with the book when the book's EXTH identifier records hold
the same ASIN. [patch_identifier] rewrites both records in place:

```rust
use mobi_xray::{patch_identifier, read_exth, ContainerBuilder, PatchOutcome};

let mut book = ContainerBuilder::new("Example")
    .exth_record(113, "B000000000")
    .exth_record(504, "B000000000")
    .build(b"<p>text</p>");

assert_eq!(patch_identifier(&mut book, "B111111111"), Ok(PatchOutcome::Patched));
assert_eq!(patch_identifier(&mut book, "B111111111"), Ok(PatchOutcome::Unchanged));
assert_eq!(read_exth(&book).unwrap().identifier(), Some(&b"B111111111"[..]));
```

## One Level Lower

Each stage is usable on its own: [MobiFile] reconstructs the markup stream, [ParagraphIndexer]
splits it into paragraphs with per character offsets, [EntityMatcher] records mentions,
[select_notable_clips] picks highlights, and [XrayWriter] serializes the result.

## Caveats

Caller is responsible for:

- Resolving the vocabulary (labels, descriptions, aliases, quotes) ahead of time
- Knowing whether the markup comes from a KF7 or KF8 section ([ContainerVariant])
- Serializing writes to the same output path

Encrypted books are rejected.

*/

pub mod clips;
pub mod container;
mod book;
mod encoding;
mod entity;
mod errors;
mod index;
mod matcher;
pub(crate) mod util;
mod vocabulary;
pub mod writer;

pub use self::book::*;
pub use self::clips::{select_notable_clips, ClipPadding, NotableClips};
pub use self::container::{
    patch_identifier, read_book_text, read_exth, xray_file_name, BookText, Compression,
    ContainerBuilder, DocumentType, ExthRecord, ExthSection, FormatError, MobiFile, PatchOutcome,
};
pub use self::encoding::*;
pub use self::entity::*;
pub use self::errors::*;
pub use self::index::*;
pub use self::matcher::*;
pub use self::vocabulary::*;
pub use self::writer::{write_xray_db, BookMetadataSummary, XrayWriter};
