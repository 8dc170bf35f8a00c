//! Read and patch MOBI e-book containers.
//!
//! A MOBI file is a Palm database: a 78 byte header followed by a table of
//! record offsets. Record 0 holds the PalmDOC header, the MOBI header, the
//! optional EXTH metadata section and the book's full name. The following
//! records hold the book's markup, optionally compressed.
//!
//! ```text
//! Palm database
//! ├── PdbHeader ─ name, type/creator tag, record table
//! ├── record 0  ─ BookHeader (PalmDOC + MOBI), EXTH, full name
//! ├── record 1..=n text records (None | PalmDoc | HuffCdic)
//! └── HUFF + CDIC records when text is huffman coded
//! ```
//!
//! [`MobiFile`] reconstructs the markup stream, [`patch_identifier`]
//! rewrites the EXTH identifier records, and [`ContainerBuilder`] assembles
//! containers from markup.

mod builder;
mod errors;
mod exth;
mod file;
mod header;
pub mod huffcdic;
pub mod palmdoc;

pub use builder::*;
pub use errors::*;
pub use exth::*;
pub use file::*;
pub use header::*;
