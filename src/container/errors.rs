use std::fmt;

/// A malformed or unsupported container.
///
/// Always fatal for the book being processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The palm database header or its record table is invalid, or the
    /// document type is not a recognized e-book tag
    InvalidContainer,

    /// Text records use a compression scheme that isn't supported
    UnsupportedCompression(u16),

    /// The metadata section can only be patched in `BOOKMOBI` documents
    UnsupportedDocumentType([u8; 8]),

    /// The container has no EXTH section to patch
    MissingMetadataSection,

    /// The text records are encrypted
    Encrypted(u16),

    /// A PalmDOC back-reference points before the start of the output
    InvalidBackReference { distance: usize, position: usize },

    /// The HUFF/CDIC tables or the data coded with them are malformed
    InvalidHuffmanData(&'static str),
}

impl std::error::Error for FormatError {}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidContainer => write!(f, "invalid container"),
            FormatError::UnsupportedCompression(code) => {
                write!(f, "unsupported compression type: {}", code)
            }
            FormatError::UnsupportedDocumentType(tag) => write!(
                f,
                "unsupported document type: {}",
                String::from_utf8_lossy(tag)
            ),
            FormatError::MissingMetadataSection => {
                write!(f, "container has no EXTH metadata section")
            }
            FormatError::Encrypted(kind) => {
                write!(f, "text records are encrypted (type {})", kind)
            }
            FormatError::InvalidBackReference { distance, position } => write!(
                f,
                "palmdoc back-reference of distance {} at output position {}",
                distance, position
            ),
            FormatError::InvalidHuffmanData(msg) => write!(f, "invalid huffman data: {}", msg),
        }
    }
}
