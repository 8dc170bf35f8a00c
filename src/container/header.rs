use crate::container::errors::FormatError;
use crate::encoding::Codec;
use crate::util::{be_u16, be_u32};
use std::ops::Range;

/// The document type and creator tag of a palm database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    /// `BOOKMOBI`: a MOBI e-book with a MOBI header in record 0
    BookMobi,

    /// `TEXtREAd`: a plain PalmDOC text document
    TextRead,
}

impl DocumentType {
    /// Resolves the 8 byte type/creator tag
    pub fn from_tag(tag: &[u8; 8]) -> Option<DocumentType> {
        match tag {
            b"BOOKMOBI" => Some(DocumentType::BookMobi),
            b"TEXtREAd" => Some(DocumentType::TextRead),
            _ => None,
        }
    }

    /// The tag as it appears in the palm database header
    pub fn tag(&self) -> &'static [u8; 8] {
        match self {
            DocumentType::BookMobi => b"BOOKMOBI",
            DocumentType::TextRead => b"TEXtREAd",
        }
    }
}

/// The palm database header and record table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbHeader {
    name: [u8; 32],
    doc_type: DocumentType,
    offsets: Vec<usize>,
    data_len: usize,
}

impl PdbHeader {
    /// Length of the fixed portion of the header
    pub const SIZE: usize = 78;

    /// Length of one entry in the record table
    pub const RECORD_INFO_SIZE: usize = 8;

    pub(crate) const TYPE_OFFSET: usize = 60;
    pub(crate) const RECORD_COUNT_OFFSET: usize = 76;

    /// Parses the header and validates the record table against the length
    /// of `data`
    pub fn from_slice(data: &[u8]) -> Result<Self, FormatError> {
        let header: &[u8; Self::SIZE] = data
            .first_chunk()
            .ok_or(FormatError::InvalidContainer)?;

        let mut name = [0u8; 32];
        name.copy_from_slice(&header[..32]);

        let tag = read_tag(data).ok_or(FormatError::InvalidContainer)?;
        let doc_type = DocumentType::from_tag(&tag).ok_or(FormatError::InvalidContainer)?;

        let count = be_u16(header, Self::RECORD_COUNT_OFFSET)
            .map(usize::from)
            .ok_or(FormatError::InvalidContainer)?;
        if count == 0 {
            return Err(FormatError::InvalidContainer);
        }

        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let entry = Self::SIZE + i * Self::RECORD_INFO_SIZE;
            let offset = be_u32(data, entry).ok_or(FormatError::InvalidContainer)? as usize;
            let previous = offsets.last().copied().unwrap_or(0);
            if offset > data.len() || offset < previous {
                return Err(FormatError::InvalidContainer);
            }
            offsets.push(offset);
        }

        Ok(PdbHeader {
            name,
            doc_type,
            offsets,
            data_len: data.len(),
        })
    }

    /// The database name with trailing NULs removed
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// The document type tag
    pub fn doc_type(&self) -> DocumentType {
        self.doc_type
    }

    /// Number of records in the database
    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    /// Byte offset of each record
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Byte range of a record. The last record extends to the end of input.
    pub fn record_range(&self, index: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(index)?;
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.data_len);
        Some(start..end)
    }
}

/// Reads the raw type/creator tag without validating the rest of the header
pub(crate) fn read_tag(data: &[u8]) -> Option<[u8; 8]> {
    data.get(PdbHeader::TYPE_OFFSET..)?.first_chunk::<8>().copied()
}

/// How text records are compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Text is stored as is
    None,

    /// PalmDOC LZ77 byte oriented compression
    PalmDoc,

    /// Huffman coding over a phrase dictionary (HUFF + CDIC records)
    HuffCdic,

    /// An unknown compression code
    Other(u16),
}

impl Compression {
    /// Creates a compression from its header code
    pub fn new(code: u16) -> Compression {
        match code {
            1 => Compression::None,
            2 => Compression::PalmDoc,
            17480 => Compression::HuffCdic,
            x => Compression::Other(x),
        }
    }

    /// Returns the header code of this compression
    pub fn value(&self) -> u16 {
        match self {
            Compression::None => 1,
            Compression::PalmDoc => 2,
            Compression::HuffCdic => 17480,
            Compression::Other(x) => *x,
        }
    }
}

/// Fields of the MOBI header that the reader and patcher rely on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobiHeader {
    header_len: u32,
    mobi_type: u32,
    text_encoding: u32,
    version: u32,
    full_name_offset: u32,
    full_name_len: u32,
    huff_record: u32,
    huff_count: u32,
    exth_flags: u32,
    extra_flags: u16,
}

impl MobiHeader {
    /// Offset of the MOBI header within record 0
    pub const OFFSET: usize = 16;

    pub(crate) const FULL_NAME_OFFSET: usize = 0x54;
    pub(crate) const EXTH_FLAGS_OFFSET: usize = 0x80;
    pub(crate) const EXTRA_FLAGS_OFFSET: usize = 0xf2;
    const EXTH_PRESENT: u32 = 0x40;

    fn from_record(record: &[u8]) -> Result<Option<Self>, FormatError> {
        if record.get(Self::OFFSET..Self::OFFSET + 4) != Some(b"MOBI") {
            return Ok(None);
        }

        let field = |offset: usize| be_u32(record, offset).ok_or(FormatError::InvalidContainer);
        let header_len = field(0x14)?;
        let mobi_type = field(0x18)?;
        let text_encoding = field(0x1c)?;
        let full_name_offset = field(Self::FULL_NAME_OFFSET)?;
        let full_name_len = field(Self::FULL_NAME_OFFSET + 4)?;
        let version = field(0x68)?;

        // Optional fields are only read when the header declares itself long
        // enough to contain them
        let declared_end = Self::OFFSET + header_len as usize;
        let optional = |offset: usize| {
            if offset + 4 <= declared_end {
                be_u32(record, offset)
            } else {
                None
            }
        };
        let huff_record = optional(0x70).unwrap_or(0);
        let huff_count = optional(0x74).unwrap_or(0);
        let exth_flags = optional(Self::EXTH_FLAGS_OFFSET).unwrap_or(0);
        let extra_flags = if version >= 5 && header_len >= 0xe4 {
            be_u16(record, Self::EXTRA_FLAGS_OFFSET).unwrap_or(0)
        } else {
            0
        };

        Ok(Some(MobiHeader {
            header_len,
            mobi_type,
            text_encoding,
            version,
            full_name_offset,
            full_name_len,
            huff_record,
            huff_count,
            exth_flags,
            extra_flags,
        }))
    }

    /// Declared length of the MOBI header
    pub fn header_len(&self) -> u32 {
        self.header_len
    }

    /// MOBI document type (2 for books)
    pub fn mobi_type(&self) -> u32 {
        self.mobi_type
    }

    /// Raw text encoding code page
    pub fn text_encoding(&self) -> u32 {
        self.text_encoding
    }

    /// Minimum reader version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Byte range of the full name within record 0
    pub fn full_name(&self) -> Range<usize> {
        let start = self.full_name_offset as usize;
        start..start + self.full_name_len as usize
    }

    /// Record index of the HUFF record and number of HUFF + CDIC records
    pub fn huffman_records(&self) -> Range<usize> {
        let start = self.huff_record as usize;
        start..start + self.huff_count as usize
    }

    /// Returns true if the EXTH section is flagged as present
    pub fn has_exth(&self) -> bool {
        self.exth_flags & Self::EXTH_PRESENT != 0
    }

    /// Offset within record 0 where the EXTH section starts
    pub fn exth_start(&self) -> usize {
        Self::OFFSET + self.header_len as usize
    }

    /// Flags describing trailing entries appended to each text record
    pub fn extra_flags(&self) -> u16 {
        self.extra_flags
    }
}

/// Header fields stored in record 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookHeader {
    compression: Compression,
    text_length: u32,
    text_records: u16,
    record_size: u16,
    encryption: u16,
    mobi: Option<MobiHeader>,
}

impl BookHeader {
    /// Length of the PalmDOC header at the start of record 0
    pub const PALMDOC_SIZE: usize = 16;

    /// Parses the PalmDOC header and, for MOBI books, the MOBI header
    pub fn from_record(record: &[u8], doc_type: DocumentType) -> Result<Self, FormatError> {
        if record.len() < Self::PALMDOC_SIZE {
            return Err(FormatError::InvalidContainer);
        }

        let field16 = |offset: usize| be_u16(record, offset).ok_or(FormatError::InvalidContainer);
        let compression = Compression::new(field16(0)?);
        let text_length = be_u32(record, 4).ok_or(FormatError::InvalidContainer)?;
        let text_records = field16(8)?;
        let record_size = field16(10)?;
        let encryption = field16(12)?;

        let mobi = match doc_type {
            DocumentType::BookMobi => MobiHeader::from_record(record)?,
            DocumentType::TextRead => None,
        };

        Ok(BookHeader {
            compression,
            text_length,
            text_records,
            record_size,
            encryption,
            mobi,
        })
    }

    /// Compression applied to the text records
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Uncompressed length of the text as declared by the header
    pub fn text_length(&self) -> u32 {
        self.text_length
    }

    /// Number of text records following record 0
    pub fn text_records(&self) -> u16 {
        self.text_records
    }

    /// Maximum uncompressed size of a text record
    pub fn record_size(&self) -> u16 {
        self.record_size
    }

    /// Encryption type, 0 when unencrypted
    pub fn encryption(&self) -> u16 {
        self.encryption
    }

    /// The MOBI header, absent for plain PalmDOC documents
    pub fn mobi(&self) -> Option<&MobiHeader> {
        self.mobi.as_ref()
    }

    /// The codec of the text. Documents without a MOBI header are Windows-1252.
    pub fn codec(&self) -> Codec {
        self.mobi
            .as_ref()
            .map(|m| Codec::from_code(m.text_encoding))
            .unwrap_or(Codec::Windows1252)
    }

    /// Trailing entry flags, 0 when the header doesn't declare them
    pub fn extra_flags(&self) -> u16 {
        self.mobi.as_ref().map_or(0, |m| m.extra_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdb(tag: &[u8; 8], offsets: &[u32], total_len: usize) -> Vec<u8> {
        let mut data = vec![0u8; PdbHeader::SIZE];
        data[..4].copy_from_slice(b"Book");
        data[60..68].copy_from_slice(tag);
        data[76..78].copy_from_slice(&(offsets.len() as u16).to_be_bytes());
        for (i, offset) in offsets.iter().enumerate() {
            data.extend_from_slice(&offset.to_be_bytes());
            data.extend_from_slice(&[0, 0, 0, (i * 2) as u8]);
        }
        data.resize(total_len, 0);
        data
    }

    #[test]
    fn test_pdb_header() {
        let data = pdb(b"BOOKMOBI", &[100, 120, 150], 200);
        let header = PdbHeader::from_slice(&data).unwrap();
        assert_eq!(header.name(), "Book");
        assert_eq!(header.doc_type(), DocumentType::BookMobi);
        assert_eq!(header.record_count(), 3);
        assert_eq!(header.record_range(0), Some(100..120));
        assert_eq!(header.record_range(2), Some(150..200));
        assert_eq!(header.record_range(3), None);
    }

    #[test]
    fn test_pdb_header_text_read() {
        let data = pdb(b"TEXtREAd", &[100], 120);
        let header = PdbHeader::from_slice(&data).unwrap();
        assert_eq!(header.doc_type(), DocumentType::TextRead);
    }

    #[test]
    fn test_pdb_header_rejects_unknown_tag() {
        let data = pdb(b"DataPlkr", &[100], 120);
        assert_eq!(
            PdbHeader::from_slice(&data),
            Err(FormatError::InvalidContainer)
        );
    }

    #[test]
    fn test_pdb_header_rejects_out_of_range_offsets() {
        let data = pdb(b"BOOKMOBI", &[100, 500], 200);
        assert!(PdbHeader::from_slice(&data).is_err());

        let data = pdb(b"BOOKMOBI", &[150, 100], 200);
        assert!(PdbHeader::from_slice(&data).is_err());

        assert!(PdbHeader::from_slice(&[0u8; 40]).is_err());
    }

    #[test]
    fn test_compression_codes() {
        assert_eq!(Compression::new(1), Compression::None);
        assert_eq!(Compression::new(2), Compression::PalmDoc);
        assert_eq!(Compression::new(17480), Compression::HuffCdic);
        assert_eq!(Compression::new(7), Compression::Other(7));
        assert_eq!(Compression::HuffCdic.value(), u16::from_be_bytes(*b"DH"));
    }

    #[test]
    fn test_text_read_defaults_to_windows1252() {
        let mut record = vec![0u8; 16];
        record[..2].copy_from_slice(&2u16.to_be_bytes());
        record[8..10].copy_from_slice(&3u16.to_be_bytes());
        let header = BookHeader::from_record(&record, DocumentType::TextRead).unwrap();
        assert_eq!(header.compression(), Compression::PalmDoc);
        assert_eq!(header.text_records(), 3);
        assert_eq!(header.codec(), Codec::Windows1252);
        assert!(header.mobi().is_none());
    }
}
