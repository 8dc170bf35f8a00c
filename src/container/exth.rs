use crate::container::{
    errors::FormatError,
    header::{read_tag, BookHeader, DocumentType, MobiHeader, PdbHeader},
};
use crate::util::{get_split, pad4, put_be_u32};
use tracing::{debug, info};

/// EXTH record holding the catalog identifier (ASIN)
pub const EXTH_ASIN: u32 = 113;

/// Second EXTH record that readers consult for the catalog identifier
pub const EXTH_ASIN_ALT: u32 = 504;

/// One record of the EXTH metadata section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthRecord {
    /// Record type id
    pub kind: u32,

    /// Payload, excluding the 8 byte record prefix
    pub data: Vec<u8>,
}

impl ExthRecord {
    /// Creates a record of the given type
    pub fn new(kind: u32, data: impl Into<Vec<u8>>) -> Self {
        ExthRecord {
            kind,
            data: data.into(),
        }
    }

    fn encoded_len(&self) -> usize {
        8 + self.data.len()
    }
}

/// The EXTH metadata section of a MOBI header
///
/// ```text
/// "EXTH" | section length u32 | record count u32 | records... | NUL padding
/// record: type u32 | length u32 (including these 8 bytes) | payload
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExthSection {
    records: Vec<ExthRecord>,
}

impl ExthSection {
    const HEADER_SIZE: usize = 12;

    /// Creates a section from records, kept in the given order
    pub fn new(records: Vec<ExthRecord>) -> Self {
        ExthSection { records }
    }

    /// Parses a section at the start of `data`
    pub fn from_slice(data: &[u8]) -> Result<Self, FormatError> {
        let err = FormatError::InvalidContainer;
        let (tag, rest) = get_split::<4>(data).ok_or(err.clone())?;
        if &tag != b"EXTH" {
            return Err(FormatError::MissingMetadataSection);
        }

        let (_len, rest) = get_split::<4>(rest).ok_or(err.clone())?;
        let (count, mut rest) = get_split::<4>(rest).ok_or(err.clone())?;
        let count = u32::from_be_bytes(count) as usize;

        let mut records = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            let (kind, tail) = get_split::<4>(rest).ok_or(err.clone())?;
            let (len, tail) = get_split::<4>(tail).ok_or(err.clone())?;
            let len = u32::from_be_bytes(len) as usize;
            let payload_len = len.checked_sub(8).ok_or(err.clone())?;
            let payload = tail.get(..payload_len).ok_or(err.clone())?;
            records.push(ExthRecord::new(u32::from_be_bytes(kind), payload));
            rest = &tail[payload_len..];
        }

        Ok(ExthSection { records })
    }

    /// The records in section order
    pub fn records(&self) -> &[ExthRecord] {
        &self.records
    }

    /// Payload of the first record of the given type
    pub fn get(&self, kind: u32) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.data.as_slice())
    }

    /// The catalog identifier, if present
    pub fn identifier(&self) -> Option<&[u8]> {
        self.get(EXTH_ASIN)
    }

    /// Replaces both identifier records with `value`, keeping every other
    /// record, then orders records by type id
    pub fn set_identifier(&mut self, value: &[u8]) {
        self.records
            .retain(|r| r.kind != EXTH_ASIN && r.kind != EXTH_ASIN_ALT);
        self.records.push(ExthRecord::new(EXTH_ASIN, value));
        self.records.push(ExthRecord::new(EXTH_ASIN_ALT, value));
        self.records.sort_by_key(|r| r.kind);
    }

    /// Section length as written in the header: header plus records,
    /// excluding padding
    pub fn declared_len(&self) -> usize {
        Self::HEADER_SIZE + self.records.iter().map(ExthRecord::encoded_len).sum::<usize>()
    }

    /// Number of bytes the section occupies once padded
    pub fn padded_len(&self) -> usize {
        let len = self.declared_len();
        len + pad4(len)
    }

    /// Serializes the section, including its padding
    pub fn write(&self, out: &mut Vec<u8>) {
        let len = self.declared_len();
        out.reserve(self.padded_len());
        out.extend_from_slice(b"EXTH");
        out.extend_from_slice(&(len as u32).to_be_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_be_bytes());
        for record in &self.records {
            out.extend_from_slice(&record.kind.to_be_bytes());
            out.extend_from_slice(&(record.encoded_len() as u32).to_be_bytes());
            out.extend_from_slice(&record.data);
        }
        out.resize(out.len() + pad4(len), 0);
    }
}

/// Result of a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The identifier already held the value, the buffer is untouched
    Unchanged,

    /// Record 0 was rewritten within its original size
    Patched,

    /// Record 0 grew and the following records were shifted
    Resized { delta: usize },
}

/// Reads the EXTH section of a `BOOKMOBI` container
pub fn read_exth(data: &[u8]) -> Result<ExthSection, FormatError> {
    let (_, record0, mobi) = locate(data)?;
    ExthSection::from_slice(&record0[mobi.exth_start()..])
}

/// Sets the catalog identifier records of a `BOOKMOBI` container.
///
/// Record 0 is rebuilt from the MOBI header, the new EXTH section and the
/// book's full name. When that fits in the original record 0 it is NUL
/// padded to the old size and no other byte of the container moves.
/// Otherwise the following records are shifted and the record table
/// updated. `buf` is only replaced once the new container is complete.
pub fn patch_identifier(buf: &mut Vec<u8>, value: &str) -> Result<PatchOutcome, FormatError> {
    let (pdb, record0, mobi) = locate(buf)?;
    let exth_start = mobi.exth_start();
    let mut exth = ExthSection::from_slice(&record0[exth_start..])?;

    if exth.identifier() == Some(value.as_bytes()) {
        debug!(value, "identifier already set");
        return Ok(PatchOutcome::Unchanged);
    }

    let title = record0
        .get(mobi.full_name())
        .ok_or(FormatError::InvalidContainer)?;

    exth.set_identifier(value.as_bytes());

    let mut new_record0 = Vec::with_capacity(record0.len());
    new_record0.extend_from_slice(&record0[..exth_start]);
    exth.write(&mut new_record0);
    let title_offset = new_record0.len();
    new_record0.extend_from_slice(title);
    new_record0.extend_from_slice(&[0, 0]);
    new_record0.resize(new_record0.len().next_multiple_of(4), 0);
    put_be_u32(&mut new_record0, MobiHeader::FULL_NAME_OFFSET, title_offset as u32);

    let old_len = record0.len();
    let range = pdb.record_range(0).ok_or(FormatError::InvalidContainer)?;
    let outcome = if new_record0.len() <= old_len {
        new_record0.resize(old_len, 0);
        PatchOutcome::Patched
    } else {
        PatchOutcome::Resized {
            delta: new_record0.len() - old_len,
        }
    };

    let mut patched = Vec::with_capacity(buf.len() - old_len + new_record0.len());
    patched.extend_from_slice(&buf[..range.start]);
    patched.extend_from_slice(&new_record0);
    patched.extend_from_slice(&buf[range.end..]);

    if let PatchOutcome::Resized { delta } = outcome {
        for (index, &offset) in pdb.offsets().iter().enumerate().skip(1) {
            let entry = PdbHeader::SIZE + index * PdbHeader::RECORD_INFO_SIZE;
            let shifted = u32::try_from(offset + delta).map_err(|_| FormatError::InvalidContainer)?;
            put_be_u32(&mut patched, entry, shifted);
        }
    }

    info!(
        value,
        records = exth.records().len(),
        exth_len = exth.padded_len(),
        outcome = ?outcome,
        "patched identifier records"
    );

    *buf = patched;
    Ok(outcome)
}

fn locate(data: &[u8]) -> Result<(PdbHeader, &[u8], MobiHeader), FormatError> {
    let tag = read_tag(data).ok_or(FormatError::InvalidContainer)?;
    if &tag != DocumentType::BookMobi.tag() {
        return Err(FormatError::UnsupportedDocumentType(tag));
    }

    let pdb = PdbHeader::from_slice(data)?;
    let record0 = pdb
        .record_range(0)
        .and_then(|range| data.get(range))
        .ok_or(FormatError::InvalidContainer)?;

    let header = BookHeader::from_record(record0, pdb.doc_type())?;
    let mobi = header
        .mobi()
        .cloned()
        .ok_or(FormatError::MissingMetadataSection)?;

    let exth_start = mobi.exth_start();
    if !mobi.has_exth() || record0.get(exth_start..exth_start + 4) != Some(b"EXTH") {
        return Err(FormatError::MissingMetadataSection);
    }

    Ok((pdb, record0, mobi))
}

/// File name readers expect for a book's X-Ray database
///
/// ```
/// assert_eq!(mobi_xray::xray_file_name("B000FC0SIM"), "XRAY.entities.B000FC0SIM.asc");
/// ```
pub fn xray_file_name(identifier: &str) -> String {
    format!("XRAY.entities.{}.asc", identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::be_u32;

    #[test]
    fn test_section_round_trip() {
        let section = ExthSection::new(vec![
            ExthRecord::new(100, "Jane Doe"),
            ExthRecord::new(EXTH_ASIN, "B000000000"),
        ]);

        let mut out = Vec::new();
        section.write(&mut out);
        assert_eq!(out.len(), section.padded_len());
        assert_eq!(out.len() % 4, 0);
        assert_eq!(&out[..4], b"EXTH");
        assert_eq!(be_u32(&out, 4), Some(section.declared_len() as u32));

        let parsed = ExthSection::from_slice(&out).unwrap();
        assert_eq!(parsed, section);
        assert_eq!(parsed.identifier(), Some(&b"B000000000"[..]));
    }

    #[test]
    fn test_padding_is_never_empty() {
        // 12 byte header + 8 byte record + 4 byte payload = 24, a multiple of 4
        let section = ExthSection::new(vec![ExthRecord::new(1, "abcd")]);
        assert_eq!(section.declared_len(), 24);
        assert_eq!(section.padded_len(), 28);
    }

    #[test]
    fn test_set_identifier_sorts_and_replaces() {
        let mut section = ExthSection::new(vec![
            ExthRecord::new(524, "en"),
            ExthRecord::new(EXTH_ASIN_ALT, "old"),
            ExthRecord::new(100, "Jane Doe"),
            ExthRecord::new(EXTH_ASIN, "old"),
        ]);
        section.set_identifier(b"B111111111");

        let kinds: Vec<u32> = section.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![100, EXTH_ASIN, EXTH_ASIN_ALT, 524]);
        assert_eq!(section.get(EXTH_ASIN), Some(&b"B111111111"[..]));
        assert_eq!(section.get(EXTH_ASIN_ALT), Some(&b"B111111111"[..]));
        assert_eq!(section.get(524), Some(&b"en"[..]));
    }

    #[test]
    fn test_truncated_section() {
        let section = ExthSection::new(vec![ExthRecord::new(100, "Jane Doe")]);
        let mut out = Vec::new();
        section.write(&mut out);
        assert_eq!(
            ExthSection::from_slice(&out[..20]),
            Err(FormatError::InvalidContainer)
        );
    }

    #[test]
    fn test_rejects_non_book_documents() {
        let mut data = vec![0u8; 100];
        data[60..68].copy_from_slice(b"TEXtREAd");
        assert_eq!(
            patch_identifier(&mut data, "B000000000"),
            Err(FormatError::UnsupportedDocumentType(*b"TEXtREAd"))
        );
    }
}
