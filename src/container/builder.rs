use crate::container::{
    exth::{ExthRecord, ExthSection},
    header::{BookHeader, Compression, DocumentType, MobiHeader, PdbHeader},
    huffcdic, palmdoc,
};
use crate::encoding::Codec;
use crate::util::put_be_u32;

/// Assembles a container from markup.
///
/// Produces a palm database with a PalmDOC header and, for `BOOKMOBI`
/// documents, a MOBI header, optional EXTH section and full name in record
/// 0. Markup is split into records of `record_size` bytes and compressed
/// with the chosen scheme. HUFF/CDIC books use identity code tables.
///
/// ```
/// use mobi_xray::{Codec, Compression, ContainerBuilder, MobiFile};
///
/// let data = ContainerBuilder::new("Example")
///     .codec(Codec::Utf8)
///     .compression(Compression::PalmDoc)
///     .build(b"<p>Hello</p>");
///
/// let file = MobiFile::from_slice(&data).unwrap();
/// assert_eq!(file.title(), "Example");
/// assert_eq!(file.text().unwrap().markup(), b"<p>Hello</p>");
/// ```
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    title: String,
    doc_type: DocumentType,
    codec: Codec,
    compression: Compression,
    record_size: usize,
    exth: Option<ExthSection>,
}

impl ContainerBuilder {
    const MOBI_HEADER_LEN: u32 = 0xe8;

    /// Starts a `BOOKMOBI` container with the given title
    pub fn new(title: impl Into<String>) -> Self {
        ContainerBuilder {
            title: title.into(),
            doc_type: DocumentType::BookMobi,
            codec: Codec::Utf8,
            compression: Compression::PalmDoc,
            record_size: 4096,
            exth: None,
        }
    }

    /// Sets the document type. `TEXtREAd` documents have no MOBI header.
    pub fn doc_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = doc_type;
        self
    }

    /// Sets the codec written to the MOBI header
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the compression. [`Compression::Other`] codes are written as is
    /// with uncompressed records.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the maximum uncompressed size of a text record
    pub fn record_size(mut self, size: usize) -> Self {
        self.record_size = size.clamp(1, usize::from(u16::MAX));
        self
    }

    /// Appends an EXTH record, creating the section on first use
    pub fn exth_record(mut self, kind: u32, data: impl Into<Vec<u8>>) -> Self {
        let mut records = self.exth.take().map(|e| e.records().to_vec()).unwrap_or_default();
        records.push(ExthRecord::new(kind, data));
        self.exth = Some(ExthSection::new(records));
        self
    }

    /// Builds the container bytes
    pub fn build(&self, markup: &[u8]) -> Vec<u8> {
        let chunks: Vec<&[u8]> = markup.chunks(self.record_size).collect();
        let mut records: Vec<Vec<u8>> = Vec::with_capacity(chunks.len() + 3);
        records.push(Vec::new());

        let mut huffman = None;
        for chunk in &chunks {
            let record = match self.compression {
                Compression::PalmDoc => palmdoc::compress(chunk),
                _ => chunk.to_vec(),
            };
            records.push(record);
        }

        if self.compression == Compression::HuffCdic {
            let (huff, cdic) = huffcdic::identity_tables();
            huffman = Some(records.len());
            records.push(huff);
            records.push(cdic);
        }

        records[0] = self.record0(markup.len(), chunks.len(), huffman);
        assemble(&self.title, self.doc_type, &records)
    }

    fn record0(&self, text_len: usize, text_records: usize, huffman: Option<usize>) -> Vec<u8> {
        let mut record = Vec::with_capacity(1024);
        record.extend_from_slice(&self.compression.value().to_be_bytes());
        record.extend_from_slice(&[0, 0]);
        record.extend_from_slice(&(text_len as u32).to_be_bytes());
        record.extend_from_slice(&(text_records as u16).to_be_bytes());
        record.extend_from_slice(&(self.record_size as u16).to_be_bytes());
        record.extend_from_slice(&[0; 4]);
        debug_assert_eq!(record.len(), BookHeader::PALMDOC_SIZE);

        if self.doc_type == DocumentType::TextRead {
            return record;
        }

        let header_end = MobiHeader::OFFSET + Self::MOBI_HEADER_LEN as usize;
        record.resize(header_end, 0);
        record[16..20].copy_from_slice(b"MOBI");
        put_be_u32(&mut record, 0x14, Self::MOBI_HEADER_LEN);
        put_be_u32(&mut record, 0x18, 2);
        put_be_u32(&mut record, 0x1c, self.codec.code());
        put_be_u32(&mut record, 0x24, 6);
        put_be_u32(&mut record, 0x50, (text_records + 1) as u32);
        put_be_u32(&mut record, 0x5c, 9);
        put_be_u32(&mut record, 0x68, 6);
        put_be_u32(&mut record, 0x6c, u32::MAX);
        if let Some(index) = huffman {
            put_be_u32(&mut record, 0x70, index as u32);
            put_be_u32(&mut record, 0x74, 2);
        }

        if let Some(exth) = &self.exth {
            put_be_u32(&mut record, MobiHeader::EXTH_FLAGS_OFFSET, 0x50);
            exth.write(&mut record);
        }

        let title = self.codec_title();
        let full_name_offset = record.len() as u32;
        put_be_u32(&mut record, MobiHeader::FULL_NAME_OFFSET, full_name_offset);
        put_be_u32(&mut record, MobiHeader::FULL_NAME_OFFSET + 4, title.len() as u32);
        record.extend_from_slice(&title);
        record.extend_from_slice(&[0, 0]);
        record.resize(record.len().next_multiple_of(4), 0);
        record
    }

    fn codec_title(&self) -> Vec<u8> {
        match self.codec {
            Codec::Utf8 => self.title.as_bytes().to_vec(),
            Codec::Windows1252 => self
                .title
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

fn assemble(title: &str, doc_type: DocumentType, records: &[Vec<u8>]) -> Vec<u8> {
    let table_len = records.len() * PdbHeader::RECORD_INFO_SIZE;
    let first = PdbHeader::SIZE + table_len + 2;
    let total = first + records.iter().map(Vec::len).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    let mut name: Vec<u8> = title
        .bytes()
        .map(|b| if b.is_ascii_alphanumeric() { b } else { b'_' })
        .take(31)
        .collect();
    name.resize(32, 0);
    out.extend_from_slice(&name);
    out.resize(PdbHeader::TYPE_OFFSET, 0);
    out.extend_from_slice(doc_type.tag());
    out.resize(PdbHeader::RECORD_COUNT_OFFSET, 0);
    out.extend_from_slice(&(records.len() as u16).to_be_bytes());

    let mut offset = first;
    for (i, record) in records.iter().enumerate() {
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        let uid = (i as u32 * 2).to_be_bytes();
        out.push(0);
        out.extend_from_slice(&uid[1..]);
        offset += record.len();
    }

    out.extend_from_slice(&[0, 0]);
    for record in records {
        out.extend_from_slice(record);
    }

    out
}
