use crate::container::{
    errors::FormatError,
    header::{BookHeader, Compression, PdbHeader},
    huffcdic::HuffCdicReader,
    palmdoc,
};
use crate::encoding::Codec;
use tracing::{debug, trace, warn};

/// A parsed MOBI or PalmDOC container backed by a byte slice
#[derive(Debug, Clone)]
pub struct MobiFile<'a> {
    data: &'a [u8],
    pdb: PdbHeader,
    header: BookHeader,
}

impl<'a> MobiFile<'a> {
    /// Parses the palm database header and record 0
    pub fn from_slice(data: &'a [u8]) -> Result<Self, FormatError> {
        let pdb = PdbHeader::from_slice(data)?;
        let record0 = pdb
            .record_range(0)
            .and_then(|range| data.get(range))
            .ok_or(FormatError::InvalidContainer)?;
        let header = BookHeader::from_record(record0, pdb.doc_type())?;

        debug!(
            name = %pdb.name(),
            records = pdb.record_count(),
            text_records = header.text_records(),
            compression = ?header.compression(),
            codec = header.codec().name(),
            "parsed container header"
        );

        Ok(MobiFile { data, pdb, header })
    }

    /// The palm database header
    pub fn pdb(&self) -> &PdbHeader {
        &self.pdb
    }

    /// The PalmDOC and MOBI header fields of record 0
    pub fn header(&self) -> &BookHeader {
        &self.header
    }

    /// Codec of the text stream
    pub fn codec(&self) -> Codec {
        self.header.codec()
    }

    /// The raw bytes of a record
    pub fn record(&self, index: usize) -> Option<&'a [u8]> {
        self.pdb
            .record_range(index)
            .and_then(|range| self.data.get(range))
    }

    /// The book's full name as stored in record 0, falling back to the
    /// database name
    pub fn title(&self) -> String {
        let full_name = self.header.mobi().and_then(|mobi| {
            let record0 = self.record(0)?;
            record0.get(mobi.full_name())
        });

        match full_name {
            Some(name) if !name.is_empty() => self.codec().decode(name).into_owned(),
            _ => self.pdb.name(),
        }
    }

    /// Decompresses every text record and reconstructs the book's markup
    pub fn text(&self) -> Result<BookText, FormatError> {
        if self.header.encryption() != 0 {
            return Err(FormatError::Encrypted(self.header.encryption()));
        }

        let mut decoder = self.decoder()?;
        let count = usize::from(self.header.text_records());
        let extra_flags = self.header.extra_flags();
        let mut markup = Vec::with_capacity(self.header.text_length() as usize);

        for index in 1..=count {
            let Some(record) = self.record(index) else {
                warn!(index, count, "text record missing from record table");
                return Err(FormatError::InvalidContainer);
            };

            let trailing = trailing_entries_len(record, extra_flags);
            let record = &record[..record.len() - trailing];
            trace!(index, len = record.len(), trailing, "decoding text record");
            decoder.decode(record, &mut markup)?;
        }

        let codec = self.codec();
        markup.retain(|&b| b != 0);
        if markup.last() == Some(&b'#') {
            markup.pop();
        }

        if codec.is_single_byte() {
            // record and group separators leak from some converters
            markup.retain(|&b| b != 0x1e && b != 0x02);
        }

        debug!(
            records = count,
            bytes = markup.len(),
            declared = self.header.text_length(),
            "reconstructed text stream"
        );

        Ok(BookText { markup, codec })
    }

    fn decoder(&self) -> Result<TextDecoder, FormatError> {
        match self.header.compression() {
            Compression::None => Ok(TextDecoder::Raw),
            Compression::PalmDoc => Ok(TextDecoder::PalmDoc),
            Compression::HuffCdic => {
                let range = self
                    .header
                    .mobi()
                    .map(|m| m.huffman_records())
                    .filter(|r| !r.is_empty())
                    .ok_or(FormatError::InvalidHuffmanData("no HUFF records declared"))?;

                let huff = self
                    .record(range.start)
                    .ok_or(FormatError::InvalidHuffmanData("HUFF record missing"))?;
                let cdics = (range.start + 1..range.end)
                    .map(|i| self.record(i))
                    .collect::<Option<Vec<_>>>()
                    .ok_or(FormatError::InvalidHuffmanData("CDIC record missing"))?;

                let reader = HuffCdicReader::new(huff, &cdics)?;
                Ok(TextDecoder::HuffCdic(Box::new(reader)))
            }
            Compression::Other(code) => Err(FormatError::UnsupportedCompression(code)),
        }
    }
}

enum TextDecoder {
    Raw,
    PalmDoc,
    HuffCdic(Box<HuffCdicReader>),
}

impl TextDecoder {
    fn decode(&mut self, record: &[u8], out: &mut Vec<u8>) -> Result<(), FormatError> {
        match self {
            TextDecoder::Raw => out.extend_from_slice(record),
            TextDecoder::PalmDoc => out.extend_from_slice(&palmdoc::decompress(record)?),
            TextDecoder::HuffCdic(reader) => out.extend_from_slice(&reader.unpack(record)?),
        }
        Ok(())
    }
}

/// The reconstructed markup of a book and the codec it is encoded with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookText {
    markup: Vec<u8>,
    codec: Codec,
}

impl BookText {
    /// Wraps an already reconstructed markup stream
    pub fn new(markup: Vec<u8>, codec: Codec) -> Self {
        BookText { markup, codec }
    }

    /// The markup bytes
    pub fn markup(&self) -> &[u8] {
        &self.markup
    }

    /// The codec of the markup
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Consumes the text, returning the markup bytes
    pub fn into_markup(self) -> Vec<u8> {
        self.markup
    }
}

/// Reads a book's markup stream from container bytes
pub fn read_book_text(data: &[u8]) -> Result<BookText, FormatError> {
    MobiFile::from_slice(data)?.text()
}

/// Size of the trailing entries appended to a text record.
///
/// Each set bit above bit 0 in `flags` adds an entry whose size is stored
/// as a backwards variable width integer at the end of the record. Bit 0
/// adds the multibyte overlap bytes whose count is in the low two bits of
/// the last remaining byte.
pub(crate) fn trailing_entries_len(data: &[u8], flags: u16) -> usize {
    let mut total = 0usize;
    let mut bits = flags >> 1;
    while bits != 0 {
        if bits & 1 != 0 {
            let end = data.len().saturating_sub(total);
            total = total.saturating_add(backward_varint(&data[..end]));
        }
        bits >>= 1;
    }

    if flags & 1 != 0 {
        let end = data.len().saturating_sub(total);
        if let Some(&last) = data[..end].last() {
            total += usize::from(last & 0x3) + 1;
        }
    }

    total.min(data.len())
}

fn backward_varint(data: &[u8]) -> usize {
    let mut result = 0usize;
    let mut shift = 0;
    for &b in data.iter().rev() {
        result |= usize::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 != 0 || shift >= 28 {
            break;
        }
    }
    result
}
