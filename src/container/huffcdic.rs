//! HUFF/CDIC decoding.
//!
//! Text records are a bit stream of canonical huffman codes. A code indexes
//! into a phrase dictionary spread across one or more CDIC records. A
//! phrase is either final text or itself huffman coded, in which case it is
//! expanded on first use and memoized.
//!
//! The HUFF record carries two tables:
//!
//! - `dict1`: 256 entries keyed by the top byte of the next 32 bits, each
//!   packing a code length, a terminal flag, and the maximum code
//! - `dict2`: 32 pairs of minimum / maximum codes per code length, used when
//!   the code is longer than 8 bits

use crate::container::errors::FormatError;
use crate::util::{be_u16, be_u32, be_u64_padded};

const HUFF_MAGIC: &[u8; 8] = b"HUFF\x00\x00\x00\x18";
const CDIC_MAGIC: &[u8; 8] = b"CDIC\x00\x00\x00\x10";
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy)]
struct CodeEntry {
    len: u32,
    terminal: bool,
    max_code: u64,
}

#[derive(Debug, Clone)]
enum Phrase {
    Expanded(Vec<u8>),
    Coded(Vec<u8>),
    InProgress,
}

/// Decoder for huffman coded text records
#[derive(Debug, Clone)]
pub struct HuffCdicReader {
    dict1: Vec<CodeEntry>,
    min_codes: [u64; 33],
    max_codes: [u64; 33],
    phrases: Vec<Phrase>,
}

impl HuffCdicReader {
    /// Loads the HUFF record followed by its CDIC records
    pub fn new(huff: &[u8], cdics: &[&[u8]]) -> Result<Self, FormatError> {
        let mut reader = Self::from_huff(huff)?;
        for cdic in cdics {
            reader.load_cdic(cdic)?;
        }
        Ok(reader)
    }

    fn from_huff(huff: &[u8]) -> Result<Self, FormatError> {
        if huff.get(..8) != Some(&HUFF_MAGIC[..]) {
            return Err(FormatError::InvalidHuffmanData("bad HUFF magic"));
        }

        let table_err = FormatError::InvalidHuffmanData("truncated HUFF tables");
        let off1 = be_u32(huff, 8).ok_or(table_err.clone())? as usize;
        let off2 = be_u32(huff, 12).ok_or(table_err.clone())? as usize;

        let mut dict1 = Vec::with_capacity(256);
        for i in 0..256 {
            let v = be_u32(huff, off1 + i * 4).ok_or(table_err.clone())?;
            let len = v & 0x1f;
            let terminal = v & 0x80 != 0;
            if len == 0 || (len <= 8 && !terminal) {
                return Err(FormatError::InvalidHuffmanData("invalid code length"));
            }
            let max_code = ((u64::from(v >> 8) + 1) << (32 - len)).wrapping_sub(1);
            dict1.push(CodeEntry {
                len,
                terminal,
                max_code,
            });
        }

        let mut min_codes = [0u64; 33];
        let mut max_codes = [0u64; 33];
        max_codes[0] = (1u64 << 32) - 1;
        for len in 1..=32usize {
            let base = off2 + (len - 1) * 8;
            let min = be_u32(huff, base).ok_or(table_err.clone())?;
            let max = be_u32(huff, base + 4).ok_or(table_err.clone())?;
            min_codes[len] = u64::from(min) << (32 - len);
            max_codes[len] = ((u64::from(max) + 1) << (32 - len)).wrapping_sub(1);
        }

        Ok(HuffCdicReader {
            dict1,
            min_codes,
            max_codes,
            phrases: Vec::new(),
        })
    }

    fn load_cdic(&mut self, cdic: &[u8]) -> Result<(), FormatError> {
        if cdic.get(..8) != Some(&CDIC_MAGIC[..]) {
            return Err(FormatError::InvalidHuffmanData("bad CDIC magic"));
        }

        let err = FormatError::InvalidHuffmanData("truncated CDIC record");
        let total = be_u32(cdic, 8).ok_or(err.clone())? as usize;
        let bits = be_u32(cdic, 12).ok_or(err.clone())?;
        if bits > 16 {
            return Err(FormatError::InvalidHuffmanData("CDIC code bits too large"));
        }

        let count = (1usize << bits).min(total.saturating_sub(self.phrases.len()));
        for i in 0..count {
            let offset = usize::from(be_u16(cdic, 16 + i * 2).ok_or(err.clone())?);
            let blen = be_u16(cdic, 16 + offset).ok_or(err.clone())?;
            let start = 18 + offset;
            let end = start + usize::from(blen & 0x7fff);
            let slice = cdic.get(start..end).ok_or(err.clone())?.to_vec();
            if blen & 0x8000 != 0 {
                self.phrases.push(Phrase::Expanded(slice));
            } else {
                self.phrases.push(Phrase::Coded(slice));
            }
        }

        Ok(())
    }

    /// Number of phrases loaded from the CDIC records
    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    /// Decodes one huffman coded record
    pub fn unpack(&mut self, data: &[u8]) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(data.len() * 3);
        self.unpack_into(data, &mut out, 0)?;
        Ok(out)
    }

    fn unpack_into(&mut self, data: &[u8], out: &mut Vec<u8>, depth: usize) -> Result<(), FormatError> {
        if depth > MAX_DEPTH {
            return Err(FormatError::InvalidHuffmanData("phrase nesting too deep"));
        }

        let mut bits_left = data.len() as i64 * 8;
        let mut pos = 0;
        let mut x = be_u64_padded(data, pos);
        let mut n: i64 = 32;

        loop {
            if n <= 0 {
                pos += 4;
                x = be_u64_padded(data, pos);
                n += 32;
            }

            let code = (x >> n) & 0xffff_ffff;
            let entry = self.dict1[(code >> 24) as usize];
            let mut len = entry.len as usize;
            let mut max_code = entry.max_code;
            if !entry.terminal {
                while len < 32 && code < self.min_codes[len] {
                    len += 1;
                }
                max_code = self.max_codes[len];
            }

            n -= len as i64;
            bits_left -= len as i64;
            if bits_left < 0 {
                break;
            }

            let index = max_code
                .checked_sub(code)
                .map(|d| (d >> (32 - len)) as usize)
                .ok_or(FormatError::InvalidHuffmanData("code above maximum"))?;

            let phrase = self
                .phrases
                .get_mut(index)
                .ok_or(FormatError::InvalidHuffmanData("phrase index out of range"))?;

            match std::mem::replace(phrase, Phrase::InProgress) {
                Phrase::Expanded(text) => {
                    out.extend_from_slice(&text);
                    self.phrases[index] = Phrase::Expanded(text);
                }
                Phrase::Coded(coded) => {
                    let mut expanded = Vec::with_capacity(coded.len() * 3);
                    self.unpack_into(&coded, &mut expanded, depth + 1)?;
                    out.extend_from_slice(&expanded);
                    self.phrases[index] = Phrase::Expanded(expanded);
                }
                Phrase::InProgress => {
                    return Err(FormatError::InvalidHuffmanData("self referential phrase"));
                }
            }
        }

        Ok(())
    }
}

/// Serializes a HUFF record from its `dict1` entries and the per length
/// `(min, max)` code pairs of `dict2`
pub(crate) fn huff_record(dict1: &[u32; 256], dict2: &[(u32, u32); 32]) -> Vec<u8> {
    let off1 = HUFF_MAGIC.len() as u32 + 16;
    let off2 = off1 + 256 * 4;

    let mut huff = Vec::with_capacity(off2 as usize + 32 * 8);
    huff.extend_from_slice(HUFF_MAGIC);
    huff.extend_from_slice(&off1.to_be_bytes());
    huff.extend_from_slice(&off2.to_be_bytes());
    huff.extend_from_slice(&[0u8; 8]);
    for v in dict1 {
        huff.extend_from_slice(&v.to_be_bytes());
    }
    for (min, max) in dict2 {
        huff.extend_from_slice(&min.to_be_bytes());
        huff.extend_from_slice(&max.to_be_bytes());
    }
    huff
}

/// Serializes a single CDIC record holding already expanded phrases
pub(crate) fn cdic_record(phrases: &[&[u8]], bits: u32) -> Vec<u8> {
    let mut table = Vec::with_capacity(phrases.len() * 2);
    let mut body = Vec::new();
    for phrase in phrases {
        table.extend_from_slice(&((phrases.len() * 2 + body.len()) as u16).to_be_bytes());
        body.extend_from_slice(&(0x8000 | phrase.len() as u16).to_be_bytes());
        body.extend_from_slice(phrase);
    }

    let mut cdic = Vec::with_capacity(16 + table.len() + body.len());
    cdic.extend_from_slice(CDIC_MAGIC);
    cdic.extend_from_slice(&(phrases.len() as u32).to_be_bytes());
    cdic.extend_from_slice(&bits.to_be_bytes());
    cdic.extend_from_slice(&table);
    cdic.extend_from_slice(&body);
    cdic
}

/// Builds a HUFF record and a single CDIC record whose codes are the
/// identity: every byte is an 8 bit code for the phrase holding that byte.
///
/// Data "compressed" with these tables is the data itself, which lets the
/// container builder emit huffman coded books.
pub(crate) fn identity_tables() -> (Vec<u8>, Vec<u8>) {
    // code length 8, terminal, max code 255
    let huff = huff_record(&[(255 << 8) | 0x80 | 8; 256], &[(0, 0); 32]);

    // code for byte b resolves to phrase 255 - b
    let bytes: Vec<[u8; 1]> = (0..=255u8).rev().map(|b| [b]).collect();
    let phrases: Vec<&[u8]> = bytes.iter().map(|b| &b[..]).collect();
    (huff, cdic_record(&phrases, 8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn identity_reader() -> HuffCdicReader {
        let (huff, cdic) = identity_tables();
        HuffCdicReader::new(&huff, &[&cdic]).unwrap()
    }

    #[test]
    fn test_identity_tables() {
        let mut reader = identity_reader();
        assert_eq!(reader.phrase_count(), 256);
        assert_eq!(reader.unpack(b"<p>Hello</p>").unwrap(), b"<p>Hello</p>");
        assert_eq!(reader.unpack(b"").unwrap(), b"");
    }

    #[test]
    fn test_nested_phrase_is_expanded_and_memoized() {
        let (huff, mut cdic) = identity_tables();

        // Rewrite the phrase for 'X' as a coded phrase holding "ab". The
        // phrase is appended after the table and its offset repointed.
        let index = 255 - usize::from(b'X');
        let offset = (cdic.len() - 16) as u16;
        cdic[16 + index * 2..16 + index * 2 + 2].copy_from_slice(&offset.to_be_bytes());
        cdic.extend_from_slice(&2u16.to_be_bytes());
        cdic.extend_from_slice(b"ab");

        let mut reader = HuffCdicReader::new(&huff, &[&cdic]).unwrap();
        assert_eq!(reader.unpack(b"-X-X").unwrap(), b"-ab-ab");
    }

    #[test]
    fn test_self_referential_phrase() {
        let (huff, mut cdic) = identity_tables();
        let index = 255 - usize::from(b'X');
        let offset = (cdic.len() - 16) as u16;
        cdic[16 + index * 2..16 + index * 2 + 2].copy_from_slice(&offset.to_be_bytes());
        cdic.extend_from_slice(&1u16.to_be_bytes());
        cdic.push(b'X');

        let mut reader = HuffCdicReader::new(&huff, &[&cdic]).unwrap();
        assert!(reader.unpack(b"X").is_err());
    }

    #[test]
    fn test_bad_magic() {
        let (mut huff, cdic) = identity_tables();
        assert!(HuffCdicReader::new(&huff, &[&b"CDIC"[..]]).is_err());
        huff[0] = b'h';
        assert!(HuffCdicReader::new(&huff, &[&cdic]).is_err());
    }

    #[test]
    fn test_identity_header_offsets() {
        let (huff, _) = identity_tables();
        assert_eq!(be_u32(&huff, 8), Some(24));
        assert_eq!(be_u32(&huff, 12), Some(24 + 1024));
        assert_eq!(huff.len(), 24 + 1024 + 256);
    }

    #[test]
    fn test_codes_longer_than_a_byte() {
        // Top bytes 0x01..=0xff are terminal 8 bit codes for themselves.
        // Top byte 0x00 is the prefix of one 9 bit code (0b000000001) and
        // two 10 bit codes (0b0000000001, 0b0000000000).
        let mut dict1 = [(255 << 8) | 0x80 | 8; 256];
        dict1[0] = 9;
        let mut dict2 = [(0, 0); 32];
        dict2[8] = (1, 256);
        dict2[9] = (0, 258);
        let huff = huff_record(&dict1, &dict2);

        let bytes: Vec<[u8; 1]> = (1..=255u8).rev().map(|b| [b]).collect();
        let mut phrases: Vec<&[u8]> = bytes.iter().map(|b| &b[..]).collect();
        phrases.push(b"<nine>");
        phrases.push(b"");
        phrases.push(b"<ten-one>");
        phrases.push(b"<ten-zero>");
        let cdic = cdic_record(&phrases, 9);

        let mut reader = HuffCdicReader::new(&huff, &[&cdic]).unwrap();
        assert_eq!(reader.phrase_count(), 259);

        // 'A', the 9 bit code, both 10 bit codes, 'B', then 3 bits of padding
        let stream = [0x41, 0x00, 0x80, 0x20, 0x02, 0x10];
        assert_eq!(
            reader.unpack(&stream).unwrap(),
            b"A<nine><ten-one><ten-zero>B"
        );
    }

    #[quickcheck]
    fn identity_round_trip(data: Vec<u8>) -> bool {
        identity_reader().unpack(&data).unwrap() == data
    }
}
