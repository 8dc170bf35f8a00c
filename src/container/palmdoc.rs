//! PalmDOC LZ77 compression.
//!
//! Each input byte is a tag:
//!
//! - `0x00`, `0x09..=0x7f`: the byte itself
//! - `0x01..=0x08`: copy the next 1 to 8 bytes verbatim
//! - `0x80..=0xbf`: together with the next byte, an 11 bit distance and a
//!   3 bit length (plus 3) back-reference into the output
//! - `0xc0..=0xff`: a space followed by the byte `tag ^ 0x80`

use crate::container::errors::FormatError;

const MAX_DISTANCE: usize = 2047;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 10;

/// Decompresses a PalmDOC coded record
///
/// ```
/// use mobi_xray::container::palmdoc;
///
/// let data = palmdoc::decompress(b"\xc8ello").unwrap();
/// assert_eq!(data, b" Hello");
/// ```
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while let Some(&tag) = data.get(i) {
        i += 1;
        match tag {
            0x01..=0x08 => {
                let end = (i + usize::from(tag)).min(data.len());
                out.extend_from_slice(&data[i..end]);
                i = end;
            }
            0x00 | 0x09..=0x7f => out.push(tag),
            0x80..=0xbf => {
                let Some(&next) = data.get(i) else {
                    // a dangling pair tag ends the record
                    break;
                };
                i += 1;

                let pair = (u16::from(tag) << 8 | u16::from(next)) & 0x3fff;
                let distance = usize::from(pair >> 3);
                let len = usize::from(pair & 0x7) + MIN_MATCH;
                if distance == 0 || distance > out.len() {
                    return Err(FormatError::InvalidBackReference {
                        distance,
                        position: out.len(),
                    });
                }

                // copies may overlap the bytes they produce
                let start = out.len() - distance;
                for j in 0..len {
                    let b = out[start + j];
                    out.push(b);
                }
            }
            0xc0..=0xff => {
                out.push(b' ');
                out.push(tag ^ 0x80);
            }
        }
    }

    Ok(out)
}

/// Compresses data with PalmDOC coding.
///
/// A greedy encoder: at each position the longest back-reference within the
/// window is taken, then space folding, then literal runs. Output is
/// deterministic so compressing a decompressed record written by this
/// encoder reproduces it byte for byte.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if let Some((distance, len)) = longest_match(data, i) {
            let pair = 0x8000 | ((distance as u16) << 3) | ((len - MIN_MATCH) as u16);
            out.extend_from_slice(&pair.to_be_bytes());
            i += len;
            continue;
        }

        let c = data[i];
        if c == b' ' {
            if let Some(&next) = data.get(i + 1) {
                if (0x40..=0x7f).contains(&next) {
                    out.push(next ^ 0x80);
                    i += 2;
                    continue;
                }
            }
        }

        if !needs_escape(c) {
            out.push(c);
            i += 1;
            continue;
        }

        let run = data[i..]
            .iter()
            .take(8)
            .take_while(|&&b| needs_escape(b))
            .count();
        out.push(run as u8);
        out.extend_from_slice(&data[i..i + run]);
        i += run;
    }

    out
}

#[inline]
fn needs_escape(b: u8) -> bool {
    matches!(b, 0x01..=0x08 | 0x80..=0xff)
}

fn longest_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let max_len = (data.len() - pos).min(MAX_MATCH);
    if max_len < MIN_MATCH {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;
    for start in (pos.saturating_sub(MAX_DISTANCE)..pos).rev() {
        let len = (0..max_len)
            .take_while(|&j| data[start + j] == data[pos + j])
            .count();
        if len >= MIN_MATCH && best.map_or(true, |(_, l)| len > l) {
            best = Some((pos - start, len));
            if len == max_len {
                break;
            }
        }
    }

    best
}
