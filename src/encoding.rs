use std::borrow::Cow;
use std::fmt;

/// The text codec a container declares for its markup
///
/// MOBI headers carry a numeric code page. Only 1252 selects the single
/// byte Western encoding, every other value is treated as UTF-8.
///
/// ```
/// use mobi_xray::Codec;
///
/// assert_eq!(Codec::from_code(1252), Codec::Windows1252);
/// assert_eq!(Codec::from_code(65001), Codec::Utf8);
/// assert_eq!(Codec::Windows1252.decode(b"caf\xe9"), "café");
/// assert_eq!(Codec::Utf8.decode("café".as_bytes()), "café");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Windows code page 1252
    #[default]
    Windows1252,

    /// UTF-8 (code page 65001)
    Utf8,
}

impl Codec {
    /// Code page value that selects Windows-1252
    pub const WINDOWS_1252_CODE: u32 = 1252;

    /// Code page value that writers use for UTF-8
    pub const UTF8_CODE: u32 = 65001;

    /// Resolves the codec from a header code page
    pub fn from_code(code: u32) -> Codec {
        if code == Self::WINDOWS_1252_CODE {
            Codec::Windows1252
        } else {
            Codec::Utf8
        }
    }

    /// The code page written into a header for this codec
    pub fn code(&self) -> u32 {
        match self {
            Codec::Windows1252 => Self::WINDOWS_1252_CODE,
            Codec::Utf8 => Self::UTF8_CODE,
        }
    }

    /// Human readable label used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Windows1252 => "cp1252",
            Codec::Utf8 => "utf-8",
        }
    }

    /// Returns true if every character occupies exactly one byte
    pub fn is_single_byte(&self) -> bool {
        matches!(self, Codec::Windows1252)
    }

    /// Walks the characters of `data`, reporting each character together
    /// with its byte index and encoded width.
    ///
    /// Invalid UTF-8 sequences are reported as U+FFFD spanning the invalid
    /// bytes and collected into the returned list so the caller can log
    /// them. Decoding never stops early.
    pub fn decode_with<F>(&self, data: &[u8], mut f: F) -> Vec<EncodingError>
    where
        F: FnMut(char, usize, usize),
    {
        let mut errors = Vec::new();
        match self {
            Codec::Windows1252 => {
                for (i, &b) in data.iter().enumerate() {
                    f(WINDOWS_1252[usize::from(b)], i, 1);
                }
            }
            Codec::Utf8 => {
                let mut pos = 0;
                for chunk in data.utf8_chunks() {
                    for (i, c) in chunk.valid().char_indices() {
                        f(c, pos + i, c.len_utf8());
                    }
                    pos += chunk.valid().len();

                    let invalid = chunk.invalid();
                    if !invalid.is_empty() {
                        f(char::REPLACEMENT_CHARACTER, pos, invalid.len());
                        errors.push(EncodingError {
                            codec: *self,
                            offset: pos,
                            len: invalid.len(),
                        });
                        pos += invalid.len();
                    }
                }
            }
        }

        errors
    }

    /// Decodes bytes into a string, allocating only when necessary
    pub fn decode<'a>(&self, data: &'a [u8]) -> Cow<'a, str> {
        match self {
            Codec::Utf8 => String::from_utf8_lossy(data),
            Codec::Windows1252 if data.is_ascii() => {
                Cow::Borrowed(std::str::from_utf8(data).unwrap_or_default())
            }
            Codec::Windows1252 => {
                Cow::Owned(data.iter().map(|&b| WINDOWS_1252[usize::from(b)]).collect())
            }
        }
    }
}

/// A byte sequence that is not valid under the resolved codec.
///
/// These are never fatal: the offending bytes are replaced with U+FFFD
/// (keeping their byte width so offsets stay aligned) and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingError {
    codec: Codec,
    offset: usize,
    len: usize,
}

impl EncodingError {
    /// Byte index of the invalid sequence relative to the decoded input
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the invalid sequence in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Codec that rejected the sequence
    pub fn codec(&self) -> Codec {
        self.codec
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} sequence of {} byte(s) at offset {}",
            self.codec.name(),
            self.len,
            self.offset
        )
    }
}

impl std::error::Error for EncodingError {}

const fn create_windows_1252_table() -> [char; 256] {
    let mut table = [0 as char; 256];
    let mut i = 0usize;
    while i < 256 {
        let c = match i {
            128 => '\u{20ac}',
            129 => '\u{81}',
            130 => '\u{201a}',
            131 => '\u{0192}',
            132 => '\u{201e}',
            133 => '\u{2026}',
            134 => '\u{2020}',
            135 => '\u{2021}',
            136 => '\u{02c6}',
            137 => '\u{2030}',
            138 => '\u{0160}',
            139 => '\u{2039}',
            140 => '\u{0152}',
            141 => '\u{8d}',
            142 => '\u{017d}',
            143 => '\u{8f}',
            144 => '\u{90}',
            145 => '\u{2018}',
            146 => '\u{2019}',
            147 => '\u{201c}',
            148 => '\u{201d}',
            149 => '\u{2022}',
            150 => '\u{2013}',
            151 => '\u{2014}',
            152 => '\u{02dc}',
            153 => '\u{2122}',
            154 => '\u{0161}',
            155 => '\u{203a}',
            156 => '\u{0153}',
            157 => '\u{9d}',
            158 => '\u{017e}',
            159 => '\u{0178}',
            i => i as u8 as char,
        };
        table[i] = c;
        i += 1;
    }
    table
}

static WINDOWS_1252: [char; 256] = create_windows_1252_table();
