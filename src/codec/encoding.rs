//! Character encodings for field content.
//!
//! Legacy databases are almost always in one of two 8-bit code pages
//! (Windows-1252 or DOS 850). Both are table driven and byte preserving:
//! every byte decodes to exactly one char and back.

use serde::{Deserialize, Serialize};

use crate::errors::{MstError, MstResult};

/// Windows-1252 code points for bytes 0x80..=0x9F. The five undefined
/// positions map to the matching C1 control so decoding never fails.
const CP1252_HIGH: [u16; 32] = [
    0x20AC, 0x0081, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160,
    0x2039, 0x0152, 0x008D, 0x017D, 0x008F, 0x0090, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022,
    0x2013, 0x2014, 0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0x009D, 0x017E, 0x0178,
];

/// DOS code page 850 code points for bytes 0x80..=0xFF.
const CP850_HIGH: [u16; 128] = [
    0x00C7, 0x00FC, 0x00E9, 0x00E2, 0x00E4, 0x00E0, 0x00E5, 0x00E7, 0x00EA, 0x00EB, 0x00E8,
    0x00EF, 0x00EE, 0x00EC, 0x00C4, 0x00C5, 0x00C9, 0x00E6, 0x00C6, 0x00F4, 0x00F6, 0x00F2,
    0x00FB, 0x00F9, 0x00FF, 0x00D6, 0x00DC, 0x00F8, 0x00A3, 0x00D8, 0x00D7, 0x0192, 0x00E1,
    0x00ED, 0x00F3, 0x00FA, 0x00F1, 0x00D1, 0x00AA, 0x00BA, 0x00BF, 0x00AE, 0x00AC, 0x00BD,
    0x00BC, 0x00A1, 0x00AB, 0x00BB, 0x2591, 0x2592, 0x2593, 0x2502, 0x2524, 0x00C1, 0x00C2,
    0x00C0, 0x00A9, 0x2563, 0x2551, 0x2557, 0x255D, 0x00A2, 0x00A5, 0x2510, 0x2514, 0x2534,
    0x252C, 0x251C, 0x2500, 0x253C, 0x00E3, 0x00C3, 0x255A, 0x2554, 0x2569, 0x2566, 0x2560,
    0x2550, 0x256C, 0x00A4, 0x00F0, 0x00D0, 0x00CA, 0x00CB, 0x00C8, 0x0131, 0x00CD, 0x00CE,
    0x00CF, 0x2518, 0x250C, 0x2588, 0x2584, 0x00A6, 0x00CC, 0x2580, 0x00D3, 0x00DF, 0x00D4,
    0x00D2, 0x00F5, 0x00D5, 0x00B5, 0x00FE, 0x00DE, 0x00DA, 0x00DB, 0x00D9, 0x00FD, 0x00DD,
    0x00AF, 0x00B4, 0x00AD, 0x00B1, 0x2017, 0x00BE, 0x00B6, 0x00A7, 0x00F7, 0x00B8, 0x00B0,
    0x00A8, 0x00B7, 0x00B9, 0x00B3, 0x00B2, 0x25A0, 0x00A0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    Utf8,
    Latin1,
    Cp1252,
    Cp850,
}

impl Encoding {
    /// Parses the names accepted in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Some(Encoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" => Some(Encoding::Latin1),
            "cp1252" | "windows-1252" => Some(Encoding::Cp1252),
            "cp850" | "ibm850" => Some(Encoding::Cp850),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin1",
            Encoding::Cp1252 => "cp1252",
            Encoding::Cp850 => "cp850",
        }
    }

    pub fn encode(&self, text: &str) -> MstResult<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            _ => text
                .chars()
                .map(|c| {
                    self.encode_char(c).ok_or_else(|| {
                        MstError::format(format!(
                            "character U+{:04X} is not representable in {}",
                            c as u32,
                            self.name()
                        ))
                    })
                })
                .collect(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> MstResult<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| MstError::format(format!("field content is not valid utf-8: {}", e))),
            _ => Ok(bytes.iter().map(|&b| self.decode_byte(b)).collect()),
        }
    }

    /// Byte length of `text` once encoded, without allocating.
    pub fn encoded_len(&self, text: &str) -> usize {
        match self {
            Encoding::Utf8 => text.len(),
            _ => text.chars().count(),
        }
    }

    fn decode_byte(&self, byte: u8) -> char {
        if byte < 0x80 {
            return byte as char;
        }
        let code = match self {
            Encoding::Cp1252 if byte < 0xA0 => CP1252_HIGH[(byte - 0x80) as usize],
            Encoding::Cp850 => CP850_HIGH[(byte - 0x80) as usize],
            _ => u16::from(byte),
        };
        char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn encode_char(&self, c: char) -> Option<u8> {
        let code = c as u32;
        if code < 0x80 {
            return Some(code as u8);
        }
        match self {
            Encoding::Latin1 => u8::try_from(code).ok(),
            Encoding::Cp1252 => {
                if (0xA0..=0xFF).contains(&code) {
                    return Some(code as u8);
                }
                CP1252_HIGH
                    .iter()
                    .position(|&p| u32::from(p) == code)
                    .map(|i| 0x80 + i as u8)
            }
            Encoding::Cp850 => CP850_HIGH
                .iter()
                .position(|&p| u32::from(p) == code)
                .map(|i| 0x80 + i as u8),
            Encoding::Utf8 => None,
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Cp1252
    }
}

/// Chooses between the two legacy code pages by sampling raw field bytes.
///
/// Accented letters sit in 0x80..=0xA5 under cp850 and in 0xC0..=0xFF under
/// cp1252, so whichever range dominates wins. Pure ASCII and ties resolve
/// to cp1252.
pub fn guess_encoding(sample: &[u8]) -> Encoding {
    let mut dos = 0usize;
    let mut windows = 0usize;
    for &b in sample {
        match b {
            0x80..=0xA5 => dos += 1,
            0xC0..=0xFF if b != 0xD7 && b != 0xF7 => windows += 1,
            _ => {}
        }
    }
    if dos > windows {
        Encoding::Cp850
    } else {
        Encoding::Cp1252
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp850_accents() {
        let bytes = Encoding::Cp850.encode("Café Ñandú").unwrap();
        assert_eq!(bytes, b"Caf\x82 \xA5and\xA3".to_vec());
        assert_eq!(Encoding::Cp850.decode(&bytes).unwrap(), "Café Ñandú");
    }

    #[test]
    fn test_cp1252_specials() {
        let bytes = Encoding::Cp1252.encode("€ “quoted” é").unwrap();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(Encoding::Cp1252.decode(&bytes).unwrap(), "€ “quoted” é");
    }

    #[test]
    fn test_eight_bit_decoding_is_byte_preserving() {
        let all: Vec<u8> = (0u8..=255).collect();
        for enc in [Encoding::Latin1, Encoding::Cp1252, Encoding::Cp850] {
            let text = enc.decode(&all).unwrap();
            assert_eq!(enc.encode(&text).unwrap(), all, "{}", enc.name());
        }
    }

    #[test]
    fn test_unrepresentable_char_fails() {
        assert!(Encoding::Latin1.encode("€").is_err());
        assert!(Encoding::Cp850.encode("日本").is_err());
    }

    #[test]
    fn test_invalid_utf8_fails() {
        assert!(Encoding::Utf8.decode(&[0xC3, 0x28]).is_err());
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(Encoding::Utf8.encoded_len("é"), 2);
        assert_eq!(Encoding::Cp850.encoded_len("é"), 1);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Encoding::from_name("ISO-8859-1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("windows_1252"), Some(Encoding::Cp1252));
        assert_eq!(Encoding::from_name("ebcdic"), None);
    }

    #[test]
    fn test_guess_encoding() {
        let dos = Encoding::Cp850.encode("Educación pública en México").unwrap();
        assert_eq!(guess_encoding(&dos), Encoding::Cp850);
        let win = Encoding::Cp1252.encode("Educación pública en México").unwrap();
        assert_eq!(guess_encoding(&win), Encoding::Cp1252);
        assert_eq!(guess_encoding(b"plain ascii"), Encoding::Cp1252);
    }
}
