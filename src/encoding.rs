//! Text <-> byte conversion for outgoing payloads and inbound display.
//!
//! Payloads are opaque to the core. The encoding is only applied at the
//! edges: when a caller hands us text to send, and when a presentation layer
//! wants to render bytes that arrived on a socket.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Supported payload encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    Ascii,
    /// One byte per UTF-16 code unit, high bits dropped. Named `binary`
    /// on the wire; `latin1` is accepted as an alias.
    #[serde(rename = "binary", alias = "latin1")]
    Latin1,
    Hex,
    Base64,
    #[serde(alias = "ucs2", alias = "ucs-2", alias = "utf-16le")]
    Utf16le,
}

impl Encoding {
    pub const ALL: [Encoding; 6] = [
        Encoding::Utf8,
        Encoding::Ascii,
        Encoding::Latin1,
        Encoding::Hex,
        Encoding::Base64,
        Encoding::Utf16le,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "binary",
            Encoding::Hex => "hex",
            Encoding::Base64 => "base64",
            Encoding::Utf16le => "utf16le",
        }
    }

    /// Convert caller-supplied text into the bytes written to the socket.
    pub fn encode(&self, message: &str) -> Result<Vec<u8>, ClientError> {
        match self {
            Encoding::Utf8 => Ok(message.as_bytes().to_vec()),
            Encoding::Ascii | Encoding::Latin1 => {
                Ok(message.encode_utf16().map(|unit| (unit & 0xff) as u8).collect())
            }
            Encoding::Hex => hex::decode(message.trim()).map_err(|e| ClientError::Encoding {
                encoding: *self,
                reason: e.to_string(),
            }),
            Encoding::Base64 => {
                // Accept both the standard and URL-safe alphabets, padded or not.
                let normalized: String = message
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| match c {
                        '-' => '+',
                        '_' => '/',
                        other => other,
                    })
                    .collect();
                STANDARD_NO_PAD
                    .decode(normalized.trim_end_matches('='))
                    .map_err(|e| ClientError::Encoding {
                        encoding: *self,
                        reason: e.to_string(),
                    })
            }
            Encoding::Utf16le => Ok(message
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()),
        }
    }

    /// Render raw bytes as text for display.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Ascii => bytes.iter().map(|b| (b & 0x7f) as char).collect(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Hex => hex::encode(bytes),
            Encoding::Base64 => STANDARD.encode(bytes),
            Encoding::Utf16le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "ascii" => Ok(Encoding::Ascii),
            "binary" | "latin1" => Ok(Encoding::Latin1),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(Encoding::Utf16le),
            other => Err(format!(
                "unknown encoding '{}' (expected one of: utf8, ascii, binary, latin1, hex, base64, utf16le)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let bytes = Encoding::Utf8.encode("héllo").unwrap();
        assert_eq!(bytes, "héllo".as_bytes());
        assert_eq!(Encoding::Utf8.decode(&bytes), "héllo");
    }

    #[test]
    fn test_latin1_truncates_code_units() {
        // U+0101 keeps only its low byte.
        assert_eq!(Encoding::Latin1.encode("A\u{0101}").unwrap(), vec![0x41, 0x01]);
        assert_eq!(Encoding::Latin1.decode(&[0x41, 0xe9]), "Aé");
    }

    #[test]
    fn test_ascii_decode_masks_high_bit() {
        assert_eq!(Encoding::Ascii.decode(&[0xc1, 0x42]), "AB");
    }

    #[test]
    fn test_hex_encode_and_reject_garbage() {
        assert_eq!(Encoding::Hex.encode("deadBEEF").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(Encoding::Hex.decode(&[0x00, 0xff]), "00ff");

        let err = Encoding::Hex.encode("xyz").unwrap_err();
        assert!(matches!(err, ClientError::Encoding { encoding: Encoding::Hex, .. }));
    }

    #[test]
    fn test_base64_accepts_url_safe_and_unpadded() {
        assert_eq!(Encoding::Base64.encode("aGk=").unwrap(), b"hi");
        assert_eq!(Encoding::Base64.encode("aGk").unwrap(), b"hi");
        assert_eq!(Encoding::Base64.encode("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(Encoding::Base64.decode(b"hi"), "aGk=");
        assert!(Encoding::Base64.encode("!!!").is_err());
    }

    #[test]
    fn test_utf16le() {
        assert_eq!(Encoding::Utf16le.encode("Hi").unwrap(), vec![0x48, 0x00, 0x69, 0x00]);
        assert_eq!(Encoding::Utf16le.decode(&[0x48, 0x00, 0x69, 0x00]), "Hi");
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("binary".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("UCS2".parse::<Encoding>().unwrap(), Encoding::Utf16le);
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert!("ebcdic".parse::<Encoding>().is_err());

        let enc: Encoding = serde_json::from_str("\"latin1\"").unwrap();
        assert_eq!(enc, Encoding::Latin1);
        assert_eq!(serde_json::to_string(&Encoding::Latin1).unwrap(), "\"binary\"");
        assert_eq!(Encoding::Latin1.to_string(), "binary");
        assert_eq!(serde_json::to_string(&Encoding::Utf16le).unwrap(), "\"utf16le\"");
    }
}
