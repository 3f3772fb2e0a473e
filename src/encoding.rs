//! Character encoding helpers for reading inputs and writing outputs.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use log::warn;

use crate::error::Error;

/// Looks up an encoding by label (`utf-8`, `UTF-16LE`, `windows-1252`, ...).
pub fn lookup(label: &str) -> Result<&'static Encoding, Error> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::Encoding(format!("unknown encoding `{}`", label)))
}

/// Detects a byte order mark. Returns the encoding and the BOM length.
pub fn sniff_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    Encoding::for_bom(bytes)
}

pub fn bom_for(encoding: &'static Encoding) -> &'static [u8] {
    if encoding == UTF_8 {
        b"\xEF\xBB\xBF"
    } else if encoding == UTF_16LE {
        b"\xFF\xFE"
    } else if encoding == UTF_16BE {
        b"\xFE\xFF"
    } else {
        b""
    }
}

/// Text decoded from raw bytes.
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    /// Encoding actually used, which is the BOM's when there is one.
    pub encoding: &'static Encoding,
    pub has_bom: bool,
    /// Malformed sequences were replaced by U+FFFD.
    pub lossy: bool,
}

/// Decodes `bytes`, honoring a BOM over the `fallback` encoding.
pub fn decode(bytes: &[u8], fallback: &'static Encoding) -> DecodedText {
    let has_bom = sniff_bom(bytes).is_some();
    let (text, encoding, lossy) = fallback.decode(bytes);
    if lossy {
        warn!(
            "Input is not valid {}; malformed sequences were replaced",
            encoding.name()
        );
    }
    DecodedText {
        text: text.into_owned(),
        encoding,
        has_bom,
        lossy,
    }
}

/// Bytes ready to be written out.
#[derive(Debug, Clone)]
pub struct EncodedText {
    pub bytes: Vec<u8>,
    /// Name of the encoding the bytes are in.
    pub encoding: &'static str,
    /// Some characters could not be represented and were replaced.
    pub lossy: bool,
}

/// Encodes `text`, prefixed by a BOM when `write_bom` is set and the
/// encoding has one.
///
/// `encoding_rs` only encodes UTF-16 as UTF-8, so both UTF-16 byte orders
/// are handled here.
pub fn encode(text: &str, encoding: &'static Encoding, write_bom: bool) -> EncodedText {
    let mut bytes = Vec::with_capacity(text.len() + 3);
    if write_bom {
        bytes.extend_from_slice(bom_for(encoding));
    }
    let lossy = if encoding == UTF_16LE {
        bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        false
    } else if encoding == UTF_16BE {
        bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
        false
    } else {
        let (encoded, _, lossy) = encoding.encode(text);
        bytes.extend_from_slice(&encoded);
        lossy
    };
    let name = if encoding == UTF_16LE || encoding == UTF_16BE {
        encoding.name()
    } else {
        encoding.output_encoding().name()
    };
    EncodedText {
        bytes,
        encoding: name,
        lossy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("utf-8").unwrap(), UTF_8);
        assert_eq!(lookup(" UTF-16LE ").unwrap(), UTF_16LE);
        assert_eq!(lookup("latin1").unwrap(), WINDOWS_1252);
        assert!(matches!(lookup("klingon"), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_decode_with_bom() {
        let decoded = decode(b"\xFF\xFEh\x00i\x00", UTF_8);
        assert_eq!(decoded.text, "hi");
        assert_eq!(decoded.encoding, UTF_16LE);
        assert!(decoded.has_bom);
        assert!(!decoded.lossy);

        let plain = decode("café".as_bytes(), UTF_8);
        assert_eq!(plain.text, "café");
        assert!(!plain.has_bom);
    }

    #[test]
    fn test_decode_malformed_is_lossy() {
        let decoded = decode(b"ab\xFF", UTF_8);
        assert!(decoded.lossy);
        assert_eq!(decoded.text, "ab\u{FFFD}");
    }

    #[test]
    fn test_encode_utf16_with_bom() {
        let encoded = encode("hi", UTF_16BE, true);
        assert_eq!(encoded.bytes, b"\xFE\xFF\x00h\x00i");
        assert_eq!(encoded.encoding, "UTF-16BE");
        let back = decode(&encoded.bytes, UTF_8);
        assert_eq!(back.text, "hi");
    }

    #[test]
    fn test_encode_unmappable_is_lossy() {
        let encoded = encode("€ ✓", WINDOWS_1252, false);
        assert!(encoded.lossy);
        assert_eq!(encoded.bytes[0], 0x80);
        assert!(!encode("plain", WINDOWS_1252, true).lossy);
    }
}
