//! Raw inputs handed to filters.

use std::{
    fs::File,
    io::{BufRead, BufReader, Cursor, Read},
    path::{Path, PathBuf},
};

use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::{
    encoding::{self, DecodedText},
    error::Error,
    locale::LocaleId,
};

/// Where the input bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Already decoded text.
    Text(String),
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// An input document with the settings needed to extract it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    input: InputSource,
    pub source_locale: Option<LocaleId>,
    pub target_locales: Vec<LocaleId>,
    /// Encoding used when the input has no BOM. UTF-8 when unset.
    pub encoding: Option<String>,
    /// Filter to use instead of inferring one from the file extension.
    pub filter_id: Option<String>,
    pub name: String,
}

impl RawDocument {
    fn with_input(input: InputSource, name: String) -> Self {
        Self {
            input,
            source_locale: None,
            target_locales: Vec::new(),
            encoding: None,
            filter_id: None,
            name,
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::with_input(InputSource::Text(text.to_string()), "<memory>".to_string())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::with_input(InputSource::Bytes(bytes), "<memory>".to_string())
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::with_input(
            InputSource::Path(path.to_path_buf()),
            path.display().to_string(),
        )
    }

    pub fn with_source_locale(mut self, locale: LocaleId) -> Self {
        self.source_locale = Some(locale);
        self
    }

    pub fn with_target_locale(mut self, locale: LocaleId) -> Self {
        if !self.target_locales.contains(&locale) {
            self.target_locales.push(locale);
        }
        self
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_string());
        self
    }

    pub fn with_filter_id(mut self, filter_id: &str) -> Self {
        self.filter_id = Some(filter_id.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn input(&self) -> &InputSource {
        &self.input
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.input {
            InputSource::Path(path) => Some(path),
            _ => None,
        }
    }

    fn fallback_encoding(&self) -> Result<&'static Encoding, Error> {
        match &self.encoding {
            Some(label) => encoding::lookup(label),
            None => Ok(UTF_8),
        }
    }

    /// Reads and decodes the whole input.
    pub fn decode(&self) -> Result<DecodedText, Error> {
        match &self.input {
            InputSource::Text(text) => Ok(DecodedText {
                text: text.clone(),
                encoding: UTF_8,
                has_bom: false,
                lossy: false,
            }),
            InputSource::Bytes(bytes) => Ok(encoding::decode(bytes, self.fallback_encoding()?)),
            InputSource::Path(path) => {
                let bytes = std::fs::read(path)?;
                Ok(encoding::decode(&bytes, self.fallback_encoding()?))
            }
        }
    }

    /// Opens a streaming reader producing UTF-8, for filters that parse
    /// their input incrementally.
    pub fn open_reader(&self) -> Result<DecodedReader, Error> {
        let source: Box<dyn Read + Send> = match &self.input {
            InputSource::Text(text) => {
                return Ok(DecodedReader {
                    reader: Box::new(Cursor::new(text.clone().into_bytes())),
                    encoding: UTF_8,
                    has_bom: false,
                });
            }
            InputSource::Bytes(bytes) => Box::new(Cursor::new(bytes.clone())),
            InputSource::Path(path) => Box::new(File::open(path)?),
        };
        let mut buffered = BufReader::new(source);
        let bom = encoding::sniff_bom(buffered.fill_buf()?);
        let has_bom = bom.is_some();
        let encoding = match bom {
            Some((encoding, _)) => encoding,
            None => self.fallback_encoding()?,
        };
        // Auto-detect BOM, decode to UTF-8
        let decoder = DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .bom_override(true)
            .strip_bom(true)
            .build(buffered);
        Ok(DecodedReader {
            reader: Box::new(BufReader::new(decoder)),
            encoding,
            has_bom,
        })
    }
}

/// UTF-8 view of an input, with what was detected while opening it.
pub struct DecodedReader {
    reader: Box<dyn BufRead + Send>,
    pub encoding: &'static Encoding,
    pub has_bom: bool,
}

impl DecodedReader {
    pub fn into_inner(self) -> Box<dyn BufRead + Send> {
        self.reader
    }
}

impl Read for DecodedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for DecodedReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::UTF_16LE;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_decode_text_and_bytes() {
        let raw = RawDocument::from_text("a=b");
        assert_eq!(raw.decode().unwrap().text, "a=b");

        let raw = RawDocument::from_bytes(b"\xE9t\xE9".to_vec()).with_encoding("windows-1252");
        let decoded = raw.decode().unwrap();
        assert_eq!(decoded.text, "été");
        assert!(!decoded.has_bom);

        let raw = RawDocument::from_bytes(vec![]).with_encoding("nope");
        assert!(raw.decode().is_err());
    }

    #[test]
    fn test_open_reader_utf16_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\xFF\xFEk\x00=\x00v\x00\n\x00").unwrap();
        let raw = RawDocument::from_path(file.path());
        assert_eq!(raw.name, file.path().display().to_string());

        let mut reader = raw.open_reader().unwrap();
        assert_eq!(reader.encoding, UTF_16LE);
        assert!(reader.has_bom);
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "k=v\n");
    }

    #[test]
    fn test_open_reader_strips_utf8_bom() {
        let raw = RawDocument::from_bytes(b"\xEF\xBB\xBFline1\nline2".to_vec());
        let reader = raw.open_reader().unwrap();
        assert!(reader.has_bom);
        let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["line1", "line2"]);
    }

    #[test]
    fn test_missing_file() {
        let raw = RawDocument::from_path("/definitely/not/here.properties");
        assert!(matches!(raw.open_reader(), Err(Error::Io(_))));
        assert!(raw.path().is_some());
    }
}
