use std::sync::Arc;

use crate::{
    document::RawDocument,
    error::Error,
    event::Event,
    options::WriterOptions,
    writer::{FlushResult, OutputTarget},
};

/// Lazily produced events of one document.
pub type EventStream<'a> = Box<dyn Iterator<Item = Result<Event, Error>> + 'a>;

/// Escapes plain text for the output format (`&` in XML, quotes in JSON, ...).
///
/// Inline codes are never passed through the encoder: their data is already
/// in the output format.
pub trait ContentEncoder: Send + Sync {
    fn encode_text(&self, text: &str) -> String;
}

/// Writes text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEncoder;

impl ContentEncoder for IdentityEncoder {
    fn encode_text(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Escapes the XML special characters of element content.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlEncoder {
    /// Escape `"` as well, for attribute values.
    pub quotes: bool,
}

impl ContentEncoder for XmlEncoder {
    fn encode_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' if self.quotes => out.push_str("&quot;"),
                c => out.push(c),
            }
        }
        out
    }
}

/// Turns an input format into events.
pub trait Filter: Send {
    /// Unique id, used to look the filter up in a registry.
    fn name(&self) -> &str;

    fn mime_type(&self) -> &str;

    /// File extensions handled, without the dot.
    fn extensions(&self) -> &[&str];

    /// Starts reading `raw`. Events are produced lazily; opening again
    /// restarts from the beginning of the input.
    fn open<'a>(&'a mut self, raw: &'a RawDocument) -> Result<EventStream<'a>, Error>;

    /// Releases resources held since the last `open`.
    fn close(&mut self) {}

    /// Encoder for the plain text of the content this filter extracts.
    fn encoder(&self) -> Arc<dyn ContentEncoder> {
        Arc::new(IdentityEncoder)
    }
}

/// Turns events back into an output document.
pub trait FilterWriter: Send {
    fn set_output(&mut self, target: OutputTarget, options: WriterOptions);

    fn set_encoder(&mut self, encoder: Arc<dyn ContentEncoder>);

    fn handle(&mut self, event: &Event) -> Result<(), Error>;

    /// Writes the pending document out.
    fn close(&mut self) -> Result<FlushResult, Error>;

    /// Drops the pending document without writing anything.
    fn discard(&mut self);
}
