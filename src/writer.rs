//! Output targets and the skeleton-driven writer.

use std::{
    fmt::{self, Display},
    path::PathBuf,
    sync::Arc,
};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::{
    encoding,
    error::Error,
    event::{Event, EventType},
    options::WriterOptions,
    resource::{Nameable, Resource, SkeletonBearer},
    skeleton::{ReferenceTable, SkeletonResolver},
    traits::{ContentEncoder, FilterWriter, IdentityEncoder},
};

/// Shared in-memory output. Clones see the same bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    /// The output as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }

    fn replace(&self, bytes: Vec<u8>) {
        *self.bytes.lock() = bytes;
    }
}

#[derive(Debug, Clone)]
pub enum OutputTarget {
    Path(PathBuf),
    Memory(MemoryOutput),
}

impl Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Path(path) => write!(f, "{}", path.display()),
            OutputTarget::Memory(_) => write!(f, "<memory>"),
        }
    }
}

/// What a writer committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushResult {
    pub target: String,
    pub encoding: String,
    pub bytes_written: usize,
    /// Some characters could not be represented in the output encoding.
    pub lossy: bool,
}

/// Settings of the document being written, taken from its START_DOCUMENT.
#[derive(Debug, Clone)]
struct DocumentState {
    encoding: &'static Encoding,
    has_bom: bool,
    line_break: String,
}

impl Default for DocumentState {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            has_bom: false,
            line_break: "\n".to_string(),
        }
    }
}

/// Rebuilds documents from the skeletons of their resources.
///
/// Resources are resolved in arrival order into a buffer. Referents are
/// kept in the reference table instead, a referent group together with
/// everything received before its END_GROUP, and are written where a later
/// skeleton references them. The buffer is only encoded and committed to
/// the output on [`close`](FilterWriter::close).
pub struct GenericSkeletonWriter {
    output: Option<OutputTarget>,
    options: WriterOptions,
    encoder: Arc<dyn ContentEncoder>,
    buffer: String,
    table: ReferenceTable,
    /// Open groups, innermost last, with whether they are being collected.
    groups: Vec<(String, bool)>,
    document: DocumentState,
}

impl Default for GenericSkeletonWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl GenericSkeletonWriter {
    pub fn new() -> Self {
        Self {
            output: None,
            options: WriterOptions::default(),
            encoder: Arc::new(IdentityEncoder),
            buffer: String::new(),
            table: ReferenceTable::new(),
            groups: Vec::new(),
            document: DocumentState::default(),
        }
    }

    /// Output produced so far for the current document, before encoding.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.table.clear();
        self.groups.clear();
    }

    fn collecting_group(&self) -> Option<&str> {
        self.groups
            .iter()
            .rev()
            .find(|(_, collecting)| *collecting)
            .map(|(id, _)| id.as_str())
    }

    /// Writes `resource` in place, or stores it when it belongs elsewhere.
    fn place(&mut self, resource: &Resource) -> Result<(), Error> {
        if resource.is_referent() {
            self.table.insert(resource.clone());
            return Ok(());
        }
        if let Some(group) = self.collecting_group().map(str::to_string) {
            self.table.push_child(&group, resource.clone());
            return Ok(());
        }
        self.render(resource)
    }

    fn render(&mut self, resource: &Resource) -> Result<(), Error> {
        let locale = self.options.target_locale.as_ref();
        let mut resolver = SkeletonResolver::new(&self.table, locale, self.encoder.as_ref());
        let text = resolver.resolve(resource)?;
        self.buffer.push_str(&text);
        Ok(())
    }

    fn start_document(&mut self, resource: Option<&Resource>) -> Result<(), Error> {
        self.reset();
        self.document = DocumentState::default();
        if let Some(doc) = resource.and_then(Resource::as_start_document) {
            if let Some(label) = &doc.encoding {
                self.document.encoding = encoding::lookup(label)?;
            }
            self.document.has_bom = doc.has_bom;
            self.document.line_break = doc.line_break.clone();
            debug!("Writing document `{}`", doc.id());
        }
        match resource {
            Some(resource) => self.render(resource),
            None => Ok(()),
        }
    }

    fn start_group(&mut self, resource: Option<&Resource>) -> Result<(), Error> {
        let Some(resource) = resource else {
            self.groups.push((String::new(), false));
            return Ok(());
        };
        if resource.is_referent() {
            self.table.open_group(resource.clone());
            self.groups.push((resource.id().to_string(), true));
            return Ok(());
        }
        self.place(resource)?;
        self.groups.push((resource.id().to_string(), false));
        Ok(())
    }

    fn end_group(&mut self, resource: Option<&Resource>) -> Result<(), Error> {
        match self.groups.pop() {
            Some((id, true)) => {
                self.table.close_group(&id, resource.cloned());
                Ok(())
            }
            _ => match resource {
                Some(resource) => self.place(resource),
                None => Ok(()),
            },
        }
    }

    fn output_encoding(&self) -> Result<&'static Encoding, Error> {
        match &self.options.encoding {
            Some(label) => encoding::lookup(label),
            None => Ok(self.document.encoding),
        }
    }
}

impl FilterWriter for GenericSkeletonWriter {
    fn set_output(&mut self, target: OutputTarget, options: WriterOptions) {
        self.output = Some(target);
        self.options = options;
    }

    fn set_encoder(&mut self, encoder: Arc<dyn ContentEncoder>) {
        self.encoder = encoder;
    }

    fn handle(&mut self, event: &Event) -> Result<(), Error> {
        if event.is_aborted() {
            if event.event_type() == EventType::EndDocument {
                self.discard();
            }
            return Ok(());
        }
        let resource = event.resource();
        match event.event_type() {
            EventType::StartDocument => self.start_document(resource),
            EventType::StartGroup => self.start_group(resource),
            EventType::EndGroup => self.end_group(resource),
            EventType::StartSubDocument
            | EventType::EndSubDocument
            | EventType::EndDocument
            | EventType::TextUnit
            | EventType::DocumentPart => match resource {
                Some(resource) => self.place(resource),
                None => Ok(()),
            },
            EventType::StartBatch
            | EventType::StartBatchItem
            | EventType::EndBatchItem
            | EventType::EndBatch => Ok(()),
        }
    }

    fn close(&mut self) -> Result<FlushResult, Error> {
        let Some(target) = self.output.clone() else {
            return Err(Error::InvalidState {
                operation: "close the writer",
                state: "no output set".to_string(),
            });
        };
        let output_encoding = self.output_encoding()?;
        let write_bom = self.options.write_bom.unwrap_or(self.document.has_bom);
        let text = match &self.options.line_break {
            Some(line_break) if *line_break != self.document.line_break => self
                .buffer
                .replace(self.document.line_break.as_str(), line_break),
            _ => std::mem::take(&mut self.buffer),
        };
        let encoded = encoding::encode(&text, output_encoding, write_bom);
        if encoded.lossy {
            warn!(
                "Some characters of {} cannot be represented in {}",
                target, encoded.encoding
            );
        }

        let bytes_written = encoded.bytes.len();
        match &target {
            OutputTarget::Path(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &encoded.bytes)?;
            }
            OutputTarget::Memory(memory) => memory.replace(encoded.bytes),
        }
        info!(
            "Wrote {} bytes ({}) to {}",
            bytes_written, encoded.encoding, target
        );
        self.reset();
        Ok(FlushResult {
            target: target.to_string(),
            encoding: encoded.encoding.to_string(),
            bytes_written,
            lossy: encoded.lossy,
        })
    }

    fn discard(&mut self) {
        if !self.buffer.is_empty() || !self.table.is_empty() {
            warn!(
                "Discarding partial output for {}",
                self.output
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "<no output>".to_string())
            );
        }
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fragment::TextFragment,
        locale::LocaleId,
        resource::{DocumentPart, Ending, PropertyBearer, StartDocument, StartGroup, TextUnit},
        skeleton::{PropertyScope, Skeleton, SkeletonBuilder},
        traits::XmlEncoder,
    };
    use tempfile::tempdir;

    fn paragraph(id: &str, text: &str) -> TextUnit {
        let mut builder = SkeletonBuilder::new();
        builder.append("<p>").add_content_placeholder().append("</p>\n");
        TextUnit::new(id, TextFragment::from_text(text).unwrap()).with_skeleton(builder.build())
    }

    fn html_document(body: Vec<Event>) -> Vec<Event> {
        let mut events = vec![
            Event::start_batch_item(),
            Event::start_document(
                StartDocument::new("doc")
                    .with_encoding("UTF-8", false)
                    .with_skeleton(Skeleton::from_text("<html>\n")),
            ),
        ];
        events.extend(body);
        events.push(Event::end_document(
            Ending::new("doc-end").with_skeleton(Skeleton::from_text("</html>\n")),
        ));
        events.push(Event::end_batch_item());
        events
    }

    fn write(writer: &mut GenericSkeletonWriter, events: &[Event]) -> MemoryOutput {
        let memory = MemoryOutput::new();
        writer.set_output(OutputTarget::Memory(memory.clone()), writer.options.clone());
        for event in events {
            writer.handle(event).unwrap();
        }
        writer.close().unwrap();
        memory
    }

    #[test]
    fn test_round_trip_in_order() {
        let events = html_document(vec![
            Event::text_unit(paragraph("tu1", "one")),
            Event::document_part(
                DocumentPart::new("dp1").with_skeleton(Skeleton::from_text("<hr/>\n")),
            ),
            Event::text_unit(paragraph("tu2", "two")),
        ]);
        let memory = write(&mut GenericSkeletonWriter::new(), &events);
        assert_eq!(memory.text(), "<html>\n<p>one</p>\n<hr/>\n<p>two</p>\n</html>\n");
    }

    #[test]
    fn test_text_unit_without_skeleton_writes_its_content() {
        let bare = TextUnit::new("tu1", TextFragment::from_text("Hello & bye").unwrap());
        let events = html_document(vec![Event::text_unit(bare)]);
        let mut writer = GenericSkeletonWriter::new();
        writer.set_encoder(Arc::new(XmlEncoder::default()));
        let memory = write(&mut writer, &events);
        assert_eq!(memory.text(), "<html>\nHello &amp; bye</html>\n");
    }

    #[test]
    fn test_target_locale_and_encoder() {
        let fr = LocaleId::new("fr").unwrap();
        let mut unit = paragraph("tu1", "a & b");
        unit.set_target(&fr, TextFragment::from_text("a & b (fr)").unwrap());
        let events = html_document(vec![Event::text_unit(unit)]);

        let mut writer = GenericSkeletonWriter::new();
        writer.set_encoder(Arc::new(XmlEncoder::default()));
        writer.options = WriterOptions::new().with_target_locale(fr);
        let memory = write(&mut writer, &events);
        assert_eq!(memory.text(), "<html>\n<p>a &amp; b (fr)</p>\n</html>\n");
    }

    #[test]
    fn test_referent_written_where_referenced() {
        let alt = TextUnit::new("alt", TextFragment::from_text("A cat").unwrap()).as_referent();
        let mut img = SkeletonBuilder::new();
        img.append("<img alt=\"").add_reference("alt").append("\"/>\n");
        let events = html_document(vec![
            Event::text_unit(alt),
            Event::document_part(DocumentPart::new("img").with_skeleton(img.build())),
        ]);
        let memory = write(&mut GenericSkeletonWriter::new(), &events);
        assert_eq!(memory.text(), "<html>\n<img alt=\"A cat\"/>\n</html>\n");
    }

    #[test]
    fn test_referent_group_collects_children() {
        let mut list = SkeletonBuilder::new();
        list.append("<div>").add_reference("menu").append("</div>\n");
        let events = html_document(vec![
            Event::start_group(
                StartGroup::new("menu")
                    .with_skeleton(Skeleton::from_text("<ul>\n"))
                    .as_referent(),
            ),
            Event::text_unit(paragraph("tu1", "item")),
            Event::end_group(Ending::new("menu-end").with_skeleton(Skeleton::from_text("</ul>"))),
            Event::document_part(DocumentPart::new("wrapper").with_skeleton(list.build())),
        ]);
        let memory = write(&mut GenericSkeletonWriter::new(), &events);
        assert_eq!(
            memory.text(),
            "<html>\n<div><ul>\n<p>item</p>\n</ul></div>\n</html>\n"
        );
    }

    #[test]
    fn test_modified_property_written() {
        let mut builder = SkeletonBuilder::new();
        builder
            .append("<a name=\"")
            .add_value_placeholder("name", PropertyScope::Resource)
            .append("\"/>\n");
        let mut part = DocumentPart::new("dp1")
            .with_skeleton(builder.build())
            .with_property("name", "x");
        part.set_property("name", "y");
        let events = html_document(vec![Event::document_part(part)]);
        let memory = write(&mut GenericSkeletonWriter::new(), &events);
        assert_eq!(memory.text(), "<html>\n<a name=\"y\"/>\n</html>\n");
    }

    #[test]
    fn test_aborted_end_document_discards() {
        let memory = MemoryOutput::new();
        let mut writer = GenericSkeletonWriter::new();
        writer.set_output(OutputTarget::Memory(memory.clone()), WriterOptions::new());
        writer
            .handle(&Event::start_document(
                StartDocument::new("doc").with_skeleton(Skeleton::from_text("<html>")),
            ))
            .unwrap();
        assert_eq!(writer.pending(), "<html>");
        writer
            .handle(&Event::aborted_end(EventType::EndDocument, "doc"))
            .unwrap();
        assert_eq!(writer.pending(), "");
        assert!(memory.is_empty());
    }

    #[test]
    fn test_bom_and_encoding_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("doc.txt");
        let events = vec![
            Event::start_document(
                StartDocument::new("doc")
                    .with_encoding("UTF-16LE", true)
                    .with_skeleton(Skeleton::from_text("hi\n")),
            ),
            Event::end_document(Ending::new("end")),
        ];
        let mut writer = GenericSkeletonWriter::new();
        writer.set_output(OutputTarget::Path(path.clone()), WriterOptions::new());
        for event in &events {
            writer.handle(event).unwrap();
        }
        let result = writer.close().unwrap();
        assert_eq!(result.encoding, "UTF-16LE");
        assert_eq!(result.bytes_written, 8);
        assert!(!result.lossy);
        assert_eq!(std::fs::read(&path).unwrap(), b"\xFF\xFEh\x00i\x00\n\x00");

        writer.set_output(
            OutputTarget::Path(path.clone()),
            WriterOptions::new()
                .with_encoding("UTF-8")
                .with_bom(false)
                .with_line_break("\r\n"),
        );
        for event in &events {
            writer.handle(event).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hi\r\n");
    }

    #[test]
    fn test_lossy_output_is_reported() {
        let memory = MemoryOutput::new();
        let mut writer = GenericSkeletonWriter::new();
        writer.set_output(
            OutputTarget::Memory(memory.clone()),
            WriterOptions::new().with_encoding("windows-1252"),
        );
        writer
            .handle(&Event::start_document(
                StartDocument::new("doc").with_skeleton(Skeleton::from_text("✓")),
            ))
            .unwrap();
        assert!(writer.close().unwrap().lossy);
    }

    #[test]
    fn test_close_without_output() {
        let mut writer = GenericSkeletonWriter::new();
        assert!(matches!(writer.close(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_unresolved_reference_is_an_error() {
        let mut builder = SkeletonBuilder::new();
        builder.add_reference("missing");
        let mut writer = GenericSkeletonWriter::new();
        writer
            .handle(&Event::start_document(StartDocument::new("doc")))
            .unwrap();
        let err = writer
            .handle(&Event::document_part(
                DocumentPart::new("dp").with_skeleton(builder.build()),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedSkeletonReference { .. }));
    }
}
