//! Fixtures shared by the integration tests: a line-based properties filter,
//! a filter replaying fixed events, and steps recording what they see.
#![allow(dead_code)]

use std::{io::BufRead, sync::Arc, time::Duration};

use parking_lot::Mutex;
use skeletext::{
    BatchItem, DocumentPart, Ending, Error, Event, EventStream, EventType, Filter,
    InlineCodeFinder, MemoryOutput, Nameable, OutputTarget, RawDocument, Skeleton,
    SkeletonBuilder, StartDocument, Step, StepContext, StepFailureKind, StepOutput, TextFragment,
    TextUnit, document::DecodedReader, traits::ContentEncoder,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `key=value` lines become text units, anything else document parts.
/// A line holding exactly `@@@` makes the filter fail.
pub struct PropertiesFilter {
    finder: InlineCodeFinder,
}

impl PropertiesFilter {
    pub fn new() -> Self {
        Self {
            finder: InlineCodeFinder::html_tags(),
        }
    }
}

impl Filter for PropertiesFilter {
    fn name(&self) -> &str {
        "okf_properties"
    }

    fn mime_type(&self) -> &str {
        "text/x-properties"
    }

    fn extensions(&self) -> &[&str] {
        &["properties"]
    }

    fn open<'a>(&'a mut self, raw: &'a RawDocument) -> Result<EventStream<'a>, Error> {
        let reader = raw.open_reader()?;
        Ok(Box::new(PropertiesEvents {
            start: Some(
                StartDocument::new("doc")
                    .with_encoding(reader.encoding.name(), reader.has_bom)
                    .with_mime_type("text/x-properties")
                    .with_filter_id("okf_properties"),
            ),
            reader: Some(reader),
            finder: &self.finder,
            next_id: 0,
        }))
    }

    fn encoder(&self) -> Arc<dyn ContentEncoder> {
        Arc::new(skeletext::IdentityEncoder)
    }
}

struct PropertiesEvents<'a> {
    start: Option<StartDocument>,
    reader: Option<DecodedReader>,
    finder: &'a InlineCodeFinder,
    next_id: usize,
}

impl PropertiesEvents<'_> {
    fn line_event(&mut self, line: &str) -> Result<Event, Error> {
        let (body, line_break) = split_line_break(line);
        self.next_id += 1;
        if body == "@@@" {
            return Err(Error::InvalidEvent(format!(
                "unreadable line {}",
                self.next_id
            )));
        }
        match body.split_once('=') {
            Some((key, value)) if !key.trim_start().starts_with('#') => {
                let mut source = TextFragment::from_text(value)?;
                self.finder.process(&mut source)?;
                let mut skeleton = SkeletonBuilder::new();
                skeleton
                    .append(key)
                    .append("=")
                    .add_content_placeholder()
                    .append(line_break);
                let unit = TextUnit::new(&format!("tu{}", self.next_id), source)
                    .with_name(key)
                    .with_skeleton(skeleton.build());
                Ok(Event::text_unit(unit))
            }
            _ => Ok(Event::document_part(
                DocumentPart::new(&format!("dp{}", self.next_id))
                    .with_skeleton(Skeleton::from_text(line)),
            )),
        }
    }
}

fn split_line_break(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

impl Iterator for PropertiesEvents<'_> {
    type Item = Result<Event, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(start) = self.start.take() {
            return Some(Ok(Event::start_document(start)));
        }
        let reader = self.reader.as_mut()?;
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                self.reader = None;
                Some(Ok(Event::end_document(Ending::new("doc-end"))))
            }
            Ok(_) => {
                let event = self.line_event(&line);
                if event.is_err() {
                    self.reader = None;
                }
                Some(event)
            }
            Err(err) => {
                self.reader = None;
                Some(Err(err.into()))
            }
        }
    }
}

/// Replays the same events on every open.
pub struct ScriptedFilter {
    events: Vec<Event>,
}

impl ScriptedFilter {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }
}

impl Filter for ScriptedFilter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn mime_type(&self) -> &str {
        "application/octet-stream"
    }

    fn extensions(&self) -> &[&str] {
        &[]
    }

    fn open<'a>(&'a mut self, _raw: &'a RawDocument) -> Result<EventStream<'a>, Error> {
        Ok(Box::new(self.events.iter().cloned().map(Ok)))
    }
}

/// Log shared between a test and its recording steps.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entry(event: &Event) -> String {
    let mut entry = event.event_type().to_string();
    if let Some(resource) = event.resource() {
        entry.push(' ');
        entry.push_str(resource.id());
    }
    if event.is_aborted() {
        entry.push_str(" (aborted)");
    }
    entry
}

/// Records every event it forwards as `TYPE id`.
pub struct RecorderStep {
    name: String,
    log: EventLog,
}

impl RecorderStep {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
        }
    }
}

impl Step for RecorderStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle_event(&mut self, event: Event, _ctx: &mut StepContext) -> Result<StepOutput, Error> {
        self.log.lock().push(entry(&event));
        Ok(StepOutput::Forward(event))
    }
}

/// Times out on the first text unit of one batch item.
pub struct SlowStep {
    item_index: usize,
}

impl SlowStep {
    pub fn on_item(item_index: usize) -> Self {
        Self { item_index }
    }
}

impl Step for SlowStep {
    fn name(&self) -> &str {
        "slow-mt"
    }

    fn description(&self) -> &str {
        "Pretends to call a machine translation service."
    }

    fn handle_event(&mut self, event: Event, ctx: &mut StepContext) -> Result<StepOutput, Error> {
        let is_target = ctx.item().map(|item| item.index) == Some(self.item_index);
        if is_target && event.event_type() == EventType::TextUnit {
            let deadline = ctx.deadline(Duration::ZERO);
            std::thread::sleep(Duration::from_millis(2));
            deadline.check(self.name())?;
        }
        Ok(StepOutput::Forward(event))
    }
}

/// Fails every text unit of every item with the given kind.
pub struct RejectingStep(pub StepFailureKind);

impl Step for RejectingStep {
    fn name(&self) -> &str {
        "reject"
    }

    fn handle_event(&mut self, event: Event, _ctx: &mut StepContext) -> Result<StepOutput, Error> {
        if event.event_type() == EventType::TextUnit {
            return Err(Error::step_failure(self.name(), self.0, "not today"));
        }
        Ok(StepOutput::Forward(event))
    }
}

pub fn properties_item(text: &str, name: &str) -> (BatchItem, MemoryOutput) {
    let output = MemoryOutput::new();
    let item = BatchItem::new(RawDocument::from_text(text).with_name(name))
        .with_output(OutputTarget::Memory(output.clone()));
    (item, output)
}
