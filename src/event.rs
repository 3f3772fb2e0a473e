//! Events: the unit of communication between filters, steps and writers.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    resource::{
        DocumentPart, Ending, Nameable, Resource, SkeletonBearer, StartDocument, StartGroup,
        StartSubDocument, TextUnit,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    StartBatch,
    StartBatchItem,
    StartDocument,
    StartSubDocument,
    StartGroup,
    TextUnit,
    DocumentPart,
    EndGroup,
    EndSubDocument,
    EndDocument,
    EndBatchItem,
    EndBatch,
}

impl EventType {
    /// Events sent by the engine itself around the document sequences.
    pub fn is_batch_level(self) -> bool {
        matches!(
            self,
            EventType::StartBatch
                | EventType::StartBatchItem
                | EventType::EndBatchItem
                | EventType::EndBatch
        )
    }

    pub fn is_start(self) -> bool {
        matches!(
            self,
            EventType::StartBatch
                | EventType::StartBatchItem
                | EventType::StartDocument
                | EventType::StartSubDocument
                | EventType::StartGroup
        )
    }

    pub fn is_end(self) -> bool {
        matches!(
            self,
            EventType::EndBatch
                | EventType::EndBatchItem
                | EventType::EndDocument
                | EventType::EndSubDocument
                | EventType::EndGroup
        )
    }

    /// The end event closing this start event.
    pub fn matching_end(self) -> Option<EventType> {
        match self {
            EventType::StartBatch => Some(EventType::EndBatch),
            EventType::StartBatchItem => Some(EventType::EndBatchItem),
            EventType::StartDocument => Some(EventType::EndDocument),
            EventType::StartSubDocument => Some(EventType::EndSubDocument),
            EventType::StartGroup => Some(EventType::EndGroup),
            _ => None,
        }
    }

    fn accepts(self, resource: Option<&Resource>) -> bool {
        match (self, resource) {
            (EventType::TextUnit, Some(Resource::TextUnit(_))) => true,
            (EventType::DocumentPart, Some(Resource::DocumentPart(_))) => true,
            (EventType::TextUnit | EventType::DocumentPart, _) => false,
            (_, None) => true,
            (t, Some(_)) if t.is_batch_level() => false,
            (EventType::StartDocument, Some(Resource::StartDocument(_))) => true,
            (EventType::StartSubDocument, Some(Resource::StartSubDocument(_))) => true,
            (EventType::StartGroup, Some(Resource::StartGroup(_))) => true,
            (
                EventType::EndDocument | EventType::EndSubDocument | EventType::EndGroup,
                Some(Resource::Ending(_)),
            ) => true,
            _ => false,
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::StartBatch => "START_BATCH",
            EventType::StartBatchItem => "START_BATCH_ITEM",
            EventType::StartDocument => "START_DOCUMENT",
            EventType::StartSubDocument => "START_SUBDOCUMENT",
            EventType::StartGroup => "START_GROUP",
            EventType::TextUnit => "TEXT_UNIT",
            EventType::DocumentPart => "DOCUMENT_PART",
            EventType::EndGroup => "END_GROUP",
            EventType::EndSubDocument => "END_SUBDOCUMENT",
            EventType::EndDocument => "END_DOCUMENT",
            EventType::EndBatchItem => "END_BATCH_ITEM",
            EventType::EndBatch => "END_BATCH",
        };
        write!(f, "{}", name)
    }
}

/// An event type with its resource.
///
/// The pairing is checked on construction: a `TEXT_UNIT` event always holds
/// a [`TextUnit`], an `END_GROUP` holds an [`Ending`] or nothing, batch
/// events hold nothing, and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<Resource>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    aborted: bool,
}

impl Event {
    pub fn new(event_type: EventType, resource: Option<Resource>) -> Result<Self, Error> {
        if !event_type.accepts(resource.as_ref()) {
            return Err(Error::InvalidEvent(format!(
                "{} cannot carry {}",
                event_type,
                resource.as_ref().map(Resource::kind).unwrap_or("no resource")
            )));
        }
        Ok(Self {
            event_type,
            resource,
            aborted: false,
        })
    }

    fn bare(event_type: EventType, resource: Option<Resource>) -> Self {
        Self {
            event_type,
            resource,
            aborted: false,
        }
    }

    pub fn start_batch() -> Self {
        Self::bare(EventType::StartBatch, None)
    }

    pub fn end_batch() -> Self {
        Self::bare(EventType::EndBatch, None)
    }

    pub fn start_batch_item() -> Self {
        Self::bare(EventType::StartBatchItem, None)
    }

    pub fn end_batch_item() -> Self {
        Self::bare(EventType::EndBatchItem, None)
    }

    pub fn start_document(doc: StartDocument) -> Self {
        Self::bare(EventType::StartDocument, Some(doc.into()))
    }

    pub fn start_subdocument(sub: StartSubDocument) -> Self {
        Self::bare(EventType::StartSubDocument, Some(sub.into()))
    }

    pub fn start_group(group: StartGroup) -> Self {
        Self::bare(EventType::StartGroup, Some(group.into()))
    }

    pub fn text_unit(unit: TextUnit) -> Self {
        Self::bare(EventType::TextUnit, Some(unit.into()))
    }

    pub fn document_part(part: DocumentPart) -> Self {
        Self::bare(EventType::DocumentPart, Some(part.into()))
    }

    pub fn end_group(ending: Ending) -> Self {
        Self::bare(EventType::EndGroup, Some(ending.into()))
    }

    pub fn end_subdocument(ending: Ending) -> Self {
        Self::bare(EventType::EndSubDocument, Some(ending.into()))
    }

    pub fn end_document(ending: Ending) -> Self {
        Self::bare(EventType::EndDocument, Some(ending.into()))
    }

    /// An end event synthesized after a failure or a cancellation.
    pub(crate) fn aborted_end(event_type: EventType, id: &str) -> Self {
        let resource = match event_type {
            EventType::EndDocument | EventType::EndSubDocument | EventType::EndGroup => {
                Some(Ending::new(id).into())
            }
            _ => None,
        };
        Self {
            event_type,
            resource,
            aborted: true,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn resource_mut(&mut self) -> Option<&mut Resource> {
        self.resource.as_mut()
    }

    pub fn text_unit_mut(&mut self) -> Option<&mut TextUnit> {
        self.resource.as_mut().and_then(Resource::as_text_unit_mut)
    }

    pub fn into_resource(self) -> Option<Resource> {
        self.resource
    }

    /// `true` for end events synthesized because the document could not be
    /// completed. Writers discard their partial output on such events.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Replaces the resource with a transformed one and returns the old one.
    ///
    /// The replacement must be of the same variant, keep the id and keep the
    /// skeleton, otherwise the document could not be rebuilt.
    pub fn replace_resource(&mut self, resource: Resource) -> Result<Resource, Error> {
        let Some(current) = self.resource.as_ref() else {
            return Err(Error::InvalidEvent(format!(
                "{} has no resource to replace",
                self.event_type
            )));
        };
        if !current.same_variant(&resource) {
            return Err(Error::InvalidEvent(format!(
                "cannot replace {} `{}` with {}",
                current.kind(),
                current.id(),
                resource.kind()
            )));
        }
        if current.id() != resource.id() {
            return Err(Error::InvalidEvent(format!(
                "replacement changes id `{}` to `{}`",
                current.id(),
                resource.id()
            )));
        }
        if current.skeleton() != resource.skeleton() {
            return Err(Error::InvalidEvent(format!(
                "replacement changes the skeleton of `{}`",
                current.id()
            )));
        }
        self.resource
            .replace(resource)
            .ok_or_else(|| Error::InvalidEvent("missing resource".to_string()))
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an event, checking the type/resource pairing.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            event_type: EventType,
            #[serde(default)]
            resource: Option<Resource>,
            #[serde(default)]
            aborted: bool,
        }

        let raw = Raw::deserialize(deserializer)?;
        let mut event =
            Event::new(raw.event_type, raw.resource).map_err(serde::de::Error::custom)?;
        event.aborted = raw.aborted;
        Ok(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Document,
    SubDocument,
    Group,
}

impl FrameKind {
    fn end_type(self) -> EventType {
        match self {
            FrameKind::Document => EventType::EndDocument,
            FrameKind::SubDocument => EventType::EndSubDocument,
            FrameKind::Group => EventType::EndGroup,
        }
    }
}

/// Checks the nesting of the event sequence of one batch item.
///
/// Exactly one document per item; sub-documents only inside the document or
/// another sub-document; groups inside any open frame; content only inside
/// an open frame.
#[derive(Debug, Clone, Default)]
pub struct NestingValidator {
    frames: Vec<(FrameKind, String)>,
    documents: usize,
}

impl NestingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &Event) -> Result<(), Error> {
        let id = event
            .resource()
            .map(|r| r.id().to_string())
            .unwrap_or_default();
        let event_type = event.event_type();
        match event_type {
            t if t.is_batch_level() => {
                return Err(Error::UnbalancedNesting(format!(
                    "{} inside a document sequence",
                    t
                )));
            }
            EventType::StartDocument => {
                if self.documents > 0 {
                    return Err(Error::UnbalancedNesting(format!(
                        "second document `{}` in the same batch item",
                        id
                    )));
                }
                self.documents += 1;
                self.frames.push((FrameKind::Document, id));
            }
            EventType::StartSubDocument => match self.top() {
                Some(FrameKind::Document | FrameKind::SubDocument) => {
                    self.frames.push((FrameKind::SubDocument, id));
                }
                _ => {
                    return Err(Error::UnbalancedNesting(format!(
                        "subdocument `{}` outside a document",
                        id
                    )));
                }
            },
            EventType::StartGroup => {
                self.require_open(event_type, &id)?;
                self.frames.push((FrameKind::Group, id));
            }
            EventType::TextUnit | EventType::DocumentPart => {
                self.require_open(event_type, &id)?;
            }
            EventType::EndGroup | EventType::EndSubDocument | EventType::EndDocument => {
                match self.frames.last() {
                    Some((kind, _)) if kind.end_type() == event_type => {
                        self.frames.pop();
                    }
                    Some((kind, open_id)) => {
                        return Err(Error::UnbalancedNesting(format!(
                            "{} while `{}` expects {}",
                            event_type,
                            open_id,
                            kind.end_type()
                        )));
                    }
                    None => {
                        return Err(Error::UnbalancedNesting(format!(
                            "{} without a matching start",
                            event_type
                        )));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Checks that the sequence held exactly one complete document.
    pub fn finish(&self) -> Result<(), Error> {
        if let Some((kind, id)) = self.frames.last() {
            return Err(Error::UnbalancedNesting(format!(
                "`{}` is never closed ({} missing)",
                id,
                kind.end_type()
            )));
        }
        if self.documents == 0 {
            return Err(Error::UnbalancedNesting(
                "batch item produced no document".to_string(),
            ));
        }
        Ok(())
    }

    /// The end events still owed, innermost first, with the ids they close.
    pub fn open_frames(&self) -> Vec<(EventType, String)> {
        self.frames
            .iter()
            .rev()
            .map(|(kind, id)| (kind.end_type(), id.clone()))
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn validate_sequence<'a, I>(events: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut validator = NestingValidator::new();
        for event in events {
            validator.push(event)?;
        }
        validator.finish()
    }

    fn top(&self) -> Option<FrameKind> {
        self.frames.last().map(|(kind, _)| *kind)
    }

    fn require_open(&self, event_type: EventType, id: &str) -> Result<(), Error> {
        if self.frames.is_empty() {
            return Err(Error::UnbalancedNesting(format!(
                "{} `{}` outside a document",
                event_type, id
            )));
        }
        Ok(())
    }
}
