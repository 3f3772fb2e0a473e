//! Lossless extraction and reconstruction of localizable documents.
//!
//! Filters turn an input document into a stream of [`Event`]s carrying
//! [`Resource`]s: translatable [`TextUnit`]s with inline codes, opaque
//! [`DocumentPart`]s, and the structure around them. Steps of a [`Pipeline`]
//! transform those resources, and a writer rebuilds the document from the
//! [`Skeleton`] each resource carries. Parts that no step touched come out
//! byte for byte as they went in.
//!
//! ```rust
//! use skeletext::{TagType, TextFragment};
//!
//! let mut fragment = TextFragment::from_text("Hello ").unwrap();
//! fragment.append_code(TagType::Opening, "b", "<b>").unwrap();
//! fragment.append_text("world").unwrap();
//! fragment.append_code(TagType::Closing, "b", "</b>").unwrap();
//! assert_eq!(fragment.display(), "Hello ⟦1o⟧world⟦1c⟧");
//! assert_eq!(fragment.to_original(), "Hello <b>world</b>");
//! ```

pub mod code_finder;
pub mod document;
pub mod encoding;
pub mod error;
pub mod event;
pub mod filters;
pub mod fragment;
pub mod locale;
pub mod options;
pub mod pipeline;
pub mod resource;
pub mod skeleton;
pub mod steps;
pub mod traits;
pub mod writer;

// Re-export most used types for easy consumption
pub use crate::{
    code_finder::InlineCodeFinder,
    document::{InputSource, RawDocument},
    error::{Error, StepFailureKind},
    event::{Event, EventType, NestingValidator},
    filters::FilterRegistry,
    fragment::{Code, TagType, TextFragment},
    locale::LocaleId,
    options::{NestingCheck, PipelineOptions, WriterOptions},
    pipeline::{
        BatchItem, BatchReport, ItemReport, ItemStatus, Pipeline, PipelineDriver, PipelineState,
        RunControl, Step, StepContext, StepOutput,
    },
    resource::{
        Annotatable, DocumentPart, Ending, Nameable, PropertyBearer, Resource, SkeletonBearer,
        StartDocument, StartGroup, StartSubDocument, TargetCreation, TextUnit,
    },
    skeleton::{PropertyScope, ResourceRef, Skeleton, SkeletonBuilder, SkeletonPart},
    steps::{CreateTargetStep, WriterStep},
    traits::{ContentEncoder, EventStream, Filter, FilterWriter, IdentityEncoder, XmlEncoder},
    writer::{FlushResult, GenericSkeletonWriter, MemoryOutput, OutputTarget},
};
