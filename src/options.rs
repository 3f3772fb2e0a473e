//! Options for pipelines and writers.

use serde::{Deserialize, Serialize};

use crate::{error::Error, locale::LocaleId};

/// When the nesting of a batch item's events is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingCheck {
    /// Read the whole item first; no step sees a document event of a badly
    /// nested item.
    #[default]
    Prevalidate,
    /// Check each event right before it is dispatched. Steps may have seen
    /// the beginning of an item that turns out to be badly nested.
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Name used in logs and reports.
    pub id: String,
    pub nesting_check: NestingCheck,
    /// Keep processing the next items after an item failed.
    pub continue_on_failure: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            id: "pipeline".to_string(),
            nesting_check: NestingCheck::default(),
            continue_on_failure: true,
        }
    }
}

impl PipelineOptions {
    /// Creates default pipeline options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_nesting_check(mut self, nesting_check: NestingCheck) -> Self {
        self.nesting_check = nesting_check;
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    /// Loads options from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// How a writer produces its output.
///
/// Unset fields follow the input document: its encoding, its BOM, its line
/// breaks. Without a target locale the source content is written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    pub encoding: Option<String>,
    pub target_locale: Option<LocaleId>,
    pub write_bom: Option<bool>,
    pub line_break: Option<String>,
}

impl WriterOptions {
    /// Creates default writer options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = Some(encoding.to_string());
        self
    }

    pub fn with_target_locale(mut self, locale: LocaleId) -> Self {
        self.target_locale = Some(locale);
        self
    }

    pub fn with_bom(mut self, write_bom: bool) -> Self {
        self.write_bom = Some(write_bom);
        self
    }

    pub fn with_line_break(mut self, line_break: &str) -> Self {
        self.line_break = Some(line_break.to_string());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}
