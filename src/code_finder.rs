//! Regex-driven detection of inline codes inside plain text.
//!
//! Filters that extract text containing markup (an HTML snippet inside a
//! properties value, printf placeholders, ...) run the finder over the
//! extracted fragment so the markup becomes protected inline codes.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    error::Error,
    fragment::{Code, Piece, TagType, TextFragment},
};

lazy_static! {
    static ref HTML_TAG_REGEX: Regex = Regex::new(r"</?[A-Za-z][A-Za-z0-9:_-]*[^<>]*>").unwrap();
    static ref TAG_NAME_REGEX: Regex = Regex::new(r"^</?([A-Za-z][A-Za-z0-9:_-]*)").unwrap();
}

/// A set of patterns whose matches are turned into inline codes.
#[derive(Debug, Clone, Default)]
pub struct InlineCodeFinder {
    rules: Vec<Regex>,
}

impl InlineCodeFinder {
    /// Creates a finder without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A finder that recognizes HTML/XML-like tags.
    pub fn html_tags() -> Self {
        Self {
            rules: vec![HTML_TAG_REGEX.clone()],
        }
    }

    /// Adds a rule. Invalid patterns are rejected.
    pub fn add_rule(&mut self, pattern: &str) -> Result<(), Error> {
        self.rules.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn with_rule(mut self, pattern: &str) -> Result<Self, Error> {
        self.add_rule(pattern)?;
        Ok(self)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Converts every match found in the plain-text runs of `fragment` into
    /// an inline code. Existing codes keep their ids. Returns the number of
    /// codes created.
    pub fn process(&self, fragment: &mut TextFragment) -> Result<usize, Error> {
        if self.rules.is_empty() {
            return Ok(0);
        }
        let mut created = 0;
        let mut pieces = Vec::new();
        for piece in fragment.pieces() {
            match piece {
                Piece::Text(text) => created += self.split_run(&text, &mut pieces),
                other => pieces.push(other),
            }
        }
        if created > 0 {
            fragment.rebuild(pieces)?;
        }
        Ok(created)
    }

    fn split_run(&self, text: &str, pieces: &mut Vec<Piece>) -> usize {
        let mut created = 0;
        let mut pos = 0;
        while pos < text.len() {
            // Earliest match wins, the longest one on ties.
            let next = self
                .rules
                .iter()
                .filter_map(|rule| rule.find_at(text, pos))
                .filter(|m| !m.is_empty())
                .min_by(|a, b| a.start().cmp(&b.start()).then(b.end().cmp(&a.end())));
            let Some(found) = next else {
                break;
            };
            if found.start() > pos {
                pieces.push(Piece::Text(text[pos..found.start()].to_string()));
            }
            pieces.push(Piece::New(classify(found.as_str())));
            created += 1;
            pos = found.end();
        }
        if pos < text.len() {
            pieces.push(Piece::Text(text[pos..].to_string()));
        }
        created
    }
}

fn classify(markup: &str) -> Code {
    let name = TAG_NAME_REGEX
        .captures(markup)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase());
    let tag_type = match &name {
        Some(_) if markup.starts_with("</") => TagType::Closing,
        Some(_) if markup.ends_with("/>") => TagType::Isolated,
        Some(_) if markup.starts_with('<') && markup.ends_with('>') => TagType::Opening,
        _ => TagType::Isolated,
    };
    Code::new(tag_type, name.unwrap_or_else(|| "x".to_string()), markup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_tags() {
        let mut tf = TextFragment::from_text("Hello <b>world</b>!<br/>").unwrap();
        let finder = InlineCodeFinder::html_tags();
        assert_eq!(finder.process(&mut tf).unwrap(), 3);
        assert_eq!(tf.display(), "Hello ⟦1o⟧world⟦1c⟧!⟦2i⟧");
        assert_eq!(tf.to_original(), "Hello <b>world</b>!<br/>");
        assert_eq!(tf.codes()[0].code_type, "b");
        assert_eq!(tf.codes()[2].code_type, "br");
    }

    #[test]
    fn test_existing_codes_keep_ids() {
        let mut tf = TextFragment::new();
        tf.append_code(TagType::Isolated, "ph", "{0}").unwrap();
        tf.append_text(" <i>x</i>").unwrap();
        InlineCodeFinder::html_tags().process(&mut tf).unwrap();
        assert_eq!(tf.display(), "⟦1i⟧ ⟦2o⟧x⟦2c⟧");
    }

    #[test]
    fn test_custom_rule_for_placeholders() {
        let finder = InlineCodeFinder::new().with_rule(r"%\d*\$?[sd]").unwrap();
        let mut tf = TextFragment::from_text("%1$s has %d items").unwrap();
        assert_eq!(finder.process(&mut tf).unwrap(), 2);
        assert_eq!(tf.text(), " has  items");
        assert_eq!(tf.codes()[0].data, "%1$s");
        assert_eq!(tf.codes()[0].code_type, "x");
        assert_eq!(tf.codes()[0].tag_type, TagType::Isolated);
    }

    #[test]
    fn test_invalid_rule() {
        let mut finder = InlineCodeFinder::new();
        assert!(matches!(finder.add_rule("("), Err(Error::InvalidPattern(_))));
        assert_eq!(finder.rule_count(), 0);
    }

    #[test]
    fn test_no_match_leaves_fragment_untouched() {
        let mut tf = TextFragment::from_text("plain text").unwrap();
        assert_eq!(InlineCodeFinder::html_tags().process(&mut tf).unwrap(), 0);
        assert_eq!(tf.coded_text(), "plain text");
    }
}
