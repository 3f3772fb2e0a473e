//! Coded text: translatable text with inline codes kept out of band.
//!
//! A [`TextFragment`] stores its content as a *coded text* string where every
//! inline code (a bold tag, a line break, a placeholder...) is replaced by a
//! single marker character from the supplementary private-use plane. The
//! `n`-th marker of the string stands for `codes[n]`, so segmenters and
//! tokenizers can work on the string without ever seeing raw markup.

use std::{
    collections::{BTreeSet, HashSet},
    fmt::{self, Display},
};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// First marker character (`U+F0000`).
pub const MARKER_BASE: u32 = 0xF0000;
/// Maximum number of codes a single fragment can hold.
pub const MAX_CODES: usize = (0xFFFFD - MARKER_BASE) as usize + 1;

/// Returns `true` if `c` is a code marker.
pub fn is_marker(c: char) -> bool {
    (MARKER_BASE..MARKER_BASE + MAX_CODES as u32).contains(&(c as u32))
}

fn marker_index(c: char) -> Option<usize> {
    is_marker(c).then(|| (c as u32 - MARKER_BASE) as usize)
}

fn marker_for(index: usize) -> Result<char, Error> {
    if index >= MAX_CODES {
        return Err(Error::malformed(format!(
            "a fragment cannot hold more than {} codes",
            MAX_CODES
        )));
    }
    char::from_u32(MARKER_BASE + index as u32)
        .ok_or_else(|| Error::malformed(format!("no marker for code index {}", index)))
}

/// Role of an inline code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    Opening,
    Closing,
    Isolated,
}

impl TagType {
    fn letter(self) -> char {
        match self {
            TagType::Opening => 'o',
            TagType::Closing => 'c',
            TagType::Isolated => 'i',
        }
    }
}

impl Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagType::Opening => write!(f, "opening"),
            TagType::Closing => write!(f, "closing"),
            TagType::Isolated => write!(f, "isolated"),
        }
    }
}

/// An inline code and the raw markup it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// Identifier shared by both sides of a pair.
    pub id: u32,
    pub tag_type: TagType,
    /// Kind of code (`b`, `br`, `link`...), used to pair closing codes.
    pub code_type: String,
    /// Original markup, written back verbatim.
    pub data: String,
    /// Set when this code lost its counterpart and was turned isolated.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub orphaned_from: Option<TagType>,
}

impl Code {
    pub fn new(tag_type: TagType, code_type: impl Into<String>, data: impl Into<String>) -> Self {
        Code {
            id: 0,
            tag_type,
            code_type: code_type.into(),
            data: data.into(),
            orphaned_from: None,
        }
    }

    /// `true` when the other side of this code's pair was deleted.
    pub fn is_orphaned(&self) -> bool {
        self.orphaned_from.is_some()
    }

    fn display_letter(&self) -> char {
        self.orphaned_from.unwrap_or(self.tag_type).letter()
    }
}

/// A code waiting for an id, or an existing one keeping its id.
#[derive(Debug, Clone)]
pub(crate) enum Piece {
    Text(String),
    Existing(Code),
    New(Code),
}

/// Translatable text with inline codes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextFragment {
    coded_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    codes: Vec<Code>,
    /// Last id handed out; ids are never reused within this fragment.
    #[serde(default)]
    last_id: u32,
}

impl TextFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fragment holding plain text only.
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let mut fragment = Self::new();
        fragment.append_text(text)?;
        Ok(fragment)
    }

    /// The marker-interleaved string.
    pub fn coded_text(&self) -> &str {
        &self.coded_text
    }

    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// The first code (opening side for pairs) carrying `id`.
    pub fn get_code(&self, id: u32) -> Option<&Code> {
        self.codes.iter().find(|c| c.id == id)
    }

    /// Opening and closing sides of the pair `id`.
    pub fn code_pair(&self, id: u32) -> (Option<&Code>, Option<&Code>) {
        let side = |tag_type| {
            self.codes
                .iter()
                .find(|c| c.id == id && c.tag_type == tag_type)
        };
        (side(TagType::Opening), side(TagType::Closing))
    }

    pub fn has_code(&self) -> bool {
        !self.codes.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.coded_text.is_empty()
    }

    /// Length of the coded text in characters (markers count as one).
    pub fn len(&self) -> usize {
        self.coded_text.chars().count()
    }

    /// Appends plain text.
    pub fn append_text(&mut self, text: &str) -> Result<(), Error> {
        reject_markers(text)?;
        self.coded_text.push_str(text);
        Ok(())
    }

    /// Appends an inline code and returns its id.
    ///
    /// A closing code takes the id of the last unclosed opening code of the
    /// same `code_type`; without one it is stored as an orphaned isolated code.
    pub fn append_code(
        &mut self,
        tag_type: TagType,
        code_type: &str,
        data: &str,
    ) -> Result<u32, Error> {
        let mut pieces = self.pieces();
        pieces.push(Piece::New(Code::new(tag_type, code_type, data)));
        self.rebuild(pieces)?;
        Ok(self.codes.last().map(|c| c.id).unwrap_or_default())
    }

    /// Inserts plain text at character position `pos` of the coded text.
    pub fn insert_text(&mut self, pos: usize, text: &str) -> Result<(), Error> {
        reject_markers(text)?;
        let offset = self.byte_offset(pos)?;
        let mut coded = self.coded_text.clone();
        coded.insert_str(offset, text);
        self.commit(coded, self.codes.clone())
    }

    /// Deletes the characters `[start, end)` of the coded text.
    ///
    /// Codes whose markers fall in the range leave the code table. When only
    /// one side of a pair is removed, the surviving side becomes isolated and
    /// is flagged through [`Code::orphaned_from`].
    pub fn delete_range(&mut self, start: usize, end: usize) -> Result<(), Error> {
        let len = self.len();
        if start > end || end > len {
            return Err(Error::InvalidPosition {
                position: if end > len { end } else { start },
                len,
            });
        }

        let mut removed = BTreeSet::new();
        let mut kept_text = String::with_capacity(self.coded_text.len());
        for (i, c) in self.coded_text.chars().enumerate() {
            let in_range = i >= start && i < end;
            match (marker_index(c), in_range) {
                (Some(index), true) => {
                    removed.insert(index);
                }
                (_, true) => {}
                (_, false) => kept_text.push(c),
            }
        }
        if removed.is_empty() {
            return self.commit(kept_text, self.codes.clone());
        }

        let removed_sides: HashSet<(u32, TagType)> = removed
            .iter()
            .filter_map(|&i| self.codes.get(i))
            .map(|c| (c.id, c.tag_type))
            .collect();

        let mut remap = vec![None; self.codes.len()];
        let mut codes = Vec::with_capacity(self.codes.len() - removed.len());
        for (index, code) in self.codes.iter().enumerate() {
            if removed.contains(&index) {
                continue;
            }
            let mut code = code.clone();
            let counterpart = match code.tag_type {
                TagType::Opening => Some(TagType::Closing),
                TagType::Closing => Some(TagType::Opening),
                TagType::Isolated => None,
            };
            if let Some(other) = counterpart {
                if removed_sides.contains(&(code.id, other)) {
                    code.orphaned_from = Some(code.tag_type);
                    code.tag_type = TagType::Isolated;
                }
            }
            remap[index] = Some(codes.len());
            codes.push(code);
        }

        let mut coded = String::with_capacity(kept_text.len());
        for c in kept_text.chars() {
            match marker_index(c) {
                Some(old) => {
                    let new = remap
                        .get(old)
                        .copied()
                        .flatten()
                        .ok_or_else(|| Error::malformed(format!("dangling marker {}", old)))?;
                    coded.push(marker_for(new)?);
                }
                None => coded.push(c),
            }
        }
        self.commit(coded, codes)
    }

    /// Replaces the coded text while keeping the code table.
    ///
    /// Collaborators such as segmenters hand back a modified coded text
    /// through this call. Every code of the table must still be present,
    /// once, in table order; otherwise the fragment is left unchanged.
    pub fn set_coded_text(&mut self, coded_text: &str) -> Result<(), Error> {
        self.commit(coded_text.to_string(), self.codes.clone())
    }

    /// Deep copy with freshly numbered codes, unrelated to this fragment.
    pub fn clone_fragment(&self) -> TextFragment {
        let mut ids = Vec::<(u32, u32)>::new();
        let mut codes = Vec::with_capacity(self.codes.len());
        for code in &self.codes {
            let new_id = match ids.iter().find(|(old, _)| *old == code.id) {
                Some((_, new)) => *new,
                None => {
                    let new = ids.len() as u32 + 1;
                    ids.push((code.id, new));
                    new
                }
            };
            codes.push(Code {
                id: new_id,
                ..code.clone()
            });
        }
        TextFragment {
            coded_text: self.coded_text.clone(),
            codes,
            last_id: ids.len() as u32,
        }
    }

    /// The text without any code.
    pub fn text(&self) -> String {
        self.coded_text.chars().filter(|c| !is_marker(*c)).collect()
    }

    /// The content with every code replaced by its raw markup.
    pub fn to_original(&self) -> String {
        self.render(|text| text.to_string())
    }

    /// Renders the content, passing plain-text runs through `encode` and
    /// writing codes verbatim.
    pub fn render<F>(&self, mut encode: F) -> String
    where
        F: FnMut(&str) -> String,
    {
        let mut out = String::with_capacity(self.coded_text.len());
        let mut run = String::new();
        for c in self.coded_text.chars() {
            match marker_index(c).and_then(|i| self.codes.get(i)) {
                Some(code) => {
                    if !run.is_empty() {
                        out.push_str(&encode(&run));
                        run.clear();
                    }
                    out.push_str(&code.data);
                }
                None => run.push(c),
            }
        }
        if !run.is_empty() {
            out.push_str(&encode(&run));
        }
        out
    }

    /// Human-readable coded text: `Hello ⟦1o⟧world⟦1c⟧!`.
    pub fn display(&self) -> String {
        let mut out = String::with_capacity(self.coded_text.len());
        for c in self.coded_text.chars() {
            match marker_index(c).and_then(|i| self.codes.get(i)) {
                Some(code) => {
                    out.push('⟦');
                    out.push_str(&code.id.to_string());
                    out.push(code.display_letter());
                    out.push('⟧');
                }
                None => out.push(c),
            }
        }
        out
    }

    /// Every opening code is closed and every closing code is opened.
    pub fn is_balanced(&self) -> bool {
        check(&self.coded_text, &self.codes, true).is_ok()
    }

    fn byte_offset(&self, pos: usize) -> Result<usize, Error> {
        if pos == 0 {
            return Ok(0);
        }
        let mut count = 0;
        for (offset, _) in self.coded_text.char_indices() {
            if count == pos {
                return Ok(offset);
            }
            count += 1;
        }
        if count == pos {
            Ok(self.coded_text.len())
        } else {
            Err(Error::InvalidPosition {
                position: pos,
                len: count,
            })
        }
    }

    pub(crate) fn pieces(&self) -> Vec<Piece> {
        let mut pieces = Vec::new();
        let mut run = String::new();
        for c in self.coded_text.chars() {
            match marker_index(c).and_then(|i| self.codes.get(i)) {
                Some(code) => {
                    if !run.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut run)));
                    }
                    pieces.push(Piece::Existing(code.clone()));
                }
                None => run.push(c),
            }
        }
        if !run.is_empty() {
            pieces.push(Piece::Text(run));
        }
        pieces
    }

    /// Rebuilds the fragment from pieces, issuing ids for new codes.
    pub(crate) fn rebuild(&mut self, pieces: Vec<Piece>) -> Result<(), Error> {
        let mut last_id = self.last_id;
        let mut coded = String::new();
        let mut codes: Vec<Code> = Vec::new();
        for piece in pieces {
            let code = match piece {
                Piece::Text(text) => {
                    reject_markers(&text)?;
                    coded.push_str(&text);
                    continue;
                }
                Piece::Existing(code) => code,
                Piece::New(mut code) => {
                    match code.tag_type {
                        TagType::Closing => match last_unclosed(&codes, &code.code_type) {
                            Some(id) => code.id = id,
                            None => {
                                last_id += 1;
                                code.id = last_id;
                                code.orphaned_from = Some(TagType::Closing);
                                code.tag_type = TagType::Isolated;
                            }
                        },
                        TagType::Opening | TagType::Isolated => {
                            last_id += 1;
                            code.id = last_id;
                        }
                    }
                    code
                }
            };
            coded.push(marker_for(codes.len())?);
            codes.push(code);
        }
        self.commit(coded, codes)?;
        self.last_id = last_id;
        Ok(())
    }

    fn commit(&mut self, coded_text: String, codes: Vec<Code>) -> Result<(), Error> {
        check(&coded_text, &codes, false)?;
        self.last_id = codes.iter().map(|c| c.id).fold(self.last_id, u32::max);
        self.coded_text = coded_text;
        self.codes = codes;
        Ok(())
    }
}

impl Display for TextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_original())
    }
}

fn reject_markers(text: &str) -> Result<(), Error> {
    match text.chars().find(|c| is_marker(*c)) {
        Some(c) => Err(Error::malformed(format!(
            "plain text contains code marker U+{:X}",
            c as u32
        ))),
        None => Ok(()),
    }
}

fn last_unclosed(codes: &[Code], code_type: &str) -> Option<u32> {
    let mut open: Vec<&Code> = Vec::new();
    for code in codes {
        match code.tag_type {
            TagType::Opening => open.push(code),
            TagType::Closing => open.retain(|c| c.id != code.id),
            TagType::Isolated => {}
        }
    }
    open.iter()
        .rev()
        .find(|c| c.code_type == code_type)
        .map(|c| c.id)
}

/// Validates the coded text against the code table. Opening codes still
/// waiting for their closing code are only rejected with `require_closed`.
fn check(coded_text: &str, codes: &[Code], require_closed: bool) -> Result<(), Error> {
    let mut expected = 0usize;
    for c in coded_text.chars() {
        if let Some(index) = marker_index(c) {
            if index != expected {
                return Err(Error::malformed(format!(
                    "marker for code {} found where code {} was expected",
                    index, expected
                )));
            }
            expected += 1;
        }
    }
    if expected != codes.len() {
        return Err(Error::malformed(format!(
            "{} markers for {} codes",
            expected,
            codes.len()
        )));
    }

    let mut used = HashSet::new();
    let mut open = HashSet::new();
    for code in codes {
        if code.id == 0 {
            return Err(Error::malformed("code without id"));
        }
        match code.tag_type {
            TagType::Opening | TagType::Isolated => {
                if !used.insert(code.id) {
                    return Err(Error::malformed(format!("duplicate code id {}", code.id)));
                }
                if code.tag_type == TagType::Opening {
                    open.insert(code.id);
                }
            }
            TagType::Closing => {
                if !open.remove(&code.id) {
                    return Err(Error::malformed(format!(
                        "closing code {} has no opening code before it",
                        code.id
                    )));
                }
            }
        }
    }
    if let Some(id) = open.iter().min().filter(|_| require_closed) {
        return Err(Error::malformed(format!(
            "opening code {} has no closing code",
            id
        )));
    }
    Ok(())
}
