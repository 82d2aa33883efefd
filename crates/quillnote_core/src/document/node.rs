//! Closed node/mark model for rich notes.
//!
//! # Responsibility
//! - Define every node and mark kind the editor accepts.
//! - Provide char-offset based run surgery used by editor transactions.
//!
//! # Invariants
//! - A `Document` always holds at least one block.
//! - Heading levels are limited to 1 and 2.
//! - After `normalize()`, a text block holds no empty runs and no two
//!   adjacent runs share an identical mark set.
//! - Bullet lists and blockquotes are the maximal runs of consecutive
//!   `BulletItem` / `Quote` blocks; they have no storage of their own.

use uuid::Uuid;

/// Session-local identity of a media node.
pub type NodeId = Uuid;

/// Heading levels supported by the editor toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadingLevel {
    One,
    Two,
}

impl HeadingLevel {
    /// Parses a numeric heading level; only 1 and 2 are accepted.
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Kind of a text-bearing block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextBlockKind {
    Paragraph,
    Heading(HeadingLevel),
    /// One item of a bullet list.
    BulletItem,
    /// One paragraph of a blockquote.
    Quote,
}

/// Character-level formatting kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Bold,
    Italic,
    Color,
    Highlight,
    Link,
}

impl MarkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Color => "color",
            Self::Highlight => "highlight",
            Self::Link => "link",
        }
    }
}

/// Highlight mark payload. `color: None` renders with the theme default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Highlight {
    pub color: Option<String>,
}

/// Mark set carried by one text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub color: Option<String>,
    pub highlight: Option<Highlight>,
    pub link: Option<String>,
}

impl Marks {
    pub fn has(&self, kind: MarkKind) -> bool {
        match kind {
            MarkKind::Bold => self.bold,
            MarkKind::Italic => self.italic,
            MarkKind::Color => self.color.is_some(),
            MarkKind::Highlight => self.highlight.is_some(),
            MarkKind::Link => self.link.is_some(),
        }
    }

    /// Sets one mark. `value` is the color / href payload where applicable.
    pub(crate) fn set(&mut self, kind: MarkKind, value: Option<&str>) {
        match kind {
            MarkKind::Bold => self.bold = true,
            MarkKind::Italic => self.italic = true,
            MarkKind::Color => self.color = value.map(str::to_string),
            MarkKind::Highlight => {
                self.highlight = Some(Highlight {
                    color: value.map(str::to_string),
                })
            }
            MarkKind::Link => self.link = value.map(str::to_string),
        }
    }

    pub(crate) fn clear(&mut self, kind: MarkKind) {
        match kind {
            MarkKind::Bold => self.bold = false,
            MarkKind::Italic => self.italic = false,
            MarkKind::Color => self.color = None,
            MarkKind::Highlight => self.highlight = None,
            MarkKind::Link => self.link = None,
        }
    }
}

/// A contiguous piece of text sharing one mark set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub marks: Marks,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: Marks) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Paragraph, heading, list item or quote paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub kind: TextBlockKind,
    pub runs: Vec<TextRun>,
}

impl TextBlock {
    pub fn new(kind: TextBlockKind) -> Self {
        Self {
            kind,
            runs: Vec::new(),
        }
    }

    pub fn from_text(kind: TextBlockKind, text: &str) -> Self {
        let mut block = Self::new(kind);
        block.runs.push(TextRun::plain(text));
        block.normalize();
        block
    }

    /// Length in chars, the unit used by editor positions.
    pub fn char_len(&self) -> usize {
        self.runs.iter().map(TextRun::char_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.is_empty())
    }

    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    /// Text between two char offsets of this block.
    pub fn text_slice(&self, start: usize, end: usize) -> String {
        self.plain_text()
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }

    /// Merges equal-mark neighbors and drops empty runs.
    pub fn normalize(&mut self) {
        let mut merged: Vec<TextRun> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            if let Some(previous) = merged.last_mut() {
                if previous.marks == run.marks {
                    previous.text.push_str(&run.text);
                    continue;
                }
            }
            merged.push(run);
        }
        self.runs = merged;
    }

    /// Splits this block at `offset`, returning the tail with the same kind.
    pub fn split_off(&mut self, offset: usize) -> TextBlock {
        let index = self.ensure_boundary(offset);
        let tail = self.runs.split_off(index);
        TextBlock {
            kind: self.kind,
            runs: tail,
        }
    }

    /// Appends the runs of `other`; the receiver keeps its kind.
    pub fn append(&mut self, other: TextBlock) {
        self.runs.extend(other.runs);
        self.normalize();
    }

    /// Inserts runs at `offset` and returns the offset right after them.
    pub fn insert_runs(&mut self, offset: usize, runs: Vec<TextRun>) -> usize {
        let inserted: usize = runs.iter().map(TextRun::char_len).sum();
        let index = self.ensure_boundary(offset);
        self.runs.splice(index..index, runs);
        self.normalize();
        offset + inserted
    }

    /// Mutable access to the runs covering `[start, end)`.
    ///
    /// Runs are split so the returned slice covers the range exactly. Call
    /// `normalize()` once mutation is done.
    pub(crate) fn runs_in_range_mut(&mut self, start: usize, end: usize) -> &mut [TextRun] {
        let first = self.ensure_boundary(start);
        let last = self.ensure_boundary(end);
        &mut self.runs[first..last]
    }

    /// Guarantees a run boundary at `offset`; returns the index of the run
    /// that starts there (or `runs.len()` at the end).
    fn ensure_boundary(&mut self, offset: usize) -> usize {
        let mut consumed = 0;
        for index in 0..self.runs.len() {
            let len = self.runs[index].char_len();
            if offset == consumed {
                return index;
            }
            if offset < consumed + len {
                let split_at = byte_index(&self.runs[index].text, offset - consumed);
                let tail_text = self.runs[index].text.split_off(split_at);
                let tail = TextRun::marked(tail_text, self.runs[index].marks.clone());
                self.runs.insert(index + 1, tail);
                return index + 1;
            }
            consumed += len;
        }
        self.runs.len()
    }
}

/// Width/height attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Dimension {
    #[default]
    Auto,
    Px(f64),
}

impl Dimension {
    /// Parses `240`, `240px` or `auto`. Non-positive or garbage values are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Some(Self::Auto);
        }
        let numeric = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
        match numeric.parse::<f64>() {
            Ok(px) if px.is_finite() && px > 0.0 => Some(Self::Px(px)),
            _ => None,
        }
    }

    /// Rounds to the precision attributes are written with, so a value
    /// survives a serialize/parse round trip unchanged.
    pub fn snap_px(px: f64) -> f64 {
        (px * 100.0).round() / 100.0
    }

    pub fn as_px(self) -> Option<f64> {
        match self {
            Self::Auto => None,
            Self::Px(px) => Some(px),
        }
    }

    /// Attribute text, or `None` for `Auto` (attribute omitted).
    pub fn to_attr(self) -> Option<String> {
        let px = self.as_px()?;
        if px.fract() == 0.0 {
            Some(format!("{}", px as i64))
        } else {
            let formatted = format!("{px:.2}");
            Some(formatted.trim_end_matches('0').trim_end_matches('.').to_string())
        }
    }
}

/// Attribute set of an embedded image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaAttrs {
    /// Durable URI returned by the media storage collaborator.
    pub src: String,
    pub width: Dimension,
    pub height: Dimension,
    pub alt: Option<String>,
    pub title: Option<String>,
}

impl MediaAttrs {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Self::default()
        }
    }

    /// Copy of this attribute set with a new explicit size.
    pub fn resized(&self, width: f64, height: f64) -> Self {
        Self {
            width: Dimension::Px(width),
            height: Dimension::Px(height),
            ..self.clone()
        }
    }
}

/// Embedded image block.
///
/// `id` is session-local identity used to find the node again after the
/// document changed; it does not take part in equality.
#[derive(Debug, Clone)]
pub struct MediaNode {
    pub id: NodeId,
    pub attrs: MediaAttrs,
}

impl MediaNode {
    pub fn new(attrs: MediaAttrs) -> Self {
        Self {
            id: Uuid::new_v4(),
            attrs,
        }
    }
}

impl PartialEq for MediaNode {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}

/// Top-level document block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text(TextBlock),
    Media(MediaNode),
}

impl Block {
    pub fn paragraph(text: &str) -> Self {
        Self::Text(TextBlock::from_text(TextBlockKind::Paragraph, text))
    }

    /// Position length: chars for text blocks, 1 for media.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(block) => block.char_len(),
            Self::Media(_) => 1,
        }
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, Self::Text(block) if block.is_empty())
    }

    pub fn as_text(&self) -> Option<&TextBlock> {
        match self {
            Self::Text(block) => Some(block),
            Self::Media(_) => None,
        }
    }
}

/// Ordered block sequence owned by one editor session.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            blocks: vec![Block::Text(TextBlock::new(TextBlockKind::Paragraph))],
        }
    }
}

impl Document {
    /// Builds a document, normalizing runs and substituting an empty
    /// paragraph for an empty block list.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut blocks = blocks;
        for block in &mut blocks {
            if let Block::Text(text) = block {
                text.normalize();
            }
        }
        if blocks.is_empty() {
            return Self::default();
        }
        Self { blocks }
    }

    /// Imports raw text line by line as plain paragraphs.
    pub fn from_plain_text(text: &str) -> Self {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let blocks = normalized.split('\n').map(Block::paragraph).collect();
        Self::from_blocks(blocks)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Block::is_empty_text)
    }

    /// Finds a media node by identity.
    pub fn find_media(&self, id: NodeId) -> Option<(usize, &MediaNode)> {
        self.blocks
            .iter()
            .enumerate()
            .find_map(|(index, block)| match block {
                Block::Media(node) if node.id == id => Some((index, node)),
                _ => None,
            })
    }

    pub fn media_nodes(&self) -> impl Iterator<Item = &MediaNode> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Media(node) => Some(node),
            Block::Text(_) => None,
        })
    }
}

/// Byte index of the `char_offset`-th char, clamped to the string end.
pub(crate) fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map_or(text.len(), |(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::{Dimension, Marks, TextBlock, TextBlockKind, TextRun};

    fn bold() -> Marks {
        Marks {
            bold: true,
            ..Marks::default()
        }
    }

    #[test]
    fn split_off_cuts_inside_a_multibyte_run() {
        let mut block = TextBlock::from_text(TextBlockKind::Paragraph, "héllo wörld");
        let tail = block.split_off(7);
        assert_eq!(block.plain_text(), "héllo w");
        assert_eq!(tail.plain_text(), "örld");
        assert_eq!(tail.kind, TextBlockKind::Paragraph);
    }

    #[test]
    fn normalize_merges_equal_marks_and_drops_empty_runs() {
        let mut block = TextBlock::new(TextBlockKind::Paragraph);
        block.runs = vec![
            TextRun::marked("a", bold()),
            TextRun::plain(""),
            TextRun::marked("b", bold()),
            TextRun::plain("c"),
        ];
        block.normalize();
        assert_eq!(block.runs.len(), 2);
        assert_eq!(block.runs[0].text, "ab");
    }

    #[test]
    fn runs_in_range_mut_splits_exactly_at_the_range() {
        let mut block = TextBlock::from_text(TextBlockKind::Paragraph, "abcdef");
        for run in block.runs_in_range_mut(2, 4) {
            run.marks.bold = true;
        }
        block.normalize();
        let texts: Vec<_> = block.runs.iter().map(|run| run.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "cd", "ef"]);
        assert!(block.runs[1].marks.bold);
    }

    #[test]
    fn insert_runs_returns_offset_after_insertion() {
        let mut block = TextBlock::from_text(TextBlockKind::Paragraph, "ad");
        let end = block.insert_runs(1, vec![TextRun::plain("bc")]);
        assert_eq!(end, 3);
        assert_eq!(block.plain_text(), "abcd");
    }

    #[test]
    fn dimension_parses_pixels_and_auto() {
        assert_eq!(Dimension::parse("240"), Some(Dimension::Px(240.0)));
        assert_eq!(Dimension::parse(" 120px "), Some(Dimension::Px(120.0)));
        assert_eq!(Dimension::parse("auto"), Some(Dimension::Auto));
        assert_eq!(Dimension::parse("-3"), None);
        assert_eq!(Dimension::Px(240.0).to_attr().as_deref(), Some("240"));
        assert_eq!(Dimension::Px(120.5).to_attr().as_deref(), Some("120.5"));
        assert_eq!(Dimension::Auto.to_attr(), None);
    }
}
