//! Transactional editing session over one [`Document`].
//!
//! # Responsibility
//! - Expose the mutation/query contract used by the toolbar, the media node
//!   view and the assist pipeline.
//! - Record every successful mutation as exactly one [`Transaction`].
//!
//! # Invariants
//! - Mutations run against a scratch copy of the block list; a failing
//!   operation leaves document, selection and version untouched.
//! - The selection always addresses valid positions of the current document.
//! - Undo history and transaction log keep at most [`HISTORY_LIMIT`] entries.
//! - Every transaction carries the [`StepMap`] from the previous version's
//!   flat offsets to its own; anchors are mapped through them, never
//!   re-matched by text at stale coordinates.
//!
//! # See also
//! - `document::parse` / `document::serialize` for the HTML boundary.

use crate::document::html::{is_safe_link_url, is_safe_media_url, MalformedContentError};
use crate::document::node::{
    Block, Document, HeadingLevel, MarkKind, MediaAttrs, MediaNode, NodeId, TextBlock,
    TextBlockKind, TextRun,
};
use crate::document::parse::{is_valid_css_color, parse_blocks};
use crate::document::{create_document, serialize};
use log::debug;
use std::collections::VecDeque;
use thiserror::Error;

/// Maximum number of undo snapshots and transaction records kept.
pub const HISTORY_LIMIT: usize = 100;

/// Caret position: block index plus char offset inside that block.
///
/// Media blocks have length 1: offset 0 is before the image, 1 after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub block: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(block: usize, offset: usize) -> Self {
        Self { block, offset }
    }
}

/// Ordered document range; `from <= to` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub from: Position,
    pub to: Position,
}

impl Range {
    /// Builds a range from two positions in any order.
    pub fn new(a: Position, b: Position) -> Self {
        if a <= b {
            Self { from: a, to: b }
        } else {
            Self { from: b, to: a }
        }
    }

    pub fn caret(at: Position) -> Self {
        Self { from: at, to: at }
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

/// Block conversions offered by the toolbar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Heading(u8),
    BulletList,
    Blockquote,
}

/// Node kinds accepted by [`DocumentEditor::insert_node`].
#[derive(Debug, Clone, PartialEq)]
pub enum NewNode {
    Media(MediaAttrs),
    Paragraph,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("position {block}:{offset} is outside the document")]
    InvalidPosition { block: usize, offset: usize },
    #[error("heading level {0} is not supported")]
    InvalidHeadingLevel(u8),
    #[error("invalid value for {kind} mark")]
    InvalidMarkValue { kind: &'static str },
    #[error("media source is not allowed")]
    UnsafeMediaSource,
    #[error("media node {0} not found")]
    NodeNotFound(NodeId),
    #[error("fragment has no content to replace the selection with")]
    EmptyFragment,
    #[error(transparent)]
    Malformed(#[from] MalformedContentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    ApplyMark(MarkKind),
    ToggleBlockType,
    InsertNode,
    ReplaceSelection,
    ReplaceMediaAttrs,
    Undo,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApplyMark(_) => "apply_mark",
            Self::ToggleBlockType => "toggle_block_type",
            Self::InsertNode => "insert_node",
            Self::ReplaceSelection => "replace_selection",
            Self::ReplaceMediaAttrs => "replace_media_attrs",
            Self::Undo => "undo",
        }
    }
}

/// Flat-offset change made by one transaction.
///
/// Flat offsets count every block's length plus one separator between
/// consecutive blocks. A step replaces `deleted` units at `start` with
/// `inserted` new ones; everything before `start` and after the deleted
/// span keeps its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepMap {
    pub start: usize,
    pub deleted: usize,
    pub inserted: usize,
}

impl StepMap {
    /// Step of a change that moves no content (marks, block kinds, attrs).
    pub const IDENTITY: StepMap = StepMap {
        start: 0,
        deleted: 0,
        inserted: 0,
    };

    pub fn invert(self) -> Self {
        Self {
            start: self.start,
            deleted: self.inserted,
            inserted: self.deleted,
        }
    }

    /// Maps the non-empty span `[from, to)` across this step. `None` when
    /// the step deleted or inserted anything strictly inside the span.
    pub fn map_span(self, from: usize, to: usize) -> Option<(usize, usize)> {
        let end = self.start + self.deleted;
        if to <= self.start {
            Some((from, to))
        } else if from >= end {
            Some((
                from - self.deleted + self.inserted,
                to - self.deleted + self.inserted,
            ))
        } else {
            None
        }
    }
}

/// Record of one committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Document version produced by this change.
    pub version: u64,
    pub kind: TransactionKind,
    pub step: StepMap,
}

/// Selection captured together with its text for later staleness checks.
///
/// Only [`DocumentEditor::anchor_selection`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredSelection {
    pub range: Range,
    pub text: String,
    /// Document version at capture time.
    pub version: u64,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct Snapshot {
    document: Document,
    selection: Range,
    step: StepMap,
}

/// Editing session owning one document.
#[derive(Debug, Clone)]
pub struct DocumentEditor {
    document: Document,
    selection: Range,
    version: u64,
    history: VecDeque<Snapshot>,
    transactions: VecDeque<Transaction>,
}

impl Default for DocumentEditor {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

impl DocumentEditor {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            selection: Range::caret(Position::new(0, 0)),
            version: 0,
            history: VecDeque::new(),
            transactions: VecDeque::new(),
        }
    }

    /// Opens stored HTML; malformed input degrades to plain text.
    pub fn open(html: &str) -> Self {
        Self::new(create_document(html))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn selection(&self) -> Range {
        self.selection
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn set_selection(&mut self, range: Range) -> Result<(), EditError> {
        check_position(self.document.blocks(), range.from)?;
        check_position(self.document.blocks(), range.to)?;
        self.selection = range;
        Ok(())
    }

    /// Text of `range`; blocks are joined with `\n`, media contributes nothing.
    pub fn text_between(&self, range: Range) -> Result<String, EditError> {
        check_position(self.document.blocks(), range.from)?;
        check_position(self.document.blocks(), range.to)?;
        Ok(slice_text(self.document.blocks(), range))
    }

    pub fn selected_text(&self) -> String {
        slice_text(self.document.blocks(), self.selection)
    }

    /// Captures the current non-empty selection.
    pub fn anchor_selection(&self) -> Option<AnchoredSelection> {
        if self.selection.is_empty() {
            return None;
        }
        let blocks = self.document.blocks();
        Some(AnchoredSelection {
            range: self.selection,
            text: self.selected_text(),
            version: self.version,
            start: flat_offset(blocks, self.selection.from),
            end: flat_offset(blocks, self.selection.to),
        })
    }

    /// Maps `anchor` through every transaction since it was captured.
    ///
    /// Returns `None` when a later change touched the anchored span, when the
    /// transaction log no longer reaches back to the capture, or when the
    /// mapped range does not hold the captured text.
    pub fn resolve_anchor(&self, anchor: &AnchoredSelection) -> Option<Range> {
        if anchor.version > self.version {
            return None;
        }
        let (mut start, mut end) = (anchor.start, anchor.end);
        if anchor.version < self.version {
            let oldest = self.transactions.front()?.version;
            if oldest > anchor.version + 1 {
                return None;
            }
            for transaction in self
                .transactions
                .iter()
                .filter(|transaction| transaction.version > anchor.version)
            {
                (start, end) = transaction.step.map_span(start, end)?;
            }
        }

        let blocks = self.document.blocks();
        let range = Range::new(position_at(blocks, start)?, position_at(blocks, end)?);
        (slice_text(blocks, range) == anchor.text).then_some(range)
    }

    pub fn media_attrs(&self, id: NodeId) -> Option<&MediaAttrs> {
        self.document.find_media(id).map(|(_, node)| &node.attrs)
    }

    pub fn to_html(&self) -> String {
        serialize::to_html(&self.document)
    }

    pub fn to_plain_text(&self) -> String {
        serialize::to_plain_text(&self.document)
    }

    /// Toggles or sets a mark over `range`. Empty ranges are a no-op.
    ///
    /// Bold and italic toggle. Color and link are set when `value` is given
    /// and cleared otherwise. Highlight with a value sets that color; without
    /// one it toggles the default highlight.
    pub fn apply_mark(
        &mut self,
        range: Range,
        kind: MarkKind,
        value: Option<&str>,
    ) -> Result<(), EditError> {
        if range.is_empty() {
            return Ok(());
        }
        check_position(self.document.blocks(), range.from)?;
        check_position(self.document.blocks(), range.to)?;
        validate_mark_value(kind, value)?;
        let value = value.map(|value| value.trim().to_string());

        let segments = text_segments(self.document.blocks(), range);
        if segments.is_empty() {
            return Ok(());
        }

        self.commit(TransactionKind::ApplyMark(kind), None, move |blocks, _| {
            let toggles = matches!(kind, MarkKind::Bold | MarkKind::Italic)
                || (kind == MarkKind::Highlight && value.is_none());
            let mut all_marked = true;
            for &(index, start, end) in &segments {
                if let Block::Text(block) = &mut blocks[index] {
                    all_marked &= block
                        .runs_in_range_mut(start, end)
                        .iter()
                        .all(|run| run.marks.has(kind));
                }
            }
            let set = if toggles {
                !all_marked
            } else {
                value.is_some()
            };

            for &(index, start, end) in &segments {
                if let Block::Text(block) = &mut blocks[index] {
                    for run in block.runs_in_range_mut(start, end) {
                        if set {
                            run.marks.set(kind, value.as_deref());
                        } else {
                            run.marks.clear(kind);
                        }
                    }
                    block.normalize();
                }
            }
            Ok(())
        })
    }

    /// Converts the text blocks touched by the selection, or reverts them to
    /// paragraphs when they all already have the requested kind.
    pub fn toggle_block_type(&mut self, block_type: BlockType) -> Result<(), EditError> {
        let target = match block_type {
            BlockType::Heading(level) => TextBlockKind::Heading(
                HeadingLevel::from_u8(level).ok_or(EditError::InvalidHeadingLevel(level))?,
            ),
            BlockType::BulletList => TextBlockKind::BulletItem,
            BlockType::Blockquote => TextBlockKind::Quote,
        };
        let range = self.selection;
        let touched: Vec<usize> = (range.from.block..=range.to.block)
            .filter(|&index| matches!(self.document.block(index), Some(Block::Text(_))))
            .collect();
        if touched.is_empty() {
            return Ok(());
        }

        self.commit(TransactionKind::ToggleBlockType, None, move |blocks, _| {
            let already = touched
                .iter()
                .all(|&index| matches!(&blocks[index], Block::Text(block) if block.kind == target));
            let kind = if already {
                TextBlockKind::Paragraph
            } else {
                target
            };
            for &index in &touched {
                if let Block::Text(block) = &mut blocks[index] {
                    block.kind = kind;
                }
            }
            Ok(())
        })
    }

    /// Inserts a node at the cursor, replacing a non-empty selection.
    pub fn insert_node(&mut self, node: NewNode) -> Result<(), EditError> {
        if let NewNode::Media(attrs) = &node {
            if !is_safe_media_url(&attrs.src) {
                return Err(EditError::UnsafeMediaSource);
            }
        }
        let replaced = Some(self.selection);
        self.commit(TransactionKind::InsertNode, replaced, move |blocks, selection| {
            let at = delete_range(blocks, *selection);
            let caret = match node {
                NewNode::Paragraph => split_block(blocks, at),
                NewNode::Media(attrs) => {
                    let media = Block::Media(MediaNode::new(attrs));
                    let mut end = insert_blocks(blocks, at, vec![media]);
                    if end.block + 1 == blocks.len() {
                        blocks.push(Block::Text(TextBlock::new(TextBlockKind::Paragraph)));
                        end = Position::new(end.block + 1, 0);
                    }
                    end
                }
            };
            *selection = Range::caret(caret);
            Ok(())
        })
    }

    /// Deletes the selection and inserts the parsed fragment in its place.
    ///
    /// # Errors
    /// - `EditError::Malformed` when the fragment cannot be parsed.
    /// - `EditError::EmptyFragment` when the fragment holds no blocks but the
    ///   selection is not empty.
    ///
    /// The document is left unchanged on error.
    pub fn replace_selection(&mut self, html_fragment: &str) -> Result<(), EditError> {
        let fragment = parse_blocks(html_fragment)?;
        if fragment.is_empty() && !self.selection.is_empty() {
            return Err(EditError::EmptyFragment);
        }
        let replaced = Some(self.selection);
        self.commit(TransactionKind::ReplaceSelection, replaced, move |blocks, selection| {
            let at = delete_range(blocks, *selection);
            let end = insert_fragment(blocks, at, fragment);
            *selection = Range::caret(end);
            Ok(())
        })
    }

    /// Replaces the selection with unformatted text.
    pub fn insert_text(&mut self, text: &str) -> Result<(), EditError> {
        let mut block = TextBlock::new(TextBlockKind::Paragraph);
        block.runs.push(TextRun::plain(text));
        let replaced = Some(self.selection);
        self.commit(TransactionKind::ReplaceSelection, replaced, move |blocks, selection| {
            let at = delete_range(blocks, *selection);
            let end = insert_fragment(blocks, at, vec![Block::Text(block)]);
            *selection = Range::caret(end);
            Ok(())
        })
    }

    /// Overwrites the attribute set of a media node in one transaction.
    pub fn replace_media_attrs(&mut self, id: NodeId, attrs: MediaAttrs) -> Result<(), EditError> {
        if !is_safe_media_url(&attrs.src) {
            return Err(EditError::UnsafeMediaSource);
        }
        let (index, _) = self
            .document
            .find_media(id)
            .ok_or(EditError::NodeNotFound(id))?;
        self.commit(TransactionKind::ReplaceMediaAttrs, None, move |blocks, _| {
            if let Block::Media(node) = &mut blocks[index] {
                node.attrs = attrs;
            }
            Ok(())
        })
    }

    /// Restores the state before the last transaction. Returns `false` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop_back() else {
            return false;
        };
        self.document = snapshot.document;
        self.selection = clamp_range(self.document.blocks(), snapshot.selection);
        self.record(TransactionKind::Undo, snapshot.step.invert());
        true
    }

    /// Runs `apply` on a scratch copy and commits it as one transaction.
    ///
    /// `replaced` is the range `apply` deletes before inserting; `None` for
    /// changes that keep every flat offset in place.
    fn commit<F>(
        &mut self,
        kind: TransactionKind,
        replaced: Option<Range>,
        apply: F,
    ) -> Result<(), EditError>
    where
        F: FnOnce(&mut Vec<Block>, &mut Range) -> Result<(), EditError>,
    {
        let mut blocks = self.document.blocks().to_vec();
        let mut selection = self.selection;
        apply(&mut blocks, &mut selection)?;

        let next = Document::from_blocks(blocks);
        let step = match replaced {
            Some(range) => {
                let previous = self.document.blocks();
                let start = flat_offset(previous, range.from);
                let deleted = flat_offset(previous, range.to) - start;
                StepMap {
                    start,
                    deleted,
                    inserted: (flat_len(next.blocks()) + deleted)
                        .saturating_sub(flat_len(previous)),
                }
            }
            None => StepMap::IDENTITY,
        };
        let selection = clamp_range(next.blocks(), selection);
        let previous = std::mem::replace(&mut self.document, next);
        self.history.push_back(Snapshot {
            document: previous,
            selection: self.selection,
            step,
        });
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.selection = selection;
        self.record(kind, step);
        Ok(())
    }

    fn record(&mut self, kind: TransactionKind, step: StepMap) {
        self.version += 1;
        self.transactions.push_back(Transaction {
            version: self.version,
            kind,
            step,
        });
        if self.transactions.len() > HISTORY_LIMIT {
            self.transactions.pop_front();
        }
        debug!(
            "event=doc_transaction module=document status=ok kind={} version={} blocks={}",
            kind.as_str(),
            self.version,
            self.document.len()
        );
    }
}

fn check_position(blocks: &[Block], position: Position) -> Result<(), EditError> {
    match blocks.get(position.block) {
        Some(block) if position.offset <= block.len() => Ok(()),
        _ => Err(EditError::InvalidPosition {
            block: position.block,
            offset: position.offset,
        }),
    }
}

/// Flat offset of `position`: preceding blocks plus one separator each.
fn flat_offset(blocks: &[Block], position: Position) -> usize {
    blocks[..position.block.min(blocks.len())]
        .iter()
        .map(|block| block.len() + 1)
        .sum::<usize>()
        + position.offset
}

fn flat_len(blocks: &[Block]) -> usize {
    blocks.iter().map(Block::len).sum::<usize>() + blocks.len().saturating_sub(1)
}

/// Inverse of [`flat_offset`]; `None` past the document end.
fn position_at(blocks: &[Block], mut offset: usize) -> Option<Position> {
    for (index, block) in blocks.iter().enumerate() {
        if offset <= block.len() {
            return Some(Position::new(index, offset));
        }
        offset -= block.len() + 1;
    }
    None
}

fn clamp_position(blocks: &[Block], position: Position) -> Position {
    let Some(last) = blocks.len().checked_sub(1) else {
        return Position::new(0, 0);
    };
    let block = position.block.min(last);
    let offset = position.offset.min(blocks[block].len());
    Position::new(block, offset)
}

fn clamp_range(blocks: &[Block], range: Range) -> Range {
    Range::new(
        clamp_position(blocks, range.from),
        clamp_position(blocks, range.to),
    )
}

fn validate_mark_value(kind: MarkKind, value: Option<&str>) -> Result<(), EditError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(());
    };
    let valid = match kind {
        MarkKind::Bold | MarkKind::Italic => true,
        MarkKind::Color | MarkKind::Highlight => is_valid_css_color(value),
        MarkKind::Link => !value.is_empty() && is_safe_link_url(value),
    };
    if valid {
        Ok(())
    } else {
        Err(EditError::InvalidMarkValue {
            kind: kind.as_str(),
        })
    }
}

/// `(block, start, end)` char spans of text blocks covered by `range`.
fn text_segments(blocks: &[Block], range: Range) -> Vec<(usize, usize, usize)> {
    (range.from.block..=range.to.block)
        .filter_map(|index| {
            let Block::Text(block) = blocks.get(index)? else {
                return None;
            };
            let start = if index == range.from.block {
                range.from.offset
            } else {
                0
            };
            let end = if index == range.to.block {
                range.to.offset
            } else {
                block.char_len()
            };
            (start < end).then_some((index, start, end))
        })
        .collect()
}

fn slice_text(blocks: &[Block], range: Range) -> String {
    let mut parts = Vec::new();
    for index in range.from.block..=range.to.block {
        match blocks.get(index) {
            Some(Block::Text(block)) => {
                let start = if index == range.from.block {
                    range.from.offset
                } else {
                    0
                };
                let end = if index == range.to.block {
                    range.to.offset
                } else {
                    block.char_len()
                };
                parts.push(block.text_slice(start, end));
            }
            Some(Block::Media(_)) => parts.push(String::new()),
            None => break,
        }
    }
    parts.join("\n")
}

/// Part of `block` before `offset`; `None` when nothing remains.
fn head_of(block: &Block, offset: usize) -> Option<Block> {
    match block {
        Block::Text(text) => {
            let mut head = text.clone();
            head.split_off(offset);
            Some(Block::Text(head))
        }
        Block::Media(_) => (offset > 0).then(|| block.clone()),
    }
}

/// Part of `block` from `offset` on; `None` when nothing remains.
fn tail_of(block: &Block, offset: usize) -> Option<Block> {
    match block {
        Block::Text(text) => {
            let mut head = text.clone();
            Some(Block::Text(head.split_off(offset)))
        }
        Block::Media(_) => (offset == 0).then(|| block.clone()),
    }
}

/// Removes `range` and returns the collapsed caret, which is always `range.from`.
fn delete_range(blocks: &mut Vec<Block>, range: Range) -> Position {
    if range.is_empty() {
        return range.from;
    }
    let head = head_of(&blocks[range.from.block], range.from.offset);
    let tail = tail_of(&blocks[range.to.block], range.to.offset);
    let replacement = match (head, tail) {
        (Some(Block::Text(mut head)), Some(Block::Text(tail))) => {
            head.append(tail);
            vec![Block::Text(head)]
        }
        (Some(head), Some(tail)) => vec![head, tail],
        (Some(head), None) => vec![head],
        (None, Some(tail)) => vec![tail],
        (None, None) => vec![Block::Text(TextBlock::new(TextBlockKind::Paragraph))],
    };
    blocks.splice(range.from.block..=range.to.block, replacement);
    range.from
}

/// Inserts parsed blocks at `at` and returns the caret after them.
///
/// A lone paragraph landing in a text block is merged inline; anything else
/// splits the target block around the fragment.
fn insert_fragment(blocks: &mut Vec<Block>, at: Position, mut fragment: Vec<Block>) -> Position {
    if fragment.is_empty() {
        return at;
    }
    let inline = fragment.len() == 1
        && matches!(&fragment[0], Block::Text(block) if block.kind == TextBlockKind::Paragraph)
        && matches!(blocks.get(at.block), Some(Block::Text(_)));
    if inline {
        if let (Some(Block::Text(source)), Some(Block::Text(target))) =
            (fragment.pop(), blocks.get_mut(at.block))
        {
            let end = target.insert_runs(at.offset, source.runs);
            return Position::new(at.block, end);
        }
    }
    insert_blocks(blocks, at, fragment)
}

fn insert_blocks(blocks: &mut Vec<Block>, at: Position, fragment: Vec<Block>) -> Position {
    let count = fragment.len();
    let first = match &mut blocks[at.block] {
        Block::Text(target) => {
            let tail = target.split_off(at.offset);
            let head_empty = target.is_empty();
            let mut replacement = Vec::with_capacity(count + 2);
            if !head_empty {
                replacement.push(Block::Text(target.clone()));
            }
            replacement.extend(fragment);
            if !tail.is_empty() {
                replacement.push(Block::Text(tail));
            }
            blocks.splice(at.block..=at.block, replacement);
            if head_empty {
                at.block
            } else {
                at.block + 1
            }
        }
        Block::Media(_) => {
            let index = if at.offset == 0 { at.block } else { at.block + 1 };
            blocks.splice(index..index, fragment);
            index
        }
    };
    let last = first + count - 1;
    Position::new(last, blocks[last].len())
}

/// Splits the block at `at` into two, returning the start of the second.
fn split_block(blocks: &mut Vec<Block>, at: Position) -> Position {
    match &mut blocks[at.block] {
        Block::Text(target) => {
            let tail = target.split_off(at.offset);
            blocks.insert(at.block + 1, Block::Text(tail));
            Position::new(at.block + 1, 0)
        }
        Block::Media(_) => {
            let index = if at.offset == 0 { at.block } else { at.block + 1 };
            blocks.insert(index, Block::Text(TextBlock::new(TextBlockKind::Paragraph)));
            Position::new(index, 0)
        }
    }
}
