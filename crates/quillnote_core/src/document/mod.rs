//! Rich-text document model, HTML boundary and editing session.
//!
//! # Responsibility
//! - Own the closed node set and its HTML import/export.
//! - Provide the transactional editor used by every other core module.
//!
//! # See also
//! - `media` for the resizable image node view.
//! - `assist` for AI output merged back through `replace_selection`.

pub mod editor;
pub mod html;
pub mod node;
pub mod parse;
pub mod serialize;

use log::warn;

pub use editor::{
    AnchoredSelection, BlockType, DocumentEditor, EditError, NewNode, Position, Range, StepMap,
    Transaction, TransactionKind,
};
pub use html::MalformedContentError;
pub use node::{
    Block, Dimension, Document, HeadingLevel, Highlight, MarkKind, Marks, MediaAttrs, MediaNode,
    NodeId, TextBlock, TextBlockKind, TextRun,
};
pub use parse::parse_html;
pub use serialize::{to_html, to_plain_text};

/// Builds a document from stored content; never fails.
///
/// Empty input yields one empty paragraph. Content the strict parser
/// rejects is imported as plain-text paragraphs instead.
pub fn create_document(html: &str) -> Document {
    if html.trim().is_empty() {
        return Document::default();
    }
    match parse_html(html) {
        Ok(document) => document,
        Err(err) => {
            warn!(
                "event=document_parse module=document status=error fallback=plain_text input_len={} error={}",
                html.len(),
                err
            );
            Document::from_plain_text(html)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{create_document, to_plain_text};

    #[test]
    fn malformed_content_falls_back_to_plain_text() {
        let doc = create_document("line one\n<p>unterminated <b");
        assert_eq!(to_plain_text(&doc), "line one\n<p>unterminated <b");
    }

    #[test]
    fn empty_input_is_one_empty_paragraph() {
        let doc = create_document("   ");
        assert_eq!(doc.len(), 1);
        assert!(doc.is_empty());
    }
}
