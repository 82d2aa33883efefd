//! HTML and plain-text export.
//!
//! # Invariants
//! - Output only uses elements and attributes that `parse_html` accepts, so
//!   serialize -> parse -> serialize is stable.
//! - Consecutive bullet items share one `<ul>`; consecutive quote blocks
//!   share one `<blockquote>`.

use crate::document::node::{Block, Document, HeadingLevel, MediaNode, TextBlock, TextBlockKind, TextRun};
use html_escape::{encode_double_quoted_attribute, encode_text};

/// Serializes a document to the persisted HTML form.
pub fn to_html(document: &Document) -> String {
    blocks_to_html(document.blocks())
}

pub(crate) fn blocks_to_html(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut open_group: Option<TextBlockKind> = None;

    for block in blocks {
        let group = match block {
            Block::Text(text) if matches!(text.kind, TextBlockKind::BulletItem | TextBlockKind::Quote) => {
                Some(text.kind)
            }
            _ => None,
        };
        if group != open_group {
            close_group(&mut out, open_group);
            open_group = group;
            match group {
                Some(TextBlockKind::BulletItem) => out.push_str("<ul>"),
                Some(TextBlockKind::Quote) => out.push_str("<blockquote>"),
                _ => {}
            }
        }

        match block {
            Block::Text(text) => write_text_block(&mut out, text),
            Block::Media(media) => write_media(&mut out, media),
        }
    }
    close_group(&mut out, open_group);
    out
}

/// Plain text: text blocks joined by newlines, media skipped.
pub fn to_plain_text(document: &Document) -> String {
    document
        .blocks()
        .iter()
        .filter_map(Block::as_text)
        .map(TextBlock::plain_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn close_group(out: &mut String, group: Option<TextBlockKind>) {
    match group {
        Some(TextBlockKind::BulletItem) => out.push_str("</ul>"),
        Some(TextBlockKind::Quote) => out.push_str("</blockquote>"),
        _ => {}
    }
}

fn write_text_block(out: &mut String, block: &TextBlock) {
    let (open, close) = match block.kind {
        TextBlockKind::Paragraph | TextBlockKind::Quote => ("<p>", "</p>"),
        TextBlockKind::BulletItem => ("<li><p>", "</p></li>"),
        TextBlockKind::Heading(HeadingLevel::One) => ("<h1>", "</h1>"),
        TextBlockKind::Heading(HeadingLevel::Two) => ("<h2>", "</h2>"),
    };
    out.push_str(open);
    for run in &block.runs {
        write_run(out, run);
    }
    out.push_str(close);
}

fn write_run(out: &mut String, run: &TextRun) {
    let marks = &run.marks;
    let mut closers: Vec<&str> = Vec::new();

    if let Some(href) = &marks.link {
        out.push_str("<a href=\"");
        out.push_str(&encode_double_quoted_attribute(href));
        out.push_str("\">");
        closers.push("</a>");
    }
    if marks.bold {
        out.push_str("<strong>");
        closers.push("</strong>");
    }
    if marks.italic {
        out.push_str("<em>");
        closers.push("</em>");
    }
    if let Some(color) = &marks.color {
        out.push_str("<span style=\"color: ");
        out.push_str(&encode_double_quoted_attribute(color));
        out.push_str("\">");
        closers.push("</span>");
    }
    if let Some(highlight) = &marks.highlight {
        match &highlight.color {
            Some(color) => {
                let color = encode_double_quoted_attribute(color);
                out.push_str(&format!(
                    "<mark data-color=\"{color}\" style=\"background-color: {color}\">"
                ));
            }
            None => out.push_str("<mark>"),
        }
        closers.push("</mark>");
    }

    for (index, line) in run.text.split('\n').enumerate() {
        if index > 0 {
            out.push_str("<br>");
        }
        out.push_str(&encode_text(line));
    }

    for closer in closers.into_iter().rev() {
        out.push_str(closer);
    }
}

fn write_media(out: &mut String, media: &MediaNode) {
    let attrs = &media.attrs;
    out.push_str("<img src=\"");
    out.push_str(&encode_double_quoted_attribute(&attrs.src));
    out.push('"');
    if let Some(width) = attrs.width.to_attr() {
        out.push_str(&format!(" width=\"{width}\""));
    }
    if let Some(height) = attrs.height.to_attr() {
        out.push_str(&format!(" height=\"{height}\""));
    }
    if let Some(alt) = &attrs.alt {
        out.push_str(" alt=\"");
        out.push_str(&encode_double_quoted_attribute(alt));
        out.push('"');
    }
    if let Some(title) = &attrs.title {
        out.push_str(" title=\"");
        out.push_str(&encode_double_quoted_attribute(title));
        out.push('"');
    }
    out.push('>');
}
