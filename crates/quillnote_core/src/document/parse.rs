//! HTML import into the closed node model.
//!
//! # Responsibility
//! - Map the supported element set onto blocks and marks.
//! - Drop or coerce everything else so the result is always a valid tree.
//!
//! # Invariants
//! - Unknown elements never become nodes; their text survives as plain runs.
//! - Ordered lists import as bullet lists, `h3`-`h6` as level-2 headings.
//! - `script`/`style`/`template` bodies and unsafe URLs are discarded.
//! - Whitespace runs collapse to one space and are trimmed at block edges.

use crate::document::html::{
    is_safe_link_url, is_safe_media_url, tokenize, MalformedContentError, StartTag, Token,
};
use crate::document::node::{
    Block, Dimension, Document, HeadingLevel, MarkKind, Marks, MediaAttrs, MediaNode, TextBlock,
    TextBlockKind, TextRun,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Deepest element nesting accepted before the input is declared malformed.
pub const MAX_NESTING_DEPTH: usize = 256;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

static CSS_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[#a-zA-Z0-9(),.%\s-]{1,64}$").expect("valid css color regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Whether `value` is safe to embed in an inline `color` declaration.
pub fn is_valid_css_color(value: &str) -> bool {
    CSS_COLOR_RE.is_match(value.trim())
}

/// Strictly parses HTML into a document.
///
/// # Errors
/// - `MalformedContentError` for unterminated tags/comments or nesting
///   deeper than [`MAX_NESTING_DEPTH`].
pub fn parse_html(html: &str) -> Result<Document, MalformedContentError> {
    parse_blocks(html).map(Document::from_blocks)
}

/// Parses an HTML fragment into raw blocks (may be empty).
pub(crate) fn parse_blocks(html: &str) -> Result<Vec<Block>, MalformedContentError> {
    let tokens = tokenize(html)?;
    let mut builder = TreeBuilder::default();
    for token in tokens {
        builder.feed(token)?;
    }
    Ok(builder.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    List,
    ListItem,
    Quote,
}

#[derive(Debug)]
struct MarkFrame {
    tag: String,
    mark: Option<(MarkKind, Option<String>)>,
}

#[derive(Debug, Default)]
struct TreeBuilder {
    blocks: Vec<Block>,
    current: Option<TextBlock>,
    current_explicit: bool,
    containers: Vec<Container>,
    marks: Vec<MarkFrame>,
    depth: usize,
}

impl TreeBuilder {
    fn feed(&mut self, token: Token) -> Result<(), MalformedContentError> {
        match token {
            Token::Start(tag) => self.start(tag),
            Token::End(name) => {
                if !VOID_ELEMENTS.contains(&name.as_str()) {
                    self.depth = self.depth.saturating_sub(1);
                    self.close(&name);
                }
                Ok(())
            }
            Token::Text(text) => {
                self.text(&text);
                Ok(())
            }
            Token::RawText(_) | Token::Comment | Token::Doctype => Ok(()),
        }
    }

    fn start(&mut self, tag: StartTag) -> Result<(), MalformedContentError> {
        let is_void = VOID_ELEMENTS.contains(&tag.name.as_str());
        if !is_void && !tag.self_closing {
            self.depth += 1;
            if self.depth > MAX_NESTING_DEPTH {
                return Err(MalformedContentError::NestingTooDeep {
                    max: MAX_NESTING_DEPTH,
                });
            }
        }

        match tag.name.as_str() {
            "p" => self.open_text_block(TextBlockKind::Paragraph),
            "h1" => self.open_text_block(TextBlockKind::Heading(HeadingLevel::One)),
            "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.open_text_block(TextBlockKind::Heading(HeadingLevel::Two))
            }
            "ul" | "ol" => {
                self.flush();
                self.containers.push(Container::List);
            }
            "li" => {
                self.flush();
                self.containers.push(Container::ListItem);
                self.open_text_block(TextBlockKind::BulletItem);
            }
            "blockquote" => {
                self.flush();
                self.containers.push(Container::Quote);
            }
            "div" | "section" | "article" | "header" | "footer" | "main" => self.flush(),
            "img" => self.media(&tag),
            "br" => self.append_raw("\n"),
            "strong" | "b" => self.push_mark(&tag.name, Some((MarkKind::Bold, None))),
            "em" | "i" => self.push_mark(&tag.name, Some((MarkKind::Italic, None))),
            "mark" => {
                let color = tag
                    .attr("data-color")
                    .map(str::to_string)
                    .or_else(|| tag.attr("style").and_then(|s| style_property(s, "background-color")))
                    .filter(|value| is_valid_css_color(value));
                self.push_mark(&tag.name, Some((MarkKind::Highlight, color)));
            }
            "span" => {
                let color = tag
                    .attr("style")
                    .and_then(|style| style_property(style, "color"))
                    .filter(|value| is_valid_css_color(value));
                self.push_mark(&tag.name, color.map(|value| (MarkKind::Color, Some(value))));
            }
            "a" => {
                let href = tag
                    .attr("href")
                    .map(str::trim)
                    .filter(|href| !href.is_empty() && is_safe_link_url(href))
                    .map(str::to_string);
                self.push_mark(&tag.name, href.map(|href| (MarkKind::Link, Some(href))));
            }
            _ => {}
        }

        if tag.self_closing && !is_void {
            self.close(&tag.name);
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        match name {
            "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "div" | "section" | "article"
            | "header" | "footer" | "main" => self.flush(),
            "li" => {
                self.flush();
                self.pop_container(Container::ListItem);
            }
            "ul" | "ol" => {
                self.flush();
                self.pop_container(Container::List);
            }
            "blockquote" => {
                self.flush();
                self.pop_container(Container::Quote);
            }
            _ => {
                if let Some(index) = self.marks.iter().rposition(|frame| frame.tag == name) {
                    self.marks.remove(index);
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        let collapsed = WHITESPACE_RE.replace_all(text, " ");
        if self.current.is_none() && collapsed.trim().is_empty() {
            return;
        }
        self.append_text(&collapsed);
    }

    fn append_text(&mut self, text: &str) {
        let marks = self.active_marks();
        let block = self.ensure_block();
        let ends_with_break = block
            .runs
            .last()
            .and_then(|run| run.text.chars().last())
            .map_or(true, |ch| ch == ' ' || ch == '\n');
        let text = if ends_with_break {
            text.trim_start_matches(' ')
        } else {
            text
        };
        if !text.is_empty() {
            block.runs.push(TextRun::marked(text, marks));
        }
    }

    fn append_raw(&mut self, text: &str) {
        let marks = self.active_marks();
        let block = self.ensure_block();
        if let Some(run) = block.runs.last_mut() {
            let trimmed_len = run.text.trim_end_matches(' ').len();
            run.text.truncate(trimmed_len);
        }
        block.runs.push(TextRun::marked(text, marks));
    }

    fn media(&mut self, tag: &StartTag) {
        let Some(src) = tag
            .attr("src")
            .map(str::trim)
            .filter(|src| is_safe_media_url(src))
        else {
            return;
        };
        let kind = self.current.as_ref().map(|block| block.kind);
        // An image that opens its paragraph replaces it instead of leaving an
        // empty block behind.
        if self.current.as_ref().is_some_and(TextBlock::is_empty) {
            self.current = None;
            self.current_explicit = false;
        }
        self.flush();

        let attrs = MediaAttrs {
            src: src.to_string(),
            width: tag.attr("width").and_then(Dimension::parse).unwrap_or_default(),
            height: tag.attr("height").and_then(Dimension::parse).unwrap_or_default(),
            alt: tag.attr("alt").map(str::to_string),
            title: tag.attr("title").map(str::to_string),
        };
        self.blocks.push(Block::Media(MediaNode::new(attrs)));

        // Text following an image inside the same paragraph continues in a
        // fresh block of the same kind.
        if let Some(kind) = kind {
            self.current = Some(TextBlock::new(kind));
            self.current_explicit = false;
        }
    }

    fn push_mark(&mut self, tag: &str, mark: Option<(MarkKind, Option<String>)>) {
        self.marks.push(MarkFrame {
            tag: tag.to_string(),
            mark,
        });
    }

    fn active_marks(&self) -> Marks {
        let mut marks = Marks::default();
        for frame in &self.marks {
            if let Some((kind, value)) = &frame.mark {
                marks.set(*kind, value.as_deref());
            }
        }
        marks
    }

    fn open_text_block(&mut self, requested: TextBlockKind) {
        let kind = self.contextual_kind(requested);
        if let Some(current) = &self.current {
            // `<li><p>` reuses the block the list item already opened.
            if current.is_empty() && current.kind == kind {
                self.current_explicit = true;
                return;
            }
        }
        self.flush();
        self.current = Some(TextBlock::new(kind));
        self.current_explicit = true;
    }

    fn ensure_block(&mut self) -> &mut TextBlock {
        if self.current.is_none() {
            let kind = self.contextual_kind(TextBlockKind::Paragraph);
            self.current = Some(TextBlock::new(kind));
            self.current_explicit = false;
        }
        self.current.get_or_insert_with(|| TextBlock::new(TextBlockKind::Paragraph))
    }

    /// Innermost container decides the kind of text blocks inside it.
    fn contextual_kind(&self, requested: TextBlockKind) -> TextBlockKind {
        match self.containers.last() {
            Some(Container::List | Container::ListItem) => TextBlockKind::BulletItem,
            Some(Container::Quote) => TextBlockKind::Quote,
            None => requested,
        }
    }

    fn pop_container(&mut self, container: Container) {
        if let Some(index) = self.containers.iter().rposition(|open| *open == container) {
            self.containers.truncate(index);
        }
    }

    fn flush(&mut self) {
        let Some(mut block) = self.current.take() else {
            return;
        };
        while let Some(last) = block.runs.last_mut() {
            let trimmed_len = last.text.trim_end_matches(' ').len();
            last.text.truncate(trimmed_len);
            if last.text.is_empty() {
                block.runs.pop();
            } else {
                break;
            }
        }
        block.normalize();
        if self.current_explicit || !block.is_empty() {
            self.blocks.push(Block::Text(block));
        }
        self.current_explicit = false;
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

/// Value of one declaration in an inline `style` attribute.
fn style_property(style: &str, property: &str) -> Option<String> {
    style.split(';').find_map(|declaration| {
        let (name, value) = declaration.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(property) {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_html, MAX_NESTING_DEPTH};
    use crate::document::html::MalformedContentError;
    use crate::document::node::{Block, Dimension, HeadingLevel, TextBlockKind};

    fn text_blocks(html: &str) -> Vec<(TextBlockKind, String)> {
        parse_html(html)
            .expect("parse")
            .blocks()
            .iter()
            .filter_map(|block| block.as_text())
            .map(|block| (block.kind, block.plain_text()))
            .collect()
    }

    #[test]
    fn parses_supported_blocks_and_coerces_the_rest() {
        let blocks = text_blocks(
            "<h1>Title</h1><h4>Sub</h4><ol><li>one</li><li><p>two</p></li></ol>\
             <blockquote><p>quoted</p></blockquote><p>end</p>",
        );
        assert_eq!(
            blocks,
            vec![
                (TextBlockKind::Heading(HeadingLevel::One), "Title".to_string()),
                (TextBlockKind::Heading(HeadingLevel::Two), "Sub".to_string()),
                (TextBlockKind::BulletItem, "one".to_string()),
                (TextBlockKind::BulletItem, "two".to_string()),
                (TextBlockKind::Quote, "quoted".to_string()),
                (TextBlockKind::Paragraph, "end".to_string()),
            ]
        );
    }

    #[test]
    fn applies_marks_from_nested_inline_elements() {
        let doc = parse_html(
            r#"<p><strong>bold <em>both</em></strong> <span style="color: #ff0000">red</span> <a href="https://x.dev">go</a></p>"#,
        )
        .expect("parse");
        let block = doc.blocks()[0].as_text().expect("text block");
        let both = block
            .runs
            .iter()
            .find(|run| run.text == "both")
            .expect("both run");
        assert!(both.marks.bold && both.marks.italic);
        let red = block.runs.iter().find(|run| run.text == "red").expect("red");
        assert_eq!(red.marks.color.as_deref(), Some("#ff0000"));
        let link = block.runs.iter().find(|run| run.text == "go").expect("go");
        assert_eq!(link.marks.link.as_deref(), Some("https://x.dev"));
    }

    #[test]
    fn drops_scripts_unknown_elements_and_unsafe_links() {
        let blocks = text_blocks(
            r#"<p>a<script>alert(1)</script><u>b</u><a href="javascript:x()">c</a></p>"#,
        );
        assert_eq!(blocks, vec![(TextBlockKind::Paragraph, "abc".to_string())]);
    }

    #[test]
    fn wraps_loose_text_and_collapses_whitespace() {
        let blocks = text_blocks("  hello \n\n   world  ");
        assert_eq!(
            blocks,
            vec![(TextBlockKind::Paragraph, "hello world".to_string())]
        );
    }

    #[test]
    fn imports_media_with_dimensions() {
        let doc = parse_html(r#"<p>before<img src="https://cdn/x.png" width="240" height="auto">after</p>"#)
            .expect("parse");
        assert_eq!(doc.len(), 3);
        let Block::Media(media) = &doc.blocks()[1] else {
            panic!("expected media block");
        };
        assert_eq!(media.attrs.width, Dimension::Px(240.0));
        assert_eq!(media.attrs.height, Dimension::Auto);
        assert_eq!(doc.blocks()[2].as_text().expect("text").plain_text(), "after");
    }

    #[test]
    fn keeps_explicit_empty_paragraphs() {
        let blocks = text_blocks("<p></p><p>x</p>");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].1, "");
    }

    #[test]
    fn rejects_excessive_nesting() {
        let html = "<span>".repeat(MAX_NESTING_DEPTH + 1);
        let err = parse_html(&html).expect_err("must fail");
        assert_eq!(
            err,
            MalformedContentError::NestingTooDeep {
                max: MAX_NESTING_DEPTH
            }
        );
    }

    #[test]
    fn line_breaks_survive_as_newlines() {
        let blocks = text_blocks("<p>one<br>two</p>");
        assert_eq!(blocks[0].1, "one\ntwo");
    }
}
