//! Allow-list HTML sanitizer for model output.
//!
//! # Invariants
//! - Only allow-listed elements survive; disallowed elements are unwrapped
//!   (their text is kept) unless they belong to the dropped-subtree set.
//! - The only surviving attributes are `title` and a safe `href` on `a`.
//! - Output is balanced: every opened element is closed.

use crate::document::html::{is_safe_link_url, tokenize_lenient, StartTag, Token};
use html_escape::{encode_double_quoted_attribute, encode_text};

const ALLOWED_ELEMENTS: &[&str] = &[
    "p", "br", "strong", "b", "em", "i", "a", "ul", "ol", "li", "blockquote", "h1", "h2", "h3",
    "h4", "h5", "h6", "code", "pre", "mark", "span", "hr",
];
const VOID_ELEMENTS: &[&str] = &["br", "hr"];
const DROPPED_SUBTREES: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "template", "noscript", "svg", "math",
];

/// Sanitizes an HTML fragment so it is safe to display and insert.
pub fn sanitize_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut open: Vec<String> = Vec::new();
    // Name and same-name depth of the subtree being dropped.
    let mut dropping: Option<(String, usize)> = None;

    for token in tokenize_lenient(html) {
        if let Some((name, depth)) = dropping.as_mut() {
            match &token {
                Token::Start(tag) if tag.name == *name && !tag.self_closing => *depth += 1,
                Token::End(end) if *end == *name => {
                    *depth -= 1;
                    if *depth == 0 {
                        dropping = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match token {
            Token::Start(tag) => {
                let name = tag.name.as_str();
                if DROPPED_SUBTREES.contains(&name) {
                    if !tag.self_closing {
                        dropping = Some((tag.name.clone(), 1));
                    }
                    continue;
                }
                if !ALLOWED_ELEMENTS.contains(&name) {
                    continue;
                }
                write_start_tag(&mut out, &tag);
                if VOID_ELEMENTS.contains(&name) {
                    continue;
                }
                if tag.self_closing {
                    out.push_str(&format!("</{name}>"));
                    continue;
                }
                open.push(tag.name);
            }
            Token::End(name) => {
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    continue;
                }
                if let Some(position) = open.iter().rposition(|tag| *tag == name) {
                    for tag in open.drain(position..).rev() {
                        out.push_str(&format!("</{tag}>"));
                    }
                }
            }
            Token::Text(text) => out.push_str(&encode_text(&text)),
            Token::RawText(_) | Token::Comment | Token::Doctype => {}
        }
    }

    for tag in open.into_iter().rev() {
        out.push_str(&format!("</{tag}>"));
    }
    out
}

fn write_start_tag(out: &mut String, tag: &StartTag) {
    out.push('<');
    out.push_str(&tag.name);
    if tag.name == "a" {
        if let Some(href) = tag
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty() && is_safe_link_url(href))
        {
            push_attr(out, "href", href);
        }
    }
    if let Some(title) = tag.attr("title") {
        push_attr(out, "title", title);
    }
    out.push('>');
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&encode_double_quoted_attribute(value));
    out.push('"');
}
