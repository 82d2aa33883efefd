//! Progressive rendering of streamed model output.
//!
//! Every call re-renders the full accumulated text, so a fence or list marker
//! split across chunks resolves once the rest of it arrives.

use crate::assist::sanitize::sanitize_html;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Parser};
use regex::Regex;

static LEADING_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*```[A-Za-z0-9_+-]*[ \t]*(?:\r?\n|$)").expect("valid leading fence regex")
});
static TRAILING_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\n)[ \t]*```\s*$").expect("valid trailing fence regex"));

const FENCE_OPENER: &str = "```markdown";

/// Removes a wrapping code fence models sometimes put around their answer.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    // Opening fence still arriving ("`", "``").
    if trimmed.starts_with('`') && FENCE_OPENER.starts_with(trimmed) {
        return String::new();
    }
    let without_leading = LEADING_FENCE_RE.replace(text, "");
    let without_trailing = TRAILING_FENCE_RE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

/// Converts Markdown to (unsanitized) HTML.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Full pipeline for one accumulated response: strip fence, render, sanitize.
pub fn render_markdown(accumulated: &str) -> String {
    sanitize_html(&markdown_to_html(&strip_code_fence(accumulated)))
}

#[cfg(test)]
mod tests {
    use super::{render_markdown, strip_code_fence};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("```markdown\n# Hi\n```", "# Hi")]
    #[case("```\nplain\n```", "plain")]
    #[case("```md\n- a\n- b\n```\n", "- a\n- b")]
    #[case("no fence", "no fence")]
    #[case("``", "")]
    #[case("```mark", "")]
    #[case("```markdown\npartial", "partial")]
    fn strips_wrapping_fences(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_code_fence(input), expected);
    }

    #[test]
    fn renders_single_paragraph() {
        assert_eq!(render_markdown("It was good."), "<p>It was good.</p>\n");
    }

    #[test]
    fn raw_html_in_markdown_is_sanitized() {
        let html = render_markdown("**hi** <img src=x onerror=alert(1)>\n\n<script>x()</script>");
        assert!(html.contains("<strong>hi</strong>"));
        assert!(!html.contains("onerror"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn split_list_marker_resolves_once_complete() {
        let partial = render_markdown("```markdown\n-");
        let complete = render_markdown("```markdown\n- item\n```");
        assert!(!partial.contains("<script"));
        assert_eq!(complete, "<ul>\n<li>item</li>\n</ul>\n");
    }
}
