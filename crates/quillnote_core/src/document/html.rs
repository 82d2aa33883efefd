//! Tolerant HTML tokenizer shared by document import and output sanitizing.
//!
//! # Responsibility
//! - Split markup into start/end tags, decoded text and raw-text bodies.
//! - Decide which URL schemes may survive into links and media sources.
//!
//! # Invariants
//! - Tag and attribute names are lowercased; the first duplicate attribute wins.
//! - `script`/`style`/`template`/`textarea` bodies are never tokenized as markup.
//! - Strict mode reports unterminated constructs; lenient mode emits them as text.

use thiserror::Error;

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "template", "textarea"];

/// Content that could not be recovered into a valid node tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedContentError {
    #[error("unterminated tag at byte {offset}")]
    UnterminatedTag { offset: usize },
    #[error("unterminated comment at byte {offset}")]
    UnterminatedComment { offset: usize },
    #[error("element nesting exceeds {max} levels")]
    NestingTooDeep { max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub self_closing: bool,
}

impl StartTag {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Start(StartTag),
    End(String),
    /// Entity-decoded character data.
    Text(String),
    /// Undecoded body of a raw-text element.
    RawText(String),
    Comment,
    Doctype,
}

/// Tokenizes, failing on unterminated tags or comments.
pub fn tokenize(input: &str) -> Result<Vec<Token>, MalformedContentError> {
    Lexer::new(input, true).run()
}

/// Tokenizes, turning unterminated constructs into literal text.
pub fn tokenize_lenient(input: &str) -> Vec<Token> {
    match Lexer::new(input, false).run() {
        Ok(tokens) => tokens,
        // Lenient lexing never reports errors; keep the input as text anyway.
        Err(_) => vec![Token::Text(input.to_string())],
    }
}

/// Whether `url` may be used as a link target.
pub fn is_safe_link_url(url: &str) -> bool {
    match url_scheme(url) {
        None => true,
        Some(scheme) => matches!(scheme.as_str(), "http" | "https" | "mailto"),
    }
}

/// Whether `url` may be used as an image source.
pub fn is_safe_media_url(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return false;
    }
    match url_scheme(trimmed) {
        None => true,
        Some(scheme) => match scheme.as_str() {
            "http" | "https" | "file" => true,
            "data" => trimmed
                .get(5..)
                .is_some_and(|rest| rest.to_ascii_lowercase().starts_with("image/")),
            _ => false,
        },
    }
}

/// Lowercased scheme of an absolute URL, ignoring embedded whitespace and
/// control characters the way browsers do.
fn url_scheme(url: &str) -> Option<String> {
    let compact: String = url
        .trim()
        .chars()
        .filter(|ch| !ch.is_whitespace() && !ch.is_control())
        .collect();
    let colon = compact.find(':')?;
    let candidate = &compact[..colon];
    if candidate.contains(['/', '?', '#']) {
        return None;
    }
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
    {
        return None;
    }
    Some(candidate.to_ascii_lowercase())
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    strict: bool,
    pending_text: String,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, strict: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            strict,
            pending_text: String::new(),
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, MalformedContentError> {
        let src = self.src;
        while self.pos < self.bytes.len() {
            let Some(relative) = src[self.pos..].find('<') else {
                self.pending_text.push_str(&src[self.pos..]);
                self.pos = self.bytes.len();
                break;
            };
            let lt = self.pos + relative;
            self.pending_text.push_str(&src[self.pos..lt]);
            self.pos = lt;

            let next = self.bytes.get(lt + 1).copied();
            let after_next = self.bytes.get(lt + 2).copied();
            let outcome = match next {
                Some(b'!') => self.lex_declaration(),
                Some(b'?') => self.lex_bogus(lt),
                Some(b'/') if after_next.is_some_and(|b| b.is_ascii_alphabetic()) => {
                    self.lex_end_tag()
                }
                Some(b) if b.is_ascii_alphabetic() => self.lex_start_tag(),
                _ => {
                    self.pending_text.push('<');
                    self.pos += 1;
                    Ok(())
                }
            };

            if let Err(err) = outcome {
                if self.strict {
                    return Err(err);
                }
                self.pending_text.push_str(&src[lt..]);
                self.pos = self.bytes.len();
            }
        }
        self.flush_text();
        Ok(self.tokens)
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.pending_text);
        let decoded = html_escape::decode_html_entities(&raw).into_owned();
        self.tokens.push(Token::Text(decoded));
    }

    fn push(&mut self, token: Token) {
        self.flush_text();
        self.tokens.push(token);
    }

    fn lex_declaration(&mut self) -> Result<(), MalformedContentError> {
        let start = self.pos;
        if self.src[start..].starts_with("<!--") {
            let Some(end) = self.src[start + 4..].find("-->") else {
                return Err(MalformedContentError::UnterminatedComment { offset: start });
            };
            self.pos = start + 4 + end + 3;
            self.push(Token::Comment);
            return Ok(());
        }
        let Some(end) = self.src[start..].find('>') else {
            return Err(MalformedContentError::UnterminatedTag { offset: start });
        };
        self.pos = start + end + 1;
        self.push(Token::Doctype);
        Ok(())
    }

    fn lex_bogus(&mut self, start: usize) -> Result<(), MalformedContentError> {
        let Some(end) = self.src[start..].find('>') else {
            return Err(MalformedContentError::UnterminatedTag { offset: start });
        };
        self.pos = start + end + 1;
        self.push(Token::Comment);
        Ok(())
    }

    fn lex_end_tag(&mut self) -> Result<(), MalformedContentError> {
        let start = self.pos;
        let (name, after_name) = self.read_name(start + 2);
        let Some(end) = self.src[after_name..].find('>') else {
            return Err(MalformedContentError::UnterminatedTag { offset: start });
        };
        self.pos = after_name + end + 1;
        self.push(Token::End(name));
        Ok(())
    }

    fn lex_start_tag(&mut self) -> Result<(), MalformedContentError> {
        let start = self.pos;
        let (name, mut i) = self.read_name(start + 1);
        let unterminated = MalformedContentError::UnterminatedTag { offset: start };
        let mut attrs: Vec<Attribute> = Vec::new();
        let mut self_closing = false;

        loop {
            i = self.skip_whitespace(i);
            match self.bytes.get(i) {
                None => return Err(unterminated),
                Some(b'>') => {
                    i += 1;
                    break;
                }
                Some(b'/') => {
                    if self.bytes.get(i + 1) == Some(&b'>') {
                        self_closing = true;
                        i += 2;
                        break;
                    }
                    i += 1;
                    continue;
                }
                Some(_) => {}
            }

            let name_start = i;
            while let Some(&b) = self.bytes.get(i) {
                if b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/') {
                    break;
                }
                i += 1;
            }
            let attr_name = self.src[name_start..i].to_ascii_lowercase();
            i = self.skip_whitespace(i);

            let mut value = String::new();
            if self.bytes.get(i) == Some(&b'=') {
                i = self.skip_whitespace(i + 1);
                match self.bytes.get(i) {
                    None => return Err(unterminated),
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let quote_char = quote as char;
                        let Some(close) = self.src[i + 1..].find(quote_char) else {
                            return Err(unterminated);
                        };
                        value = self.src[i + 1..i + 1 + close].to_string();
                        i = i + 1 + close + 1;
                    }
                    Some(_) => {
                        let value_start = i;
                        while let Some(&b) = self.bytes.get(i) {
                            if b.is_ascii_whitespace() || b == b'>' {
                                break;
                            }
                            i += 1;
                        }
                        value = self.src[value_start..i].to_string();
                    }
                }
            }

            if !attr_name.is_empty() && !attrs.iter().any(|attr| attr.name == attr_name) {
                attrs.push(Attribute {
                    name: attr_name,
                    value: html_escape::decode_html_entities(&value).into_owned(),
                });
            }
        }

        self.pos = i;
        let is_raw = RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing;
        self.push(Token::Start(StartTag {
            name: name.clone(),
            attrs,
            self_closing,
        }));

        if is_raw {
            let closing = format!("</{name}");
            let body_end = self.src[self.pos..]
                .to_ascii_lowercase()
                .find(&closing)
                .map_or(self.bytes.len(), |offset| self.pos + offset);
            let body = &self.src[self.pos..body_end];
            if !body.is_empty() {
                self.tokens.push(Token::RawText(body.to_string()));
            }
            self.pos = body_end;
        }
        Ok(())
    }

    fn read_name(&self, from: usize) -> (String, usize) {
        let mut i = from;
        while let Some(&b) = self.bytes.get(i) {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'_') {
                i += 1;
            } else {
                break;
            }
        }
        (self.src[from..i].to_ascii_lowercase(), i)
    }

    fn skip_whitespace(&self, mut i: usize) -> usize {
        while self.bytes.get(i).is_some_and(|b| b.is_ascii_whitespace()) {
            i += 1;
        }
        i
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_safe_link_url, is_safe_media_url, tokenize, tokenize_lenient, MalformedContentError,
        Token,
    };

    #[test]
    fn tokenizes_tags_attributes_and_decoded_text() {
        let tokens = tokenize(r#"<P Class=x data-a='1 2'>a &amp; b</p>"#).expect("tokenize");
        let Token::Start(tag) = &tokens[0] else {
            panic!("expected start tag, got {:?}", tokens[0]);
        };
        assert_eq!(tag.name, "p");
        assert_eq!(tag.attr("class"), Some("x"));
        assert_eq!(tag.attr("data-a"), Some("1 2"));
        assert_eq!(tokens[1], Token::Text("a & b".to_string()));
        assert_eq!(tokens[2], Token::End("p".to_string()));
    }

    #[test]
    fn script_body_is_raw_text() {
        let tokens = tokenize("<script>if (a < b) { x() }</script>ok").expect("tokenize");
        assert_eq!(tokens[1], Token::RawText("if (a < b) { x() }".to_string()));
        assert_eq!(tokens[2], Token::End("script".to_string()));
        assert_eq!(tokens[3], Token::Text("ok".to_string()));
    }

    #[test]
    fn stray_less_than_is_text() {
        let tokens = tokenize("1 < 2 <3").expect("tokenize");
        assert_eq!(tokens, vec![Token::Text("1 < 2 <3".to_string())]);
    }

    #[test]
    fn strict_mode_rejects_unterminated_tag() {
        let err = tokenize("<p>hello <strong").expect_err("must fail");
        assert_eq!(err, MalformedContentError::UnterminatedTag { offset: 9 });
    }

    #[test]
    fn lenient_mode_keeps_unterminated_tag_as_text() {
        let tokens = tokenize_lenient("hi <img src=x onerror=alert(1)");
        assert_eq!(
            tokens,
            vec![Token::Text("hi <img src=x onerror=alert(1)".to_string())]
        );
    }

    #[test]
    fn url_policies_reject_script_schemes() {
        assert!(is_safe_link_url("https://example.com"));
        assert!(is_safe_link_url("/notes/1"));
        assert!(!is_safe_link_url("javascript:alert(1)"));
        assert!(!is_safe_link_url(" JaVa\tScript:alert(1)"));
        assert!(is_safe_media_url("data:image/png;base64,AAAA"));
        assert!(!is_safe_media_url("data:text/html,<b>"));
        assert!(is_safe_media_url("file:///tmp/a.png"));
        assert!(!is_safe_media_url(""));
    }
}
