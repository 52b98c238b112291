//! Sheet markup – the controlled element subset emitted by the template
//! composer, plus the parser the render host uses to read it back.
//!
//! Supported elements:
//! - Containers: sheet, div
//! - Text blocks: p, h1, h2 (inline span / br children)
//! - Void: img, br
//!
//! Unlike a browser we are strict about nesting: a mismatched or missing
//! closing tag is an error, because the host must never render a sheet
//! whose structure differs from what the composer produced.

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Node types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Sheet,
    Div,
    P,
    H1,
    H2,
    Span,
    Img,
    Br,
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "sheet" => Tag::Sheet,
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "span" => Tag::Span,
            "img" => Tag::Img,
            "br" => Tag::Br,
            other => Tag::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Sheet => "sheet",
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::Span => "span",
            Tag::Img => "img",
            Tag::Br => "br",
            Tag::Unknown(name) => name,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Img | Tag::Br)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Tag::Span | Tag::Br)
    }

    /// Blocks whose inline content is flowed as a single text run.
    pub fn is_text_block(&self) -> bool {
        matches!(self, Tag::P | Tag::H1 | Tag::H2)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// Flattened text of the inline subtree; `<br>` becomes a newline.
    pub fn inline_text(&self) -> String {
        let mut out = String::new();
        collect_inline_text(&self.children, &mut out);
        out
    }

    /// Depth-first walk over every element below (and including) `self`.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        visit(self);
        for child in &self.children {
            if let Node::Element(e) = child {
                e.walk(visit);
            }
        }
    }
}

fn collect_inline_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => {
                // Collapse source whitespace the way a browser would.
                let mut last_space = out.ends_with(' ') || out.ends_with('\n') || out.is_empty();
                for c in t.chars() {
                    if c.is_whitespace() && c != '\u{00A0}' {
                        if !last_space {
                            out.push(' ');
                            last_space = true;
                        }
                    } else {
                        out.push(c);
                        last_space = false;
                    }
                }
            }
            Node::Element(e) if e.tag == Tag::Br => {
                while out.ends_with(' ') {
                    out.pop();
                }
                out.push('\n');
            }
            Node::Element(e) => collect_inline_text(&e.children, out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "markup error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for MarkupError {}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse sheet markup into a node list.
pub fn parse_markup(input: &str) -> Result<Vec<Node>, MarkupError> {
    let mut parser = Parser { input, pos: 0 };
    let nodes = parser.parse_children(None)?;
    if !parser.eof() {
        return Err(parser.error("unexpected closing tag at top level"));
    }
    Ok(nodes)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_children(&mut self, parent: Option<&Tag>) -> Result<Vec<Node>, MarkupError> {
        let mut nodes = Vec::new();
        loop {
            if self.eof() {
                if let Some(tag) = parent {
                    return Err(self.error(&format!("unclosed <{}>", tag.name())));
                }
                return Ok(nodes);
            }
            if self.rest().starts_with("</") {
                return Ok(nodes);
            }
            if self.rest().starts_with("<!--") {
                self.skip_past("-->");
                continue;
            }
            if self.rest().starts_with('<') {
                nodes.push(Node::Element(self.parse_element()?));
            } else {
                let text = self.take_while(|c| c != '<');
                // Whitespace-only runs between elements carry no content.
                if !text.trim().is_empty() {
                    nodes.push(Node::Text(decode_entities(text)));
                } else if matches!(nodes.last(), Some(Node::Element(e)) if e.tag.is_inline()) {
                    nodes.push(Node::Text(" ".to_string()));
                }
            }
        }
    }

    fn parse_element(&mut self) -> Result<Element, MarkupError> {
        self.pos += 1; // '<'
        let name = self.take_while(is_name_char);
        if name.is_empty() {
            return Err(self.error("expected tag name"));
        }
        let mut element = Element::new(Tag::parse(name));

        loop {
            self.skip_whitespace();
            if self.eof() {
                return Err(self.error("unterminated start tag"));
            }
            if self.rest().starts_with("/>") {
                self.pos += 2;
                return Ok(element);
            }
            if self.rest().starts_with('>') {
                self.pos += 1;
                break;
            }
            let key = self.take_while(is_name_char).to_ascii_lowercase();
            if key.is_empty() {
                return Err(self.error("malformed attribute"));
            }
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.parse_attr_value()?
            } else {
                String::new()
            };
            element.attributes.insert(key, value);
        }

        if element.tag.is_void() {
            return Ok(element);
        }

        element.children = self.parse_children(Some(&element.tag))?;

        // Closing tag must match.
        self.pos += 2; // "</"
        let closing = self.take_while(is_name_char);
        if !closing.eq_ignore_ascii_case(element.tag.name()) {
            return Err(self.error(&format!(
                "expected </{}>, found </{}>",
                element.tag.name(),
                closing
            )));
        }
        self.skip_whitespace();
        if !self.rest().starts_with('>') {
            return Err(self.error("unterminated end tag"));
        }
        self.pos += 1;
        Ok(element)
    }

    fn parse_attr_value(&mut self) -> Result<String, MarkupError> {
        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                let raw = self.take_while(|c| !c.is_whitespace() && c != '>' && c != '/');
                return Ok(decode_entities(raw));
            }
        };
        self.pos += 1;
        let raw = self.take_while(|c| c != quote);
        if self.eof() {
            return Err(self.error("unterminated attribute value"));
        }
        self.pos += 1;
        Ok(decode_entities(raw))
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| i)
            .unwrap_or(self.input.len() - start);
        self.pos += len;
        &self.input[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn skip_past(&mut self, marker: &str) {
        match self.rest().find(marker) {
            Some(i) => self.pos += i + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn error(&self, message: &str) -> MarkupError {
        MarkupError {
            offset: self.pos,
            message: message.to_string(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Escaping (used when composing)
// ---------------------------------------------------------------------------

/// Escape text content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;").replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(html: &str) -> Element {
        let nodes = parse_markup(html).unwrap();
        assert_eq!(nodes.len(), 1);
        match nodes.into_iter().next() {
            Some(Node::Element(e)) => e,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn parse_sheet_with_attributes() {
        let sheet = single(r#"<sheet kind="detail" index="2"><div class="flex p-4"><p>Hi</p></div></sheet>"#);
        assert_eq!(sheet.tag, Tag::Sheet);
        assert_eq!(sheet.attr("kind"), Some("detail"));
        assert_eq!(sheet.children.len(), 1);
        if let Node::Element(div) = &sheet.children[0] {
            assert_eq!(div.classes().collect::<Vec<_>>(), vec!["flex", "p-4"]);
        } else {
            panic!("expected div");
        }
    }

    #[test]
    fn br_and_void_img() {
        let p = single("<p>無上最勝佛法僧<br>直至菩提我皈依</p>");
        assert_eq!(p.inline_text(), "無上最勝佛法僧\n直至菩提我皈依");
        let img = single(r#"<img src="asset:seal.png" class="seal">"#);
        assert_eq!(img.tag, Tag::Img);
        assert_eq!(img.attr("src"), Some("asset:seal.png"));
    }

    #[test]
    fn inline_text_collapses_whitespace() {
        let p = single("<p>\n   Namo   <span>Guru</span> Bhe\n</p>");
        assert_eq!(p.inline_text().trim(), "Namo Guru Bhe");
    }

    #[test]
    fn mismatched_close_is_rejected() {
        let err = parse_markup("<div><p>text</div>").unwrap_err();
        assert!(err.message.contains("expected </p>"), "{err}");
        assert!(parse_markup("<div>").is_err());
    }

    #[test]
    fn escaping_roundtrips_through_parser() {
        let name = r#"A & B <"C">"#;
        let html = format!(
            r#"<p title="{}">{}</p>"#,
            escape_attr(name),
            escape_text(name)
        );
        let p = single(&html);
        assert_eq!(p.attr("title"), Some(name));
        assert_eq!(p.inline_text(), name);
    }
}
