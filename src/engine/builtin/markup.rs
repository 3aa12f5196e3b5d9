//! HTML flattener – reduces a document to a sequence of text blocks.
//!
//! Only the structure that matters for plain text output is kept: block
//! boundaries, headings, list items and line breaks. Everything inside
//! `<head>`, `<script>` and `<style>` is dropped.

/// What kind of block a run of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    /// `<h1>` .. `<h6>`, level 1-6.
    Heading(u8),
    ListItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

impl Block {
    /// Font size multiplier relative to the body text.
    pub fn scale(&self) -> f32 {
        match self.kind {
            BlockKind::Heading(1) => 2.0,
            BlockKind::Heading(2) => 1.5,
            BlockKind::Heading(3) => 1.25,
            _ => 1.0,
        }
    }

    pub fn bold(&self) -> bool {
        matches!(self.kind, BlockKind::Heading(_))
    }
}

/// Flatten `html` into blocks, in document order.
pub fn parse_blocks(html: &str) -> Vec<Block> {
    let mut scanner = Scanner::new(html);
    scanner.run();
    scanner.blocks
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "header", "hr", "html", "main", "nav", "ol", "p", "pre",
    "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "title", "template"];

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    blocks: Vec<Block>,
    current: String,
    kind: BlockKind,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            blocks: Vec::new(),
            current: String::new(),
            kind: BlockKind::Paragraph,
        }
    }

    fn run(&mut self) {
        while !self.eof() {
            if self.starts_with("<!--") {
                self.skip_past("-->");
            } else if self.starts_with("<!") || self.starts_with("<?") {
                self.skip_past(">");
            } else if self.starts_with("<") {
                self.tag();
            } else {
                self.text();
            }
        }
        self.flush();
    }

    fn text(&mut self) {
        let start = self.pos;
        while !self.eof() && !self.starts_with("<") {
            self.advance();
        }
        let raw = decode_entities(&self.input[start..self.pos]);
        for c in raw.chars() {
            if c.is_whitespace() && c != '\u{00A0}' {
                if !self.current.is_empty() && !self.current.ends_with(' ') {
                    self.current.push(' ');
                }
            } else {
                self.current.push(c);
            }
        }
    }

    fn tag(&mut self) {
        let start = self.pos;
        self.advance(); // '<'
        let closing = self.starts_with("/");
        if closing {
            self.advance();
        }
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            // A '<' that opens no tag is text; rescan right after it.
            self.pos = start + 1;
            self.current.push('<');
            return;
        }
        let name = self.tag_name().to_ascii_lowercase();
        self.skip_past(">");

        if !closing && SKIPPED_TAGS.contains(&name.as_str()) {
            self.skip_element(&name);
            return;
        }

        match name.as_str() {
            "br" => {
                let kind = self.kind;
                self.flush();
                self.kind = kind;
            }
            "li" => {
                self.flush();
                if !closing {
                    self.kind = BlockKind::ListItem;
                }
            }
            h if is_heading(h) => {
                self.flush();
                if !closing {
                    self.kind = BlockKind::Heading(h.as_bytes()[1] - b'0');
                }
            }
            b if BLOCK_TAGS.contains(&b) => self.flush(),
            _ => {}
        }
    }

    /// Skip to the matching close tag of a raw-content element.
    fn skip_element(&mut self, name: &str) {
        let close = format!("</{name}");
        let rest = self.input[self.pos..].to_ascii_lowercase();
        match rest.find(&close) {
            Some(at) => {
                self.pos += at;
                self.skip_past(">");
            }
            None => self.pos = self.input.len(),
        }
    }

    fn flush(&mut self) {
        let text = self.current.trim();
        if !text.is_empty() {
            self.blocks.push(Block {
                kind: self.kind,
                text: text.to_string(),
            });
        }
        self.current.clear();
        self.kind = BlockKind::Paragraph;
    }

    fn tag_name(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn skip_past(&mut self, marker: &str) {
        match self.input[self.pos..].find(marker) {
            Some(at) => self.pos += at + marker.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }
}

fn is_heading(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 2 && bytes[0] == b'h' && (b'1'..=b'6').contains(&bytes[1])
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(at) = rest.find('&') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// The character for an entity body (`amp`, `#233`, `#xE9`).
fn entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{00A0}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "deg" => '\u{00B0}',
        "times" => '\u{00D7}',
        "agrave" => '\u{00E0}',
        "aacute" => '\u{00E1}',
        "auml" => '\u{00E4}',
        "ccedil" => '\u{00E7}',
        "egrave" => '\u{00E8}',
        "eacute" => '\u{00E9}',
        "ouml" => '\u{00F6}',
        "uuml" => '\u{00FC}',
        "szlig" => '\u{00DF}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "bull" => '\u{2022}',
        "hellip" => '\u{2026}',
        "euro" => '\u{20AC}',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(html: &str) -> Vec<String> {
        parse_blocks(html).into_iter().map(|b| b.text).collect()
    }

    #[test]
    fn headings_and_paragraphs() {
        let blocks = parse_blocks("<h2>Title</h2><p>Some <b>bold</b>\n   text</p>");
        assert_eq!(
            blocks,
            vec![
                Block {
                    kind: BlockKind::Heading(2),
                    text: "Title".into()
                },
                Block {
                    kind: BlockKind::Paragraph,
                    text: "Some bold text".into()
                },
            ]
        );
    }

    #[test]
    fn head_script_and_style_are_dropped() {
        let html = "<html><head><title>T</title><style>p { color: red }</style></head>\
                    <body><script>var a = '<p>';</script><p>Visible</p></body></html>";
        assert_eq!(texts(html), ["Visible"]);
    }

    #[test]
    fn list_items_and_breaks() {
        let blocks = parse_blocks("<ul><li>One</li><li>Two<br>lines</li></ul>");
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, [BlockKind::ListItem; 3]);
        assert_eq!(texts("<ul><li>One</li><li>Two<br>lines</li></ul>"), ["One", "Two", "lines"]);
    }

    #[test]
    fn entities_and_comments() {
        let html = "<!DOCTYPE html><!-- note --><p>Fish &amp; chips &lt;3</p>";
        assert_eq!(texts(html), ["Fish & chips <3"]);
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        assert_eq!(
            texts("<p>1 < 2 and more</p><p>Next</p>"),
            ["1 < 2 and more", "Next"]
        );
        assert_eq!(texts("<p>a <= b</p>"), ["a <= b"]);
        assert_eq!(texts("x </ y"), ["x </ y"]);
    }

    #[test]
    fn numeric_and_named_entities() {
        assert_eq!(texts("<p>A&#8212;B &eacute;&#xE9;</p>"), ["A\u{2014}B \u{e9}\u{e9}"]);
        assert_eq!(texts("<p>R&D &unknown; &#xZZ;</p>"), ["R&D &unknown; &#xZZ;"]);
    }

    #[test]
    fn bare_text_is_one_block() {
        assert_eq!(texts("hello   world"), ["hello world"]);
        assert!(parse_blocks("").is_empty());
    }
}
