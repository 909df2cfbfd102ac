//! CSS reference scanner
//!
//! Finds the resources a stylesheet pulls in without building a style model:
//! - `@import` targets (stylesheets)
//! - `url()` values inside `@font-face` blocks (fonts)
//! - every other `url()` value (images and other media)
//!
//! Comments and strings are skipped so URLs inside them are not reported.
//! Structural problems (unterminated comments or strings, unbalanced braces)
//! are collected rather than aborting the scan.

use crate::report::Location;

/// How a URL is used by the stylesheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CssUrlKind {
    /// `@import`
    Import,
    /// `src` of an `@font-face` rule
    FontFace,
    /// Any other `url()`
    Url,
}

/// One URL found in CSS text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CssReference {
    /// URL as written, quotes removed.
    pub url: String,
    /// Usage.
    pub kind: CssUrlKind,
    /// Position inside the scanned text.
    pub location: Location,
}

/// Structural problem found while scanning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CssProblem {
    /// Description.
    pub message: String,
    /// Position inside the scanned text.
    pub location: Location,
}

/// Result of scanning a stylesheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CssScan {
    /// URLs in source order.
    pub references: Vec<CssReference>,
    /// Value of a leading `@charset` rule.
    pub charset: Option<String>,
    /// Structural problems in source order.
    pub problems: Vec<CssProblem>,
}

struct Scanner<'a> {
    css: &'a str,
    bytes: &'a [u8],
    pos: usize,
    scan: CssScan,
}

impl<'a> Scanner<'a> {
    fn new(css: &'a str) -> Self {
        Self {
            css,
            bytes: css.as_bytes(),
            pos: 0,
            scan: CssScan::default(),
        }
    }

    fn location(&self, offset: usize) -> Location {
        let before = &self.bytes[..offset.min(self.bytes.len())];
        let line = before.iter().filter(|b| **b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        let column = self
            .css
            .get(line_start..offset)
            .map_or(offset - line_start, |s| s.chars().count())
            + 1;
        Location::new(
            u32::try_from(line).unwrap_or(u32::MAX),
            u32::try_from(column).unwrap_or(u32::MAX),
        )
    }

    fn problem(&mut self, offset: usize, message: &str) {
        let location = self.location(offset);
        self.scan.problems.push(CssProblem {
            message: message.to_string(),
            location,
        });
    }

    fn push(&mut self, offset: usize, url: String, kind: CssUrlKind) {
        let url = url.trim().to_string();
        // Same-document fragments (SVG paint servers, filters) are not
        // resource references.
        if url.is_empty() || url.starts_with('#') {
            return;
        }
        let location = self.location(offset);
        self.scan.references.push(CssReference {
            url,
            kind,
            location,
        });
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// Skip a comment starting at `pos`. Returns false when unterminated.
    fn skip_comment(&mut self) -> bool {
        match self.css[self.pos + 2..].find("*/") {
            Some(end) => {
                self.pos += 2 + end + 2;
                true
            }
            None => {
                self.problem(self.pos, "unterminated comment");
                self.pos = self.bytes.len();
                false
            }
        }
    }

    /// Read a quoted string starting at `pos`; returns its unquoted content.
    fn read_string(&mut self) -> Option<String> {
        let start = self.pos;
        let quote = self.bytes[start];
        let mut cursor = start + 1;
        while cursor < self.bytes.len() {
            let b = self.bytes[cursor];
            if b == quote {
                let value = self.css[start + 1..cursor].replace('\\', "");
                self.pos = cursor + 1;
                return Some(value);
            }
            if b == b'\\' {
                cursor += 2;
                continue;
            }
            if b == b'\n' {
                break;
            }
            cursor += 1;
        }
        self.problem(start, "unterminated string");
        self.pos = cursor.min(self.bytes.len());
        None
    }

    /// Read the argument of `url(`, with `pos` just after the parenthesis.
    fn read_url(&mut self) -> Option<String> {
        self.skip_whitespace();
        let value = if matches!(self.bytes.get(self.pos), Some(b'"' | b'\'')) {
            let value = self.read_string()?;
            self.skip_whitespace();
            value
        } else {
            let start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b')' {
                self.pos += 1;
            }
            self.css[start..self.pos].trim().to_string()
        };
        if self.bytes.get(self.pos) == Some(&b')') {
            self.pos += 1;
            Some(value)
        } else {
            self.problem(self.pos, "unterminated url()");
            None
        }
    }

    fn at_url(&self) -> bool {
        let rest = &self.bytes[self.pos..];
        rest.len() >= 4
            && rest[..4].eq_ignore_ascii_case(b"url(")
            && (self.pos == 0 || !is_ident_byte(self.bytes[self.pos - 1]))
    }

    fn at_keyword(&mut self) -> String {
        let start = self.pos + 1;
        let mut end = start;
        while end < self.bytes.len() && is_ident_byte(self.bytes[end]) {
            end += 1;
        }
        self.pos = end;
        self.css[start..end].to_ascii_lowercase()
    }

    fn import(&mut self, offset: usize) {
        self.skip_whitespace();
        if self.at_url() {
            self.pos += 4;
            if let Some(url) = self.read_url() {
                self.push(offset, url, CssUrlKind::Import);
            }
        } else if matches!(self.bytes.get(self.pos), Some(b'"' | b'\'')) {
            if let Some(url) = self.read_string() {
                self.push(offset, url, CssUrlKind::Import);
            }
        } else {
            self.problem(offset, "@import without a URL");
        }
    }

    fn run(mut self, declarations_only: bool) -> CssScan {
        let mut depth = 0usize;
        let mut font_face_depth: Option<usize> = None;
        let mut pending_font_face = false;

        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    if !self.skip_comment() {
                        break;
                    }
                }
                b'"' | b'\'' => {
                    self.read_string();
                }
                b'{' => {
                    depth += 1;
                    if pending_font_face {
                        font_face_depth = Some(depth);
                        pending_font_face = false;
                    }
                    self.pos += 1;
                }
                b'}' => {
                    if depth == 0 {
                        self.problem(self.pos, "unexpected '}'");
                    } else {
                        if font_face_depth == Some(depth) {
                            font_face_depth = None;
                        }
                        depth -= 1;
                    }
                    self.pos += 1;
                }
                b'@' if !declarations_only => {
                    let offset = self.pos;
                    match self.at_keyword().as_str() {
                        "import" if depth == 0 => self.import(offset),
                        "charset" if offset == 0 => {
                            self.skip_whitespace();
                            if matches!(self.bytes.get(self.pos), Some(b'"' | b'\'')) {
                                self.scan.charset = self.read_string();
                            }
                        }
                        "font-face" => pending_font_face = true,
                        _ => {}
                    }
                }
                _ if self.at_url() => {
                    let offset = self.pos;
                    self.pos += 4;
                    if let Some(url) = self.read_url() {
                        let kind = if font_face_depth.is_some() {
                            CssUrlKind::FontFace
                        } else {
                            CssUrlKind::Url
                        };
                        self.push(offset, url, kind);
                    }
                }
                _ => self.pos += 1,
            }
        }
        if depth > 0 {
            self.problem(self.bytes.len(), "unclosed block at end of stylesheet");
        }
        self.scan
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Scan a full stylesheet (a `.css` file or a `style` element).
pub fn scan_stylesheet(css: &str) -> CssScan {
    Scanner::new(css).run(false)
}

/// Scan an inline `style` attribute value.
pub fn scan_declarations(style_attr: &str) -> CssScan {
    Scanner::new(style_attr).run(true)
}
