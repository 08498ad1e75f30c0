//! JSX scanning
//!
//! Tag names, attribute names and text runs are read straight from the
//! source. Embedded `{expressions}` hand control back to the token-based
//! parser, which is restarted at the brace.

use crate::ast::*;
use crate::error::{Result, ScriptError, Span};
use crate::lexer::Token;
use crate::parser::Parser;

fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$'
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'$' | b'-' | b':' | b'.')
}

fn classify(name: &str) -> JsxName {
    if name.contains('.') {
        return JsxName::Component(name.split('.').map(str::to_string).collect());
    }
    match name.chars().next() {
        Some(first) if first.is_ascii_lowercase() => JsxName::Intrinsic(name.to_string()),
        _ => JsxName::Component(vec![name.to_string()]),
    }
}

impl<'src> Parser<'src> {
    fn byte_at(&self, pos: usize) -> Option<u8> {
        self.source.as_bytes().get(pos).copied()
    }

    fn skip_ws(&self, mut pos: usize) -> usize {
        while matches!(self.byte_at(pos), Some(b) if b.is_ascii_whitespace()) {
            pos += 1;
        }
        pos
    }

    fn jsx_error(&self, pos: usize, message: impl Into<String>) -> ScriptError {
        ScriptError::parser(Span::new(pos, pos + 1), message)
    }

    fn scan_name(&self, pos: usize) -> Result<(String, usize)> {
        match self.byte_at(pos) {
            Some(b) if is_name_start(b) => {}
            Some(b) => {
                return Err(self.jsx_error(pos, format!("Unexpected token '{}'", b as char)))
            }
            None => return Err(self.jsx_error(pos, "Unexpected end of input")),
        }
        let mut end = pos;
        while matches!(self.byte_at(end), Some(b) if is_name_char(b)) {
            end += 1;
        }
        Ok((self.source[pos..end].to_string(), end))
    }

    fn scan_attr_string(&self, pos: usize) -> Result<(String, usize)> {
        let quote = self.source.as_bytes()[pos] as char;
        match self.source[pos + 1..].find(quote) {
            Some(offset) => {
                let end = pos + 1 + offset;
                Ok((decode_entities(&self.source[pos + 1..end]), end + 1))
            }
            None => Err(self.jsx_error(pos, "Unterminated string constant")),
        }
    }

    /// `{ expr }` inside a tag or child list, returning the offset after `}`
    fn parse_embedded(&mut self, brace: usize) -> Result<(Option<Expr>, usize)> {
        self.reset_to(brace);
        self.expect(Token::LBrace)?;
        if self.eat(&Token::RBrace)? {
            return Ok((None, self.last_end));
        }
        let expr = self.parse_expression()?;
        self.expect(Token::RBrace)?;
        Ok((Some(expr), self.last_end))
    }

    /// Parse an element starting at the `<` token
    pub(crate) fn parse_jsx_element(&mut self) -> Result<JsxElement> {
        self.nested(Self::parse_jsx_element_inner)
    }

    fn parse_jsx_element_inner(&mut self) -> Result<JsxElement> {
        let open = self.expect(Token::Lt)?;
        let start = open.span.start;
        let mut pos = self.skip_ws(open.span.end);

        if self.byte_at(pos) == Some(b'>') {
            let children = self.parse_jsx_children(&JsxName::Fragment, start, pos + 1)?;
            return Ok(JsxElement {
                name: JsxName::Fragment,
                attributes: Vec::new(),
                children,
                span: self.span_from(start),
            });
        }

        let (raw_name, after_name) = self.scan_name(pos)?;
        let name = classify(&raw_name);
        pos = after_name;

        let mut attributes = Vec::new();
        loop {
            pos = self.skip_ws(pos);
            match self.byte_at(pos) {
                Some(b'/') => {
                    if self.byte_at(pos + 1) != Some(b'>') {
                        return Err(self.jsx_error(pos + 1, "Unexpected token"));
                    }
                    self.reset_to(pos + 2);
                    return Ok(JsxElement {
                        name,
                        attributes,
                        children: Vec::new(),
                        span: Span::new(start, pos + 2),
                    });
                }
                Some(b'>') => {
                    let children = self.parse_jsx_children(&name, start, pos + 1)?;
                    return Ok(JsxElement {
                        name,
                        attributes,
                        children,
                        span: self.span_from(start),
                    });
                }
                Some(b'{') => {
                    self.reset_to(pos);
                    self.expect(Token::LBrace)?;
                    self.expect(Token::Ellipsis)?;
                    let expr = self.parse_expression()?;
                    self.expect(Token::RBrace)?;
                    attributes.push(JsxAttribute::Spread(expr));
                    pos = self.last_end;
                }
                Some(b) if is_name_start(b) => {
                    let (attr_name, after) = self.scan_name(pos)?;
                    pos = self.skip_ws(after);
                    if self.byte_at(pos) != Some(b'=') {
                        attributes.push(JsxAttribute::Named {
                            name: attr_name,
                            value: None,
                        });
                        continue;
                    }

                    pos = self.skip_ws(pos + 1);
                    let value = match self.byte_at(pos) {
                        Some(b'"') | Some(b'\'') => {
                            let (text, end) = self.scan_attr_string(pos)?;
                            pos = end;
                            JsxAttrValue::Str(text)
                        }
                        Some(b'{') => {
                            let (expr, end) = self.parse_embedded(pos)?;
                            pos = end;
                            match expr {
                                Some(expr) => JsxAttrValue::Expr(expr),
                                None => {
                                    return Err(self.jsx_error(
                                        pos - 1,
                                        "JSX attributes must only be assigned a non-empty expression",
                                    ))
                                }
                            }
                        }
                        Some(b'<') => {
                            self.reset_to(pos);
                            let element = self.parse_jsx_element()?;
                            pos = self.last_end;
                            JsxAttrValue::Element(element)
                        }
                        _ => {
                            return Err(self.jsx_error(
                                pos,
                                "JSX value should be either an expression or a quoted JSX text",
                            ))
                        }
                    };
                    attributes.push(JsxAttribute::Named {
                        name: attr_name,
                        value: Some(value),
                    });
                }
                None => {
                    return Err(ScriptError::parser(
                        Span::new(start, start + 1),
                        "Unterminated JSX contents",
                    ))
                }
                Some(b) => {
                    return Err(self.jsx_error(pos, format!("Unexpected token '{}'", b as char)))
                }
            }
        }
    }

    /// Children from `pos` through the matching closing tag
    fn parse_jsx_children(
        &mut self,
        name: &JsxName,
        start: usize,
        mut pos: usize,
    ) -> Result<Vec<JsxChild>> {
        let mut children = Vec::new();
        loop {
            let Some(offset) = self.source[pos..].find(['<', '{']) else {
                return Err(ScriptError::parser(
                    Span::new(start, start + 1),
                    "Unterminated JSX contents",
                ));
            };
            let text_end = pos + offset;
            if let Some(text) = clean_jsx_text(&self.source[pos..text_end]) {
                children.push(JsxChild::Text(text));
            }
            pos = text_end;

            if self.byte_at(pos) == Some(b'{') {
                let (expr, end) = self.parse_embedded(pos)?;
                if let Some(expr) = expr {
                    children.push(JsxChild::Expr(expr));
                }
                pos = end;
                continue;
            }

            let after_lt = self.skip_ws(pos + 1);
            if self.byte_at(after_lt) == Some(b'/') {
                let name_start = self.skip_ws(after_lt + 1);
                let (closing, name_end) = if self.byte_at(name_start) == Some(b'>') {
                    (String::new(), name_start)
                } else {
                    self.scan_name(name_start)?
                };
                let gt = self.skip_ws(name_end);
                if self.byte_at(gt) != Some(b'>') {
                    return Err(self.jsx_error(gt, "Unexpected token"));
                }
                let expected = name.display();
                if closing != expected {
                    return Err(ScriptError::parser(
                        Span::new(pos, gt + 1),
                        format!("Expected corresponding JSX closing tag for <{}>", expected),
                    ));
                }
                self.reset_to(gt + 1);
                return Ok(children);
            }

            self.reset_to(pos);
            let child = self.parse_jsx_element()?;
            children.push(JsxChild::Element(child));
            pos = self.last_end;
        }
    }
}

/// Collapse JSX text the way React compilers do
///
/// Lines are trimmed at the edges that touch a line break, blank lines are
/// dropped and the remaining lines are joined with single spaces.
fn clean_jsx_text(raw: &str) -> Option<String> {
    let normalized = raw.replace("\r\n", "\n").replace('\t', " ");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.bytes().any(|b| b != b' '))
        .unwrap_or(0);

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut trimmed: &str = line;
        if i != 0 {
            trimmed = trimmed.trim_start_matches(' ');
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(' ');
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(trimmed);
        if i != last_non_empty {
            out.push(' ');
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(decode_entities(&out))
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "mdash" => Some('\u{2014}'),
                "hellip" => Some('\u{2026}'),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_trims_line_edges() {
        assert_eq!(
            clean_jsx_text("\n      Clicked "),
            Some("Clicked ".to_string())
        );
        assert_eq!(clean_jsx_text(" times\n    "), Some(" times".to_string()));
        assert_eq!(
            clean_jsx_text("\n  first line\n  second line\n"),
            Some("first line second line".to_string())
        );
        assert_eq!(clean_jsx_text("\n   \n  "), None);
    }

    #[test]
    fn test_inline_whitespace_kept() {
        assert_eq!(clean_jsx_text(" "), Some(" ".to_string()));
    }

    #[test]
    fn test_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("5 &unknown; 6"), "5 &unknown; 6");
        assert_eq!(decode_entities("fish & chips"), "fish & chips");
    }
}
