//! Cursor over tagged-block text.
//!
//! Only what the envelope needs: start tags with quoted attributes, raw
//! element bodies ending at the first matching close tag, and skipping of
//! anything unrecognized. Bodies are never entity-decoded.

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// First value among `names`, in preference order.
    pub(crate) fn get(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| {
            self.0
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }
}

/// Next item inside a container.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Child<'a> {
    /// A start tag; the cursor sits right after its name.
    Open { name: &'a str, start: usize },
    /// The container's own close tag; the cursor sits after it.
    End,
}

pub(crate) struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self, ch: char) {
        self.pos += ch.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.bump(ch);
        }
    }

    /// `MalformedBatch` positioned at byte offset `at`.
    pub(crate) fn error(&self, at: usize, message: impl Into<String>) -> ProtocolError {
        let before = &self.src[..at.min(self.src.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        ProtocolError::MalformedBatch {
            line,
            column,
            message: message.into(),
        }
    }

    /// Advance past the next `<name` start tag; returns where it began.
    pub(crate) fn find_start_tag(&mut self, name: &str) -> Option<usize> {
        while let Some(offset) = self.rest().find('<') {
            let start = self.pos + offset;
            self.pos = start + 1;
            if let Some(found) = self.read_name() {
                if found.eq_ignore_ascii_case(name) && self.at_name_boundary() {
                    return Some(start);
                }
            }
        }
        self.pos = self.src.len();
        None
    }

    fn at_name_boundary(&self) -> bool {
        matches!(self.peek(), None | Some('>') | Some('/')) || self.peek().is_some_and(char::is_whitespace)
    }

    fn read_name(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let first = rest.chars().next()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    /// Parse attributes up to `>` or `/>`. Returns whether the tag was
    /// self-closing.
    pub(crate) fn attributes(&mut self, tag_start: usize) -> Result<(Attributes, bool), ProtocolError> {
        let mut attrs: Vec<(String, String)> = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(tag_start, "unterminated start tag")),
                Some('>') => {
                    self.bump('>');
                    return Ok((Attributes(attrs), false));
                }
                Some('/') if self.rest().starts_with("/>") => {
                    self.pos += 2;
                    return Ok((Attributes(attrs), true));
                }
                Some(_) => {}
            }

            let attr_start = self.pos;
            let Some(key) = self.read_name() else {
                return Err(self.error(attr_start, "expected an attribute name"));
            };
            self.skip_whitespace();
            if self.peek() != Some('=') {
                return Err(self.error(self.pos, format!("expected `=` after attribute `{key}`")));
            }
            self.bump('=');
            self.skip_whitespace();
            let raw = match self.peek() {
                Some(quote @ ('"' | '\'')) => {
                    self.bump(quote);
                    let Some(len) = self.rest().find(quote) else {
                        return Err(self.error(attr_start, format!("unterminated value for `{key}`")));
                    };
                    let value = &self.rest()[..len];
                    self.pos += len + 1;
                    value
                }
                Some(_) => {
                    let rest = self.rest();
                    let mut len = rest
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(rest.len());
                    if rest[..len].ends_with('/') && rest[len..].starts_with('>') {
                        len -= 1;
                    }
                    self.pos += len;
                    &rest[..len]
                }
                None => return Err(self.error(tag_start, "unterminated start tag")),
            };
            if attrs.iter().any(|(existing, _)| existing == key) {
                return Err(self.error(attr_start, format!("duplicate attribute `{key}`")));
            }
            attrs.push((key.to_string(), decode_entities(raw)));
        }
    }

    /// Raw text up to the first `</name>`; the cursor moves past it.
    pub(crate) fn body(&mut self, name: &str, tag_start: usize) -> Result<&'a str, ProtocolError> {
        let body_start = self.pos;
        let Some((end, after)) = self.find_close_tag(name) else {
            return Err(self.error(tag_start, format!("missing `</{name}>`")));
        };
        self.pos = after;
        Ok(&self.src[body_start..end])
    }

    /// Locate the next `</name>` (whitespace allowed before `>`). Returns the
    /// offsets of its `<` and of the byte after its `>`.
    fn find_close_tag(&self, name: &str) -> Option<(usize, usize)> {
        let mut from = self.pos;
        while let Some(offset) = self.src[from..].find("</") {
            let start = from + offset;
            let after_slash = start + 2;
            let candidate = &self.src[after_slash..];
            let matches_name = candidate
                .get(..name.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(name));
            if matches_name {
                let tail = &candidate[name.len()..];
                let trimmed = tail.trim_start();
                if trimmed.starts_with('>') {
                    let after = after_slash + name.len() + (tail.len() - trimmed.len()) + 1;
                    return Some((start, after));
                }
            }
            from = after_slash;
        }
        None
    }

    /// Next child start tag, or the container's close tag. Text, comments and
    /// stray close tags in between are skipped.
    pub(crate) fn next_child(&mut self, container: &str, container_start: usize) -> Result<Child<'a>, ProtocolError> {
        loop {
            let Some(offset) = self.rest().find('<') else {
                return Err(self.error(container_start, format!("missing `</{container}>`")));
            };
            let start = self.pos + offset;
            self.pos = start + 1;

            if self.peek() == Some('/') {
                self.bump('/');
                let name = self.read_name();
                let closes_container = name.is_some_and(|n| n.eq_ignore_ascii_case(container));
                self.skip_whitespace();
                if self.peek() == Some('>') {
                    self.bump('>');
                    if closes_container {
                        return Ok(Child::End);
                    }
                }
                continue;
            }

            if let Some(name) = self.read_name() {
                return Ok(Child::Open { name, start });
            }
        }
    }

    /// Skip an unrecognized element whose name was just read.
    pub(crate) fn skip_element(&mut self, name: &str) {
        let Some(close) = self.rest().find('>') else {
            self.pos = self.src.len();
            return;
        };
        let self_closing = self.rest()[..close].ends_with('/');
        self.pos += close + 1;
        if self_closing {
            return;
        }
        if let Some((_, after)) = self.find_close_tag(name) {
            self.pos = after;
        }
    }
}

/// Decode the five XML entities plus numeric references. Unknown entities
/// are kept verbatim.
pub(crate) fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
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

/// Inverse of [`decode_entities`] for attribute values.
pub(crate) fn encode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
