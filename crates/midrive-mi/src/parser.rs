//! MI reply parser
//!
//! Turns one received line into a [`Reply`]. Structured data is parsed
//! strictly: anything that does not fit the grammar is a [`ParseError`]
//! carrying the raw line and the dotted name path where parsing stopped
//! (e.g. `stack.frame[1].addr`).
//!
//! Grammar quirks handled here:
//! - a repeated name inside one tuple collapses into a value list under that name
//! - `bkpt={..},{..}` in a result position is a value list of tuples
//! - `[]` is an empty value list; `[name=value,...]` is a result list

use crate::protocol::{
    AsyncClass, AsyncKind, AsyncRecord, Reply, ResultClass, ResultRecord, StreamChannel,
    StreamRecord,
};
use crate::value::{List, Tuple, Value};
use thiserror::Error;

/// Reply text that does not fit the MI grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unexpected result format at '{path}': {reason} in {raw:?}")]
pub struct ParseError {
    /// The offending line
    pub raw: String,
    /// Dotted name path being parsed, `<root>` at top level
    pub path: String,
    pub reason: String,
    /// The command whose reply this was, when known
    pub command: Option<String>,
}

impl ParseError {
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// Parse one line of debugger output
pub fn parse_line(line: &str) -> Result<Reply, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Reply::Noise(String::new()));
    }
    if line.trim_end() == "(gdb)" {
        return Ok(Reply::Prompt);
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let (token, rest) = match line.as_bytes().get(digits) {
        Some(b'^' | b'*' | b'+' | b'=' | b'~' | b'@' | b'&') if digits > 0 => {
            (line[..digits].parse::<u64>().ok(), &line[digits..])
        }
        _ => (None, line),
    };

    match rest.as_bytes()[0] {
        b'^' => parse_result_record(line, token, &rest[1..]).map(Reply::Result),
        b'*' => parse_async_record(line, token, AsyncKind::Exec, &rest[1..]).map(Reply::Async),
        b'+' => parse_async_record(line, token, AsyncKind::Status, &rest[1..]).map(Reply::Async),
        b'=' => parse_async_record(line, token, AsyncKind::Notify, &rest[1..]).map(Reply::Async),
        b'~' => parse_stream(line, StreamChannel::Console, &rest[1..]),
        b'@' => parse_stream(line, StreamChannel::Target, &rest[1..]),
        b'&' => parse_stream(line, StreamChannel::Log, &rest[1..]),
        b'-' => Ok(Reply::Noise(line.to_string())),
        _ => Ok(Reply::Unrecognized(line.to_string())),
    }
}

/// Parse bare result data (`name=value,...`) into a tuple
pub fn parse_results(text: &str) -> Result<Tuple, ParseError> {
    Cursor::new(text, text).top_level()
}

/// Decode a quoted C string (quotes included); the whole input must be consumed
pub fn unescape_c_string(quoted: &str) -> Result<String, ParseError> {
    let mut cursor = Cursor::new(quoted, quoted);
    let text = cursor.c_string()?;
    if !cursor.at_end() {
        return Err(cursor.error("trailing characters after string"));
    }
    Ok(text)
}

/// Escape text for inclusion inside a quoted MI argument
pub fn escape_c_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn parse_result_record(
    line: &str,
    token: Option<u64>,
    body: &str,
) -> Result<ResultRecord, ParseError> {
    let (class_text, data) = split_class(body);
    let class = ResultClass::parse(class_text).ok_or_else(|| ParseError {
        raw: line.to_string(),
        path: "<root>".to_string(),
        reason: format!("unknown result class '{}'", class_text),
        command: None,
    })?;
    let results = Cursor::new(line, data).top_level()?;
    Ok(ResultRecord {
        token,
        class,
        results,
    })
}

fn parse_async_record(
    line: &str,
    token: Option<u64>,
    kind: AsyncKind,
    body: &str,
) -> Result<AsyncRecord, ParseError> {
    let (class_text, data) = split_class(body);
    if class_text.is_empty() {
        return Err(ParseError {
            raw: line.to_string(),
            path: "<root>".to_string(),
            reason: "missing async class".to_string(),
            command: None,
        });
    }
    let results = Cursor::new(line, data).top_level()?;
    Ok(AsyncRecord {
        token,
        kind,
        class: AsyncClass::parse(class_text),
        results,
    })
}

fn parse_stream(line: &str, channel: StreamChannel, body: &str) -> Result<Reply, ParseError> {
    let mut cursor = Cursor::new(line, body);
    let text = cursor.c_string()?;
    if !cursor.at_end() {
        return Err(cursor.error("trailing characters after stream text"));
    }
    Ok(Reply::Stream(StreamRecord { channel, text }))
}

fn split_class(body: &str) -> (&str, &str) {
    match body.find(',') {
        Some(i) => (&body[..i], &body[i + 1..]),
        None => (body, ""),
    }
}

/// Byte cursor over the structured part of a line.
///
/// Delimiters are all ASCII, so every slice boundary lands on a char boundary.
struct Cursor<'a> {
    raw: &'a str,
    text: &'a str,
    pos: usize,
    path: Vec<String>,
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a str, text: &'a str) -> Self {
        Self {
            raw,
            text,
            pos: 0,
            path: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn lookahead(&self, pattern: &[u8]) -> bool {
        self.text.as_bytes()[self.pos..].starts_with(pattern)
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.error(&format!(
                "expected '{}', found '{}'",
                byte as char, b as char
            ))),
            None => Err(self.error(&format!("expected '{}', found end of input", byte as char))),
        }
    }

    fn error(&self, reason: &str) -> ParseError {
        let mut path = String::new();
        for segment in &self.path {
            if !path.is_empty() && !segment.starts_with('[') {
                path.push('.');
            }
            path.push_str(segment);
        }
        if path.is_empty() {
            path.push_str("<root>");
        }
        ParseError {
            raw: self.raw.to_string(),
            path,
            reason: format!("{} at offset {}", reason, self.pos),
            command: None,
        }
    }

    fn top_level(&mut self) -> Result<Tuple, ParseError> {
        let entries = self.results(None)?;
        if !self.at_end() {
            return Err(self.error("trailing characters"));
        }
        Ok(Tuple::from_entries(entries))
    }

    fn results(&mut self, close: Option<u8>) -> Result<Vec<(String, Value)>, ParseError> {
        let mut entries = Vec::new();
        if self.at_end() || (close.is_some() && self.peek() == close) {
            return Ok(entries);
        }
        loop {
            let (name, values) = self.result()?;
            entries.extend(values.into_iter().map(|value| (name.clone(), value)));
            if self.peek() == Some(b',') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(entries)
    }

    /// One `name=value`; the tuple-list quirk yields several values
    fn result(&mut self) -> Result<(String, Vec<Value>), ParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'=' => break,
                b',' | b'{' | b'}' | b'[' | b']' | b'"' => {
                    return Err(self.error("expected '=' after name"));
                }
                _ => self.pos += 1,
            }
        }
        let name = self.text[start..self.pos].to_string();
        if name.is_empty() {
            return Err(self.error("empty name"));
        }
        self.expect(b'=')?;
        self.path.push(name.clone());
        let values = self.result_values()?;
        self.path.pop();
        Ok((name, values))
    }

    /// The value(s) in `name=` position. `name={..},{..}` is read as
    /// `name={..},name={..}`.
    fn result_values(&mut self) -> Result<Vec<Value>, ParseError> {
        let first = self.value()?;
        let mut items = vec![first];
        if !matches!(items[0], Value::Tuple(_)) {
            return Ok(items);
        }
        while self.lookahead(b",{") {
            self.pos += 1;
            self.path.push(format!("[{}]", items.len()));
            items.push(Value::Tuple(self.tuple()?));
            self.path.pop();
        }
        Ok(items)
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        match self.peek() {
            Some(b'"') => Ok(Value::Const(self.c_string()?)),
            Some(b'{') => Ok(Value::Tuple(self.tuple()?)),
            Some(b'[') => Ok(Value::List(self.list()?)),
            Some(b) => Err(self.error(&format!("expected value, found '{}'", b as char))),
            None => Err(self.error("expected value, found end of input")),
        }
    }

    fn tuple(&mut self) -> Result<Tuple, ParseError> {
        self.expect(b'{')?;
        let entries = self.results(Some(b'}'))?;
        self.expect(b'}')?;
        Ok(Tuple::from_entries(entries))
    }

    fn list(&mut self) -> Result<List, ParseError> {
        self.expect(b'[')?;
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(List::Values(Vec::new()));
        }
        let list = if matches!(self.peek(), Some(b'"' | b'{' | b'[')) {
            let mut items = Vec::new();
            loop {
                self.path.push(format!("[{}]", items.len()));
                items.push(self.value()?);
                self.path.pop();
                if self.peek() == Some(b',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            List::Values(items)
        } else {
            List::Results(self.results(Some(b']'))?)
        };
        self.expect(b']')?;
        Ok(list)
    }

    /// Quoted C string. Escapes decode to raw bytes which are then
    /// reassembled as UTF-8, so octal-escaped multi-byte sequences survive.
    fn c_string(&mut self) -> Result<String, ParseError> {
        self.expect(b'"')?;
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(b'"') => {
                    // lldb-mi doubles quotes inside strings
                    if self.peek() == Some(b'"') {
                        self.pos += 1;
                        out.push(b'"');
                        continue;
                    }
                    break;
                }
                Some(b'\\') => match self.bump() {
                    None => return Err(self.error("unterminated escape")),
                    Some(b'n') => out.push(b'\n'),
                    Some(b'r') => out.push(b'\r'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'a') => out.push(0x07),
                    Some(b'b') => out.push(0x08),
                    Some(b'f') => out.push(0x0c),
                    Some(b'v') => out.push(0x0b),
                    Some(b'e') => out.push(0x1b),
                    Some(b'"') => out.push(b'"'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(d @ b'0'..=b'7') => {
                        let mut code = u32::from(d - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(n @ b'0'..=b'7') => {
                                    code = code * 8 + u32::from(n - b'0');
                                    self.pos += 1;
                                }
                                _ => break,
                            }
                        }
                        let byte = u8::try_from(code)
                            .map_err(|_| self.error("octal escape out of range"))?;
                        out.push(byte);
                    }
                    Some(other) => {
                        out.push(b'\\');
                        out.push(other);
                    }
                },
                Some(b) => out.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
