//! Tolerant raw-header scanner for mbox records.
//!
//! Reads header lines from a positioned stream, folds continuation lines and
//! stops at the blank line that separates headers from the body. Malformed
//! lines are skipped; only stream I/O failures are reported.

use std::io::{BufRead, Cursor, Seek};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::parser::mbox;

/// Headers whose value is kept; the last occurrence wins.
static RECOGNIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(from|to|cc|bcc|subject|date|references|in-reply-to|reply-to|list-post|list-subscribe|list-unsubscribe|status):\s*(.*?)\s*$",
    )
    .expect("valid regex")
});

/// `Message-Id`, with surrounding angle brackets stripped.
static MESSAGE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(message-id):\s*<?(.*?)>?\s*$").expect("valid regex"));

/// Delivery-path headers that repeat; only the first occurrence counts.
static FIRST_WINS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(delivered-to|x-original-to|envelope-to):\s*(.*?)\s*$")
        .expect("valid regex")
});

/// Any other `Name:` line.
static GENERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^:\s]+:").expect("valid regex"));

static CONTINUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+(.*?)\s*$").expect("valid regex"));

/// Header values of one record, keyed by lower-cased name.
///
/// Insertion order is preserved and each name maps to exactly one value.
/// Multi-valued headers (address lists, references) stay single delimited
/// strings here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaderMap {
    entries: Vec<(String, String)>,
}

impl RawHeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for a header name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Store a value, replacing any earlier one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name.to_ascii_lowercase(), value)),
        }
    }

    /// Store a value only if the name is not already present.
    /// Returns `true` if the value was stored.
    pub fn set_first(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.entries.push((name.to_ascii_lowercase(), value.into()));
        true
    }

    /// Fold a continuation into an existing value, separated by one space.
    pub fn fold(&mut self, name: &str, continuation: &str) {
        if let Some(i) = self.position(name) {
            let value = &mut self.entries[i].1;
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(continuation);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(lowercase_name, value)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// What a single header line means to the scanner.
#[derive(Debug, PartialEq, Eq)]
enum HeaderLine<'a> {
    /// A recognized header whose latest value wins.
    Assign(String, &'a str),
    /// A repeated header where only the first value counts.
    AssignFirst(String, &'a str),
    /// Some other header; continuation text must not attach to anything.
    Unrecognized,
    /// End of the header block.
    Blank,
    Continuation(&'a str),
    /// Nothing we can use.
    Junk,
}

/// Classify a header line (terminator already stripped).
///
/// Specific names are tried before the generic `Name:` shape, and the
/// generic shape before continuation, so unrelated lines never fold. A
/// whitespace-only line ends the block, as it does for record readers.
fn classify(line: &str) -> HeaderLine<'_> {
    if let Some(c) = MESSAGE_ID.captures(line) {
        return HeaderLine::Assign(c[1].to_ascii_lowercase(), capture(&c, 2, line));
    }
    if let Some(c) = RECOGNIZED.captures(line) {
        return HeaderLine::Assign(c[1].to_ascii_lowercase(), capture(&c, 2, line));
    }
    if let Some(c) = FIRST_WINS.captures(line) {
        return HeaderLine::AssignFirst(c[1].to_ascii_lowercase(), capture(&c, 2, line));
    }
    if GENERIC.is_match(line) {
        return HeaderLine::Unrecognized;
    }
    if mbox::is_blank_line(line.as_bytes()) {
        return HeaderLine::Blank;
    }
    if let Some(c) = CONTINUATION.captures(line) {
        return HeaderLine::Continuation(capture(&c, 1, line));
    }
    HeaderLine::Junk
}

fn capture<'a>(caps: &regex::Captures<'_>, group: usize, line: &'a str) -> &'a str {
    caps.get(group)
        .map(|m| &line[m.start()..m.end()])
        .unwrap_or("")
}

/// Read one record's headers from `reader`.
///
/// The stream must be positioned at the start of a record; a leading
/// `From ` separator is skipped. On return the stream sits right after the
/// blank line ending the headers, at the next record's separator, or at end
/// of stream.
pub fn scan_headers<R: BufRead + Seek>(reader: &mut R) -> Result<RawHeaderMap> {
    let mut headers = RawHeaderMap::new();
    let mut current: Option<String> = None;
    let mut raw = Vec::with_capacity(256);
    let mut first = true;

    while mbox::next_record_line(reader, &mut raw, first)? {
        if first {
            first = false;
            if mbox::is_mbox_separator(&raw) {
                continue;
            }
        }

        let decoded = decode_header_bytes(&raw);
        let line = decoded.trim_end_matches(['\r', '\n']);

        match classify(line) {
            HeaderLine::Assign(name, value) => {
                headers.set(&name, value);
                current = Some(name);
            }
            HeaderLine::AssignFirst(name, value) => {
                current = headers.set_first(&name, value).then_some(name);
            }
            HeaderLine::Unrecognized => current = None,
            HeaderLine::Blank => break,
            HeaderLine::Continuation(text) => {
                if let Some(name) = &current {
                    headers.fold(name, text);
                }
            }
            HeaderLine::Junk => {}
        }
    }

    Ok(headers)
}

/// Scan headers from an in-memory header block.
pub fn scan_header_bytes(bytes: &[u8]) -> Result<RawHeaderMap> {
    scan_headers(&mut Cursor::new(bytes))
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}
