//! Core data types for the interval store
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `TimeRange`: a half-open time interval with an open-end sentinel
//! - `Interval`: a tagged, optionally annotated time range
//! - The canonical line codec used by the data files
//!
//! # Line format
//!
//! One interval per line:
//!
//! ```text
//! inc 20160603T010000Z - 20160603T020000Z # tagA "tag B" # "annotation"
//! ```
//!
//! - `inc START` alone denotes an open (still running) interval.
//! - Timestamps are compact UTC, `%Y%m%dT%H%M%SZ`.
//! - Tags follow the first `#`. A tag is quoted iff it contains whitespace,
//!   a double quote, or a hash; embedded quotes are backslash-escaped.
//! - An optional annotation follows a second `#`, always quoted. When an
//!   annotation is present without tags the tag section is left empty.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Timestamp format used by the line codec
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// A serialized interval line failed to parse
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot parse interval line: {0}")]
pub struct ParseError(pub String);

/// A half-open time interval `[start, end)`
///
/// `end` equal to the Unix epoch is the sentinel for "open ended"; it is
/// how still-running intervals are stored on disk. Use [`TimeRange::is_open`]
/// rather than comparing against the sentinel directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start instant (inclusive)
    pub start: DateTime<Utc>,
    /// End instant (exclusive); epoch 0 means open ended
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a closed range
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Create an open-ended range
    pub fn open(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: DateTime::UNIX_EPOCH,
        }
    }

    /// True when the range has no end yet
    pub fn is_open(&self) -> bool {
        self.end == DateTime::UNIX_EPOCH
    }

    /// True iff this range's start lies within `other`
    pub fn starts_within(&self, other: &TimeRange) -> bool {
        self.start >= other.start && (other.is_open() || self.start < other.end)
    }

    /// True iff an instant lies within this range
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && (self.is_open() || instant < self.end)
    }

    /// Standard half-open overlap; an open end is treated as unbounded
    pub fn intersects(&self, other: &TimeRange) -> bool {
        (other.is_open() || self.start < other.end)
            && (self.is_open() || other.start < self.end)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "[{} - ...)", self.start.format(DATE_FORMAT))
        } else {
            write!(
                f,
                "[{} - {})",
                self.start.format(DATE_FORMAT),
                self.end.format(DATE_FORMAT)
            )
        }
    }
}

/// A tracked interval: a time range, a set of tags, an optional annotation
///
/// Tag equality is byte-exact and case-sensitive. The `BTreeSet` keeps the
/// serialized tag order stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// The time range covered by the interval
    pub range: TimeRange,
    /// Tags attached to the interval
    pub tags: BTreeSet<String>,
    /// Free-form annotation; empty means none
    pub annotation: String,
}

impl Interval {
    /// Create a closed interval
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            range: TimeRange::new(start, end),
            tags: BTreeSet::new(),
            annotation: String::new(),
        }
    }

    /// Create an open (still running) interval
    pub fn open(start: DateTime<Utc>) -> Self {
        Self {
            range: TimeRange::open(start),
            tags: BTreeSet::new(),
            annotation: String::new(),
        }
    }

    /// Builder method: add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder method: set the annotation
    pub fn annotate(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    /// Start instant
    pub fn start(&self) -> DateTime<Utc> {
        self.range.start
    }

    /// End instant; epoch 0 when open
    pub fn end(&self) -> DateTime<Utc> {
        self.range.end
    }

    /// True when the interval has not been closed yet
    pub fn is_open(&self) -> bool {
        self.range.is_open()
    }

    /// Render the canonical single-line form
    pub fn to_line(&self) -> String {
        let mut out = format!("inc {}", self.start().format(DATE_FORMAT));

        if !self.is_open() {
            out.push_str(&format!(" - {}", self.end().format(DATE_FORMAT)));
        }

        if !self.tags.is_empty() || !self.annotation.is_empty() {
            out.push_str(" #");
            for tag in &self.tags {
                out.push(' ');
                out.push_str(&quote_if_needed(tag));
            }
        }

        if !self.annotation.is_empty() {
            out.push_str(&format!(" # \"{}\"", escape(&self.annotation)));
        }

        out
    }

    /// Parse the canonical single-line form
    pub fn from_line(line: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(line)?;
        let mut cursor = tokens.iter().peekable();

        match cursor.next() {
            Some(Token::Word(w)) if w == "inc" => {}
            _ => return Err(ParseError(format!("line does not begin with 'inc': {line}"))),
        }

        let start = match cursor.next() {
            Some(Token::Word(w)) => parse_date(w)?,
            _ => return Err(ParseError(format!("missing start date: {line}"))),
        };

        let range = if matches!(cursor.peek(), Some(Token::Word(w)) if w == "-") {
            cursor.next();
            let end = match cursor.next() {
                Some(Token::Word(w)) => parse_date(w)?,
                _ => return Err(ParseError(format!("missing end date after '-': {line}"))),
            };
            TimeRange::new(start, end)
        } else {
            TimeRange::open(start)
        };

        // First hash opens the tag section, second one the annotation.
        let mut tags = BTreeSet::new();
        let mut annotation_parts: Vec<String> = Vec::new();
        let mut section = 0u8;

        for token in cursor {
            match token {
                Token::Hash => {
                    section += 1;
                    if section > 2 {
                        return Err(ParseError(format!("too many '#' sections: {line}")));
                    }
                }
                Token::Word(w) | Token::Quoted(w) => match section {
                    1 => {
                        tags.insert(w.clone());
                    }
                    2 => annotation_parts.push(w.clone()),
                    _ => {
                        return Err(ParseError(format!(
                            "unexpected trailing token '{w}': {line}"
                        )))
                    }
                },
            }
        }

        Ok(Self {
            range,
            tags,
            annotation: annotation_parts.join(" "),
        })
    }

    /// Ordering key for sorted data-file lines: start, then end with an
    /// open end after every closed end sharing the same start
    fn sort_key(&self) -> (DateTime<Utc>, bool, DateTime<Utc>) {
        (self.start(), self.is_open(), self.end())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Compare two serialized lines by parsed start, end (open last), then raw
/// bytes. A line that fails to parse compares by raw bytes.
pub fn compare_lines(a: &str, b: &str) -> Ordering {
    match (Interval::from_line(a), Interval::from_line(b)) {
        (Ok(ia), Ok(ib)) => ia.sort_key().cmp(&ib.sort_key()).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

fn parse_date(text: &str) -> Result<DateTime<Utc>, ParseError> {
    chrono::NaiveDateTime::parse_from_str(text, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ParseError(format!("bad timestamp '{text}': {e}")))
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quote_if_needed(tag: &str) -> String {
    let needs_quotes =
        tag.is_empty() || tag.contains(char::is_whitespace) || tag.contains(['"', '#']);
    if needs_quotes {
        format!("\"{}\"", escape(tag))
    } else {
        tag.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// A bare word delimited by whitespace
    Word(String),
    /// A quoted string with escapes resolved
    Quoted(String),
    /// A section separator
    Hash,
}

fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '#' {
            chars.next();
            tokens.push(Token::Hash);
        } else if c == '"' {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => {
                            return Err(ParseError(format!("dangling escape: {line}")));
                        }
                    },
                    Some('"') => break,
                    Some(other) => value.push(other),
                    None => {
                        return Err(ParseError(format!("unterminated quote: {line}")));
                    }
                }
            }
            tokens.push(Token::Quoted(value));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '#' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }

    Ok(tokens)
}
