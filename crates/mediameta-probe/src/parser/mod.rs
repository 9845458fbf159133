//! Format parsers
//!
//! One parser per container family, selected by a flat match over
//! [`ContainerKind`]. Every parser walks its structure iteratively, checks the
//! extraction budget at each element, and pushes [`RawRecord`]s into the
//! shared [`ParseSession`].

pub mod bytes;
pub mod flac;
pub mod id3;
pub mod isobmff;
pub mod matroska;
pub mod mpeg_audio;
pub mod ogg;
pub mod riff;
pub mod vorbis;

use crate::budget::Budget;
use crate::config::Limits;
use crate::container::ContainerKind;
use crate::error::{Error, ParseError, Result};
use crate::reader::FileHandle;
use crate::record::{RawRecord, RawValue};

/// Run the parser for `kind` over the session's handle.
pub fn parse(kind: ContainerKind, session: &mut ParseSession<'_>) -> Result<()> {
    match kind {
        ContainerKind::IsoMedia => isobmff::parse(session),
        ContainerKind::Avi | ContainerKind::Wave | ContainerKind::Aiff => riff::parse(session, kind),
        ContainerKind::Matroska => matroska::parse(session),
        ContainerKind::MpegAudio => mpeg_audio::parse(session),
        ContainerKind::Flac => flac::parse(session),
        ContainerKind::Ogg => ogg::parse(session),
        ContainerKind::Unknown => Ok(()),
    }
}

/// A pending element range on a parser's explicit work stack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame<S> {
    /// Offset of the next child to read.
    pub next: u64,
    /// End of the enclosing element's payload.
    pub end: u64,
    /// Nesting depth of the children.
    pub depth: usize,
    pub scope: S,
}

/// Per-extraction parser state: the byte source, bounds, and the records and
/// localized issues collected so far.
pub struct ParseSession<'a> {
    handle: &'a mut FileHandle,
    limits: &'a Limits,
    budget: &'a Budget,
    records: Vec<RawRecord>,
    issues: Vec<ParseError>,
    records_full: bool,
}

impl<'a> ParseSession<'a> {
    pub fn new(handle: &'a mut FileHandle, limits: &'a Limits, budget: &'a Budget) -> Self {
        Self {
            handle,
            limits,
            budget,
            records: Vec::new(),
            issues: Vec::new(),
            records_full: false,
        }
    }

    pub fn limits(&self) -> &Limits {
        self.limits
    }

    pub fn file_len(&self) -> u64 {
        self.handle.len()
    }

    /// Suspension point: stop if the caller cancelled or the budget ran out.
    pub fn checkpoint(&self) -> Result<()> {
        self.budget.check().map_err(Error::Interrupted)
    }

    /// Read up to `len` bytes at `offset`, bounded by the payload limit.
    pub fn read(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let len = len.min(self.limits.max_payload_bytes as u64) as usize;
        self.handle.read_at(offset, len)
    }

    /// Read exactly `len` bytes, or `None` when the data ends first or the
    /// request exceeds the payload limit.
    pub fn read_exact(&mut self, offset: u64, len: usize) -> Result<Option<Vec<u8>>> {
        if len > self.limits.max_payload_bytes {
            return Ok(None);
        }
        self.handle.read_exact_at(offset, len)
    }

    /// Record a value. Oversized text and byte payloads are truncated; once
    /// the record buffer is full further records are dropped.
    pub fn emit(&mut self, key: impl Into<String>, value: RawValue) {
        if self.records.len() >= self.limits.max_records {
            if !self.records_full {
                self.records_full = true;
                let limit = self.limits.max_records;
                self.issue(self.file_len(), format!("record limit {limit} reached; further metadata dropped"));
            }
            return;
        }

        let value = match value {
            RawValue::Text(text) => RawValue::Text(truncate_chars(text, self.limits.max_text_chars)),
            RawValue::Bytes(mut bytes) => {
                bytes.truncate(self.limits.max_bytes_value);
                RawValue::Bytes(bytes)
            }
            other => other,
        };
        self.records.push(RawRecord::new(key, value));
    }

    pub fn emit_int(&mut self, key: impl Into<String>, value: impl Into<i64>) {
        self.emit(key, RawValue::Integer(value.into()));
    }

    pub fn emit_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.emit(key, RawValue::Text(value.into()));
    }

    pub fn emit_rational(&mut self, key: impl Into<String>, num: i64, den: i64) {
        self.emit(key, RawValue::Rational { num, den });
    }

    /// Note a localized problem. The extraction continues but is reported as
    /// partial.
    pub fn issue(&mut self, position: u64, detail: impl Into<String>) {
        let issue = ParseError::new(position, detail);
        tracing::trace!(position, detail = %issue.detail, "parse issue");
        if self.issues.len() < self.limits.max_issues {
            self.issues.push(issue);
        }
    }

    pub fn into_parts(self) -> (Vec<RawRecord>, Vec<ParseError>) {
        (self.records, self.issues)
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}
