//! Vorbis comment blocks, shared by FLAC, Ogg Vorbis, Opus and Speex.

use std::collections::HashSet;

use super::bytes::{clean_text, FieldReader};
use super::ParseSession;
use crate::record::RawValue;

/// Fields whose value is an encoded picture rather than text.
const PICTURE_FIELDS: [&str; 2] = ["METADATA_BLOCK_PICTURE", "COVERART"];

/// Decode a comment block starting at `data[0]` (after any packet header).
///
/// Emits `vorbis:vendor` and one `vorbis:<FIELD>` record per field name,
/// keeping the first value of repeated fields. Returns `false` if the block
/// was cut short; fields decoded before that point are kept.
pub fn parse_comments(session: &mut ParseSession<'_>, data: &[u8], position: u64) -> bool {
    let mut r = FieldReader::new(data);

    let Some(vendor) = r.u32_le().and_then(|len| r.take(len as usize)) else {
        session.issue(position, "truncated Vorbis comment vendor string");
        return false;
    };
    let vendor = clean_text(vendor);
    if !vendor.is_empty() {
        session.emit_text("vorbis:vendor", vendor);
    }

    let Some(count) = r.u32_le() else {
        session.issue(position, "truncated Vorbis comment count");
        return false;
    };
    // Each field takes at least its four-byte length
    if count as usize > r.remaining() / 4 {
        session.issue(position, format!("Vorbis comment count {count} exceeds block size"));
    }

    let mut seen = HashSet::new();
    for _ in 0..count {
        let at = position + r.position() as u64;
        let Some(field) = r.u32_le().and_then(|len| r.take(len as usize)) else {
            session.issue(at, "truncated Vorbis comment field");
            return false;
        };
        let Some(split) = field.iter().position(|&b| b == b'=') else {
            continue;
        };
        let name = String::from_utf8_lossy(&field[..split]).to_ascii_uppercase();
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        let value = &field[split + 1..];
        let key = format!("vorbis:{name}");
        if PICTURE_FIELDS.contains(&name.as_str()) {
            session.emit(key, RawValue::Bytes(value.to_vec()));
        } else {
            session.emit_text(key, clean_text(value));
        }
    }
    true
}
