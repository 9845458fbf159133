//! ID3 tag decoding (ID3v2.2, v2.3, v2.4 and ID3v1/v1.1).
//!
//! ID3v2 tags appear at the start of MPEG audio and FLAC files and inside
//! `id3 ` chunks of WAVE and AIFF files. Frames become `id3:<FRAME>` records;
//! the trailing ID3v1 block becomes `id3v1:<field>` records.

use super::bytes::{clean_text, latin1, trim_text, utf16};
use super::ParseSession;
use crate::error::Result;
use crate::record::RawValue;

/// ID3v2 header length, and footer length when present.
const HEADER_LEN: u64 = 10;

/// ID3v1 block length.
pub const V1_LEN: u64 = 128;

const FLAG_UNSYNC: u8 = 0x80;
const FLAG_EXTENDED: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

/// Total length of an ID3v2 tag starting at `header[0]`, footer included.
pub fn tag_size(header: &[u8]) -> Option<u64> {
    if header.len() < HEADER_LEN as usize || &header[0..3] != b"ID3" {
        return None;
    }
    let major = header[3];
    if !(2..=4).contains(&major) || header[4] == 0xFF {
        return None;
    }
    let size = syncsafe(&header[6..10])?;
    let footer = if header[5] & FLAG_FOOTER != 0 { HEADER_LEN } else { 0 };
    Some(HEADER_LEN + u64::from(size) + footer)
}

/// Whether a file suffix ends with an ID3v1 block.
pub fn has_v1_trailer(suffix: &[u8]) -> bool {
    suffix.len() >= V1_LEN as usize && suffix[suffix.len() - V1_LEN as usize..].starts_with(b"TAG")
}

/// 28-bit integer stored as four 7-bit bytes.
fn syncsafe(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 4 || bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 7) | u32::from(b)))
}

/// Reverse tag-level unsynchronisation: every `FF 00` becomes `FF`.
fn deunsync(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev_ff = false;
    for &b in data {
        if prev_ff && b == 0 {
            prev_ff = false;
            continue;
        }
        out.push(b);
        prev_ff = b == 0xFF;
    }
    out
}

/// Decode the ID3v2 tag at `offset`, bounded by `limit`.
///
/// Returns the tag length, or 0 when no tag starts at `offset`.
pub fn parse_v2(session: &mut ParseSession<'_>, offset: u64, limit: u64) -> Result<u64> {
    let header = session.read(offset, HEADER_LEN)?;
    let Some(tag_len) = tag_size(&header) else {
        return Ok(0);
    };
    let major = header[3];
    let flags = header[5];

    let available = limit.saturating_sub(offset);
    if tag_len > available {
        session.issue(offset, format!("ID3v2 tag of {tag_len} bytes extends past its container"));
    }
    let body_len = tag_len.min(available).saturating_sub(HEADER_LEN);
    let body_end = (offset + HEADER_LEN + body_len).min(session.file_len());
    // File offset of `body[0]`; moves forward when an oversized frame is skipped
    let mut base = offset + HEADER_LEN;
    let mut body = session.read(base, body_len)?;

    if major == 2 && flags & 0x40 != 0 {
        // v2.2 compression has no defined scheme
        tracing::trace!(offset, "compressed ID3v2.2 tag skipped");
        return Ok(tag_len);
    }
    let unsynchronised = flags & FLAG_UNSYNC != 0 && major < 4;
    if unsynchronised {
        body = deunsync(&body);
    }

    let mut pos = 0usize;
    if major >= 3 && flags & FLAG_EXTENDED != 0 {
        let Some(size_bytes) = body.get(0..4) else {
            return Ok(tag_len);
        };
        pos = if major == 4 {
            syncsafe(size_bytes).map_or(body.len(), |s| s as usize)
        } else {
            u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]) as usize + 4
        };
    }

    let frame_header_len = if major == 2 { 6 } else { 10 };
    loop {
        if pos + frame_header_len > body.len() {
            // The bounded read may stop inside the tag
            let read_end = base + body.len() as u64;
            if unsynchronised || pos == 0 || pos > body.len() || read_end >= body_end {
                break;
            }
            base += pos as u64;
            body = session.read(base, body_end.saturating_sub(base))?;
            pos = 0;
            continue;
        }
        session.checkpoint()?;
        let frame_offset = base + pos as u64;
        let raw_id = &body[pos..pos + if major == 2 { 3 } else { 4 }];
        if raw_id[0] == 0 {
            // Padding
            break;
        }
        if !raw_id.iter().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            session.issue(frame_offset, "invalid ID3v2 frame id");
            break;
        }

        let (size, frame_flags) = match major {
            2 => (
                u32::from_be_bytes([0, body[pos + 3], body[pos + 4], body[pos + 5]]) as usize,
                0u16,
            ),
            3 => (
                u32::from_be_bytes([body[pos + 4], body[pos + 5], body[pos + 6], body[pos + 7]]) as usize,
                u16::from_be_bytes([body[pos + 8], body[pos + 9]]),
            ),
            _ => (
                v24_frame_size(&body, pos),
                u16::from_be_bytes([body[pos + 8], body[pos + 9]]),
            ),
        };

        let data_start = pos + frame_header_len;
        let Some(data_end) = data_start.checked_add(size) else {
            break;
        };
        let id = frame_id(raw_id);
        if data_end > body.len() {
            let frame_end = base + data_end as u64;
            if unsynchronised || frame_end > body_end {
                session.issue(frame_offset, format!("ID3v2 frame {id} extends past the tag"));
                break;
            }
            if pos > 0 && data_end - pos <= session.limits().max_payload_bytes {
                base += pos as u64;
                body = session.read(base, body_end - base)?;
                pos = 0;
                continue;
            }
            // Larger than one bounded read: skip by the declared size and
            // resume with the frames behind it.
            if id == "APIC" {
                // The leading bytes are enough to show artwork is present
                emit_frame(session, &id, &body[data_start..], major);
            } else {
                session.issue(frame_offset, format!("ID3v2 frame {id} of {size} bytes skipped"));
            }
            base = frame_end;
            body = session.read(base, body_end - base)?;
            pos = 0;
            continue;
        }

        let frame = &body[data_start..data_end];
        match frame_payload(frame, frame_flags, major, flags) {
            Some(data) => emit_frame(session, &id, &data, major),
            None => tracing::trace!(frame = %id, "compressed or encrypted ID3v2 frame skipped"),
        }
        pos = data_end;
    }

    Ok(tag_len)
}

/// ID3v2.4 frame sizes are syncsafe, but some writers store plain integers.
fn v24_frame_size(body: &[u8], pos: usize) -> usize {
    let raw = &body[pos + 4..pos + 8];
    let plain = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let Some(safe) = syncsafe(raw).map(|s| s as usize) else {
        return plain;
    };
    let next = pos + 10 + safe;
    let next_ok = next >= body.len()
        || body[next] == 0
        || body
            .get(next..next + 4)
            .is_some_and(|id| id.iter().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    if next_ok || plain == safe {
        safe
    } else {
        plain
    }
}

/// Strip per-frame grouping, data length and unsynchronisation. `None` for
/// compressed or encrypted frames.
fn frame_payload(frame: &[u8], frame_flags: u16, major: u8, tag_flags: u8) -> Option<Vec<u8>> {
    match major {
        3 => {
            if frame_flags & 0x00C0 != 0 {
                return None;
            }
            let skip = if frame_flags & 0x0020 != 0 { 1 } else { 0 };
            frame.get(skip..).map(<[u8]>::to_vec)
        }
        4 => {
            if frame_flags & 0x000C != 0 {
                return None;
            }
            let mut skip = 0;
            if frame_flags & 0x0040 != 0 {
                skip += 1;
            }
            if frame_flags & 0x0001 != 0 {
                skip += 4;
            }
            let data = frame.get(skip..)?;
            if frame_flags & 0x0002 != 0 || tag_flags & FLAG_UNSYNC != 0 {
                Some(deunsync(data))
            } else {
                Some(data.to_vec())
            }
        }
        _ => Some(frame.to_vec()),
    }
}

/// Normalize v2.2 three-character ids to their v2.3 names.
fn frame_id(raw: &[u8]) -> String {
    let id = latin1(raw);
    if raw.len() != 3 {
        return id;
    }
    let mapped = match id.as_str() {
        "TT1" => "TIT1",
        "TT2" => "TIT2",
        "TT3" => "TIT3",
        "TP1" => "TPE1",
        "TP2" => "TPE2",
        "TP3" => "TPE3",
        "TAL" => "TALB",
        "TCM" => "TCOM",
        "TCO" => "TCON",
        "TCR" => "TCOP",
        "TYE" => "TYER",
        "TDA" => "TDAT",
        "TRK" => "TRCK",
        "TPA" => "TPOS",
        "TEN" => "TENC",
        "TSS" => "TSSE",
        "TLA" => "TLAN",
        "TLE" => "TLEN",
        "TCP" => "TCMP",
        "TXX" => "TXXX",
        "COM" => "COMM",
        "PIC" => "APIC",
        _ => return id,
    };
    mapped.to_string()
}

fn emit_frame(session: &mut ParseSession<'_>, id: &str, data: &[u8], major: u8) {
    match id {
        "TXXX" => {
            let Some((&encoding, rest)) = data.split_first() else { return };
            let (desc, value) = split_terminated(rest, encoding);
            let desc = decode(desc, encoding);
            let value = first_value(&decode(value, encoding));
            if !desc.is_empty() && !value.is_empty() {
                session.emit_text(format!("id3:TXXX:{}", desc.to_uppercase()), value);
            }
        }
        "COMM" => {
            let Some((&encoding, rest)) = data.split_first() else { return };
            let Some(rest) = rest.get(3..) else { return };
            let (desc, text) = split_terminated(rest, encoding);
            // iTunes stores normalization and gapless data in comments
            if decode(desc, encoding).starts_with("iTun") {
                return;
            }
            let text = decode(text, encoding);
            if !text.is_empty() {
                session.emit_text("id3:COMM", text);
            }
        }
        "APIC" => {
            if let Some(image) = picture_data(data, major) {
                session.emit("id3:APIC", RawValue::Bytes(image.to_vec()));
            }
        }
        _ if id.starts_with('T') => {
            let Some((&encoding, rest)) = data.split_first() else { return };
            let value = first_value(&decode(rest, encoding));
            if !value.is_empty() {
                session.emit_text(format!("id3:{id}"), value);
            }
        }
        _ => tracing::trace!(frame = %id, "ID3v2 frame ignored"),
    }
}

fn picture_data(data: &[u8], major: u8) -> Option<&[u8]> {
    let (&encoding, rest) = data.split_first()?;
    let rest = if major == 2 {
        // Three-character image format
        rest.get(3..)?
    } else {
        let nul = rest.iter().position(|&b| b == 0)?;
        rest.get(nul + 1..)?
    };
    // Picture type, then description
    let (_, image) = split_terminated(rest.get(1..)?, encoding);
    Some(image)
}

/// Split at the encoding's string terminator.
fn split_terminated(data: &[u8], encoding: u8) -> (&[u8], &[u8]) {
    if matches!(encoding, 1 | 2) {
        let mut i = 0;
        while i + 1 < data.len() {
            if data[i] == 0 && data[i + 1] == 0 {
                return (&data[..i], &data[i + 2..]);
            }
            i += 2;
        }
        (data, &[])
    } else {
        match data.iter().position(|&b| b == 0) {
            Some(nul) => (&data[..nul], &data[nul + 1..]),
            None => (data, &[]),
        }
    }
}

fn decode(data: &[u8], encoding: u8) -> String {
    let text = match encoding {
        0 => latin1(data),
        1 => utf16(data, false),
        2 => utf16(data, true),
        _ => String::from_utf8_lossy(data).into_owned(),
    };
    trim_text(&text)
}

/// ID3v2.4 separates multiple values with NUL; keep the first non-empty one.
fn first_value(text: &str) -> String {
    text.split('\0')
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Decode a trailing ID3v1/v1.1 block. Returns whether one was found.
pub fn parse_v1(session: &mut ParseSession<'_>) -> Result<bool> {
    let len = session.file_len();
    if len < V1_LEN {
        return Ok(false);
    }
    let Some(block) = session.read_exact(len - V1_LEN, V1_LEN as usize)? else {
        return Ok(false);
    };
    if !block.starts_with(b"TAG") {
        return Ok(false);
    }

    let field = |range: std::ops::Range<usize>| clean_text(latin1(&block[range]).as_bytes());
    for (key, range) in [
        ("id3v1:title", 3..33),
        ("id3v1:artist", 33..63),
        ("id3v1:album", 63..93),
        ("id3v1:year", 93..97),
    ] {
        let value = field(range);
        if !value.is_empty() {
            session.emit_text(key, value);
        }
    }

    // v1.1: a zero byte before the last comment byte marks a track number
    let (comment, track) = if block[125] == 0 && block[126] != 0 {
        (field(97..125), Some(block[126]))
    } else {
        (field(97..127), None)
    };
    if !comment.is_empty() {
        session.emit_text("id3v1:comment", comment);
    }
    if let Some(track) = track {
        session.emit_int("id3v1:track", track);
    }
    if block[127] != 0xFF {
        session.emit_int("id3v1:genre", block[127]);
    }
    Ok(true)
}
