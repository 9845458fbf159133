//! Chunk-based containers: RIFF AVI, RIFF/RF64 WAVE and IFF AIFF/AIFF-C.
//!
//! RIFF stores chunk sizes little-endian, IFF big-endian; both pad chunks to
//! an even length. `LIST` chunks are entered only for the header lists that
//! carry metadata (`hdrl`, `strl`, `INFO`); `movi` and `idx1` are skipped.

use super::bytes::{clean_text, fourcc_str, le_u16, le_u32, FieldReader};
use super::{id3, Frame, ParseSession};
use crate::container::ContainerKind;
use crate::error::{ParseError, Result};

const FORM_HEADER_LEN: u64 = 12;
const CHUNK_HEADER_LEN: u64 = 8;

/// WAVE_FORMAT_EXTENSIBLE
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    Hdrl,
    Strl,
    Info,
}

#[derive(Debug, Default)]
struct Stream {
    kind: Option<[u8; 4]>,
    handler: Option<[u8; 4]>,
    scale: u32,
    rate: u32,
    length: u32,
    compression: Option<[u8; 4]>,
    width: Option<u32>,
    height: Option<u32>,
    format_tag: Option<u16>,
    channels: Option<u16>,
    sample_rate: Option<u32>,
    bits: Option<u16>,
}

#[derive(Debug, Default)]
struct State {
    stream: Option<Stream>,
    streams: i64,
    first_video: Option<String>,
    first_audio: Option<String>,
    ds64_data_size: Option<u64>,
}

/// Walk a RIFF or IFF file.
pub fn parse(session: &mut ParseSession<'_>, kind: ContainerKind) -> Result<()> {
    let Some(header) = session.read_exact(0, FORM_HEADER_LEN as usize)? else {
        return Err(ParseError::new(0, "truncated form header").into());
    };
    let big_endian = &header[0..4] == b"FORM";
    let declared = chunk_size(&header[4..8], big_endian);
    let file_len = session.file_len();

    // Streaming writers leave the size at 0 or all ones.
    let end = if declared < 4 || declared == u64::from(u32::MAX) {
        file_len
    } else {
        let end = CHUNK_HEADER_LEN + declared;
        if end > file_len {
            session.issue(0, format!("form declares {end} bytes but the file holds {file_len}"));
        }
        end.min(file_len)
    };

    if kind == ContainerKind::Aiff && &header[8..12] == b"AIFF" {
        session.emit_text("comm:compression", "NONE");
    }

    let max_depth = session.limits().max_depth;
    let mut state = State::default();
    let mut stack = vec![Frame {
        next: FORM_HEADER_LEN,
        end,
        depth: 0,
        scope: Scope::Root,
    }];

    while let Some(frame) = stack.last().copied() {
        if frame.next.saturating_add(CHUNK_HEADER_LEN) > frame.end {
            stack.pop();
            if frame.scope == Scope::Strl {
                if let Some(stream) = state.stream.take() {
                    flush_stream(session, stream, &mut state);
                }
            }
            continue;
        }

        session.checkpoint()?;
        let offset = frame.next;
        let Some(chunk) = session.read_exact(offset, CHUNK_HEADER_LEN as usize)? else {
            session.issue(offset, "truncated chunk header");
            set_next(&mut stack, frame.end);
            continue;
        };
        let id: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let mut size = chunk_size(&chunk[4..8], big_endian);
        if &id == b"data" && size == u64::from(u32::MAX) {
            if let Some(real) = state.ds64_data_size {
                size = real;
            }
        }

        let payload_start = offset + CHUNK_HEADER_LEN;
        let padded = size.saturating_add(size & 1);
        let mut chunk_end = payload_start.saturating_add(padded);
        let list_scope = if &id == b"LIST" {
            list_scope(session, frame.scope, payload_start)?
        } else {
            None
        };

        if payload_start.saturating_add(size) > frame.end {
            if list_scope.is_some() {
                session.issue(offset, "LIST chunk extends past its parent; clamped");
                chunk_end = frame.end;
            } else if &id == b"data" && frame.scope == Scope::Root {
                // Truncated audio payload: report what is actually present.
                let present = frame.end - payload_start;
                session.issue(offset, format!("data chunk declares {size} bytes, {present} present"));
                session.emit_int("data:size", i64::try_from(present).unwrap_or(i64::MAX));
                set_next(&mut stack, frame.end);
                continue;
            } else {
                session.issue(offset, format!("{} chunk extends past its parent; skipped", fourcc_str(&id)));
                set_next(&mut stack, frame.end);
                continue;
            }
        }
        set_next(&mut stack, chunk_end.min(frame.end));

        if let Some(scope) = list_scope {
            let depth = frame.depth + 1;
            if depth > max_depth {
                session.issue(offset, format!("nesting deeper than {max_depth}; LIST skipped"));
                continue;
            }
            if scope == Scope::Strl {
                state.stream = Some(Stream::default());
            }
            stack.push(Frame {
                next: payload_start + 4,
                end: chunk_end.min(frame.end),
                depth,
                scope,
            });
            continue;
        }

        handle_chunk(session, frame.scope, kind, &id, payload_start, size, &mut state)?;
    }

    if state.streams > 0 {
        session.emit_int("strl:count", state.streams);
    }
    if let Some(codec) = state.first_video.take().or(state.first_audio.take()) {
        session.emit_text("strl:primary-codec", codec);
    }
    Ok(())
}

fn chunk_size(bytes: &[u8], big_endian: bool) -> u64 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    u64::from(if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    })
}

fn set_next<S>(stack: &mut [Frame<S>], next: u64) {
    if let Some(top) = stack.last_mut() {
        top.next = next;
    }
}

fn list_scope(session: &mut ParseSession<'_>, parent: Scope, payload_start: u64) -> Result<Option<Scope>> {
    let list_type = session.read(payload_start, 4)?;
    Ok(match (parent, list_type.as_slice()) {
        (Scope::Root, b"hdrl") => Some(Scope::Hdrl),
        (Scope::Root | Scope::Hdrl, b"INFO") => Some(Scope::Info),
        (Scope::Hdrl, b"strl") => Some(Scope::Strl),
        _ => None,
    })
}

fn handle_chunk(
    session: &mut ParseSession<'_>,
    scope: Scope,
    kind: ContainerKind,
    id: &[u8; 4],
    payload_start: u64,
    size: u64,
    state: &mut State,
) -> Result<()> {
    match (scope, kind, id) {
        (Scope::Info, _, _) => {
            let data = session.read(payload_start, size)?;
            let value = clean_text(&data);
            if !value.is_empty() {
                session.emit_text(format!("info:{}", fourcc_str(id)), value);
            }
        }
        (Scope::Hdrl, _, b"avih") => {
            let data = session.read(payload_start, size)?;
            parse_avih(session, &data);
        }
        (Scope::Strl, _, b"strh") => {
            let data = session.read(payload_start, size)?;
            if let Some(stream) = state.stream.as_mut() {
                parse_strh(&data, stream);
            }
        }
        (Scope::Strl, _, b"strf") => {
            let data = session.read(payload_start, size)?;
            if let Some(stream) = state.stream.as_mut() {
                parse_strf(&data, stream);
            }
        }
        (Scope::Root, ContainerKind::Wave, b"fmt ") => {
            let data = session.read(payload_start, size)?;
            parse_fmt(session, &data);
        }
        (Scope::Root, ContainerKind::Wave, b"data") => {
            session.emit_int("data:size", i64::try_from(size).unwrap_or(i64::MAX));
        }
        (Scope::Root, ContainerKind::Wave, b"fact") => {
            let data = session.read(payload_start, 4)?;
            if let Some(samples) = le_u32(&data, 0) {
                session.emit_int("fact:sample-count", samples);
            }
        }
        (Scope::Root, ContainerKind::Wave, b"ds64") => {
            // riff size, data size, sample count
            let data = session.read(payload_start, 24)?;
            let mut r = FieldReader::new(&data);
            if let (Some(_), Some(data_size), Some(samples)) = (r.u64_le(), r.u64_le(), r.u64_le()) {
                state.ds64_data_size = Some(data_size);
                if let Ok(samples) = i64::try_from(samples) {
                    session.emit_int("fact:sample-count", samples);
                }
            }
        }
        (Scope::Root, ContainerKind::Aiff, b"COMM") => {
            let data = session.read(payload_start, size)?;
            parse_comm(session, &data);
        }
        (Scope::Root, ContainerKind::Aiff, b"NAME" | b"AUTH" | b"(c) " | b"ANNO") => {
            let data = session.read(payload_start, size)?;
            let value = clean_text(&data);
            if !value.is_empty() {
                session.emit_text(format!("aiff:{}", fourcc_str(id).trim()), value);
            }
        }
        (Scope::Root, ContainerKind::Wave | ContainerKind::Aiff, b"id3 " | b"ID3 ") => {
            id3::parse_v2(session, payload_start, payload_start.saturating_add(size))?;
        }
        _ => tracing::trace!(chunk = %fourcc_str(id), offset = payload_start, "skipping chunk"),
    }
    Ok(())
}

fn parse_avih(session: &mut ParseSession<'_>, data: &[u8]) {
    let Some(usec_per_frame) = le_u32(data, 0) else { return };
    let total_frames = le_u32(data, 16).unwrap_or(0);

    if usec_per_frame > 0 {
        session.emit_rational("avih:frame-rate", 1_000_000, i64::from(usec_per_frame));
        if total_frames > 0 {
            session.emit_rational(
                "avih:duration",
                i64::from(total_frames) * i64::from(usec_per_frame),
                1_000_000,
            );
        }
    }
    if let Some(streams) = le_u32(data, 24) {
        session.emit_int("avih:streams", streams);
    }
    if let (Some(w), Some(h)) = (le_u32(data, 32), le_u32(data, 36)) {
        if w > 0 && h > 0 {
            session.emit_int("avih:width", w);
            session.emit_int("avih:height", h);
        }
    }
}

fn parse_strh(data: &[u8], stream: &mut Stream) {
    stream.kind = data.get(0..4).and_then(|k| k.try_into().ok());
    stream.handler = data.get(4..8).and_then(|h| h.try_into().ok());
    stream.scale = le_u32(data, 20).unwrap_or(0);
    stream.rate = le_u32(data, 24).unwrap_or(0);
    stream.length = le_u32(data, 32).unwrap_or(0);
}

fn parse_strf(data: &[u8], stream: &mut Stream) {
    match stream.kind.as_ref() {
        // BITMAPINFOHEADER
        Some(b"vids") => {
            let dims = |off| le_u32(data, off).map(|v| (v as i32).unsigned_abs());
            stream.width = dims(4);
            stream.height = dims(8);
            stream.compression = data.get(16..20).and_then(|c| c.try_into().ok());
        }
        // WAVEFORMATEX
        Some(b"auds") => {
            stream.format_tag = le_u16(data, 0);
            stream.channels = le_u16(data, 2);
            stream.sample_rate = le_u32(data, 4);
            stream.bits = le_u16(data, 14);
        }
        _ => {}
    }
}

fn flush_stream(session: &mut ParseSession<'_>, stream: Stream, state: &mut State) {
    state.streams += 1;

    if stream.scale > 0 && stream.rate > 0 && stream.length > 0 {
        session.emit_rational(
            "strl:duration",
            i64::from(stream.length) * i64::from(stream.scale),
            i64::from(stream.rate),
        );
    }

    match stream.kind.as_ref() {
        Some(b"vids") => {
            let codec = match stream.compression {
                Some([0, 0, 0, 0]) => "RGB".to_string(),
                Some(code) => fourcc_str(&code).trim().to_string(),
                None => stream.handler.map(|h| fourcc_str(&h).trim().to_string()).unwrap_or_default(),
            };
            if !codec.is_empty() {
                state.first_video.get_or_insert_with(|| codec.clone());
                session.emit_text("strl:video-codec", codec);
            }
            if stream.scale > 0 && stream.rate > 0 {
                session.emit_rational("strl:frame-rate", i64::from(stream.rate), i64::from(stream.scale));
            }
            if let (Some(w), Some(h)) = (stream.width, stream.height) {
                if w > 0 && h > 0 {
                    session.emit_int("strl:width", w);
                    session.emit_int("strl:height", h);
                }
            }
        }
        Some(b"auds") => {
            if let Some(tag) = stream.format_tag {
                state.first_audio.get_or_insert_with(|| format!("0x{tag:04x}"));
                session.emit_text("strl:audio-codec", format!("0x{tag:04x}"));
            }
            if let Some(channels) = stream.channels.filter(|&c| c > 0) {
                session.emit_int("strl:channels", channels);
            }
            if let Some(rate) = stream.sample_rate.filter(|&r| r > 0) {
                session.emit_int("strl:sample-rate", rate);
            }
            if let Some(bits) = stream.bits.filter(|&b| b > 0) {
                session.emit_int("strl:bits-per-sample", bits);
            }
        }
        _ => {}
    }
}

fn parse_fmt(session: &mut ParseSession<'_>, data: &[u8]) {
    let mut r = FieldReader::new(data);
    let (Some(mut tag), Some(channels), Some(rate), Some(byte_rate), Some(_align), Some(bits)) =
        (r.u16_le(), r.u16_le(), r.u32_le(), r.u32_le(), r.u16_le(), r.u16_le())
    else {
        return;
    };

    if tag == FORMAT_EXTENSIBLE {
        // cbSize, valid bits, channel mask, then the sub-format GUID
        if let Some(sub) = le_u16(data, 24) {
            tag = sub;
        }
    }

    session.emit_text("fmt:format-tag", format!("0x{tag:04x}"));
    session.emit_int("fmt:channels", channels);
    session.emit_int("fmt:sample-rate", rate);
    session.emit_int("fmt:byte-rate", byte_rate);
    if bits > 0 {
        session.emit_int("fmt:bits-per-sample", bits);
    }
}

/// 80-bit IEEE 754 extended precision, as used by the AIFF sample rate.
pub fn extended_to_f64(bytes: &[u8; 10]) -> f64 {
    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from(u16::from_be_bytes([bytes[0] & 0x7F, bytes[1]]));
    let mut mantissa_bytes = [0u8; 8];
    mantissa_bytes.copy_from_slice(&bytes[2..10]);
    let mantissa = u64::from_be_bytes(mantissa_bytes);
    if exponent == 0 && mantissa == 0 {
        return 0.0;
    }
    if exponent == 0x7FFF {
        return f64::NAN;
    }
    sign * (mantissa as f64) * 2f64.powi(exponent - 16383 - 63)
}

fn parse_comm(session: &mut ParseSession<'_>, data: &[u8]) {
    let mut r = FieldReader::new(data);
    let (Some(channels), Some(frames), Some(bits), Some(rate)) = (r.u16_be(), r.u32_be(), r.u16_be(), r.take(10)) else {
        return;
    };
    let mut ext = [0u8; 10];
    ext.copy_from_slice(rate);
    let rate = extended_to_f64(&ext);

    session.emit_int("comm:channels", channels);
    session.emit_int("comm:sample-frames", frames);
    session.emit_int("comm:bits-per-sample", bits);
    if rate.is_finite() && rate >= 1.0 && rate < f64::from(u32::MAX) {
        session.emit_int("comm:sample-rate", rate.round() as i64);
    }

    // AIFF-C compression type
    if let Some(code) = r.fourcc() {
        session.emit_text("comm:compression", fourcc_str(&code).trim().to_string());
    }
}
