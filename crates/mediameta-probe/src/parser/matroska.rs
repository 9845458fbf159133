//! Matroska and WebM (EBML) parsing.
//!
//! Elements are walked iteratively; only the master elements that carry
//! metadata are entered. `Cluster`, `Cues`, `SeekHead` and `Chapters` are
//! skipped by size. An element of unknown size extends to the end of its
//! parent.

use super::bytes::clean_text;
use super::{Frame, ParseSession};
use crate::error::{ParseError, Result};
use crate::record::RawValue;

const EBML_HEADER: u32 = 0x1A45_DFA3;
const DOC_TYPE: u32 = 0x4282;

const SEGMENT: u32 = 0x1853_8067;
const CLUSTER: u32 = 0x1F43_B675;

const INFO: u32 = 0x1549_A966;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const TITLE: u32 = 0x7BA9;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;
const DATE_UTC: u32 = 0x4461;

const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const LANGUAGE: u32 = 0x22_B59C;
const DEFAULT_DURATION: u32 = 0x23_E383;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const AUDIO: u32 = 0xE1;
const SAMPLING_FREQUENCY: u32 = 0xB5;
const CHANNELS: u32 = 0x9F;
const BIT_DEPTH: u32 = 0x6264;

const TAGS: u32 = 0x1254_C367;
const TAG: u32 = 0x7373;
const SIMPLE_TAG: u32 = 0x67C8;
const TAG_NAME: u32 = 0x45A3;
const TAG_STRING: u32 = 0x4487;

const ATTACHMENTS: u32 = 0x1941_A469;
const ATTACHED_FILE: u32 = 0x61A7;
const FILE_MIME_TYPE: u32 = 0x4660;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

/// Default TimecodeScale: one millisecond in nanoseconds.
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    Header,
    Segment,
    Info,
    Tracks,
    TrackEntry,
    Video,
    Audio,
    Tags,
    Tag,
    SimpleTag,
    Attachments,
    AttachedFile,
}

impl Scope {
    fn child(self, id: u32) -> Option<Scope> {
        match (self, id) {
            (Scope::Root, EBML_HEADER) => Some(Scope::Header),
            (Scope::Root, SEGMENT) => Some(Scope::Segment),
            (Scope::Segment, INFO) => Some(Scope::Info),
            (Scope::Segment, TRACKS) => Some(Scope::Tracks),
            (Scope::Segment, TAGS) => Some(Scope::Tags),
            (Scope::Segment, ATTACHMENTS) => Some(Scope::Attachments),
            (Scope::Tracks, TRACK_ENTRY) => Some(Scope::TrackEntry),
            (Scope::TrackEntry, VIDEO) => Some(Scope::Video),
            (Scope::TrackEntry, AUDIO) => Some(Scope::Audio),
            (Scope::Tags, TAG) => Some(Scope::Tag),
            (Scope::Tag | Scope::SimpleTag, SIMPLE_TAG) => Some(Scope::SimpleTag),
            (Scope::Attachments, ATTACHED_FILE) => Some(Scope::AttachedFile),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Track {
    track_type: Option<u64>,
    codec_id: Option<String>,
    language: Option<String>,
    default_duration: Option<u64>,
    width: Option<u64>,
    height: Option<u64>,
    sample_rate: Option<f64>,
    channels: Option<u64>,
    bit_depth: Option<u64>,
}

#[derive(Debug, Default)]
struct SimpleTag {
    name: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    timecode_scale: Option<u64>,
    duration: Option<f64>,
    track: Option<Track>,
    tracks: i64,
    first_video: Option<String>,
    first_audio: Option<String>,
    simple_tags: Vec<SimpleTag>,
}

/// An element header: ID (marker bits kept), payload size and header length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    /// `None` for the reserved unknown-size value.
    pub size: Option<u64>,
    pub header_len: u64,
}

/// Decode an element ID of up to four bytes.
fn read_id(data: &[u8]) -> Option<(u32, usize)> {
    let first = *data.first()?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return None;
    }
    let bytes = data.get(..len)?;
    Some((bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)), len))
}

/// Decode a data size VINT of up to eight bytes.
fn read_size(data: &[u8]) -> Option<(Option<u64>, usize)> {
    let first = *data.first()?;
    if first == 0 {
        return None;
    }
    let len = first.leading_zeros() as usize + 1;
    let bytes = data.get(..len)?;
    let mask = if len == 8 { 0 } else { 0xFFu8 >> len };
    let value = bytes[1..]
        .iter()
        .fold(u64::from(first & mask), |acc, &b| (acc << 8) | u64::from(b));
    let all_ones = (1u64 << (7 * len)) - 1;
    Some(((value != all_ones).then_some(value), len))
}

pub fn parse_element_header(data: &[u8]) -> Option<ElementHeader> {
    let (id, id_len) = read_id(data)?;
    let (size, size_len) = read_size(data.get(id_len..)?)?;
    Some(ElementHeader {
        id,
        size,
        header_len: (id_len + size_len) as u64,
    })
}

fn read_uint(data: &[u8]) -> Option<u64> {
    if data.len() > 8 {
        return None;
    }
    Some(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn read_int(data: &[u8]) -> Option<i64> {
    if data.is_empty() || data.len() > 8 {
        return None;
    }
    let unsigned = read_uint(data)?;
    let shift = 64 - 8 * data.len() as u32;
    // Sign-extend from the element width.
    Some(((unsigned << shift) as i64) >> shift)
}

fn read_float(data: &[u8]) -> Option<f64> {
    match data.len() {
        4 => Some(f64::from(f32::from_be_bytes(data.try_into().ok()?))),
        8 => Some(f64::from_be_bytes(data.try_into().ok()?)),
        _ => None,
    }
}

/// Walk the EBML element tree and emit records.
pub fn parse(session: &mut ParseSession<'_>) -> Result<()> {
    let file_len = session.file_len();
    let max_depth = session.limits().max_depth;
    let mut state = State::default();
    let mut stack = vec![Frame {
        next: 0,
        end: file_len,
        depth: 0,
        scope: Scope::Root,
    }];

    while let Some(frame) = stack.last().copied() {
        if frame.next >= frame.end {
            stack.pop();
            close_scope(session, frame.scope, &mut state);
            continue;
        }

        session.checkpoint()?;
        let offset = frame.next;
        let raw = session.read(offset, 12)?;
        let Some(header) = parse_element_header(&raw) else {
            if offset == 0 {
                return Err(ParseError::new(0, "invalid EBML header").into());
            }
            session.issue(offset, "invalid element header");
            set_next(&mut stack, frame.end);
            continue;
        };
        if offset == 0 && header.id != EBML_HEADER {
            return Err(ParseError::new(0, "file does not start with an EBML header").into());
        }

        let payload_start = offset + header.header_len;
        let child_scope = frame.scope.child(header.id);
        let element_end = match header.size {
            Some(size) => payload_start.saturating_add(size),
            None if child_scope.is_some() => frame.end,
            None => {
                // Unknown-size clusters cannot be skipped without parsing blocks.
                if header.id != CLUSTER {
                    session.issue(offset, format!("element 0x{:X} of unknown size", header.id));
                }
                set_next(&mut stack, frame.end);
                continue;
            }
        };

        let mut element_end = element_end;
        if element_end > frame.end {
            if child_scope.is_none() {
                session.issue(offset, format!("element 0x{:X} extends past its parent; skipped", header.id));
                set_next(&mut stack, frame.end);
                continue;
            }
            session.issue(offset, format!("element 0x{:X} extends past its parent; clamped", header.id));
            element_end = frame.end;
        }
        set_next(&mut stack, element_end);

        if let Some(scope) = child_scope {
            let depth = frame.depth + 1;
            if depth > max_depth {
                session.issue(offset, format!("nesting deeper than {max_depth}; element 0x{:X} skipped", header.id));
                continue;
            }
            open_scope(scope, &mut state);
            stack.push(Frame {
                next: payload_start,
                end: element_end,
                depth,
                scope,
            });
            continue;
        }

        if is_leaf_of_interest(frame.scope, header.id) {
            let data = session.read(payload_start, element_end - payload_start)?;
            handle_leaf(session, frame.scope, header.id, &data, &mut state);
        }
    }

    if state.tracks > 0 {
        session.emit_int("tracks:count", state.tracks);
    }
    if let Some(codec) = state.first_video.take().or(state.first_audio.take()) {
        session.emit_text("tracks:primary-codec", codec);
    }
    Ok(())
}

fn set_next<S>(stack: &mut [Frame<S>], next: u64) {
    if let Some(top) = stack.last_mut() {
        top.next = next;
    }
}

fn open_scope(scope: Scope, state: &mut State) {
    match scope {
        Scope::TrackEntry => state.track = Some(Track::default()),
        Scope::SimpleTag => state.simple_tags.push(SimpleTag::default()),
        _ => {}
    }
}

fn close_scope(session: &mut ParseSession<'_>, scope: Scope, state: &mut State) {
    match scope {
        Scope::Info => {
            let scale = state.timecode_scale.unwrap_or(DEFAULT_TIMECODE_SCALE);
            if let Some(duration) = state.duration.take() {
                let nanos = duration * scale as f64;
                if nanos.is_finite() && nanos >= 0.0 && nanos < i64::MAX as f64 {
                    session.emit_rational("info:duration", nanos.round() as i64, 1_000_000_000);
                }
            }
        }
        Scope::TrackEntry => {
            if let Some(track) = state.track.take() {
                flush_track(session, track, state);
            }
        }
        Scope::SimpleTag => {
            if let Some(SimpleTag {
                name: Some(name),
                value: Some(value),
            }) = state.simple_tags.pop()
            {
                session.emit_text(format!("mkv:tag:{}", name.to_uppercase()), value);
            }
        }
        _ => {}
    }
}

fn is_leaf_of_interest(scope: Scope, id: u32) -> bool {
    match scope {
        Scope::Header => id == DOC_TYPE,
        Scope::Info => matches!(id, TIMECODE_SCALE | DURATION | TITLE | MUXING_APP | WRITING_APP | DATE_UTC),
        Scope::TrackEntry => matches!(id, TRACK_TYPE | CODEC_ID | LANGUAGE | DEFAULT_DURATION),
        Scope::Video => matches!(id, PIXEL_WIDTH | PIXEL_HEIGHT),
        Scope::Audio => matches!(id, SAMPLING_FREQUENCY | CHANNELS | BIT_DEPTH),
        Scope::SimpleTag => matches!(id, TAG_NAME | TAG_STRING),
        Scope::AttachedFile => id == FILE_MIME_TYPE,
        _ => false,
    }
}

fn handle_leaf(session: &mut ParseSession<'_>, scope: Scope, id: u32, data: &[u8], state: &mut State) {
    match (scope, id) {
        (Scope::Header, DOC_TYPE) => {
            let doc_type = clean_text(data);
            let name = match doc_type.as_str() {
                "webm" => "WebM".to_string(),
                "matroska" => "Matroska".to_string(),
                _ => doc_type,
            };
            session.emit_text("ebml:doctype", name);
        }
        (Scope::Info, TIMECODE_SCALE) => state.timecode_scale = read_uint(data).filter(|&s| s > 0),
        (Scope::Info, DURATION) => state.duration = read_float(data),
        (Scope::Info, TITLE) => session.emit_text("info:title", clean_text(data)),
        (Scope::Info, MUXING_APP) => session.emit_text("info:muxing-app", clean_text(data)),
        (Scope::Info, WRITING_APP) => session.emit_text("info:writing-app", clean_text(data)),
        (Scope::Info, DATE_UTC) => {
            if let Some(nanos) = read_int(data) {
                session.emit_int("info:date-utc", nanos);
            }
        }
        (Scope::TrackEntry | Scope::Video | Scope::Audio, _) => {
            if let Some(track) = state.track.as_mut() {
                track_field(track, id, data);
            }
        }
        (Scope::SimpleTag, TAG_NAME) => {
            if let Some(tag) = state.simple_tags.last_mut() {
                tag.name = Some(clean_text(data)).filter(|n| !n.is_empty());
            }
        }
        (Scope::SimpleTag, TAG_STRING) => {
            if let Some(tag) = state.simple_tags.last_mut() {
                tag.value = Some(clean_text(data)).filter(|v| !v.is_empty());
            }
        }
        (Scope::AttachedFile, FILE_MIME_TYPE) => {
            let mime = clean_text(data);
            if mime.starts_with("image/") {
                session.emit("attachment:image", RawValue::Text(mime));
            }
        }
        _ => {}
    }
}

fn track_field(track: &mut Track, id: u32, data: &[u8]) {
    match id {
        TRACK_TYPE => track.track_type = read_uint(data),
        CODEC_ID => track.codec_id = Some(clean_text(data)).filter(|c| !c.is_empty()),
        LANGUAGE => track.language = Some(clean_text(data)).filter(|l| !l.is_empty()),
        DEFAULT_DURATION => track.default_duration = read_uint(data).filter(|&d| d > 0),
        PIXEL_WIDTH => track.width = read_uint(data),
        PIXEL_HEIGHT => track.height = read_uint(data),
        SAMPLING_FREQUENCY => track.sample_rate = read_float(data),
        CHANNELS => track.channels = read_uint(data),
        BIT_DEPTH => track.bit_depth = read_uint(data),
        _ => {}
    }
}

fn flush_track(session: &mut ParseSession<'_>, track: Track, state: &mut State) {
    state.tracks += 1;
    if let Some(language) = track.language {
        session.emit_text("track:language", language);
    }

    match track.track_type {
        Some(TRACK_TYPE_VIDEO) => {
            if let Some(codec) = track.codec_id {
                state.first_video.get_or_insert_with(|| codec.clone());
                session.emit_text("track:video-codec", codec);
            }
            if let (Some(w), Some(h)) = (track.width, track.height) {
                if let (Ok(w), Ok(h)) = (i64::try_from(w), i64::try_from(h)) {
                    session.emit_int("track:width", w);
                    session.emit_int("track:height", h);
                }
            }
            if let Some(frame_ns) = track.default_duration.and_then(|d| i64::try_from(d).ok()) {
                session.emit_rational("track:frame-rate", 1_000_000_000, frame_ns);
            }
        }
        Some(TRACK_TYPE_AUDIO) => {
            if let Some(codec) = track.codec_id {
                state.first_audio.get_or_insert_with(|| codec.clone());
                session.emit_text("track:audio-codec", codec);
            }
            if let Some(channels) = track.channels.and_then(|c| i64::try_from(c).ok()) {
                session.emit_int("track:channels", channels);
            }
            if let Some(rate) = track.sample_rate.filter(|r| r.is_finite() && *r >= 1.0 && *r < 1e9) {
                session.emit_int("track:sample-rate", rate.round() as i64);
            }
            if let Some(bits) = track.bit_depth.and_then(|b| i64::try_from(b).ok()) {
                session.emit_int("track:bits-per-sample", bits);
            }
        }
        _ => {}
    }
}
