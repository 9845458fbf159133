//! ISO base media file format parsing (MP4, M4A, M4V, MOV, 3GP).
//!
//! The box tree is walked iteratively. Only the boxes that carry metadata are
//! entered (`moov`, `trak`, `mdia`, `minf`, `stbl`, `udta`, `meta`, `ilst`);
//! everything else, `mdat` included, is skipped by its size field.

use super::bytes::{be_u16, be_u32, be_u64, clean_text, fourcc_str, utf16, FieldReader};
use super::{Frame, ParseSession};
use crate::error::{ParseError, Result};
use crate::record::RawValue;

/// A parsed box header.
#[derive(Debug, Clone)]
pub struct BoxHeader {
    /// 4-byte box type (e.g. b"moov").
    pub box_type: [u8; 4],
    /// Total size of the box including the header.
    pub size: u64,
    /// Size of the header itself (8 or 16 for extended-size boxes).
    pub header_size: u64,
}

impl BoxHeader {
    /// Size of the box content (size - header_size).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }
}

/// Read a box header at `offset`. A size of 0 extends the box to `limit`.
///
/// Returns `Ok(None)` when fewer header bytes than needed remain.
pub fn read_box_header(
    session: &mut ParseSession<'_>,
    offset: u64,
    limit: u64,
) -> Result<Option<BoxHeader>> {
    let Some(buf) = session.read_exact(offset, 8)? else {
        return Ok(None);
    };
    let size32 = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let box_type = [buf[4], buf[5], buf[6], buf[7]];

    let (size, header_size) = match size32 {
        // Extended 64-bit size
        1 => {
            let Some(ext) = session.read_exact(offset + 8, 8)? else {
                return Ok(None);
            };
            (be_u64(&ext, 0).unwrap_or(0), 16)
        }
        0 => (limit.saturating_sub(offset), 8),
        n => (u64::from(n), 8),
    };

    Ok(Some(BoxHeader {
        box_type,
        size,
        header_size,
    }))
}

/// Iterate the child boxes of an in-memory payload. Stops at the first box
/// whose size does not fit.
fn child_boxes(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        let size = be_u32(data, pos)? as usize;
        let box_type: [u8; 4] = data.get(pos + 4..pos + 8)?.try_into().ok()?;
        let size = if size == 0 { data.len() - pos } else { size };
        if size < 8 {
            return None;
        }
        let body = data.get(pos + 8..pos.checked_add(size)?)?;
        pos += size;
        Some((box_type, body))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    Moov,
    Trak,
    Mdia,
    Minf,
    Stbl,
    Udta,
    Meta,
    Ilst,
    Item([u8; 4]),
}

impl Scope {
    /// The scope entered when `box_type` is a container under `self`.
    fn child(self, box_type: &[u8; 4]) -> Option<Scope> {
        match (self, box_type) {
            (Scope::Root, b"moov") => Some(Scope::Moov),
            (Scope::Root | Scope::Moov | Scope::Udta, b"meta") => Some(Scope::Meta),
            (Scope::Moov, b"trak") => Some(Scope::Trak),
            (Scope::Moov, b"udta") => Some(Scope::Udta),
            (Scope::Trak, b"mdia") => Some(Scope::Mdia),
            (Scope::Mdia, b"minf") => Some(Scope::Minf),
            (Scope::Minf, b"stbl") => Some(Scope::Stbl),
            (Scope::Meta, b"ilst") => Some(Scope::Ilst),
            (Scope::Ilst, item) => Some(Scope::Item(*item)),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Track {
    handler: Option<[u8; 4]>,
    codec: Option<String>,
    tkhd_size: Option<(u32, u32)>,
    entry_size: Option<(u16, u16)>,
    timescale: u32,
    duration: Option<u64>,
    language: Option<String>,
    channels: Option<u16>,
    sample_size: Option<u16>,
    sample_rate: Option<u32>,
    avg_bitrate: Option<u32>,
    samples: u64,
    sample_time: u64,
}

#[derive(Debug, Default)]
struct Movie {
    tracks: i64,
    first_video: Option<String>,
    first_audio: Option<String>,
    track: Option<Track>,
    freeform_name: Option<String>,
}

/// Walk the box tree and emit records.
pub fn parse(session: &mut ParseSession<'_>) -> Result<()> {
    let file_len = session.file_len();
    let max_depth = session.limits().max_depth;
    let mut movie = Movie::default();
    let mut stack = vec![Frame {
        next: 0,
        end: file_len,
        depth: 0,
        scope: Scope::Root,
    }];

    while let Some(frame) = stack.last().copied() {
        // Fewer than 8 bytes left cannot hold another box.
        if frame.next.saturating_add(8) > frame.end {
            stack.pop();
            if frame.scope == Scope::Trak {
                if let Some(track) = movie.track.take() {
                    flush_track(session, track, &mut movie);
                }
            }
            continue;
        }

        session.checkpoint()?;
        let offset = frame.next;
        let Some(header) = read_box_header(session, offset, frame.end)? else {
            session.issue(offset, "truncated box header");
            set_next(&mut stack, frame.end);
            continue;
        };

        if header.size < header.header_size {
            if frame.scope == Scope::Root && offset == 0 {
                return Err(ParseError::new(offset, "box size smaller than header").into());
            }
            session.issue(offset, format!("{} box size {} smaller than header", fourcc_str(&header.box_type), header.size));
            set_next(&mut stack, frame.end);
            continue;
        }

        let child_scope = frame.scope.child(&header.box_type);
        let mut box_end = offset.saturating_add(header.size);
        if box_end > frame.end {
            if child_scope.is_none() {
                session.issue(offset, format!("{} box extends past its parent; skipped", fourcc_str(&header.box_type)));
                set_next(&mut stack, frame.end);
                continue;
            }
            session.issue(offset, format!("{} box extends past its parent; clamped", fourcc_str(&header.box_type)));
            box_end = frame.end;
        }
        set_next(&mut stack, box_end);

        let payload_start = offset + header.header_size;
        match child_scope {
            Some(scope) => {
                let depth = frame.depth + 1;
                if depth > max_depth {
                    session.issue(offset, format!("nesting deeper than {max_depth}; {} skipped", fourcc_str(&header.box_type)));
                    continue;
                }
                let mut next = payload_start;
                match scope {
                    Scope::Trak => movie.track = Some(Track::default()),
                    Scope::Item(_) => movie.freeform_name = None,
                    Scope::Meta => next += meta_header_len(session, payload_start)?,
                    _ => {}
                }
                stack.push(Frame {
                    next,
                    end: box_end,
                    depth,
                    scope,
                });
            }
            None if is_leaf_of_interest(frame.scope, &header.box_type) => {
                let payload = session.read(payload_start, box_end.saturating_sub(payload_start))?;
                handle_leaf(session, frame.scope, &header.box_type, &payload, &mut movie);
            }
            None => {
                tracing::trace!(offset, box_type = %fourcc_str(&header.box_type), "skipping box");
            }
        }
    }

    if movie.tracks > 0 {
        session.emit_int("trak:count", movie.tracks);
    }
    if let Some(codec) = movie.first_video.take().or(movie.first_audio.take()) {
        session.emit_text("trak:primary-codec", codec);
    }
    Ok(())
}

fn set_next<S>(stack: &mut [Frame<S>], next: u64) {
    if let Some(top) = stack.last_mut() {
        top.next = next;
    }
}

/// ISO `meta` is a full box; QuickTime `meta` is a plain container whose
/// first child is `hdlr`.
fn meta_header_len(session: &mut ParseSession<'_>, payload_start: u64) -> Result<u64> {
    let probe = session.read(payload_start, 8)?;
    Ok(if probe.get(4..8) == Some(&b"hdlr"[..]) { 0 } else { 4 })
}

fn is_leaf_of_interest(scope: Scope, box_type: &[u8; 4]) -> bool {
    match scope {
        Scope::Root => box_type == b"ftyp",
        Scope::Moov => box_type == b"mvhd",
        Scope::Trak => box_type == b"tkhd",
        Scope::Mdia => matches!(box_type, b"mdhd" | b"hdlr"),
        Scope::Stbl => matches!(box_type, b"stsd" | b"stts"),
        Scope::Udta => box_type[0] == 0xA9 || box_type == b"cprt",
        Scope::Item(_) => matches!(box_type, b"data" | b"name"),
        _ => false,
    }
}

fn handle_leaf(session: &mut ParseSession<'_>, scope: Scope, box_type: &[u8; 4], payload: &[u8], movie: &mut Movie) {
    match (scope, box_type) {
        (Scope::Root, b"ftyp") => {
            if let Some(brand) = payload.get(0..4) {
                session.emit_text("ftyp:major-brand", fourcc_str(brand).trim().to_string());
            }
        }
        (Scope::Moov, b"mvhd") => parse_mvhd(session, payload),
        (Scope::Trak, b"tkhd") => {
            if let (Some(track), Some(size)) = (movie.track.as_mut(), parse_tkhd(payload)) {
                track.tkhd_size = Some(size);
            }
        }
        (Scope::Mdia, b"mdhd") => {
            if let Some(track) = movie.track.as_mut() {
                parse_mdhd(payload, track);
            }
        }
        (Scope::Mdia, b"hdlr") => {
            if let Some(track) = movie.track.as_mut() {
                track.handler = payload.get(8..12).and_then(|h| h.try_into().ok());
            }
        }
        (Scope::Stbl, b"stsd") => {
            if let Some(track) = movie.track.as_mut() {
                parse_stsd(payload, track);
            }
        }
        (Scope::Stbl, b"stts") => {
            if let Some(track) = movie.track.as_mut() {
                parse_stts(payload, track);
            }
        }
        (Scope::Udta, b"cprt") => {
            // Full box: version/flags, packed language, UTF-8 or UTF-16 text
            if let Some(text) = payload.get(6..) {
                session.emit_text("udta:cprt", decode_string(text));
            }
        }
        (Scope::Udta, code) => {
            // QuickTime text atom: u16 length, u16 language, text
            let len = be_u16(payload, 0).unwrap_or(0) as usize;
            if let Some(text) = payload.get(4..4 + len) {
                session.emit_text(format!("udta:{}", fourcc_str(code)), clean_text(text));
            }
        }
        (Scope::Item(_), b"name") => {
            if let Some(name) = payload.get(4..) {
                movie.freeform_name = Some(clean_text(name));
            }
        }
        (Scope::Item(item), b"data") => parse_ilst_data(session, &item, payload, movie.freeform_name.as_deref()),
        _ => {}
    }
}

fn parse_mvhd(session: &mut ParseSession<'_>, payload: &[u8]) {
    let Some((created, timescale, duration)) = mvhd_fields(payload) else {
        return;
    };

    if created != 0 {
        if let Ok(created) = i64::try_from(created) {
            session.emit_int("mvhd:creation-time", created);
        }
    }
    if timescale > 0 {
        if let Some(duration) = duration.and_then(|d| i64::try_from(d).ok()) {
            session.emit_rational("mvhd:duration", duration, i64::from(timescale));
        }
    }
}

/// `(creation_time, timescale, duration)`; an all-ones duration is unknown.
fn mvhd_fields(payload: &[u8]) -> Option<(u64, u32, Option<u64>)> {
    let mut r = FieldReader::new(payload);
    let version = r.u8()?;
    r.skip(3)?;
    if version == 1 {
        let created = r.u64_be()?;
        r.skip(8)?;
        let timescale = r.u32_be()?;
        let duration = r.u64_be()?;
        Some((created, timescale, Some(duration).filter(|&d| d != u64::MAX)))
    } else {
        let created = u64::from(r.u32_be()?);
        r.skip(4)?;
        let timescale = r.u32_be()?;
        let duration = r.u32_be()?;
        Some((created, timescale, Some(duration).filter(|&d| d != u32::MAX).map(u64::from)))
    }
}

/// Presentation width and height (16.16 fixed point, integer part).
fn parse_tkhd(payload: &[u8]) -> Option<(u32, u32)> {
    let offset = if *payload.first()? == 1 { 88 } else { 76 };
    let width = be_u32(payload, offset)? >> 16;
    let height = be_u32(payload, offset + 4)? >> 16;
    Some((width, height))
}

fn parse_mdhd(payload: &[u8], track: &mut Track) {
    let Some(&version) = payload.first() else { return };
    let (timescale_at, duration, lang_at) = if version == 1 {
        (20, be_u64(payload, 24), 32)
    } else {
        (12, be_u32(payload, 16).filter(|&d| d != u32::MAX).map(u64::from), 20)
    };
    track.timescale = be_u32(payload, timescale_at).unwrap_or(0);
    track.duration = duration;
    track.language = be_u16(payload, lang_at).and_then(unpack_language);
}

/// ISO-639-2/T code packed as three 5-bit letters offset by 0x60.
fn unpack_language(packed: u16) -> Option<String> {
    // Values below 0x400 are Macintosh language codes.
    if packed < 0x400 {
        return None;
    }
    let code: String = [10u16, 5, 0]
        .iter()
        .map(|shift| char::from((((packed >> shift) & 0x1F) as u8).wrapping_add(0x60)))
        .collect();
    code.chars().all(|c| c.is_ascii_lowercase()).then_some(code)
}

fn parse_stsd(payload: &[u8], track: &mut Track) {
    // version/flags, entry count, then the first sample entry
    let Some(entry) = payload.get(8..) else { return };
    let Some(size) = be_u32(entry, 0) else { return };
    let entry = entry.get(..(size as usize).min(entry.len())).unwrap_or(entry);
    let Some(fourcc) = entry.get(4..8) else { return };
    let mut codec = fourcc_str(fourcc).trim().to_string();

    match track.handler.as_ref() {
        Some(b"vide") => {
            if let (Some(w), Some(h)) = (be_u16(entry, 32), be_u16(entry, 34)) {
                track.entry_size = Some((w, h));
            }
            scan_codec_boxes(entry.get(86..).unwrap_or(&[]), track, &mut codec);
        }
        Some(b"soun") => {
            let sound_version = be_u16(entry, 16).unwrap_or(0);
            track.channels = be_u16(entry, 24);
            track.sample_size = be_u16(entry, 26);
            track.sample_rate = be_u32(entry, 32).map(|r| r >> 16);
            let children_at = match sound_version {
                1 => 52,
                2 => {
                    if let Some(bits) = be_u64(entry, 40) {
                        let rate = f64::from_bits(bits);
                        if rate.is_finite() && rate > 0.0 && rate < f64::from(u32::MAX) {
                            track.sample_rate = Some(rate.round() as u32);
                        }
                    }
                    track.channels = be_u32(entry, 48).and_then(|c| u16::try_from(c).ok());
                    72
                }
                _ => 36,
            };
            scan_codec_boxes(entry.get(children_at..).unwrap_or(&[]), track, &mut codec);
        }
        _ => {}
    }

    track.codec = Some(codec).filter(|c| !c.is_empty());
}

/// Pick up bitrate and object type from `esds`/`btrt`, also inside a
/// QuickTime `wave` box.
fn scan_codec_boxes(data: &[u8], track: &mut Track, codec: &mut String) {
    for (box_type, body) in child_boxes(data) {
        match &box_type {
            b"esds" => {
                if let Some((object_type, avg_bitrate)) = parse_esds(body) {
                    if avg_bitrate > 0 {
                        track.avg_bitrate = Some(avg_bitrate);
                    }
                    // MPEG-1/2 audio carried in MP4
                    if codec == "mp4a" && matches!(object_type, 0x69 | 0x6B) {
                        *codec = format!("mp4a.{object_type:02x}");
                    }
                }
            }
            b"btrt" => {
                if let Some(avg) = be_u32(body, 8).filter(|&b| b > 0) {
                    track.avg_bitrate.get_or_insert(avg);
                }
            }
            b"wave" => scan_codec_boxes(body, track, codec),
            _ => {}
        }
    }
}

/// Descriptor length: up to four 7-bit groups.
fn descriptor_len(r: &mut FieldReader<'_>) -> Option<usize> {
    let mut len = 0usize;
    for _ in 0..4 {
        let b = r.u8()?;
        len = (len << 7) | usize::from(b & 0x7F);
        if b & 0x80 == 0 {
            break;
        }
    }
    Some(len)
}

/// Returns `(objectTypeIndication, avgBitrate)` from an ES descriptor.
fn parse_esds(body: &[u8]) -> Option<(u8, u32)> {
    let mut r = FieldReader::new(body);
    r.skip(4)?;
    if r.u8()? != 0x03 {
        return None;
    }
    descriptor_len(&mut r)?;
    r.skip(2)?;
    let flags = r.u8()?;
    if flags & 0x80 != 0 {
        r.skip(2)?;
    }
    if flags & 0x40 != 0 {
        let url_len = r.u8()?;
        r.skip(usize::from(url_len))?;
    }
    if flags & 0x20 != 0 {
        r.skip(2)?;
    }
    if r.u8()? != 0x04 {
        return None;
    }
    descriptor_len(&mut r)?;
    let object_type = r.u8()?;
    r.skip(1 + 3 + 4)?;
    Some((object_type, r.u32_be()?))
}

fn parse_stts(payload: &[u8], track: &mut Track) {
    let mut r = FieldReader::new(payload);
    let Some(count) = r.skip(4).and_then(|_| r.u32_be()) else { return };
    for _ in 0..count {
        let (Some(samples), Some(delta)) = (r.u32_be(), r.u32_be()) else {
            break;
        };
        track.samples = track.samples.saturating_add(u64::from(samples));
        track.sample_time = track
            .sample_time
            .saturating_add(u64::from(samples) * u64::from(delta));
    }
}

fn flush_track(session: &mut ParseSession<'_>, track: Track, movie: &mut Movie) {
    movie.tracks += 1;
    let is_video = track.handler.as_ref() == Some(b"vide");
    let is_audio = track.handler.as_ref() == Some(b"soun");
    if !is_video && !is_audio {
        return;
    }

    if track.timescale > 0 {
        if let Some(duration) = track.duration.and_then(|d| i64::try_from(d).ok()) {
            session.emit_rational("trak:duration", duration, i64::from(track.timescale));
        }
    }
    if let Some(language) = track.language {
        session.emit_text("trak:language", language);
    }

    if is_video {
        if let Some(codec) = track.codec {
            movie.first_video.get_or_insert_with(|| codec.clone());
            session.emit_text("trak:video-codec", codec);
        }
        let size = match (track.tkhd_size, track.entry_size) {
            (Some((w, h)), _) if w > 0 && h > 0 => Some((w, h)),
            (_, Some((w, h))) if w > 0 && h > 0 => Some((u32::from(w), u32::from(h))),
            _ => None,
        };
        if let Some((w, h)) = size {
            session.emit_int("trak:width", w);
            session.emit_int("trak:height", h);
        }
        let frames = track.samples.checked_mul(u64::from(track.timescale)).and_then(|n| i64::try_from(n).ok());
        if let (Some(frames), Ok(time)) = (frames, i64::try_from(track.sample_time)) {
            if frames > 0 && time > 0 {
                session.emit_rational("trak:frame-rate", frames, time);
            }
        }
    } else {
        if let Some(codec) = track.codec {
            movie.first_audio.get_or_insert_with(|| codec.clone());
            session.emit_text("trak:audio-codec", codec);
        }
        if let Some(channels) = track.channels.filter(|&c| c > 0) {
            session.emit_int("trak:channels", channels);
        }
        if let Some(rate) = track.sample_rate.filter(|&r| r > 0) {
            session.emit_int("trak:sample-rate", rate);
        }
        if let Some(bits) = track.sample_size.filter(|&b| b > 0) {
            session.emit_int("trak:bits-per-sample", bits);
        }
        if let Some(bitrate) = track.avg_bitrate {
            session.emit_int("trak:avg-bitrate", bitrate);
        }
    }
}

/// UTF-16 when a byte-order mark is present, UTF-8 otherwise.
fn decode_string(data: &[u8]) -> String {
    if data.starts_with(&[0xFE, 0xFF]) || data.starts_with(&[0xFF, 0xFE]) {
        clean_text(utf16(data, true).as_bytes())
    } else {
        clean_text(data)
    }
}

fn parse_ilst_data(session: &mut ParseSession<'_>, item: &[u8; 4], payload: &[u8], freeform: Option<&str>) {
    let Some(type_code) = be_u32(payload, 0).map(|t| t & 0x00FF_FFFF) else {
        return;
    };
    let Some(value) = payload.get(8..) else { return };

    let key = match (item, freeform) {
        (b"----", Some(name)) => format!("ilst:----:{name}"),
        (b"----", None) => return,
        _ => format!("ilst:{}", fourcc_str(item)),
    };

    match (item, type_code) {
        (b"trkn" | b"disk", _) => {
            // reserved u16, number u16, total u16
            if let Some(number) = be_u16(value, 2).filter(|&n| n > 0) {
                session.emit_int(key.clone(), number);
            }
            if let Some(total) = be_u16(value, 4).filter(|&n| n > 0) {
                session.emit_int(format!("{key}:total"), total);
            }
        }
        (b"gnre", _) => {
            // One-based ID3v1 genre index
            if let Some(index) = be_u16(value, 0).filter(|&n| n > 0) {
                session.emit_int(key, i64::from(index) - 1);
            }
        }
        (_, 1) => session.emit_text(key, clean_text(value)),
        (_, 2) => session.emit_text(key, clean_text(utf16(value, true).as_bytes())),
        (_, 13 | 14 | 27) => session.emit(key, RawValue::Bytes(value.to_vec())),
        (_, 21) => {
            if let Some(v) = signed_be(value) {
                session.emit_int(key, v);
            }
        }
        (_, 0 | 22) => {
            if let Some(v) = unsigned_be(value) {
                session.emit_int(key, v);
            }
        }
        _ => tracing::trace!(item = %fourcc_str(item), type_code, "unhandled ilst data type"),
    }
}

fn signed_be(value: &[u8]) -> Option<i64> {
    let mut r = FieldReader::new(value);
    match value.len() {
        1 => r.u8().map(|v| i64::from(v as i8)),
        2 => r.u16_be().map(|v| i64::from(v as i16)),
        4 => r.i32_be().map(i64::from),
        8 => r.u64_be().map(|v| v as i64),
        _ => None,
    }
}

fn unsigned_be(value: &[u8]) -> Option<i64> {
    let mut r = FieldReader::new(value);
    match value.len() {
        1 => r.u8().map(i64::from),
        2 => r.u16_be().map(i64::from),
        3 => r.u24_be().map(i64::from),
        4 => r.u32_be().map(i64::from),
        8 => r.u64_be().and_then(|v| i64::try_from(v).ok()),
        _ => None,
    }
}
