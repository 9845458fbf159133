//! Ogg streams carrying Vorbis, Opus, FLAC, Speex or Theora.
//!
//! The header pages are walked until every logical stream that began in the
//! first group has produced its identification and comment packets. The
//! stream duration comes from the granule position of the last page, found
//! by scanning a bounded suffix of the file.

use super::bytes::{le_u16, le_u32, FieldReader};
use super::flac::StreamInfo;
use super::{vorbis, ParseSession};
use crate::error::Result;

const CAPTURE: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const FLAG_BOS: u8 = 0x02;

const MAX_STREAMS: usize = 4;
const MAX_HEADER_PAGES: usize = 512;

const OPUS_GRANULE_RATE: i64 = 48_000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Codec {
    Vorbis { channels: u8, rate: u32, nominal_bitrate: i32 },
    Opus { channels: u8, preskip: u16, input_rate: u32 },
    Flac(StreamInfo),
    Speex { channels: u32, rate: u32, bitrate: i32 },
    Theora { width: u32, height: u32, fps_num: u32, fps_den: u32, shift: u8 },
}

impl Codec {
    /// Recognise a codec from the first packet of a logical stream.
    fn identify(packet: &[u8]) -> Option<Self> {
        if packet.starts_with(b"\x01vorbis") {
            return Some(Codec::Vorbis {
                channels: *packet.get(11)?,
                rate: le_u32(packet, 12)?,
                nominal_bitrate: le_u32(packet, 20)? as i32,
            });
        }
        if packet.starts_with(b"OpusHead") {
            return Some(Codec::Opus {
                channels: *packet.get(9)?,
                preskip: le_u16(packet, 10)?,
                input_rate: le_u32(packet, 12)?,
            });
        }
        if packet.starts_with(b"\x7fFLAC") && packet.get(9..13) == Some(&b"fLaC"[..]) {
            return StreamInfo::parse(packet.get(17..)?).map(Codec::Flac);
        }
        if packet.starts_with(b"Speex   ") {
            return Some(Codec::Speex {
                rate: le_u32(packet, 36)?,
                channels: le_u32(packet, 48)?,
                bitrate: le_u32(packet, 52)? as i32,
            });
        }
        if packet.starts_with(b"\x80theora") {
            let mut r = FieldReader::new(packet.get(14..)?);
            let width = r.u24_be()?;
            let height = r.u24_be()?;
            r.skip(2)?;
            let fps_num = r.u32_be()?;
            let fps_den = r.u32_be()?;
            let b40 = *packet.get(40)?;
            let b41 = *packet.get(41)?;
            return Some(Codec::Theora {
                width,
                height,
                fps_num,
                fps_den,
                shift: ((b40 & 0x03) << 3) | (b41 >> 5),
            });
        }
        None
    }

    fn name(&self) -> &'static str {
        match self {
            Codec::Vorbis { .. } => "Vorbis",
            Codec::Opus { .. } => "Opus",
            Codec::Flac(_) => "FLAC",
            Codec::Speex { .. } => "Speex",
            Codec::Theora { .. } => "Theora",
        }
    }

    fn is_video(&self) -> bool {
        matches!(self, Codec::Theora { .. })
    }

    /// Offset of the Vorbis comment block inside the second header packet.
    fn comment_offset(&self, packet: &[u8]) -> Option<usize> {
        match self {
            Codec::Vorbis { .. } => packet.starts_with(b"\x03vorbis").then_some(7),
            Codec::Opus { .. } => packet.starts_with(b"OpusTags").then_some(8),
            Codec::Flac(_) => (packet.first()? & 0x7F == 4).then_some(4),
            Codec::Speex { .. } => Some(0),
            Codec::Theora { .. } => packet.starts_with(b"\x81theora").then_some(7),
        }
    }

    /// Stream duration from the final granule position, as (num, den) seconds.
    fn duration(&self, granule: i64) -> Option<(i64, i64)> {
        let (num, den) = match *self {
            Codec::Vorbis { rate, .. } => (granule, i64::from(rate)),
            Codec::Opus { preskip, .. } => (granule - i64::from(preskip), OPUS_GRANULE_RATE),
            Codec::Flac(info) => (granule, i64::from(info.sample_rate)),
            Codec::Speex { rate, .. } => (granule, i64::from(rate)),
            Codec::Theora { fps_num, fps_den, shift, .. } => {
                let shift = u32::from(shift).min(62);
                let frames = (granule >> shift) + (granule & ((1i64 << shift) - 1));
                (frames.checked_mul(i64::from(fps_den))?, i64::from(fps_num))
            }
        };
        (num >= 0 && den > 0).then_some((num, den))
    }
}

#[derive(Debug)]
struct LogicalStream {
    serial: u32,
    codec: Option<Codec>,
    packets: Vec<Vec<u8>>,
    partial: Vec<u8>,
}

impl LogicalStream {
    fn packets_needed(&self) -> usize {
        if self.codec.is_some() || self.packets.is_empty() {
            2
        } else {
            1
        }
    }

    fn complete(&self) -> bool {
        self.packets.len() >= self.packets_needed()
    }
}

struct Page {
    flags: u8,
    serial: u32,
    lacing: Vec<u8>,
    body: Vec<u8>,
    len: u64,
}

/// Read the page at `offset`; `None` at end of data or on lost sync.
fn read_page(session: &mut ParseSession<'_>, offset: u64) -> Result<Option<Page>> {
    let Some(header) = session.read_exact(offset, PAGE_HEADER_LEN)? else {
        if offset < session.file_len() {
            session.issue(offset, "truncated Ogg page header");
        }
        return Ok(None);
    };
    if &header[0..4] != CAPTURE || header[4] != 0 {
        session.issue(offset, "lost Ogg page sync");
        return Ok(None);
    }
    let segments = usize::from(header[26]);
    let Some(lacing) = session.read_exact(offset + PAGE_HEADER_LEN as u64, segments)? else {
        session.issue(offset, "truncated Ogg segment table");
        return Ok(None);
    };
    let body_len: usize = lacing.iter().map(|&l| usize::from(l)).sum();
    let body_at = offset + (PAGE_HEADER_LEN + segments) as u64;
    let Some(body) = session.read_exact(body_at, body_len)? else {
        session.issue(offset, "truncated Ogg page body");
        return Ok(None);
    };
    Ok(Some(Page {
        flags: header[5],
        serial: u32::from_le_bytes([header[14], header[15], header[16], header[17]]),
        lacing,
        body,
        len: (PAGE_HEADER_LEN + segments + body_len) as u64,
    }))
}

/// Split a page body into packets, continuing any packet left open by the
/// previous page of the same stream.
fn collect_packets(stream: &mut LogicalStream, page: &Page, max_packet: usize) {
    let mut at = 0;
    for &lace in &page.lacing {
        let end = at + usize::from(lace);
        if stream.partial.len() < max_packet {
            stream.partial.extend_from_slice(&page.body[at..end]);
        }
        at = end;
        if lace < 255 {
            stream.packets.push(std::mem::take(&mut stream.partial));
            if stream.packets.len() == 1 {
                stream.codec = Codec::identify(&stream.packets[0]);
            }
            if stream.complete() {
                return;
            }
        }
    }
}

/// Granule position of the last page of `serial` in the file's tail.
fn last_granule(session: &mut ParseSession<'_>, serial: u32) -> Result<Option<i64>> {
    let file_len = session.file_len();
    let tail_len = session.limits().ogg_tail_bytes as u64;
    let start = file_len.saturating_sub(tail_len);
    let tail = session.read(start, file_len - start)?;

    let mut end = tail.len();
    while let Some(pos) = tail[..end].windows(4).rposition(|w| w == CAPTURE) {
        end = pos;
        let Some(header) = tail.get(pos..pos + PAGE_HEADER_LEN) else {
            continue;
        };
        if header[4] != 0 || le_u32(header, 14) != Some(serial) {
            continue;
        }
        let granule = i64::from_le_bytes([
            header[6], header[7], header[8], header[9], header[10], header[11], header[12], header[13],
        ]);
        if granule >= 0 {
            return Ok(Some(granule));
        }
    }
    Ok(None)
}

fn emit_stream(session: &mut ParseSession<'_>, codec: &Codec) {
    match *codec {
        Codec::Vorbis { channels, rate, nominal_bitrate } => {
            session.emit_int("ogg:channels", channels);
            session.emit_int("ogg:sample-rate", rate);
            if nominal_bitrate > 0 {
                session.emit_int("ogg:bitrate", nominal_bitrate);
            }
        }
        Codec::Opus { channels, input_rate, .. } => {
            session.emit_int("ogg:channels", channels);
            // Opus always decodes at 48 kHz; the input rate is informational
            let rate = if input_rate > 0 { input_rate } else { OPUS_GRANULE_RATE as u32 };
            session.emit_int("ogg:sample-rate", rate);
        }
        Codec::Flac(info) => info.emit(session, "ogg"),
        Codec::Speex { channels, rate, bitrate } => {
            session.emit_int("ogg:channels", channels);
            session.emit_int("ogg:sample-rate", rate);
            if bitrate > 0 {
                session.emit_int("ogg:bitrate", bitrate);
            }
        }
        Codec::Theora { width, height, fps_num, fps_den, .. } => {
            session.emit_int("theora:width", width);
            session.emit_int("theora:height", height);
            if fps_num > 0 && fps_den > 0 {
                session.emit_rational("theora:frame-rate", i64::from(fps_num), i64::from(fps_den));
            }
        }
    }
}

/// Decode the header packets and final granule of an Ogg file.
pub fn parse(session: &mut ParseSession<'_>) -> Result<()> {
    let max_packet = session.limits().max_payload_bytes;
    let mut streams: Vec<LogicalStream> = Vec::new();
    let mut offset = 0u64;
    let mut in_bos_group = true;

    for _ in 0..MAX_HEADER_PAGES {
        session.checkpoint()?;
        let Some(page) = read_page(session, offset)? else {
            break;
        };
        offset += page.len;

        if page.flags & FLAG_BOS != 0 {
            if !in_bos_group {
                // Chained stream: the first link is enough
                break;
            }
            if streams.len() < MAX_STREAMS && !streams.iter().any(|s| s.serial == page.serial) {
                streams.push(LogicalStream {
                    serial: page.serial,
                    codec: None,
                    packets: Vec::new(),
                    partial: Vec::new(),
                });
            }
        } else {
            in_bos_group = false;
        }

        if let Some(stream) = streams.iter_mut().find(|s| s.serial == page.serial) {
            if !stream.complete() {
                collect_packets(stream, &page, max_packet);
            }
        }
        if !in_bos_group && streams.iter().all(LogicalStream::complete) {
            break;
        }
    }

    let identified: Vec<(u32, Codec, Option<Vec<u8>>)> = streams
        .into_iter()
        .filter_map(|s| {
            let codec = s.codec?;
            let comment = s.packets.into_iter().nth(1);
            Some((s.serial, codec, comment))
        })
        .collect();
    if identified.is_empty() {
        session.issue(0, "no recognised Ogg logical stream");
        return Ok(());
    }
    session.emit_int("ogg:stream-count", identified.len() as i64);

    let audio = identified.iter().find(|(_, c, _)| !c.is_video());
    let video = identified.iter().find(|(_, c, _)| c.is_video());
    if let Some((_, codec, _)) = audio {
        session.emit_text("ogg:audio-codec", codec.name());
    }
    if let Some((_, codec, _)) = video {
        session.emit_text("ogg:video-codec", codec.name());
    }

    for (serial, codec, comment) in &identified {
        emit_stream(session, codec);
        match comment {
            Some(packet) => match codec.comment_offset(packet) {
                Some(skip) => {
                    vorbis::parse_comments(session, &packet[skip.min(packet.len())..], 0);
                }
                None => session.issue(0, format!("stream {serial:#x}: unexpected comment packet")),
            },
            None => session.issue(0, format!("stream {serial:#x}: missing comment packet")),
        }
    }

    // Audio granules are sample accurate; Theora only counts frames
    if let Some(&(serial, codec, _)) = audio.or(video) {
        session.checkpoint()?;
        if let Some(granule) = last_granule(session, serial)? {
            if let Some((num, den)) = codec.duration(granule) {
                session.emit_rational("ogg:duration", num, den);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::test_support::{find, int, run, text};
    use crate::parser::vorbis::tests::comment_block;
    use crate::record::RawValue;

    pub(crate) fn page(serial: u32, flags: u8, granule: i64, packets: &[&[u8]]) -> Vec<u8> {
        let mut lacing = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            lacing.extend(std::iter::repeat(255u8).take(packet.len() / 255));
            lacing.push((packet.len() % 255) as u8);
            body.extend_from_slice(packet);
        }
        let mut out = CAPTURE.to_vec();
        out.push(0);
        out.push(flags);
        out.extend_from_slice(&granule.to_le_bytes());
        out.extend_from_slice(&serial.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.push(lacing.len() as u8);
        out.extend(lacing);
        out.extend(body);
        out
    }

    pub(crate) fn vorbis_id(channels: u8, rate: u32, nominal: i32) -> Vec<u8> {
        let mut out = b"\x01vorbis".to_vec();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.push(channels);
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&nominal.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&[0xB8, 0x01]);
        out
    }

    fn with_prefix(prefix: &[u8], fields: &[&str]) -> Vec<u8> {
        let mut out = prefix.to_vec();
        out.extend(comment_block("Lavf", fields));
        out
    }

    pub(crate) fn vorbis_file(granule: i64) -> Vec<u8> {
        let serial = 0x1234;
        let mut file = page(serial, FLAG_BOS, 0, &[&vorbis_id(2, 44_100, 128_000)]);
        let comment = with_prefix(b"\x03vorbis", &["TITLE=Ogg Song", "ARTIST=Someone"]);
        file.extend(page(serial, 0, 0, &[&comment, b"\x05vorbis setup"]));
        file.extend(page(serial, 0x04, granule, &[&[0u8; 300]]));
        file
    }

    fn theora_id(width: u32, height: u32, fps: (u32, u32), shift: u8) -> Vec<u8> {
        let mut out = b"\x80theora\x03\x02\x01".to_vec();
        out.extend_from_slice(&((width / 16) as u16).to_be_bytes());
        out.extend_from_slice(&((height / 16) as u16).to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes()[1..]);
        out.extend_from_slice(&height.to_be_bytes()[1..]);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&fps.0.to_be_bytes());
        out.extend_from_slice(&fps.1.to_be_bytes());
        out.extend_from_slice(&[0, 0, 1, 0, 0, 1, 0, 0, 0, 0]);
        out.push((shift >> 3) & 0x03);
        out.push(shift << 5);
        out
    }

    #[test]
    fn vorbis_stream() {
        let (records, issues, outcome) = run(vorbis_file(441_000), parse);
        assert!(outcome.is_ok());
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(text(&records, "ogg:audio-codec").as_deref(), Some("Vorbis"));
        assert_eq!(int(&records, "ogg:channels"), Some(2));
        assert_eq!(int(&records, "ogg:sample-rate"), Some(44_100));
        assert_eq!(int(&records, "ogg:bitrate"), Some(128_000));
        assert_eq!(text(&records, "vorbis:TITLE").as_deref(), Some("Ogg Song"));
        assert_eq!(
            find(&records, "ogg:duration"),
            Some(&RawValue::Rational { num: 441_000, den: 44_100 })
        );
    }

    #[test]
    fn opus_duration_skips_preskip() {
        let serial = 7;
        let mut head = b"OpusHead\x01\x02".to_vec();
        head.extend_from_slice(&312u16.to_le_bytes());
        head.extend_from_slice(&48_000u32.to_le_bytes());
        head.extend_from_slice(&[0, 0, 0]);
        let mut file = page(serial, FLAG_BOS, 0, &[&head]);
        file.extend(page(serial, 0, 0, &[&with_prefix(b"OpusTags", &["ALBUM=Opus Album"])]));
        file.extend(page(serial, 0x04, 480_312, &[&[0u8; 40]]));

        let (records, issues, _) = run(file, parse);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(text(&records, "ogg:audio-codec").as_deref(), Some("Opus"));
        assert_eq!(text(&records, "vorbis:ALBUM").as_deref(), Some("Opus Album"));
        assert_eq!(
            find(&records, "ogg:duration"),
            Some(&RawValue::Rational { num: 480_000, den: 48_000 })
        );
    }

    #[test]
    fn theora_with_vorbis() {
        let video = 1;
        let audio = 2;
        let mut file = page(video, FLAG_BOS, 0, &[&theora_id(640, 480, (25, 1), 6)]);
        file.extend(page(audio, FLAG_BOS, 0, &[&vorbis_id(2, 48_000, 0)]));
        file.extend(page(video, 0, 0, &[&with_prefix(b"\x81theora", &[])]));
        file.extend(page(audio, 0, 0, &[&with_prefix(b"\x03vorbis", &["TITLE=Clip"])]));
        file.extend(page(audio, 0x04, 96_000, &[&[0u8; 10]]));

        let (records, issues, _) = run(file, parse);
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(int(&records, "ogg:stream-count"), Some(2));
        assert_eq!(text(&records, "ogg:video-codec").as_deref(), Some("Theora"));
        assert_eq!(text(&records, "ogg:audio-codec").as_deref(), Some("Vorbis"));
        assert_eq!(int(&records, "theora:width"), Some(640));
        assert_eq!(int(&records, "theora:height"), Some(480));
        assert_eq!(
            find(&records, "ogg:duration"),
            Some(&RawValue::Rational { num: 96_000, den: 48_000 })
        );
        assert!(find(&records, "ogg:bitrate").is_none());
    }

    #[test]
    fn theora_granule_counts_frames() {
        let codec = Codec::identify(&theora_id(320, 240, (25, 1), 6)).unwrap();
        assert_eq!(codec.duration((100 << 6) | 5), Some((105, 25)));
    }

    #[test]
    fn truncated_header_pages() {
        let mut file = vorbis_file(441_000);
        file.truncate(80);
        let (records, issues, outcome) = run(file, parse);
        assert!(outcome.is_ok());
        assert!(!issues.is_empty());
        assert_eq!(text(&records, "ogg:audio-codec").as_deref(), Some("Vorbis"));
        assert!(find(&records, "vorbis:TITLE").is_none());
    }

    #[test]
    fn unknown_stream_is_issue() {
        let file = page(9, FLAG_BOS, 0, &[b"\x00mystery codec"]);
        let (records, issues, _) = run(file, parse);
        assert!(records.is_empty());
        assert_eq!(issues.len(), 1);
    }
}
