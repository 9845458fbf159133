//! MPEG-1/2/2.5 Layer I/II/III elementary streams.
//!
//! Tags come first: a trailing ID3v1 block bounds the audio payload, leading
//! ID3v2 tags are decoded and skipped. The first frame header that is
//! confirmed by the following one gives the stream parameters; a Xing/Info or
//! VBRI header in that frame gives the exact frame count.

use super::bytes::be_u32;
use super::{id3, ParseSession};
use crate::error::Result;

/// How far past the tags the first frame is searched for.
const SYNC_WINDOW: u64 = 64 * 1024;

/// Leading ID3v2 tags decoded before giving up on more.
const MAX_LEADING_TAGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

/// A decoded four-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: u8,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: u8,
}

const BITRATES_V1: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const BITRATES_V2: [[u32; 15]; 2] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

impl FrameHeader {
    /// Decode a header word. Free-format and reserved values are rejected.
    pub fn parse(word: u32) -> Option<Self> {
        if word & 0xFFE0_0000 != 0xFFE0_0000 {
            return None;
        }
        let version = match (word >> 19) & 0b11 {
            0b00 => MpegVersion::V25,
            0b10 => MpegVersion::V2,
            0b11 => MpegVersion::V1,
            _ => return None,
        };
        let layer = match (word >> 17) & 0b11 {
            0b01 => 3,
            0b10 => 2,
            0b11 => 1,
            _ => return None,
        };
        let bitrate_index = ((word >> 12) & 0xF) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let rate_index = ((word >> 10) & 0b11) as usize;
        if rate_index == 3 {
            return None;
        }

        let bitrate_kbps = match version {
            MpegVersion::V1 => BITRATES_V1[usize::from(layer - 1)][bitrate_index],
            _ => BITRATES_V2[usize::from(layer != 1)][bitrate_index],
        };
        let base_rate = [44_100, 48_000, 32_000][rate_index];
        let sample_rate = match version {
            MpegVersion::V1 => base_rate,
            MpegVersion::V2 => base_rate / 2,
            MpegVersion::V25 => base_rate / 4,
        };

        Some(Self {
            version,
            layer,
            bitrate_kbps,
            sample_rate,
            padding: (word >> 9) & 1 == 1,
            channel_mode: ((word >> 6) & 0b11) as u8,
        })
    }

    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (1, _) => 384,
            (2, _) | (3, MpegVersion::V1) => 1152,
            _ => 576,
        }
    }

    /// Frame length in bytes, header included.
    pub fn frame_len(&self) -> u32 {
        let bitrate = self.bitrate_kbps * 1000;
        let pad = u32::from(self.padding);
        match self.layer {
            1 => (12 * bitrate / self.sample_rate + pad) * 4,
            _ => self.samples_per_frame() / 8 * bitrate / self.sample_rate + pad,
        }
    }

    pub fn channels(&self) -> u8 {
        if self.channel_mode == 3 {
            1
        } else {
            2
        }
    }

    /// Short codec label, e.g. `mp3`.
    pub fn codec(&self) -> &'static str {
        match self.layer {
            1 => "mp1",
            2 => "mp2",
            _ => "mp3",
        }
    }

    /// Offset of a Xing/Info header from the frame start.
    fn xing_offset(&self) -> usize {
        let side_info = match (self.version, self.channels()) {
            (MpegVersion::V1, 1) => 17,
            (MpegVersion::V1, _) => 32,
            (_, 1) => 9,
            _ => 17,
        };
        4 + side_info
    }
}

fn header_at(data: &[u8], offset: usize) -> Option<FrameHeader> {
    be_u32(data, offset).and_then(FrameHeader::parse)
}

/// First offset holding a frame header confirmed by the header after it.
fn find_first_frame(window: &[u8]) -> Option<(usize, FrameHeader)> {
    (0..window.len().saturating_sub(3)).find_map(|i| {
        let header = header_at(window, i)?;
        let next = i + header.frame_len() as usize;
        if next + 4 <= window.len() {
            let following = header_at(window, next)?;
            if following.version != header.version || following.layer != header.layer {
                return None;
            }
        }
        Some((i, header))
    })
}

/// Frame count and byte count from a Xing/Info or VBRI header.
fn vbr_totals(frame: &[u8], header: &FrameHeader) -> (Option<u32>, Option<u32>) {
    let xing = header.xing_offset();
    if let Some(tag) = frame.get(xing..xing + 4) {
        if tag == b"Xing" || tag == b"Info" {
            let flags = be_u32(frame, xing + 4).unwrap_or(0);
            let mut at = xing + 8;
            let frames = if flags & 1 != 0 {
                let v = be_u32(frame, at);
                at += 4;
                v
            } else {
                None
            };
            let bytes = if flags & 2 != 0 { be_u32(frame, at) } else { None };
            return (frames, bytes);
        }
    }
    if frame.get(36..40) == Some(&b"VBRI"[..]) {
        return (be_u32(frame, 50), be_u32(frame, 46));
    }
    (None, None)
}

/// Decode tags and the first frame of an MPEG audio stream.
pub fn parse(session: &mut ParseSession<'_>) -> Result<()> {
    let file_len = session.file_len();
    let audio_end = if id3::parse_v1(session)? {
        file_len - id3::V1_LEN
    } else {
        file_len
    };

    let mut offset = 0u64;
    for _ in 0..MAX_LEADING_TAGS {
        session.checkpoint()?;
        let tag_len = id3::parse_v2(session, offset, audio_end)?;
        if tag_len == 0 {
            break;
        }
        offset = offset.saturating_add(tag_len);
    }

    session.checkpoint()?;
    let window = session.read(offset, SYNC_WINDOW.min(audio_end.saturating_sub(offset)))?;
    let Some((at, header)) = find_first_frame(&window) else {
        if offset < audio_end {
            session.issue(offset, "no MPEG audio frame header found");
        }
        return Ok(());
    };
    let frame_offset = offset + at as u64;
    tracing::trace!(frame_offset, ?header, "first MPEG audio frame");

    session.emit_text("mpeg:codec", header.codec());
    session.emit_int("mpeg:channels", header.channels());
    session.emit_int("mpeg:sample-rate", header.sample_rate);
    session.emit_int("mpeg:bitrate", i64::from(header.bitrate_kbps) * 1000);

    let frame = &window[at..];
    match vbr_totals(frame, &header) {
        (Some(frames), bytes) if frames > 0 => {
            let samples = i64::from(frames) * i64::from(header.samples_per_frame());
            let rate = i64::from(header.sample_rate);
            session.emit_rational("mpeg:duration", samples, rate);
            if let Some(bytes) = bytes.filter(|&b| b > 0) {
                session.emit_rational("mpeg:average-bitrate", i64::from(bytes) * 8 * rate, samples);
            }
        }
        _ => {
            let audio_bytes = audio_end.saturating_sub(frame_offset);
            session.emit_int("mpeg:audio-bytes", i64::try_from(audio_bytes).unwrap_or(i64::MAX));
        }
    }

    Ok(())
}
