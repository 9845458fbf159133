//! Native FLAC streams: `fLaC` marker followed by metadata blocks.

use std::io::Cursor;

use bitstream_io::{BigEndian, BitRead, BitReader};

use super::bytes::FieldReader;
use super::{id3, vorbis, ParseSession};
use crate::error::{ParseError, Result};
use crate::record::RawValue;

const MARKER: &[u8; 4] = b"fLaC";

const BLOCK_STREAMINFO: u8 = 0;
const BLOCK_VORBIS_COMMENT: u8 = 4;
const BLOCK_PICTURE: u8 = 6;

/// Decoded STREAMINFO fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// Zero when unknown.
    pub total_samples: u64,
}

impl StreamInfo {
    pub const LEN: usize = 34;

    /// Decode the 34-byte bit-packed STREAMINFO body.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        let mut r = BitReader::endian(Cursor::new(&data[10..18]), BigEndian);
        Self::read_fields(&mut r).ok().filter(|info| info.sample_rate > 0)
    }

    fn read_fields<R: BitRead>(r: &mut R) -> std::io::Result<Self> {
        let sample_rate = r.read::<u32>(20)?;
        let channels = r.read::<u8>(3)? + 1;
        let bits_per_sample = r.read::<u8>(5)? + 1;
        let total_samples = r.read::<u64>(36)?;
        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
        })
    }

    /// Emit the stream fields under `prefix`.
    pub fn emit(&self, session: &mut ParseSession<'_>, prefix: &str) {
        session.emit_int(format!("{prefix}:sample-rate"), self.sample_rate);
        session.emit_int(format!("{prefix}:channels"), self.channels);
        session.emit_int(format!("{prefix}:bits-per-sample"), self.bits_per_sample);
        if self.total_samples > 0 {
            session.emit_int(
                format!("{prefix}:total-samples"),
                i64::try_from(self.total_samples).unwrap_or(i64::MAX),
            );
        }
    }
}

/// Image payload of a PICTURE block, possibly cut short.
fn picture_data(block: &[u8]) -> Option<&[u8]> {
    let mut r = FieldReader::new(block);
    r.skip(4)?;
    let mime_len = r.u32_be()? as usize;
    r.skip(mime_len)?;
    let desc_len = r.u32_be()? as usize;
    r.skip(desc_len)?;
    // width, height, depth, colour count
    r.skip(16)?;
    let data_len = r.u32_be()? as usize;
    let available = r.remaining().min(data_len);
    r.take(available)
}

/// Decode the metadata blocks of a FLAC stream.
pub fn parse(session: &mut ParseSession<'_>) -> Result<()> {
    let file_len = session.file_len();
    let mut offset = id3::parse_v2(session, 0, file_len)?;

    let marker = session.read(offset, 4)?;
    if marker != MARKER {
        return Err(ParseError::new(offset, "missing fLaC stream marker").into());
    }
    session.emit_text("flac:codec", "FLAC");
    offset += 4;

    let mut info = None;
    let mut first = true;
    loop {
        session.checkpoint()?;
        let Some(header) = session.read_exact(offset, 4)? else {
            session.issue(offset, "truncated metadata block header");
            break;
        };
        let last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        let len = u64::from(u32::from_be_bytes([0, header[1], header[2], header[3]]));
        let body = offset + 4;
        let end = body + len;

        if first && block_type != BLOCK_STREAMINFO {
            session.issue(offset, "first metadata block is not STREAMINFO");
        }
        first = false;

        if end > file_len {
            session.issue(offset, format!("metadata block of {len} bytes extends past end of file"));
            break;
        }

        match block_type {
            BLOCK_STREAMINFO => match session.read_exact(body, StreamInfo::LEN)? {
                Some(data) => match StreamInfo::parse(&data) {
                    Some(parsed) => {
                        parsed.emit(session, "streaminfo");
                        info = Some(parsed);
                    }
                    None => session.issue(body, "invalid STREAMINFO"),
                },
                None => session.issue(body, "truncated STREAMINFO"),
            },
            BLOCK_VORBIS_COMMENT => {
                let data = session.read(body, len)?;
                if (data.len() as u64) < len {
                    session.issue(body, "Vorbis comment block exceeds payload limit");
                }
                vorbis::parse_comments(session, &data, body);
            }
            BLOCK_PICTURE => {
                let data = session.read(body, len)?;
                match picture_data(&data) {
                    Some(image) if !image.is_empty() => {
                        session.emit("flac:picture", RawValue::Bytes(image.to_vec()));
                    }
                    _ => session.issue(body, "malformed PICTURE block"),
                }
            }
            other => tracing::trace!(offset, block_type = other, len, "skipping metadata block"),
        }

        offset = end;
        if last {
            break;
        }
    }

    if let Some(info) = info.filter(|i| i.total_samples > 0) {
        let audio_bytes = file_len.saturating_sub(offset);
        let bitrate_num = audio_bytes
            .checked_mul(8)
            .and_then(|bits| bits.checked_mul(u64::from(info.sample_rate)))
            .and_then(|n| i64::try_from(n).ok());
        if let (Some(num), Ok(den)) = (bitrate_num, i64::try_from(info.total_samples)) {
            if num > 0 {
                session.emit_rational("flac:average-bitrate", num, den);
            }
        }
    }

    Ok(())
}
