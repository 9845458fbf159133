//! Container detection from magic bytes
//!
//! Classification looks at a bounded prefix and, for MPEG audio streams that
//! only identify themselves through an ID3v1 trailer, a bounded suffix. File
//! extensions are never consulted.

use crate::config::Limits;
use crate::container::ContainerKind;
use crate::error::Result;
use crate::parser::bytes::{be_u32, be_u64};
use crate::parser::id3;
use crate::parser::mpeg_audio::FrameHeader;
use crate::reader::FileHandle;

/// Top-level ISO base media box types accepted as a first box.
const ISO_FIRST_BOXES: [&[u8; 4]; 7] = [b"ftyp", b"moov", b"mdat", b"free", b"skip", b"wide", b"pnot"];

/// Top-level box types that may follow the first box.
const ISO_TOP_LEVEL: [&[u8; 4]; 13] = [
    b"ftyp", b"moov", b"mdat", b"free", b"skip", b"wide", b"pnot", b"uuid", b"meta", b"moof", b"mfra", b"sidx",
    b"styp",
];

/// Detect the container family of an open handle.
pub fn classify(handle: &mut FileHandle, limits: &Limits) -> Result<ContainerKind> {
    let prefix = handle.read_at(0, limits.sniff_prefix_bytes)?;

    if let Some(kind) = classify_prefix(&prefix) {
        return Ok(kind);
    }

    if is_iso_media(handle, &prefix)? {
        return Ok(ContainerKind::IsoMedia);
    }

    // A leading ID3v2 tag is followed by either FLAC or MPEG audio.
    if let Some(tag_len) = id3::tag_size(&prefix) {
        let after = handle.read_at(tag_len, 4)?;
        if after == b"fLaC" {
            return Ok(ContainerKind::Flac);
        }
        return Ok(ContainerKind::MpegAudio);
    }

    if starts_with_frame(&prefix) {
        return Ok(ContainerKind::MpegAudio);
    }

    let len = handle.len();
    let suffix_len = (limits.sniff_suffix_bytes as u64).min(len);
    let suffix = handle.read_at(len - suffix_len, suffix_len as usize)?;
    if id3::has_v1_trailer(&suffix) && find_frame_sync(&prefix).is_some() {
        return Ok(ContainerKind::MpegAudio);
    }

    Ok(ContainerKind::Unknown)
}

/// Classify by fixed magic numbers alone.
pub fn classify_prefix(prefix: &[u8]) -> Option<ContainerKind> {
    if prefix.len() < 4 {
        return None;
    }

    // EBML header: 0x1A 0x45 0xDF 0xA3
    if prefix[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(ContainerKind::Matroska);
    }

    if &prefix[0..4] == b"fLaC" {
        return Some(ContainerKind::Flac);
    }

    // Capture pattern plus stream structure version 0
    if &prefix[0..4] == b"OggS" && prefix.get(4) == Some(&0) {
        return Some(ContainerKind::Ogg);
    }

    if prefix.len() >= 12 {
        let form = &prefix[0..4];
        let form_type = &prefix[8..12];
        match (form, form_type) {
            (b"RIFF", b"AVI ") => return Some(ContainerKind::Avi),
            (b"RIFF", b"WAVE") | (b"RF64", b"WAVE") => return Some(ContainerKind::Wave),
            (b"FORM", b"AIFF") | (b"FORM", b"AIFC") => return Some(ContainerKind::Aiff),
            _ => {}
        }
    }

    None
}

/// An ISO base media first box with a size that fits the file.
///
/// `ftyp` must carry a printable major brand. Any other first box is only
/// accepted when it spans the whole file or the box behind it is a known
/// top-level type, so text that happens to spell `free` or `moov` at offset
/// 4 stays unknown.
fn is_iso_media(handle: &mut FileHandle, prefix: &[u8]) -> Result<bool> {
    let len = handle.len();
    let Some((box_type, size)) = box_header(prefix, len) else {
        return Ok(false);
    };
    if !ISO_FIRST_BOXES.contains(&&box_type) {
        return Ok(false);
    }
    if &box_type == b"ftyp" {
        let brand = prefix.get(8..12);
        return Ok(brand.is_some_and(|b| b.iter().all(|c| c.is_ascii_alphanumeric() || *c == b' ')));
    }
    if size == len {
        return Ok(true);
    }
    let next = handle.read_at(size, 16)?;
    Ok(box_header(&next, len - size).is_some_and(|(t, _)| ISO_TOP_LEVEL.contains(&&t)))
}

/// Type and total size of the box header at the start of `data`, when the
/// size is plausible for `remaining` bytes.
fn box_header(data: &[u8], remaining: u64) -> Option<([u8; 4], u64)> {
    let size32 = be_u32(data, 0)?;
    let box_type: [u8; 4] = data.get(4..8)?.try_into().ok()?;
    // 0 = to end of file, 1 = 64-bit size follows
    let (size, header_len) = match size32 {
        0 => (remaining, 8),
        1 => (be_u64(data, 8)?, 16),
        s => (u64::from(s), 8),
    };
    (size >= header_len && size <= remaining).then_some((box_type, size))
}

/// A valid frame header at offset 0, confirmed by the following header when
/// it lies inside the prefix.
fn starts_with_frame(prefix: &[u8]) -> bool {
    let Some(header) = header_at(prefix, 0) else {
        return false;
    };
    let next = header.frame_len() as usize;
    if next + 4 <= prefix.len() {
        return header_at(prefix, next).is_some();
    }
    true
}

fn find_frame_sync(prefix: &[u8]) -> Option<usize> {
    (0..prefix.len().saturating_sub(3)).find(|&i| header_at(prefix, i).is_some())
}

fn header_at(data: &[u8], offset: usize) -> Option<FrameHeader> {
    let bytes = data.get(offset..offset + 4)?;
    FrameHeader::parse(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
