//! Synthetic media fixtures for integration tests.
//!
//! Every builder produces a small, well-formed file of one container family.

#![allow(dead_code)]

use mediameta_probe::ContainerKind;

// ---------------------------------------------------------------------------
// Shared chunk helpers
// ---------------------------------------------------------------------------

fn iso_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut out = ((content.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(box_type);
    out.extend_from_slice(content);
    out
}

fn riff_chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn riff_list(list_type: &[u8; 4], children: &[u8]) -> Vec<u8> {
    let mut data = list_type.to_vec();
    data.extend_from_slice(children);
    riff_chunk(b"LIST", &data)
}

fn riff(form: &[u8; 4], chunks: &[u8]) -> Vec<u8> {
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((chunks.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(form);
    out.extend_from_slice(chunks);
    out
}

fn ebml_element(id: u32, payload: &[u8]) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().position(|&b| b != 0).unwrap_or(3);
    let mut out = bytes[skip..].to_vec();
    out.push(0x01);
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

/// ID3v2.3 tag with UTF-8 text frames.
pub fn id3v23(frames: &[(&str, &str)]) -> Vec<u8> {
    let frames: Vec<(&str, Vec<u8>)> = frames
        .iter()
        .map(|(id, value)| {
            let mut data = vec![3u8];
            data.extend_from_slice(value.as_bytes());
            (*id, data)
        })
        .collect();
    id3v23_frames(&frames)
}

/// ID3v2.3 tag from raw frame payloads.
pub fn id3v23_frames(frames: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, data) in frames {
        body.extend_from_slice(id.as_bytes());
        body.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(data);
    }
    let size = body.len() as u32;
    let mut tag = b"ID3\x03\x00\x00".to_vec();
    tag.extend_from_slice(&[
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]);
    tag.extend(body);
    tag
}

fn vorbis_comments(vendor: &str, fields: &[&str]) -> Vec<u8> {
    let mut out = (vendor.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(vendor.as_bytes());
    out.extend_from_slice(&(fields.len() as u32).to_le_bytes());
    for field in fields {
        out.extend_from_slice(&(field.len() as u32).to_le_bytes());
        out.extend_from_slice(field.as_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// ISO base media
// ---------------------------------------------------------------------------

fn mvhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut c = vec![0u8; 4];
    c.extend_from_slice(&3_427_000_000u32.to_be_bytes());
    c.extend_from_slice(&0u32.to_be_bytes());
    c.extend_from_slice(&timescale.to_be_bytes());
    c.extend_from_slice(&duration.to_be_bytes());
    c.extend_from_slice(&[0u8; 80]);
    iso_box(b"mvhd", &c)
}

/// An audio track whose media header reports `duration` in `timescale` units.
fn sound_trak(timescale: u32, duration: u32) -> Vec<u8> {
    let mut mdhd = vec![0u8; 12];
    mdhd.extend_from_slice(&timescale.to_be_bytes());
    mdhd.extend_from_slice(&duration.to_be_bytes());
    mdhd.extend_from_slice(&0x15C7u16.to_be_bytes());
    mdhd.extend_from_slice(&[0, 0]);

    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"soun");
    hdlr.extend_from_slice(&[0; 12]);

    let mut mdia = iso_box(b"mdhd", &mdhd);
    mdia.extend(iso_box(b"hdlr", &hdlr));
    iso_box(b"trak", &iso_box(b"mdia", &mdia))
}

fn ilst_text(item: &[u8; 4], value: &str) -> Vec<u8> {
    let mut data = 1u32.to_be_bytes().to_vec();
    data.extend_from_slice(&[0; 4]);
    data.extend_from_slice(value.as_bytes());
    iso_box(item, &iso_box(b"data", &data))
}

/// M4A with a 125.4 s movie header, an audio track claiming zero length, and
/// an iTunes title.
pub fn mp4() -> Vec<u8> {
    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"mdir");
    hdlr.extend_from_slice(&[0; 13]);
    let mut meta = vec![0u8; 4];
    meta.extend(iso_box(b"hdlr", &hdlr));
    meta.extend(iso_box(b"ilst", &ilst_text(&[0xA9, b'n', b'a', b'm'], "Song")));

    let mut moov = mvhd(1000, 125_400);
    moov.extend(sound_trak(44_100, 0));
    moov.extend(iso_box(b"udta", &iso_box(b"meta", &meta)));

    let mut file = iso_box(b"ftyp", b"M4A \0\0\0\0isom");
    file.extend(iso_box(b"moov", &moov));
    file.extend(iso_box(b"mdat", &[0u8; 64]));
    file
}

/// Same durations as [`mp4`] with the zero-length track listed first.
pub fn mp4_track_first() -> Vec<u8> {
    let mut moov = sound_trak(44_100, 0);
    moov.extend(mvhd(1000, 125_400));
    let mut file = iso_box(b"ftyp", b"isom\0\0\0\0isom");
    file.extend(iso_box(b"moov", &moov));
    file
}

// ---------------------------------------------------------------------------
// RIFF, AIFF
// ---------------------------------------------------------------------------

fn pcm_fmt() -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.extend_from_slice(&1u16.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&44_100u32.to_le_bytes());
    fmt.extend_from_slice(&176_400u32.to_le_bytes());
    fmt.extend_from_slice(&4u16.to_le_bytes());
    fmt.extend_from_slice(&16u16.to_le_bytes());
    fmt
}

/// 0.1 s of 16-bit stereo PCM with an INFO title.
pub fn wave() -> Vec<u8> {
    let mut body = riff_chunk(b"fmt ", &pcm_fmt());
    body.extend(riff_list(b"INFO", &riff_chunk(b"INAM", b"Take 1\0")));
    body.extend(riff_chunk(b"data", &[0u8; 17_640]));
    riff(b"WAVE", &body)
}

/// 10 s of 640x480 Xvid at 25 fps.
pub fn avi() -> Vec<u8> {
    let mut avih = vec![0u8; 56];
    avih[0..4].copy_from_slice(&40_000u32.to_le_bytes());
    avih[16..20].copy_from_slice(&250u32.to_le_bytes());
    avih[24..28].copy_from_slice(&1u32.to_le_bytes());
    avih[32..36].copy_from_slice(&640u32.to_le_bytes());
    avih[36..40].copy_from_slice(&480u32.to_le_bytes());

    let mut strh = vec![0u8; 56];
    strh[0..4].copy_from_slice(b"vids");
    strh[4..8].copy_from_slice(b"xvid");
    strh[20..24].copy_from_slice(&1u32.to_le_bytes());
    strh[24..28].copy_from_slice(&25u32.to_le_bytes());
    strh[32..36].copy_from_slice(&250u32.to_le_bytes());

    let mut strf = vec![0u8; 40];
    strf[4..8].copy_from_slice(&640u32.to_le_bytes());
    strf[8..12].copy_from_slice(&480u32.to_le_bytes());
    strf[16..20].copy_from_slice(b"XVID");

    let mut strl = riff_chunk(b"strh", &strh);
    strl.extend(riff_chunk(b"strf", &strf));
    let mut hdrl = riff_chunk(b"avih", &avih);
    hdrl.extend(riff_list(b"strl", &strl));
    let mut body = riff_list(b"hdrl", &hdrl);
    body.extend(riff_list(b"movi", &[0u8; 32]));
    riff(b"AVI ", &body)
}

/// AIFF with 2 s of 44.1 kHz stereo and a NAME chunk.
pub fn aiff() -> Vec<u8> {
    let mut comm = Vec::new();
    comm.extend_from_slice(&2u16.to_be_bytes());
    comm.extend_from_slice(&88_200u32.to_be_bytes());
    comm.extend_from_slice(&16u16.to_be_bytes());
    comm.extend_from_slice(&[0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0]);

    let mut chunks = Vec::new();
    for (id, data) in [(b"COMM", comm.as_slice()), (b"NAME", b"Aiff Song".as_slice())] {
        chunks.extend_from_slice(id);
        chunks.extend_from_slice(&(data.len() as u32).to_be_bytes());
        chunks.extend_from_slice(data);
        if data.len() % 2 == 1 {
            chunks.push(0);
        }
    }
    let mut file = b"FORM".to_vec();
    file.extend_from_slice(&((chunks.len() + 4) as u32).to_be_bytes());
    file.extend_from_slice(b"AIFF");
    file.extend(chunks);
    file
}

// ---------------------------------------------------------------------------
// Matroska
// ---------------------------------------------------------------------------

const EBML_HEADER: u32 = 0x1A45_DFA3;
const DOC_TYPE: u32 = 0x4282;
const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const TITLE: u32 = 0x7BA9;
const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const TAGS: u32 = 0x1254_C367;
const TAG: u32 = 0x7373;
const SIMPLE_TAG: u32 = 0x67C8;
const TAG_NAME: u32 = 0x45A3;
const TAG_STRING: u32 = 0x4487;
const VOID: u8 = 0xEC;

/// WebM with a 125.4 s 1080p AVC track and a title.
pub fn mkv() -> Vec<u8> {
    let mut info = ebml_element(TIMECODE_SCALE, &[0x0F, 0x42, 0x40]);
    info.extend(ebml_element(DURATION, &125_400.0f64.to_be_bytes()));
    info.extend(ebml_element(TITLE, b"Movie"));

    let mut video = ebml_element(PIXEL_WIDTH, &[0x07, 0x80]);
    video.extend(ebml_element(PIXEL_HEIGHT, &[0x04, 0x38]));
    let mut entry = ebml_element(TRACK_TYPE, &[1]);
    entry.extend(ebml_element(CODEC_ID, b"V_MPEG4/ISO/AVC"));
    entry.extend(ebml_element(VIDEO, &video));

    let mut simple = ebml_element(TAG_NAME, b"ARTIST");
    simple.extend(ebml_element(TAG_STRING, b"Director"));

    let mut segment = ebml_element(INFO, &info);
    segment.extend(ebml_element(TRACKS, &ebml_element(TRACK_ENTRY, &entry)));
    segment.extend(ebml_element(TAGS, &ebml_element(TAG, &ebml_element(SIMPLE_TAG, &simple))));

    let mut file = ebml_element(EBML_HEADER, &ebml_element(DOC_TYPE, b"webm"));
    file.extend(ebml_element(SEGMENT, &segment));
    file
}

/// Matroska with a title followed by `voids` empty Void elements.
pub fn mkv_with_voids(title: &str, voids: usize) -> Vec<u8> {
    let mut segment = ebml_element(INFO, &ebml_element(TITLE, title.as_bytes()));
    segment.reserve(voids * 2);
    for _ in 0..voids {
        segment.extend_from_slice(&[VOID, 0x80]);
    }

    let mut file = ebml_element(EBML_HEADER, &ebml_element(DOC_TYPE, b"matroska"));
    file.extend(ebml_element(SEGMENT, &segment));
    file
}

/// Matroska whose SimpleTag elements nest `depth` levels deep.
pub fn deep_mkv(depth: usize) -> Vec<u8> {
    let mut nested = ebml_element(TAG_NAME, b"x");
    for _ in 0..depth {
        nested = ebml_element(SIMPLE_TAG, &nested);
    }
    let mut info = ebml_element(TITLE, b"Deep");
    info.extend(ebml_element(DURATION, &1_000.0f64.to_be_bytes()));
    let mut segment = ebml_element(INFO, &info);
    segment.extend(ebml_element(TAGS, &ebml_element(TAG, &nested)));

    let mut file = ebml_element(EBML_HEADER, &ebml_element(DOC_TYPE, b"matroska"));
    file.extend(ebml_element(SEGMENT, &segment));
    file
}

// ---------------------------------------------------------------------------
// MPEG audio, FLAC, Ogg
// ---------------------------------------------------------------------------

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, joint stereo.
const MP3_HEADER_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x44];
const MP3_FRAME_LEN: usize = 417;

/// ID3v2-tagged CBR MP3 of `frames` frames.
pub fn mp3(frames: usize) -> Vec<u8> {
    let mut file = id3v23(&[("TIT2", "Track"), ("TPE1", "Artist"), ("TRCK", "3/12"), ("TCON", "(17)")]);
    for _ in 0..frames {
        let mut frame = vec![0u8; MP3_FRAME_LEN];
        frame[0..4].copy_from_slice(&MP3_HEADER_128K);
        file.extend(frame);
    }
    file
}

/// CBR MP3 whose ID3v2 tag holds `image_len` bytes of cover art ahead of
/// its title and artist frames.
pub fn mp3_with_artwork(image_len: usize) -> Vec<u8> {
    let mut apic = vec![0u8];
    apic.extend_from_slice(b"image/jpeg\0");
    apic.push(3);
    apic.push(0);
    apic.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    apic.resize(apic.len() + image_len, 0x5A);

    let mut title = vec![3u8];
    title.extend_from_slice(b"After Art");
    let mut artist = vec![3u8];
    artist.extend_from_slice(b"Band");

    let mut file = id3v23_frames(&[("APIC", apic), ("TIT2", title), ("TPE1", artist)]);
    for _ in 0..20 {
        let mut frame = vec![0u8; MP3_FRAME_LEN];
        frame[0..4].copy_from_slice(&MP3_HEADER_128K);
        file.extend(frame);
    }
    file
}

fn streaminfo(rate: u64, channels: u64, bits: u64, total: u64) -> Vec<u8> {
    let mut data = vec![0u8; 34];
    data[0..2].copy_from_slice(&4096u16.to_be_bytes());
    data[2..4].copy_from_slice(&4096u16.to_be_bytes());
    let packed = (rate << 44) | ((channels - 1) << 41) | ((bits - 1) << 36) | total;
    data[10..18].copy_from_slice(&packed.to_be_bytes());
    data
}

fn flac_block(block_type: u8, last: bool, body: &[u8]) -> Vec<u8> {
    let mut out = vec![block_type | if last { 0x80 } else { 0 }];
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

/// 10 s of 44.1 kHz 16-bit stereo FLAC with Vorbis comments.
pub fn flac() -> Vec<u8> {
    flac_with_comments(&["TITLE=Flac Song", "ARTIST=Band", "DATE=2004-05-01", "TRACKNUMBER=3/12"])
}

pub fn flac_with_comments(fields: &[&str]) -> Vec<u8> {
    let mut file = b"fLaC".to_vec();
    file.extend(flac_block(0, false, &streaminfo(44_100, 2, 16, 441_000)));
    file.extend(flac_block(4, true, &vorbis_comments("reference libFLAC", fields)));
    file.extend(vec![0u8; 1000]);
    file
}

fn ogg_page(serial: u32, flags: u8, granule: i64, packets: &[&[u8]]) -> Vec<u8> {
    let mut lacing = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        lacing.extend(std::iter::repeat(255u8).take(packet.len() / 255));
        lacing.push((packet.len() % 255) as u8);
        body.extend_from_slice(packet);
    }
    let mut out = b"OggS".to_vec();
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

/// 10 s of 44.1 kHz stereo Ogg Vorbis with a title comment.
pub fn ogg_vorbis() -> Vec<u8> {
    let serial = 0x1234;
    let mut ident = b"\x01vorbis".to_vec();
    ident.extend_from_slice(&0u32.to_le_bytes());
    ident.push(2);
    ident.extend_from_slice(&44_100u32.to_le_bytes());
    ident.extend_from_slice(&0i32.to_le_bytes());
    ident.extend_from_slice(&128_000i32.to_le_bytes());
    ident.extend_from_slice(&0i32.to_le_bytes());
    ident.extend_from_slice(&[0xB8, 0x01]);

    let mut comment = b"\x03vorbis".to_vec();
    comment.extend(vorbis_comments("Lavf", &["TITLE=Ogg Song", "ARTIST=Someone"]));

    let mut file = ogg_page(serial, 0x02, 0, &[&ident]);
    file.extend(ogg_page(serial, 0, 0, &[&comment, b"\x05vorbis setup"]));
    file.extend(ogg_page(serial, 0x04, 441_000, &[&[0u8; 300]]));
    file
}

/// Every fixture with the family it must be classified as.
pub fn all() -> Vec<(&'static str, ContainerKind, Vec<u8>)> {
    vec![
        ("mp4", ContainerKind::IsoMedia, mp4()),
        ("wave", ContainerKind::Wave, wave()),
        ("avi", ContainerKind::Avi, avi()),
        ("aiff", ContainerKind::Aiff, aiff()),
        ("mkv", ContainerKind::Matroska, mkv()),
        ("mp3", ContainerKind::MpegAudio, mp3(10)),
        ("flac", ContainerKind::Flac, flac()),
        ("ogg", ContainerKind::Ogg, ogg_vorbis()),
    ]
}
