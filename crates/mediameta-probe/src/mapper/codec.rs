//! Human-readable codec names for the identifiers the parsers report:
//! Matroska CodecIDs, ISO sample entry and AVI fourccs, WAVE format tags,
//! AIFF-C compression types and MPEG audio layers.

/// Map a codec identifier to a display name.
pub fn codec_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(tag) = raw.strip_prefix("0x") {
        return u16::from_str_radix(tag, 16).ok().map(format_tag_name);
    }

    let name = match raw {
        // Matroska
        "V_MPEG4/ISO/AVC" => "AVC",
        "V_MPEGH/ISO/HEVC" => "HEVC",
        "V_AV1" => "AV1",
        "V_VP8" => "VP8",
        "V_VP9" => "VP9",
        "V_MPEG1" => "MPEG-1",
        "V_MPEG2" => "MPEG-2",
        "V_MPEG4/ISO/SP" | "V_MPEG4/ISO/ASP" | "V_MPEG4/ISO/AP" => "MPEG-4",
        "V_MS/VFW/FOURCC" => "VFW",
        "V_THEORA" => "Theora",
        "A_AAC" | "A_AAC/MPEG2/LC" | "A_AAC/MPEG4/LC" | "A_AAC/MPEG4/LC/SBR" => "AAC",
        "A_AC3" => "AC-3",
        "A_EAC3" => "E-AC-3",
        "A_DTS" => "DTS",
        "A_DTS/EXPRESS" => "DTS Express",
        "A_DTS/LOSSLESS" => "DTS-HD MA",
        "A_TRUEHD" => "TrueHD",
        "A_FLAC" => "FLAC",
        "A_VORBIS" => "Vorbis",
        "A_OPUS" => "Opus",
        "A_PCM/INT/LIT" | "A_PCM/INT/BIG" => "PCM",
        "A_PCM/FLOAT/IEEE" => "PCM Float",
        "A_MPEG/L3" => "MP3",
        "A_MPEG/L2" => "MP2",
        "A_MPEG/L1" => "MP1",

        // ISO sample entries
        "avc1" | "avc3" => "AVC",
        "hvc1" | "hev1" => "HEVC",
        "dvh1" | "dvhe" => "Dolby Vision",
        "av01" => "AV1",
        "vp08" => "VP8",
        "vp09" => "VP9",
        "mp4v" => "MPEG-4",
        "s263" | "h263" => "H.263",
        "jpeg" => "Motion JPEG",
        "apcn" | "apch" | "apcs" | "apco" | "ap4h" => "ProRes",
        "mp4a" => "AAC",
        "mp4a.69" | "mp4a.6b" | ".mp3" => "MP3",
        "ac-3" => "AC-3",
        "ec-3" => "E-AC-3",
        "alac" => "ALAC",
        "fLaC" => "FLAC",
        "Opus" => "Opus",
        "samr" => "AMR",
        "lpcm" | "sowt" | "twos" | "in24" | "in32" | "raw" => "PCM",
        "fl32" | "fl64" | "FL32" => "PCM Float",

        // AIFF-C compression
        "NONE" => "PCM",
        "alaw" | "ALAW" => "A-law",
        "ulaw" | "ULAW" => "µ-law",
        "ima4" => "IMA ADPCM",

        // MPEG audio layers
        "mp1" => "MP1",
        "mp2" => "MP2",
        "mp3" => "MP3",

        "RGB" => "RGB",
        other => return Some(avi_fourcc_name(other).map_or_else(|| strip_codec_prefix(other), str::to_string)),
    };
    Some(name.to_string())
}

/// AVI stream handlers are case-insensitive fourccs.
fn avi_fourcc_name(code: &str) -> Option<&'static str> {
    let name = match code.to_ascii_uppercase().as_str() {
        "H264" | "X264" | "AVC1" | "DAVC" => "AVC",
        "HEVC" | "H265" | "X265" | "HVC1" => "HEVC",
        "XVID" => "Xvid",
        "DIVX" | "DX50" | "DIV3" | "FMP4" | "MP4V" => "MPEG-4",
        "MJPG" | "AVRN" => "Motion JPEG",
        "MPG1" => "MPEG-1",
        "MPG2" | "MPEG" => "MPEG-2",
        "WMV1" => "WMV7",
        "WMV2" => "WMV8",
        "WMV3" => "WMV9",
        "WVC1" => "VC-1",
        "VP80" => "VP8",
        "VP90" => "VP9",
        "DVSD" | "DV25" | "DV50" => "DV",
        "CVID" => "Cinepak",
        "IV50" => "Indeo 5",
        "HFYU" => "HuffYUV",
        "FFV1" => "FFV1",
        _ => return None,
    };
    Some(name)
}

/// WAVE and AVI audio format tags.
fn format_tag_name(tag: u16) -> String {
    let name = match tag {
        0x0001 => "PCM",
        0x0002 => "MS ADPCM",
        0x0003 => "PCM Float",
        0x0006 => "A-law",
        0x0007 => "µ-law",
        0x0011 => "IMA ADPCM",
        0x0050 => "MP2",
        0x0055 => "MP3",
        0x00FF | 0x1610 | 0x4143 => "AAC",
        0x0160 | 0x0161 => "WMA",
        0x0162 => "WMA Pro",
        0x0163 => "WMA Lossless",
        0x2000 => "AC-3",
        0x2001 => "DTS",
        0xF1AC => "FLAC",
        0x674F | 0x6750 | 0x6751 => "Vorbis",
        0x704F => "Opus",
        other => return format!("0x{other:04X}"),
    };
    name.to_string()
}

/// Unknown identifiers pass through without their track-type prefix.
fn strip_codec_prefix(codec: &str) -> String {
    codec
        .strip_prefix("V_")
        .or_else(|| codec.strip_prefix("A_"))
        .or_else(|| codec.strip_prefix("S_"))
        .unwrap_or(codec)
        .to_string()
}
