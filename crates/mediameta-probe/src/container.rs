//! Supported container families

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of container families the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    /// ISO base media (.mp4, .m4a, .m4v, .mov, .3gp)
    IsoMedia,
    /// RIFF AVI
    Avi,
    /// RIFF/RF64 WAVE
    Wave,
    /// IFF AIFF and AIFF-C
    Aiff,
    /// Matroska and WebM
    Matroska,
    /// MPEG audio elementary stream (.mp3, .mp2)
    MpegAudio,
    /// Native FLAC
    Flac,
    /// Ogg bitstream
    Ogg,
    /// No recognizable signature
    Unknown,
}

impl ContainerKind {
    /// Every kind, in declaration order.
    pub const ALL: [ContainerKind; 9] = [
        ContainerKind::IsoMedia,
        ContainerKind::Avi,
        ContainerKind::Wave,
        ContainerKind::Aiff,
        ContainerKind::Matroska,
        ContainerKind::MpegAudio,
        ContainerKind::Flac,
        ContainerKind::Ogg,
        ContainerKind::Unknown,
    ];

    /// Stable identifier used in mapping tables and logs.
    pub fn id(self) -> &'static str {
        match self {
            ContainerKind::IsoMedia => "iso-media",
            ContainerKind::Avi => "avi",
            ContainerKind::Wave => "wave",
            ContainerKind::Aiff => "aiff",
            ContainerKind::Matroska => "matroska",
            ContainerKind::MpegAudio => "mpeg-audio",
            ContainerKind::Flac => "flac",
            ContainerKind::Ogg => "ogg",
            ContainerKind::Unknown => "unknown",
        }
    }

    /// Human-readable container name.
    pub fn display_name(self) -> &'static str {
        match self {
            ContainerKind::IsoMedia => "MPEG-4",
            ContainerKind::Avi => "AVI",
            ContainerKind::Wave => "WAVE",
            ContainerKind::Aiff => "AIFF",
            ContainerKind::Matroska => "Matroska",
            ContainerKind::MpegAudio => "MPEG Audio",
            ContainerKind::Flac => "FLAC",
            ContainerKind::Ogg => "Ogg",
            ContainerKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContainerKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| format!("unknown container kind `{s}`"))
    }
}
