//! Mapping rules and the built-in table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::coerce::{Coercion, Epoch, FractionPart};
use crate::attribute::AttributeName;
use crate::container::ContainerKind;
use crate::error::{Error, Result};

/// One raw key to one canonical attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Container family the rule applies to; `None` for shared tag schemes.
    #[serde(default)]
    pub family: Option<ContainerKind>,
    pub key: String,
    pub target: AttributeName,
    #[serde(default)]
    pub coercion: Coercion,
}

/// Ordered rule set with a per-key index.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
    by_key: HashMap<String, Vec<usize>>,
}

impl MappingTable {
    /// The default table covering every record key the parsers produce.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        table.extend(builtin_rules());
        table
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: Vec<MappingRule> =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("mapping table parse error: {e}")))?;
        let mut table = Self::default();
        table.extend(rules);
        Ok(table)
    }

    /// Append rules; they are consulted alongside the existing ones.
    pub fn extend(&mut self, rules: impl IntoIterator<Item = MappingRule>) {
        for rule in rules {
            self.by_key.entry(rule.key.clone()).or_default().push(self.rules.len());
            self.rules.push(rule);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// Rules for `key` in `kind`. Rules scoped to the family shadow shared
    /// rules for the same key.
    pub fn rules_for(&self, kind: ContainerKind, key: &str) -> Vec<&MappingRule> {
        let Some(indices) = self.by_key.get(key) else {
            return Vec::new();
        };
        let candidates = indices.iter().map(|&i| &self.rules[i]);
        let specific: Vec<&MappingRule> = candidates.clone().filter(|r| r.family == Some(kind)).collect();
        if !specific.is_empty() {
            return specific;
        }
        candidates.filter(|r| r.family.is_none()).collect()
    }
}

/// Accumulates rules for one family at a time.
struct Builder {
    family: Option<ContainerKind>,
    rules: Vec<MappingRule>,
}

impl Builder {
    fn family(&mut self, family: Option<ContainerKind>) -> &mut Self {
        self.family = family;
        self
    }

    fn rule(&mut self, key: &str, target: AttributeName, coercion: Coercion) -> &mut Self {
        self.rules.push(MappingRule {
            family: self.family,
            key: key.to_string(),
            target,
            coercion,
        });
        self
    }

    fn direct(&mut self, key: &str, target: AttributeName) -> &mut Self {
        self.rule(key, target, Coercion::Direct)
    }

    fn rational(&mut self, key: &str, target: AttributeName) -> &mut Self {
        self.rule(key, target, Coercion::Rational)
    }

    fn per_rate(&mut self, key: &str, rate_key: &str, factor: f64) -> &mut Self {
        let coercion = Coercion::PerRate {
            rate_key: rate_key.to_string(),
            factor,
        };
        self.rule(key, AttributeName::DurationSeconds, coercion)
    }

    /// Codec identifier feeding a codec name and a presence flag.
    fn codec(&mut self, key: &str, target: AttributeName, flag: AttributeName) -> &mut Self {
        self.rule(key, target, Coercion::Codec).rule(key, flag, Coercion::Presence)
    }

    fn presence(&mut self, key: &str, target: AttributeName) -> &mut Self {
        self.rule(key, target, Coercion::Presence)
    }

    /// `"n/m"` text feeding a number and a total.
    fn fraction(&mut self, key: &str, number: AttributeName, total: AttributeName) -> &mut Self {
        self.rule(key, number, Coercion::Fraction { part: FractionPart::Number })
            .rule(key, total, Coercion::Fraction { part: FractionPart::Total })
    }

    /// Date text feeding the year and, when complete, the creation date.
    fn date(&mut self, key: &str) -> &mut Self {
        self.rule(key, AttributeName::Year, Coercion::LeadingInteger).rule(
            key,
            AttributeName::CreationDate,
            Coercion::Timestamp { epoch: Epoch::Text },
        )
    }
}

fn builtin_rules() -> Vec<MappingRule> {
    use AttributeName::*;
    use ContainerKind::*;

    let mut b = Builder {
        family: None,
        rules: Vec::new(),
    };

    // Shared: seeded container name, ID3, Vorbis comments
    b.family(None)
        .direct("container", ContainerFormat)
        .direct("id3:TIT2", Title)
        .direct("id3:TPE1", Artist)
        .direct("id3:TALB", Album)
        .direct("id3:TPE2", AlbumArtist)
        .direct("id3:TCOM", Composer)
        .rule("id3:TCON", Genre, Coercion::Genre)
        .direct("id3:COMM", Comment)
        .direct("id3:TCOP", Copyright)
        .direct("id3:TSSE", Encoder)
        .rule("id3:TLAN", Language, Coercion::Language)
        .rule("id3:TYER", Year, Coercion::LeadingInteger)
        .date("id3:TDRC")
        .fraction("id3:TRCK", TrackNumber, TrackTotal)
        .fraction("id3:TPOS", DiscNumber, DiscTotal)
        .direct("id3:TCMP", Compilation)
        .rule("id3:TLEN", DurationSeconds, Coercion::Scale { factor: 0.001 })
        .direct("id3:TXXX:ALBUM ARTIST", AlbumArtist)
        .presence("id3:APIC", HasArtwork)
        .direct("id3v1:title", Title)
        .direct("id3v1:artist", Artist)
        .direct("id3v1:album", Album)
        .rule("id3v1:year", Year, Coercion::LeadingInteger)
        .direct("id3v1:comment", Comment)
        .direct("id3v1:track", TrackNumber)
        .rule("id3v1:genre", Genre, Coercion::Genre)
        .direct("vorbis:vendor", Encoder)
        .direct("vorbis:TITLE", Title)
        .direct("vorbis:ARTIST", Artist)
        .direct("vorbis:ALBUM", Album)
        .direct("vorbis:ALBUMARTIST", AlbumArtist)
        .direct("vorbis:ALBUM ARTIST", AlbumArtist)
        .direct("vorbis:COMPOSER", Composer)
        .rule("vorbis:GENRE", Genre, Coercion::Genre)
        .direct("vorbis:COMMENT", Comment)
        .direct("vorbis:DESCRIPTION", Comment)
        .direct("vorbis:COPYRIGHT", Copyright)
        .direct("vorbis:ENCODER", Encoder)
        .rule("vorbis:LANGUAGE", Language, Coercion::Language)
        .date("vorbis:DATE")
        .rule("vorbis:YEAR", Year, Coercion::LeadingInteger)
        .fraction("vorbis:TRACKNUMBER", TrackNumber, TrackTotal)
        .rule("vorbis:TRACKTOTAL", TrackTotal, Coercion::LeadingInteger)
        .rule("vorbis:TOTALTRACKS", TrackTotal, Coercion::LeadingInteger)
        .fraction("vorbis:DISCNUMBER", DiscNumber, DiscTotal)
        .rule("vorbis:DISCTOTAL", DiscTotal, Coercion::LeadingInteger)
        .rule("vorbis:TOTALDISCS", DiscTotal, Coercion::LeadingInteger)
        .direct("vorbis:COMPILATION", Compilation)
        .presence("vorbis:METADATA_BLOCK_PICTURE", HasArtwork)
        .presence("vorbis:COVERART", HasArtwork);

    b.family(Some(IsoMedia))
        .rational("mvhd:duration", DurationSeconds)
        .rule("mvhd:creation-time", CreationDate, Coercion::Timestamp { epoch: Epoch::Mac1904 })
        .rational("trak:duration", DurationSeconds)
        .rule("trak:language", Language, Coercion::Language)
        .codec("trak:video-codec", VideoCodec, HasVideo)
        .codec("trak:audio-codec", AudioCodec, HasAudio)
        .rule("trak:primary-codec", CodecName, Coercion::Codec)
        .direct("trak:width", Width)
        .direct("trak:height", Height)
        .rational("trak:frame-rate", FrameRate)
        .direct("trak:channels", AudioChannels)
        .direct("trak:sample-rate", SampleRate)
        .direct("trak:bits-per-sample", BitsPerSample)
        .direct("trak:avg-bitrate", BitRate)
        .direct("trak:count", TrackCount)
        .direct("ilst:©nam", Title)
        .direct("ilst:©ART", Artist)
        .direct("ilst:aART", AlbumArtist)
        .direct("ilst:©alb", Album)
        .direct("ilst:©wrt", Composer)
        .rule("ilst:©gen", Genre, Coercion::Genre)
        .rule("ilst:gnre", Genre, Coercion::Genre)
        .date("ilst:©day")
        .direct("ilst:©cmt", Comment)
        .direct("ilst:©too", Encoder)
        .direct("ilst:cprt", Copyright)
        .direct("ilst:trkn", TrackNumber)
        .direct("ilst:trkn:total", TrackTotal)
        .direct("ilst:disk", DiscNumber)
        .direct("ilst:disk:total", DiscTotal)
        .direct("ilst:cpil", Compilation)
        .presence("ilst:covr", HasArtwork)
        .direct("udta:©nam", Title)
        .direct("udta:©ART", Artist)
        .direct("udta:©alb", Album)
        .direct("udta:©wrt", Composer)
        .rule("udta:©gen", Genre, Coercion::Genre)
        .date("udta:©day")
        .direct("udta:©cmt", Comment)
        .direct("udta:©too", Encoder)
        .direct("udta:©swr", Encoder)
        .direct("udta:©cpy", Copyright)
        .direct("udta:cprt", Copyright);

    for family in [Avi, Wave] {
        b.family(Some(family))
            .direct("info:INAM", Title)
            .direct("info:IART", Artist)
            .direct("info:IPRD", Album)
            .direct("info:ICMT", Comment)
            .date("info:ICRD")
            .rule("info:IGNR", Genre, Coercion::Genre)
            .direct("info:ISFT", Encoder)
            .direct("info:ICOP", Copyright)
            .rule("info:ITRK", TrackNumber, Coercion::LeadingInteger)
            .rule("info:ILNG", Language, Coercion::Language);
    }

    b.family(Some(Avi))
        .rational("avih:duration", DurationSeconds)
        .rational("avih:frame-rate", FrameRate)
        .direct("avih:width", Width)
        .direct("avih:height", Height)
        .rational("strl:duration", DurationSeconds)
        .codec("strl:video-codec", VideoCodec, HasVideo)
        .codec("strl:audio-codec", AudioCodec, HasAudio)
        .rule("strl:primary-codec", CodecName, Coercion::Codec)
        .rational("strl:frame-rate", FrameRate)
        .direct("strl:width", Width)
        .direct("strl:height", Height)
        .direct("strl:channels", AudioChannels)
        .direct("strl:sample-rate", SampleRate)
        .direct("strl:bits-per-sample", BitsPerSample)
        .direct("strl:count", TrackCount);

    b.family(Some(Wave))
        .codec("fmt:format-tag", AudioCodec, HasAudio)
        .rule("fmt:format-tag", CodecName, Coercion::Codec)
        .direct("fmt:channels", AudioChannels)
        .direct("fmt:sample-rate", SampleRate)
        .direct("fmt:bits-per-sample", BitsPerSample)
        .rule("fmt:byte-rate", BitRate, Coercion::Scale { factor: 8.0 })
        .per_rate("data:size", "fmt:byte-rate", 1.0)
        .per_rate("fact:sample-count", "fmt:sample-rate", 1.0);

    b.family(Some(Aiff))
        .codec("comm:compression", AudioCodec, HasAudio)
        .rule("comm:compression", CodecName, Coercion::Codec)
        .direct("comm:channels", AudioChannels)
        .direct("comm:sample-rate", SampleRate)
        .direct("comm:bits-per-sample", BitsPerSample)
        .per_rate("comm:sample-frames", "comm:sample-rate", 1.0)
        .direct("aiff:NAME", Title)
        .direct("aiff:AUTH", Artist)
        .direct("aiff:(c)", Copyright)
        .direct("aiff:ANNO", Comment);

    b.family(Some(Matroska))
        .direct("ebml:doctype", ContainerFormat)
        .rational("info:duration", DurationSeconds)
        .direct("info:title", Title)
        .direct("info:muxing-app", Encoder)
        .direct("info:writing-app", Encoder)
        .rule("info:date-utc", CreationDate, Coercion::Timestamp { epoch: Epoch::Matroska2001 })
        .rule("track:language", Language, Coercion::Language)
        .codec("track:video-codec", VideoCodec, HasVideo)
        .codec("track:audio-codec", AudioCodec, HasAudio)
        .rule("tracks:primary-codec", CodecName, Coercion::Codec)
        .direct("track:width", Width)
        .direct("track:height", Height)
        .rational("track:frame-rate", FrameRate)
        .direct("track:channels", AudioChannels)
        .direct("track:sample-rate", SampleRate)
        .direct("track:bits-per-sample", BitsPerSample)
        .direct("tracks:count", TrackCount)
        .direct("mkv:tag:TITLE", Title)
        .direct("mkv:tag:ARTIST", Artist)
        .direct("mkv:tag:ALBUM", Album)
        .direct("mkv:tag:ALBUM_ARTIST", AlbumArtist)
        .direct("mkv:tag:COMPOSER", Composer)
        .rule("mkv:tag:GENRE", Genre, Coercion::Genre)
        .direct("mkv:tag:COMMENT", Comment)
        .direct("mkv:tag:DESCRIPTION", Comment)
        .direct("mkv:tag:COPYRIGHT", Copyright)
        .direct("mkv:tag:ENCODER", Encoder)
        .date("mkv:tag:DATE_RELEASED")
        .rule("mkv:tag:DATE_RECORDED", Year, Coercion::LeadingInteger)
        .rule("mkv:tag:PART_NUMBER", TrackNumber, Coercion::LeadingInteger)
        .rule("mkv:tag:TOTAL_PARTS", TrackTotal, Coercion::LeadingInteger)
        .presence("attachment:image", HasArtwork);

    b.family(Some(MpegAudio))
        .codec("mpeg:codec", AudioCodec, HasAudio)
        .rule("mpeg:codec", CodecName, Coercion::Codec)
        .direct("mpeg:channels", AudioChannels)
        .direct("mpeg:sample-rate", SampleRate)
        .direct("mpeg:bitrate", BitRate)
        .rational("mpeg:average-bitrate", BitRate)
        .rational("mpeg:duration", DurationSeconds)
        .per_rate("mpeg:audio-bytes", "mpeg:bitrate", 8.0);

    b.family(Some(Flac))
        .codec("flac:codec", AudioCodec, HasAudio)
        .rule("flac:codec", CodecName, Coercion::Codec)
        .direct("streaminfo:channels", AudioChannels)
        .direct("streaminfo:sample-rate", SampleRate)
        .direct("streaminfo:bits-per-sample", BitsPerSample)
        .per_rate("streaminfo:total-samples", "streaminfo:sample-rate", 1.0)
        .rational("flac:average-bitrate", BitRate)
        .presence("flac:picture", HasArtwork);

    b.family(Some(Ogg))
        .codec("ogg:audio-codec", AudioCodec, HasAudio)
        .rule("ogg:audio-codec", CodecName, Coercion::Codec)
        .codec("ogg:video-codec", VideoCodec, HasVideo)
        .rule("ogg:video-codec", CodecName, Coercion::Codec)
        .direct("ogg:channels", AudioChannels)
        .direct("ogg:sample-rate", SampleRate)
        .direct("ogg:bits-per-sample", BitsPerSample)
        .direct("ogg:bitrate", BitRate)
        .rational("ogg:duration", DurationSeconds)
        .direct("ogg:stream-count", TrackCount)
        .direct("theora:width", Width)
        .direct("theora:height", Height)
        .rational("theora:frame-rate", FrameRate);

    b.rules
}
