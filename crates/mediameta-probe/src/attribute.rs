//! Canonical attribute vocabulary
//!
//! Every value the engine hands to a caller is one of these names with a
//! value of the name's declared type. The serialized names are stable so
//! downstream search facets stay consistent across releases.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declared type of a canonical attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Number,
    String,
    Boolean,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Number => write!(f, "number"),
            AttributeType::String => write!(f, "string"),
            AttributeType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Member of the fixed output vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeName {
    // Technical
    DurationSeconds,
    BitRate,
    CodecName,
    VideoCodec,
    AudioCodec,
    Width,
    Height,
    FrameRate,
    TrackCount,
    AudioChannels,
    SampleRate,
    BitsPerSample,
    HasVideo,
    HasAudio,
    HasArtwork,
    ContainerFormat,

    // Descriptive
    Title,
    Artist,
    Album,
    AlbumArtist,
    Composer,
    Genre,
    Comment,
    Copyright,
    Encoder,
    Language,
    Year,
    TrackNumber,
    TrackTotal,
    DiscNumber,
    DiscTotal,
    CreationDate,
    Compilation,
}

impl AttributeName {
    pub const ALL: [AttributeName; 33] = [
        AttributeName::DurationSeconds,
        AttributeName::BitRate,
        AttributeName::CodecName,
        AttributeName::VideoCodec,
        AttributeName::AudioCodec,
        AttributeName::Width,
        AttributeName::Height,
        AttributeName::FrameRate,
        AttributeName::TrackCount,
        AttributeName::AudioChannels,
        AttributeName::SampleRate,
        AttributeName::BitsPerSample,
        AttributeName::HasVideo,
        AttributeName::HasAudio,
        AttributeName::HasArtwork,
        AttributeName::ContainerFormat,
        AttributeName::Title,
        AttributeName::Artist,
        AttributeName::Album,
        AttributeName::AlbumArtist,
        AttributeName::Composer,
        AttributeName::Genre,
        AttributeName::Comment,
        AttributeName::Copyright,
        AttributeName::Encoder,
        AttributeName::Language,
        AttributeName::Year,
        AttributeName::TrackNumber,
        AttributeName::TrackTotal,
        AttributeName::DiscNumber,
        AttributeName::DiscTotal,
        AttributeName::CreationDate,
        AttributeName::Compilation,
    ];

    /// The stable serialized name.
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeName::DurationSeconds => "duration-seconds",
            AttributeName::BitRate => "bit-rate",
            AttributeName::CodecName => "codec-name",
            AttributeName::VideoCodec => "video-codec",
            AttributeName::AudioCodec => "audio-codec",
            AttributeName::Width => "width",
            AttributeName::Height => "height",
            AttributeName::FrameRate => "frame-rate",
            AttributeName::TrackCount => "track-count",
            AttributeName::AudioChannels => "audio-channels",
            AttributeName::SampleRate => "sample-rate",
            AttributeName::BitsPerSample => "bits-per-sample",
            AttributeName::HasVideo => "has-video",
            AttributeName::HasAudio => "has-audio",
            AttributeName::HasArtwork => "has-artwork",
            AttributeName::ContainerFormat => "container-format",
            AttributeName::Title => "title",
            AttributeName::Artist => "artist",
            AttributeName::Album => "album",
            AttributeName::AlbumArtist => "album-artist",
            AttributeName::Composer => "composer",
            AttributeName::Genre => "genre",
            AttributeName::Comment => "comment",
            AttributeName::Copyright => "copyright",
            AttributeName::Encoder => "encoder",
            AttributeName::Language => "language",
            AttributeName::Year => "year",
            AttributeName::TrackNumber => "track-number",
            AttributeName::TrackTotal => "track-total",
            AttributeName::DiscNumber => "disc-number",
            AttributeName::DiscTotal => "disc-total",
            AttributeName::CreationDate => "creation-date",
            AttributeName::Compilation => "compilation",
        }
    }

    pub fn attribute_type(self) -> AttributeType {
        use AttributeName::*;
        match self {
            DurationSeconds | BitRate | Width | Height | FrameRate | TrackCount | AudioChannels
            | SampleRate | BitsPerSample | Year | TrackNumber | TrackTotal | DiscNumber
            | DiscTotal => AttributeType::Number,
            HasVideo | HasAudio | HasArtwork | Compilation => AttributeType::Boolean,
            CodecName | VideoCodec | AudioCodec | ContainerFormat | Title | Artist | Album
            | AlbumArtist | Composer | Genre | Comment | Copyright | Encoder | Language
            | CreationDate => AttributeType::String,
        }
    }

    /// Duration-like attributes resolve duplicates by keeping the larger value.
    pub fn is_duration_like(self) -> bool {
        matches!(self, AttributeName::DurationSeconds)
    }

    /// Number attributes that are whole counts rather than measurements.
    pub fn is_integral(self) -> bool {
        use AttributeName::*;
        matches!(
            self,
            Width
                | Height
                | TrackCount
                | AudioChannels
                | SampleRate
                | BitsPerSample
                | Year
                | TrackNumber
                | TrackTotal
                | DiscNumber
                | DiscTotal
        )
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttributeName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown attribute `{s}`"))
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    String(String),
    Boolean(bool),
}

impl AttributeValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::Number(_) => AttributeType::Number,
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Boolean(_) => AttributeType::Boolean,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(v) => write!(f, "{v}"),
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// A name with its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalAttribute {
    pub name: AttributeName,
    pub value: AttributeValue,
}

/// The attributes recovered by one extraction. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<AttributeName, AttributeValue>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: AttributeName) -> Option<&AttributeValue> {
        self.0.get(&name)
    }

    pub fn contains(&self, name: AttributeName) -> bool {
        self.0.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CanonicalAttribute> + '_ {
        self.0.iter().map(|(name, value)| CanonicalAttribute {
            name: *name,
            value: value.clone(),
        })
    }

    pub(crate) fn insert(&mut self, name: AttributeName, value: AttributeValue) {
        self.0.insert(name, value);
    }

    /// Copy every attribute into a caller-owned sink.
    pub fn write_to(&self, sink: &mut dyn AttributeSink) {
        for (name, value) in &self.0 {
            sink.set(*name, value.clone());
        }
    }
}

/// Caller-owned destination for extracted attributes.
pub trait AttributeSink {
    fn set(&mut self, name: AttributeName, value: AttributeValue);
}

impl AttributeSink for BTreeMap<String, AttributeValue> {
    fn set(&mut self, name: AttributeName, value: AttributeValue) {
        self.insert(name.as_str().to_string(), value);
    }
}

impl AttributeSink for HashMap<String, AttributeValue> {
    fn set(&mut self, name: AttributeName, value: AttributeValue) {
        self.insert(name.as_str().to_string(), value);
    }
}

impl AttributeSink for AttributeSet {
    fn set(&mut self, name: AttributeName, value: AttributeValue) {
        self.insert(name, value);
    }
}
