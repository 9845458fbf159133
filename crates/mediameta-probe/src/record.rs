//! Raw metadata records produced by the format parsers.

use std::fmt;

use serde::Serialize;

/// Decoded payload of a raw record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum RawValue {
    Integer(i64),
    Rational { num: i64, den: i64 },
    Text(String),
    Bytes(Vec<u8>),
    Boolean(bool),
}

/// Discriminant of a [`RawValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Rational,
    Text,
    Bytes,
    Boolean,
}

impl RawValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            RawValue::Integer(_) => ValueKind::Integer,
            RawValue::Rational { .. } => ValueKind::Rational,
            RawValue::Text(_) => ValueKind::Text,
            RawValue::Bytes(_) => ValueKind::Bytes,
            RawValue::Boolean(_) => ValueKind::Boolean,
        }
    }

    /// Numeric view of integer and rational values. A zero denominator has
    /// no numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            RawValue::Integer(v) => Some(v as f64),
            RawValue::Rational { num, den } if den != 0 => Some(num as f64 / den as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Integer(v) => write!(f, "{v}"),
            RawValue::Rational { num, den } => write!(f, "{num}/{den}"),
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            RawValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// One `(key, value)` pair recovered from a container structure.
///
/// Keys are namespaced by the structure that produced them, for example
/// `mvhd:duration`, `id3:TIT2` or `vorbis:TITLE`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    pub key: String,
    #[serde(flatten)]
    pub value: RawValue,
}

impl RawRecord {
    pub fn new(key: impl Into<String>, value: RawValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn integer(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, RawValue::Integer(value))
    }

    pub fn rational(key: impl Into<String>, num: i64, den: i64) -> Self {
        Self::new(key, RawValue::Rational { num, den })
    }

    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, RawValue::Text(value.into()))
    }
}
