//! Value coercions from raw records to canonical attribute values.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{codec, genre};
use crate::attribute::{AttributeName, AttributeType, AttributeValue};
use crate::record::RawValue;

/// Seconds between 1904-01-01 (QuickTime epoch) and 1970-01-01.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;
/// Seconds between 1970-01-01 and 2001-01-01 (Matroska epoch).
const MATROSKA_EPOCH_OFFSET: i64 = 978_307_200;

/// Largest integer an `f64` represents exactly.
pub const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

/// Latest value per raw key within one extraction.
pub(crate) type Latest<'r> = HashMap<&'r str, &'r RawValue>;

/// Which side of an `"n/m"` pair to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FractionPart {
    Number,
    Total,
}

/// Reference point of a numeric timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Epoch {
    /// Seconds since 1904-01-01 (QuickTime, ISO media).
    Mac1904,
    /// Nanoseconds since 2001-01-01 (Matroska `DateUTC`).
    Matroska2001,
    /// Seconds since 1970-01-01.
    Unix,
    /// Free-form date text.
    Text,
}

/// How a raw value becomes an attribute value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Coercion {
    /// Same value, converted to the target's type.
    #[default]
    Direct,
    /// `num / den`.
    Rational,
    /// Numeric value times `factor`.
    Scale { factor: f64 },
    /// Numeric value times `factor`, divided by the value of `rate_key`.
    PerRate { rate_key: String, factor: f64 },
    /// Leading integer of a text value (`"3/12"` is 3, `"2004-05-01"` is 2004).
    LeadingInteger,
    /// One side of an `"n/m"` text value.
    Fraction { part: FractionPart },
    /// Codec identifier to display name.
    Codec,
    /// ID3 genre reference or free text.
    Genre,
    /// ISO 639 language code; `und` is dropped.
    Language,
    /// Timestamp to an ISO-8601 UTC string.
    Timestamp { epoch: Epoch },
    /// Any non-empty value becomes `true`.
    Presence,
}

impl Coercion {
    /// Type this coercion produces, or `None` when it follows the target.
    fn output_type(&self) -> Option<AttributeType> {
        match self {
            Coercion::Direct => None,
            Coercion::Rational
            | Coercion::Scale { .. }
            | Coercion::PerRate { .. }
            | Coercion::LeadingInteger
            | Coercion::Fraction { .. } => Some(AttributeType::Number),
            Coercion::Codec | Coercion::Genre | Coercion::Language | Coercion::Timestamp { .. } => {
                Some(AttributeType::String)
            }
            Coercion::Presence => Some(AttributeType::Boolean),
        }
    }

    /// Describe why this coercion cannot feed `target`, if it cannot.
    pub fn check_target(&self, target: AttributeName) -> Option<String> {
        if let Coercion::PerRate { rate_key, .. } = self {
            if rate_key.trim().is_empty() {
                return Some("per-rate coercion needs a rate_key".to_string());
            }
        }
        match self.output_type() {
            Some(produced) if produced != target.attribute_type() => Some(format!(
                "coercion produces a {produced} but `{target}` is a {}",
                target.attribute_type()
            )),
            _ => None,
        }
    }

    /// Convert `value` for `target`. `None` means the value is dropped.
    pub(crate) fn apply(&self, value: &RawValue, target: AttributeName, latest: &Latest<'_>) -> Option<AttributeValue> {
        match self {
            Coercion::Direct => direct(value, target.attribute_type()),
            Coercion::Rational => number(value).map(AttributeValue::Number),
            Coercion::Scale { factor } => number(value).map(|v| AttributeValue::Number(v * factor)),
            Coercion::PerRate { rate_key, factor } => {
                let rate = latest.get(rate_key.as_str()).and_then(|r| number(r)).filter(|&r| r > 0.0)?;
                number(value).map(|v| AttributeValue::Number(v * factor / rate))
            }
            Coercion::LeadingInteger => leading_integer(value).map(AttributeValue::Number),
            Coercion::Fraction { part } => fraction(value, *part).map(AttributeValue::Number),
            Coercion::Codec => text(value).and_then(|t| codec::codec_name(&t)).map(AttributeValue::String),
            Coercion::Genre => genre_name(value).map(AttributeValue::String),
            Coercion::Language => language(value).map(AttributeValue::String),
            Coercion::Timestamp { epoch } => timestamp(value, *epoch).map(AttributeValue::String),
            Coercion::Presence => present(value).then_some(AttributeValue::Boolean(true)),
        }
    }
}

/// Check a numeric result against the representable range for `target`.
pub(crate) fn sane_number(target: AttributeName, value: f64) -> Option<f64> {
    if !value.is_finite() || value < 0.0 || value > MAX_EXACT {
        return None;
    }
    Some(if target.is_integral() { value.round() } else { value })
}

fn text(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Text(s) => {
            let s = s.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => None,
    }
}

/// Numeric view of a value; text is parsed.
fn number(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Text(_) => text(value)?.parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

fn direct(value: &RawValue, target: AttributeType) -> Option<AttributeValue> {
    match target {
        AttributeType::Number => number(value).map(AttributeValue::Number),
        AttributeType::String => match value {
            RawValue::Integer(v) => Some(AttributeValue::String(v.to_string())),
            _ => text(value).map(AttributeValue::String),
        },
        AttributeType::Boolean => match value {
            RawValue::Boolean(b) => Some(AttributeValue::Boolean(*b)),
            RawValue::Integer(v) => Some(AttributeValue::Boolean(*v != 0)),
            RawValue::Text(_) => match text(value)?.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(AttributeValue::Boolean(true)),
                "0" | "false" | "no" => Some(AttributeValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
    }
}

fn digits_prefix(s: &str) -> Option<f64> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse::<u64>().ok().map(|n| n as f64)
}

fn leading_integer(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Integer(v) => Some(*v as f64),
        _ => digits_prefix(&text(value)?),
    }
}

fn fraction(value: &RawValue, part: FractionPart) -> Option<f64> {
    if let RawValue::Integer(v) = value {
        return (part == FractionPart::Number).then_some(*v as f64);
    }
    let text = text(value)?;
    match part {
        FractionPart::Number => digits_prefix(&text),
        FractionPart::Total => digits_prefix(text.split_once('/')?.1.trim()),
    }
}

fn genre_name(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Integer(index) => genre::by_index(*index).map(str::to_string),
        _ => genre::resolve(&text(value)?),
    }
}

fn language(value: &RawValue) -> Option<String> {
    let code = text(value)?.to_ascii_lowercase();
    match code.as_str() {
        "und" | "mis" | "zxx" => None,
        _ => Some(code),
    }
}

fn iso8601(moment: DateTime<Utc>) -> String {
    moment.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn timestamp(value: &RawValue, epoch: Epoch) -> Option<String> {
    match (value, epoch) {
        (RawValue::Integer(0), Epoch::Mac1904 | Epoch::Unix) => None,
        (RawValue::Integer(secs), Epoch::Mac1904) => {
            DateTime::from_timestamp(secs.checked_sub(MAC_EPOCH_OFFSET)?, 0).map(iso8601)
        }
        (RawValue::Integer(nanos), Epoch::Matroska2001) => {
            let secs = nanos.div_euclid(1_000_000_000).checked_add(MATROSKA_EPOCH_OFFSET)?;
            DateTime::from_timestamp(secs, 0).map(iso8601)
        }
        (RawValue::Integer(secs), Epoch::Unix) => DateTime::from_timestamp(*secs, 0).map(iso8601),
        (RawValue::Text(_), _) => parse_date_text(&text(value)?).map(iso8601),
        _ => None,
    }
}

/// Dates as found in tags: RFC 3339, `YYYY-MM-DD[ hh:mm:ss]`, QuickTime's
/// `YYYY-MM-DDThh:mm:ss` without zone. Year-only values are not dates.
fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(moment) = DateTime::parse_from_rfc3339(text) {
        return Some(moment.with_timezone(&Utc));
    }
    let text = text.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn present(value: &RawValue) -> bool {
    match value {
        RawValue::Integer(v) => *v != 0,
        RawValue::Rational { num, .. } => *num != 0,
        RawValue::Text(_) => text(value).is_some(),
        RawValue::Bytes(b) => !b.is_empty(),
        RawValue::Boolean(b) => *b,
    }
}
