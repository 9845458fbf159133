//! # mediameta-probe
//!
//! Pure Rust media metadata extraction for desktop search indexing.
//!
//! Given a local file, the engine identifies its container, walks the
//! container's structure, and reports a flat set of canonical attributes
//! (duration, codecs, dimensions, tags and so on) into a caller-owned sink.
//!
//! ## Features
//!
//! - Container sniffing by magic bytes, never by file extension
//! - Parsers for ISO base media, RIFF (AVI, WAVE), AIFF, Matroska/WebM,
//!   MPEG audio with ID3, FLAC and Ogg (Vorbis, Opus, FLAC, Speex, Theora)
//! - Table-driven normalization into a fixed attribute vocabulary
//! - Hostile input is expected: damaged files yield partial results, never panics
//! - Per-extraction time budget and cooperative cancellation
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use mediameta_probe::{CancellationToken, ExtractionStatus};
//!
//! let mut attributes = BTreeMap::new();
//! let result = mediameta_probe::extract("song.flac", &mut attributes, &CancellationToken::new());
//!
//! println!("Container: {}", result.container.display_name());
//! if let ExtractionStatus::Failure(reason) = &result.status {
//!     println!("Failed: {reason:?}");
//! }
//! for (name, value) in &attributes {
//!     println!("{name}: {value}");
//! }
//! ```

pub mod attribute;
pub mod budget;
pub mod config;
pub mod container;
pub mod error;
pub mod extract;
pub mod mapper;
pub mod parser;
pub mod reader;
pub mod record;
pub mod sniff;

pub use attribute::{AttributeName, AttributeSet, AttributeSink, AttributeType, AttributeValue, CanonicalAttribute};
pub use config::{Config, Limits};
pub use container::ContainerKind;
pub use error::{Error, Interrupt, ParseError, Result};
pub use extract::{
    extract, ExtractionResult, ExtractionState, ExtractionStatus, Extractor, FailureReason, Inspection,
};
pub use mapper::{MappingRule, MappingTable};
pub use reader::{FileHandle, Locator};
pub use record::{RawRecord, RawValue};
pub use tokio_util::sync::CancellationToken;
