//! Extraction configuration.
//!
//! [`Config`] is deserialized from JSON and carries the resource [`Limits`]
//! plus any extra mapping rules. Every field defaults sensibly so a
//! completely empty `{}` document is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mapper::{MappingRule, MappingTable};

/// Smallest suffix that still holds an ID3v1 trailer.
const ID3V1_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    /// Rules appended to the built-in mapping table.
    pub rules: Vec<MappingRule>,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file, failing on unreadable or invalid input.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Build the mapping table: built-in rules followed by configured ones.
    pub fn mapping_table(&self) -> MappingTable {
        let mut table = MappingTable::builtin();
        table.extend(self.rules.iter().cloned());
        table
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.limits.validate();

        for (i, rule) in self.rules.iter().enumerate() {
            if rule.key.trim().is_empty() {
                warnings.push(format!("rules[{i}].key is empty"));
            }
            if let Some(problem) = rule.coercion.check_target(rule.target) {
                warnings.push(format!("rules[{i}] ({}): {problem}", rule.key));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Resource bounds applied to every extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Wall-clock budget for one extraction, in milliseconds.
    pub time_budget_ms: u64,
    /// Maximum element nesting depth a parser will enter.
    pub max_depth: usize,
    /// Maximum raw records kept per extraction.
    pub max_records: usize,
    /// Maximum localized parse issues kept per extraction.
    pub max_issues: usize,
    /// Largest single read a parser may request.
    pub max_payload_bytes: usize,
    /// Text values are cut to this many characters.
    pub max_text_chars: usize,
    /// Byte values (cover art and similar) are cut to this many bytes.
    pub max_bytes_value: usize,
    /// Prefix length inspected by the sniffer.
    pub sniff_prefix_bytes: usize,
    /// Suffix length inspected by the sniffer.
    pub sniff_suffix_bytes: usize,
    /// Tail length scanned for the last Ogg page.
    pub ogg_tail_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            time_budget_ms: 5_000,
            max_depth: 16,
            max_records: 4_096,
            max_issues: 64,
            max_payload_bytes: 1024 * 1024,
            max_text_chars: 4_096,
            max_bytes_value: 64,
            sniff_prefix_bytes: 512,
            sniff_suffix_bytes: ID3V1_LEN,
            ogg_tail_bytes: 64 * 1024,
        }
    }
}

impl Limits {
    /// The wall-clock budget as a [`Duration`].
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.time_budget_ms == 0 {
            warnings.push("limits.time_budget_ms is 0; every extraction will time out".into());
        }
        if self.max_depth < 4 {
            warnings.push(format!(
                "limits.max_depth {} is too shallow to reach track metadata",
                self.max_depth
            ));
        }
        if self.max_records == 0 {
            warnings.push("limits.max_records is 0; no metadata can be recorded".into());
        }
        if self.max_payload_bytes < 4096 {
            warnings.push(format!(
                "limits.max_payload_bytes {} is smaller than typical header blocks",
                self.max_payload_bytes
            ));
        }
        if self.sniff_prefix_bytes < 16 {
            warnings.push("limits.sniff_prefix_bytes must be at least 16".into());
        }
        if self.sniff_suffix_bytes < ID3V1_LEN {
            warnings.push(format!(
                "limits.sniff_suffix_bytes below {ID3V1_LEN} disables ID3v1 detection"
            ));
        }

        warnings
    }
}
