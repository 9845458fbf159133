//! Extraction orchestrator
//!
//! Drives one extraction through `Idle -> Sniffing -> Parsing -> Mapping ->
//! Done`, or into `Failed` from any stage. Whatever happens inside a parser,
//! the caller gets exactly one [`ExtractionResult`] and the file handle is
//! released.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::attribute::{AttributeSet, AttributeSink};
use crate::budget::Budget;
use crate::config::{Config, Limits};
use crate::container::ContainerKind;
use crate::error::{Error, Result};
use crate::mapper::{map_records_within, MappingTable};
use crate::parser::{self, ParseSession};
use crate::reader::{FileHandle, Locator};
use crate::record::RawRecord;
use crate::sniff;

/// Record key carrying the container's display name into the mapper.
const CONTAINER_KEY: &str = "container";

/// Stage of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Idle,
    Sniffing,
    Parsing,
    Mapping,
    Done,
    Failed,
}

/// Why an extraction produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The file could not be opened or read.
    Io(String),
    /// The time budget ran out or the caller cancelled.
    Timeout,
}

/// Outcome of one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum ExtractionStatus {
    /// Everything that was looked for was read cleanly.
    Success,
    /// Some structures were damaged; the attributes hold what was recovered.
    PartialSuccess,
    Failure(FailureReason),
}

/// Everything an extraction reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    #[serde(flatten)]
    pub status: ExtractionStatus,
    pub container: ContainerKind,
    pub attributes: AttributeSet,
    /// Localized problems that made the result partial. Diagnostic only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ExtractionResult {
    fn failure(reason: FailureReason, container: ContainerKind) -> Self {
        Self {
            status: ExtractionStatus::Failure(reason),
            container,
            attributes: AttributeSet::new(),
            notes: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractionStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ExtractionStatus::Failure(_))
    }
}

/// Raw parser output for one file, before mapping.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub container: ContainerKind,
    pub records: Vec<RawRecord>,
    pub notes: Vec<String>,
}

/// Tracks the current stage and logs transitions.
struct Progress<'a> {
    label: &'a str,
    state: ExtractionState,
}

impl Progress<'_> {
    fn enter(&mut self, next: ExtractionState) {
        tracing::debug!(path = %self.label, from = ?self.state, to = ?next, "extraction stage");
        self.state = next;
    }
}

/// Reusable extraction configuration: resource limits and the mapping table.
///
/// An `Extractor` holds no per-call state, so one instance can be shared by
/// any number of threads.
#[derive(Debug, Clone)]
pub struct Extractor {
    limits: Limits,
    table: MappingTable,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Limits::default(), MappingTable::builtin())
    }
}

impl Extractor {
    pub fn new(limits: Limits, table: MappingTable) -> Self {
        Self { limits, table }
    }

    /// Limits and mapping rules from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.limits.clone(), config.mapping_table())
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Extract the file at `locator`, writing attributes into `sink`.
    pub fn extract(
        &self,
        locator: &Locator,
        sink: &mut dyn AttributeSink,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        self.extract_path(locator.path(), sink, cancel)
    }

    pub fn extract_path(
        &self,
        path: &Path,
        sink: &mut dyn AttributeSink,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        match FileHandle::open(path) {
            Ok(handle) => self.extract_handle(handle, sink, cancel),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "open failed");
                ExtractionResult::failure(FailureReason::Io(e.to_string()), ContainerKind::Unknown)
            }
        }
    }

    /// Extract from an already opened handle, which is consumed and closed.
    pub fn extract_handle(
        &self,
        mut handle: FileHandle,
        sink: &mut dyn AttributeSink,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let budget = Budget::new(self.limits.time_budget(), cancel.clone());
        let result = self.run(&mut handle, &budget);
        handle.close();
        result.attributes.write_to(sink);
        result
    }

    /// Classify and parse without mapping.
    pub fn inspect(&self, locator: &Locator, cancel: &CancellationToken) -> Result<Inspection> {
        let mut handle = FileHandle::open(locator.path())?;
        let budget = Budget::new(self.limits.time_budget(), cancel.clone());
        let container = sniff::classify(&mut handle, &self.limits)?;

        let mut session = ParseSession::new(&mut handle, &self.limits, &budget);
        let outcome = parser::parse(container, &mut session);
        let (records, issues) = session.into_parts();
        let mut notes: Vec<String> = issues.iter().map(ToString::to_string).collect();
        match outcome {
            Ok(()) => {}
            Err(Error::Parse(e)) => notes.push(e.to_string()),
            Err(e) => return Err(e),
        }
        Ok(Inspection {
            container,
            records,
            notes,
        })
    }

    fn run(&self, handle: &mut FileHandle, budget: &Budget) -> ExtractionResult {
        let label = handle.label().to_string();
        let mut progress = Progress {
            label: &label,
            state: ExtractionState::Idle,
        };

        progress.enter(ExtractionState::Sniffing);
        if let Err(interrupt) = budget.check() {
            tracing::warn!(path = %label, %interrupt, "extraction interrupted before sniffing");
            progress.enter(ExtractionState::Failed);
            return ExtractionResult::failure(FailureReason::Timeout, ContainerKind::Unknown);
        }
        let kind = match sniff::classify(handle, &self.limits) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!(path = %label, error = %e, "sniffing failed");
                progress.enter(ExtractionState::Failed);
                return ExtractionResult::failure(FailureReason::Io(e.to_string()), ContainerKind::Unknown);
            }
        };
        tracing::debug!(path = %label, container = %kind, "classified");

        if kind == ContainerKind::Unknown {
            progress.enter(ExtractionState::Done);
            return ExtractionResult {
                status: ExtractionStatus::Success,
                container: kind,
                attributes: AttributeSet::new(),
                notes: Vec::new(),
            };
        }

        progress.enter(ExtractionState::Parsing);
        let mut session = ParseSession::new(handle, &self.limits, budget);
        let outcome = catch_unwind(AssertUnwindSafe(|| parser::parse(kind, &mut session)));
        let (parsed, issues) = session.into_parts();

        let mut notes: Vec<String> = issues.iter().map(ToString::to_string).collect();
        let mut timed_out = false;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(Error::Interrupted(interrupt))) => {
                tracing::warn!(path = %label, container = %kind, %interrupt, "extraction interrupted while parsing");
                timed_out = true;
            }
            Ok(Err(Error::Io(e))) => {
                tracing::debug!(path = %label, error = %e, "read failed while parsing");
                progress.enter(ExtractionState::Failed);
                return ExtractionResult::failure(FailureReason::Io(e.to_string()), kind);
            }
            Ok(Err(e)) => {
                tracing::debug!(path = %label, container = %kind, error = %e, "parser stopped early");
                notes.push(e.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(path = %label, container = %kind, panic = %message, "parser panicked; result contained");
                notes.push(format!("parser panicked: {message}"));
            }
        }

        progress.enter(ExtractionState::Mapping);
        let mut records = Vec::with_capacity(parsed.len() + 1);
        records.push(RawRecord::text(CONTAINER_KEY, kind.display_name()));
        records.extend(parsed);

        // Records completed before an interruption are still mapped
        let mapping_budget = if timed_out { Budget::unlimited() } else { budget.clone() };
        let (attributes, interrupt) = map_records_within(kind, &records, &self.table, &mapping_budget);
        if let Some(interrupt) = interrupt {
            tracing::warn!(path = %label, container = %kind, %interrupt, "extraction interrupted while mapping");
            timed_out = true;
        }

        let status = if timed_out {
            progress.enter(ExtractionState::Failed);
            ExtractionStatus::Failure(FailureReason::Timeout)
        } else if notes.is_empty() {
            progress.enter(ExtractionState::Done);
            ExtractionStatus::Success
        } else {
            progress.enter(ExtractionState::Done);
            ExtractionStatus::PartialSuccess
        };

        ExtractionResult {
            status,
            container: kind,
            attributes,
            notes,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Extract with default limits and the built-in mapping table.
///
/// `locator` is a filesystem path or a `file://` URL.
pub fn extract(locator: &str, sink: &mut dyn AttributeSink, cancel: &CancellationToken) -> ExtractionResult {
    match Locator::parse(locator) {
        Ok(locator) => Extractor::default().extract(&locator, sink, cancel),
        Err(e) => ExtractionResult::failure(FailureReason::Io(e.to_string()), ContainerKind::Unknown),
    }
}
