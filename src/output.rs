//! Terminal and JSON rendering for the CLI.

use mediameta_probe::{
    AttributeName, AttributeType, ExtractionResult, ExtractionStatus, FailureReason, Inspection,
};
use serde::Serialize;

/// One extracted file, as written by `extract --json`.
#[derive(Serialize)]
pub struct FileReport<'a> {
    pub file: &'a str,
    #[serde(flatten)]
    pub result: &'a ExtractionResult,
}

#[derive(Serialize)]
pub struct VocabEntry {
    pub name: AttributeName,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

pub fn status_label(status: &ExtractionStatus) -> String {
    match status {
        ExtractionStatus::Success => "success".to_string(),
        ExtractionStatus::PartialSuccess => "partial".to_string(),
        ExtractionStatus::Failure(FailureReason::Timeout) => "failed (timeout)".to_string(),
        ExtractionStatus::Failure(FailureReason::Io(message)) => format!("failed ({message})"),
    }
}

pub fn print_result(file: &str, result: &ExtractionResult) {
    println!("File: {file}");
    println!("Container: {}", result.container.display_name());
    println!("Status: {}", status_label(&result.status));

    if !result.attributes.is_empty() {
        println!("\nAttributes: {}", result.attributes.len());
        for attr in result.attributes.iter() {
            println!("  {:<18} {}", attr.name.as_str(), attr.value);
        }
    }

    if !result.notes.is_empty() {
        println!("\nNotes:");
        for note in &result.notes {
            println!("  - {note}");
        }
    }
}

pub fn print_inspection(file: &str, inspection: &Inspection) {
    println!("File: {file}");
    println!("Container: {}", inspection.container.display_name());
    println!("\nRecords: {}", inspection.records.len());
    for record in &inspection.records {
        println!("  {} = {}", record.key, record.value);
    }
    if !inspection.notes.is_empty() {
        println!("\nNotes:");
        for note in &inspection.notes {
            println!("  - {note}");
        }
    }
}

pub fn vocabulary() -> Vec<VocabEntry> {
    AttributeName::ALL
        .iter()
        .map(|&name| VocabEntry {
            name,
            attribute_type: name.attribute_type(),
        })
        .collect()
}

pub fn print_vocabulary() {
    for entry in vocabulary() {
        println!("{:<18} {}", entry.name.as_str(), entry.attribute_type);
    }
}
