//! Attribute mapper
//!
//! Normalizes raw records into the canonical vocabulary. The mapping is
//! driven entirely by a [`MappingTable`]: every record key is looked up, each
//! matching rule coerces the value for its target, and values that do not fit
//! the target's type or range are dropped.

mod coerce;
mod codec;
mod genre;
mod rules;

pub use coerce::{Coercion, Epoch, FractionPart};
pub use codec::codec_name;
pub use rules::{MappingRule, MappingTable};

use crate::attribute::{AttributeName, AttributeSet, AttributeValue};
use crate::budget::Budget;
use crate::container::ContainerKind;
use crate::error::Interrupt;
use crate::record::RawRecord;

use coerce::{sane_number, Latest};

/// Map every record with no time bound.
pub fn map_records(kind: ContainerKind, records: &[RawRecord], table: &MappingTable) -> AttributeSet {
    map_records_within(kind, records, table, &Budget::unlimited()).0
}

/// Map records, checking `budget` before each one. On interruption the
/// attributes mapped so far are returned with the reason.
pub fn map_records_within(
    kind: ContainerKind,
    records: &[RawRecord],
    table: &MappingTable,
    budget: &Budget,
) -> (AttributeSet, Option<Interrupt>) {
    let latest: Latest<'_> = records.iter().map(|r| (r.key.as_str(), &r.value)).collect();
    let mut set = AttributeSet::new();

    for record in records {
        if let Err(interrupt) = budget.check() {
            return (set, Some(interrupt));
        }

        let rules = table.rules_for(kind, &record.key);
        if rules.is_empty() {
            tracing::trace!(key = %record.key, "no mapping rule; record dropped");
            continue;
        }

        for rule in rules {
            match rule
                .coercion
                .apply(&record.value, rule.target, &latest)
                .and_then(|value| validate(rule.target, value))
            {
                Some(value) => merge(&mut set, rule.target, value),
                None => tracing::trace!(
                    key = %record.key,
                    target = %rule.target,
                    value = %record.value,
                    "mapper skip"
                ),
            }
        }
    }

    (set, None)
}

/// Enforce the target's declared type and numeric range.
fn validate(target: AttributeName, value: AttributeValue) -> Option<AttributeValue> {
    if value.attribute_type() != target.attribute_type() {
        return None;
    }
    match value {
        AttributeValue::Number(n) => sane_number(target, n).map(AttributeValue::Number),
        other => Some(other),
    }
}

/// Later values win, except duration-like attributes keep the larger value.
fn merge(set: &mut AttributeSet, name: AttributeName, value: AttributeValue) {
    if name.is_duration_like() {
        if let (Some(old), Some(new)) = (set.get(name).and_then(AttributeValue::as_f64), value.as_f64()) {
            if old >= new {
                return;
            }
        }
    }
    set.insert(name, value);
}
