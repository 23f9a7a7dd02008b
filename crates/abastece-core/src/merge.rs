//! Merging candidate values from several regions into one record.
//!
//! Regions are processed in order and the first usable value for a key wins.
//! Later values for the same key are reported as duplicates and dropped.

use tracing::{debug, trace};

use crate::models::record::{ExtractedRecord, Field, FieldCandidates, RawValue, CONFIDENCE_KEY};
use crate::normalize::normalize_field;

/// What happened to one offered value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Stored; carries the normalized value.
    Accepted(String),
    /// The slot already had a value.
    Duplicate,
    /// Null, blank, the literal `null`, or nothing left after normalization.
    Skipped,
}

/// Counts for one [`RecordMerger::merge`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub accepted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Accumulates candidates into a record, first writer wins.
#[derive(Debug, Clone)]
pub struct RecordMerger {
    record: ExtractedRecord,
}

impl RecordMerger {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            record: ExtractedRecord::new(source_file),
        }
    }

    /// Offer one key/value pair.
    pub fn offer(&mut self, key: &str, value: &RawValue) -> MergeOutcome {
        if is_absent(value) {
            return MergeOutcome::Skipped;
        }

        let field = Field::from_key(key);
        let Some(mut normalized) = normalize_field(field, value) else {
            trace!("Nothing left of {} after normalization", key);
            return MergeOutcome::Skipped;
        };

        if field == Some(Field::Plate) {
            normalized.retain(|c| !c.is_whitespace());
            if normalized.is_empty() {
                return MergeOutcome::Skipped;
            }
        }

        let slot = if key.trim().eq_ignore_ascii_case(CONFIDENCE_KEY) {
            &mut self.record.confidence
        } else if let Some(field) = field {
            self.record.slot_mut(field)
        } else {
            let key = key.trim().to_string();
            if self.record.extra.contains_key(&key) {
                return MergeOutcome::Duplicate;
            }
            debug!("Keeping extra key {} = {}", key, normalized);
            self.record.extra.insert(key, normalized.clone());
            return MergeOutcome::Accepted(normalized);
        };

        if slot.is_some() {
            return MergeOutcome::Duplicate;
        }

        debug!("{} = {}", key, normalized);
        *slot = Some(normalized.clone());
        MergeOutcome::Accepted(normalized)
    }

    /// Offer every candidate in order.
    pub fn merge(&mut self, candidates: &FieldCandidates) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for (key, value) in candidates.iter() {
            match self.offer(key, value) {
                MergeOutcome::Accepted(_) => summary.accepted += 1,
                MergeOutcome::Duplicate => summary.duplicates += 1,
                MergeOutcome::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Attach an operator-facing note.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.record.warnings.push(message.into());
    }

    /// The record as merged so far.
    pub fn record(&self) -> &ExtractedRecord {
        &self.record
    }

    /// Finalize the record.
    pub fn finish(self) -> ExtractedRecord {
        self.record
    }
}

fn is_absent(value: &RawValue) -> bool {
    match value {
        RawValue::Null => true,
        RawValue::Number(_) => false,
        RawValue::Text(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("null")
        }
    }
}
