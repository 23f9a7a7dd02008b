//! Rule-based field extraction from OCR text.

pub mod rules;
pub mod text;

pub use rules::{fuel_code, model_after_plate, FieldRule, PatternTable, RECEIPT_PATTERNS, SERIES_KEY};
pub use text::{normalize_text, RegexExtractor};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}
