//! Manual-review flags and advisory consistency checks.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::error::{AbasteceError, Result};
use crate::models::config::ReviewConfig;
use crate::models::record::ExtractedRecord;

/// Default confidence below which a record needs review.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Decides whether a record needs a human look.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPolicy {
    pub threshold: f64,
    pub total_tolerance: Decimal,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            total_tolerance: Decimal::new(5, 2),
        }
    }
}

/// Result of [`ReviewPolicy::assess`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewVerdict {
    pub needs_review: bool,
    /// Parsed confidence, when present and numeric.
    pub confidence: Option<f64>,
    pub message: Option<String>,
}

impl ReviewPolicy {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Result<Self> {
        let total_tolerance = Decimal::from_str(config.total_tolerance.trim()).map_err(|e| {
            AbasteceError::Config(format!(
                "review.total_tolerance '{}': {}",
                config.total_tolerance, e
            ))
        })?;

        Ok(Self {
            threshold: config.confidence_threshold,
            total_tolerance,
        })
    }

    /// Flag records whose self-reported confidence is below the threshold.
    ///
    /// Missing or unparseable confidence never flags.
    pub fn assess(&self, record: &ExtractedRecord) -> ReviewVerdict {
        let confidence = record.confidence.as_deref().and_then(parse_confidence);

        match confidence {
            Some(value) if value < self.threshold => {
                let message = format!(
                    "Atenção: a IA está com incerteza alta ({}) para o arquivo '{}' \
                     (Número do Documento: {}). Revise manualmente este arquivo.",
                    record.confidence.as_deref().unwrap_or_default(),
                    record.source_file,
                    record.document_number.as_deref().unwrap_or("-"),
                );
                warn!("{}", message);
                ReviewVerdict {
                    needs_review: true,
                    confidence,
                    message: Some(message),
                }
            }
            _ => ReviewVerdict {
                needs_review: false,
                confidence,
                message: None,
            },
        }
    }

    /// Advisory notes about values that do not add up.
    pub fn advisories(&self, record: &ExtractedRecord) -> Vec<String> {
        let mut notes = Vec::new();
        notes.extend(check_totals(record, self.total_tolerance));
        notes.extend(check_date(record));
        notes.extend(check_time(record));
        notes
    }
}

/// Parse a confidence value, accepting a decimal comma.
pub fn parse_confidence(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

/// Compare `quantidade * valor_unitario` with `valor_total`.
///
/// Returns a note when they differ by more than `tolerance`. Missing or
/// unparseable numbers skip the check.
pub fn check_totals(record: &ExtractedRecord, tolerance: Decimal) -> Option<String> {
    let quantity = parse_decimal(record.quantity.as_deref()?)?;
    let unit_price = parse_decimal(record.unit_price.as_deref()?)?;
    let total = parse_decimal(record.total_price.as_deref()?)?;

    let expected = quantity.checked_mul(unit_price)?;
    if expected.checked_sub(total)?.abs() <= tolerance {
        return None;
    }

    Some(format!(
        "quantidade x valor_unitario = {} difere de valor_total = {}",
        expected.round_dp(2),
        total
    ))
}

/// Note for a document date that is not a `DD/MM/YYYY` calendar date.
pub fn check_date(record: &ExtractedRecord) -> Option<String> {
    let date = record.document_date.as_deref()?;
    match NaiveDate::parse_from_str(date, "%d/%m/%Y") {
        Ok(_) => None,
        Err(_) => Some(format!("data_documento '{}' não é uma data DD/MM/AAAA válida", date)),
    }
}

/// Note for a document time that is not `HH:MM`.
pub fn check_time(record: &ExtractedRecord) -> Option<String> {
    let time = record.document_time.as_deref()?;
    match NaiveTime::parse_from_str(time, "%H:%M") {
        Ok(_) => None,
        Err(_) => Some(format!("hora_documento '{}' não é um horário HH:MM válido", time)),
    }
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn with_confidence(confidence: Option<&str>) -> ExtractedRecord {
        let mut record = ExtractedRecord::new("nota_01.pdf");
        record.document_number = Some("8412".to_string());
        record.confidence = confidence.map(str::to_string);
        record
    }

    #[test]
    fn test_confidence_threshold() {
        let policy = ReviewPolicy::default();

        assert!(!policy.assess(&with_confidence(Some("0.95"))).needs_review);
        assert!(policy.assess(&with_confidence(Some("0,5"))).needs_review);
        assert!(!policy.assess(&with_confidence(Some("abc"))).needs_review);
        assert!(!policy.assess(&with_confidence(None)).needs_review);
        assert!(!policy.assess(&with_confidence(Some("0.8"))).needs_review);
    }

    #[test]
    fn test_review_message_names_file_and_document() {
        let verdict = ReviewPolicy::default().assess(&with_confidence(Some("0.42")));
        let message = verdict.message.unwrap();

        assert!(message.contains("nota_01.pdf"));
        assert!(message.contains("8412"));
        assert_eq!(verdict.confidence, Some(0.42));
    }

    #[test]
    fn test_parse_confidence() {
        assert_eq!(parse_confidence(" 0,75 "), Some(0.75));
        assert_eq!(parse_confidence("1"), Some(1.0));
        assert_eq!(parse_confidence("ALTA"), None);
    }

    #[test]
    fn test_totals_within_tolerance() {
        let mut record = ExtractedRecord::new("a.pdf");
        record.quantity = Some("22.850".to_string());
        record.unit_price = Some("5.890".to_string());
        record.total_price = Some("134.59".to_string());

        // 22.850 * 5.890 = 134.5865
        assert_eq!(check_totals(&record, Decimal::new(5, 2)), None);

        record.total_price = Some("150.00".to_string());
        let note = check_totals(&record, Decimal::new(5, 2)).unwrap();
        assert!(note.contains("134.59"));
        assert!(note.contains("150.00"));
    }

    #[test]
    fn test_totals_skipped_when_incomplete() {
        let mut record = ExtractedRecord::new("a.pdf");
        record.quantity = Some("10".to_string());
        record.total_price = Some("99.00".to_string());
        assert_eq!(check_totals(&record, Decimal::ONE), None);

        record.unit_price = Some("ABC".to_string());
        assert_eq!(check_totals(&record, Decimal::ONE), None);
    }

    #[test]
    fn test_totals_skipped_on_decimal_overflow() {
        let mut record = ExtractedRecord::new("a.pdf");
        record.quantity = Some(Decimal::MAX.to_string());
        record.unit_price = Some("1".to_string());
        record.total_price = Some(Decimal::MIN.to_string());

        assert_eq!(check_totals(&record, Decimal::ONE), None);
    }

    #[test]
    fn test_date_and_time_checks() {
        let mut record = ExtractedRecord::new("a.pdf");
        record.document_date = Some("05/06/2025".to_string());
        record.document_time = Some("10:42".to_string());
        assert!(ReviewPolicy::default().advisories(&record).is_empty());

        record.document_date = Some("31/02/2025".to_string());
        record.document_time = Some("25:10".to_string());
        assert_eq!(ReviewPolicy::default().advisories(&record).len(), 2);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = ReviewConfig::default();
        let policy = ReviewPolicy::from_config(&config).unwrap();
        assert_eq!(policy, ReviewPolicy::default());

        config.total_tolerance = "muito".to_string();
        assert!(matches!(
            ReviewPolicy::from_config(&config),
            Err(AbasteceError::Config(_))
        ));
    }
}
