//! Field extraction from OCR text.

use tracing::debug;

use crate::models::record::{Field, FieldCandidates};

use super::rules::{fuel_code, model_after_plate, PatternTable, RECEIPT_PATTERNS};

/// Upper-case, collapse whitespace runs to one space, trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Regex field extractor over a [`PatternTable`].
#[derive(Debug, Clone, Copy)]
pub struct RegexExtractor<'a> {
    table: &'a PatternTable,
}

impl RegexExtractor<'static> {
    /// Extractor over the built-in receipt table.
    pub fn receipt() -> Self {
        Self {
            table: &RECEIPT_PATTERNS,
        }
    }
}

impl Default for RegexExtractor<'static> {
    fn default() -> Self {
        Self::receipt()
    }
}

impl<'a> RegexExtractor<'a> {
    pub fn with_table(table: &'a PatternTable) -> Self {
        Self { table }
    }

    /// Extract every field from raw OCR text.
    ///
    /// Each field gets one entry: the first match, or `None` when no pattern
    /// matched. Extra keys are only emitted when they match. The vehicle model
    /// is looked up after the plate, anchored on the plate text.
    pub fn extract(&self, text: &str) -> FieldCandidates {
        let text = normalize_text(text);
        let mut candidates = FieldCandidates::new();
        let mut plate = None;

        for rule in self.table.rules() {
            let found = rule.find(&text);

            match rule.field {
                Some(Field::FuelType) => {
                    candidates.push(rule.key.as_str(), found.map(fuel_code));
                }
                Some(field) => {
                    if field == Field::Plate {
                        plate = found;
                    }
                    candidates.push(rule.key.as_str(), found.map(str::to_string));
                }
                None => {
                    if let Some(value) = found {
                        candidates.push(rule.key.as_str(), value);
                    }
                }
            }

            if let Some(value) = found {
                debug!("Matched {} = {}", rule.key, value);
            }
        }

        let model = plate.and_then(|p| model_after_plate(&text, p));
        candidates.push_field(Field::VehicleModel, model);

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::RecordMerger;
    use crate::models::record::RawValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  placa:\n\tfei6365   onix "), "PLACA: FEI6365 ONIX");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_every_field_has_an_entry() {
        let candidates = RegexExtractor::receipt().extract("nada aqui");
        for field in Field::ALL {
            assert_eq!(candidates.get(field), Some(&RawValue::Null), "{field}");
        }
    }

    #[test]
    fn test_series_does_not_become_document_number() {
        let text = "SERIE: 1234 VALOR TOTAL: R$ 134,58 PLACA: FEI6365";
        let candidates = RegexExtractor::receipt().extract(text);

        assert!(candidates.get(Field::DocumentNumber).unwrap().is_null());
        assert_eq!(candidates.get(Field::TotalPrice), Some(&RawValue::from("134,58")));

        let mut merger = RecordMerger::new("nota.pdf");
        merger.merge(&candidates);
        let record = merger.finish();

        assert_eq!(record.document_number, None);
        assert_eq!(record.total_price.as_deref(), Some("134.58"));
        assert_eq!(record.plate.as_deref(), Some("FEI6365"));
        assert_eq!(record.extra.get("numero_serie").map(String::as_str), Some("1234"));
    }

    #[test]
    fn test_full_receipt_text() {
        let text = "POSTO EXEMPLO LTDA\n\
                    NF-E Nº 8412 SÉRIE 1\n\
                    EMISSÃO: 05/06/2025 10:42:10\n\
                    PRODUTO: DIESEL S10\n\
                    QTDE: 40,000 VL. UNIT: R$ 6,190\n\
                    VALOR TOTAL: R$ 247,60\n\
                    DADOS ADICIONAIS\n\
                    placa: abc1d23 amarok km: 120345\n\
                    MOTORISTA: FULANO";
        let candidates = RegexExtractor::receipt().extract(text);

        let get = |f: Field| match candidates.get(f) {
            Some(RawValue::Text(s)) => Some(s.as_str()),
            _ => None,
        };

        assert_eq!(get(Field::DocumentNumber), Some("8412"));
        assert_eq!(get(Field::DocumentDate), Some("05/06/2025"));
        assert_eq!(get(Field::DocumentTime), Some("10:42"));
        assert_eq!(get(Field::FuelType), Some("DS"));
        assert_eq!(get(Field::Quantity), Some("40,000"));
        assert_eq!(get(Field::UnitPrice), Some("6,190"));
        assert_eq!(get(Field::TotalPrice), Some("247,60"));
        assert_eq!(get(Field::Plate), Some("ABC1D23"));
        assert_eq!(get(Field::Odometer), Some("120345"));
        assert_eq!(get(Field::VehicleModel), Some("AMAROK"));
    }

    #[test]
    fn test_model_requires_plate() {
        let candidates = RegexExtractor::receipt().extract("MODELO AMAROK KM 1000");
        assert!(candidates.get(Field::VehicleModel).unwrap().is_null());
    }

    #[test]
    fn test_custom_table() {
        let numbers: &[&str] = &[r"PEDIDO (\d+)"];
        let table = PatternTable::from_rules(&[("numero_documento", numbers)]).unwrap();
        let candidates = RegexExtractor::with_table(&table).extract("pedido 991");

        assert_eq!(candidates.get(Field::DocumentNumber), Some(&RawValue::from("991")));
        assert!(candidates.get(Field::VehicleModel).unwrap().is_null());
    }
}
