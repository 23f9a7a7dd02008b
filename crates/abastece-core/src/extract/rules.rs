//! Ordered regex rules for receipt fields.
//!
//! Patterns run against text already passed through
//! [`normalize_text`](super::text::normalize_text), so they only need to
//! handle upper case and single spaces. Within a rule, labeled patterns come
//! first and shape-based fallbacks last; the first pattern that matches wins.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ExtractionError;
use crate::models::record::Field;

use super::FieldExtractor;

/// Brazilian or plain decimal with two or three places.
const DECIMAL: &str = r"\d{1,3}(?:\.\d{3})+,\d{2,3}|\d+[.,]\d{2,3}";

/// Plate grammar: `ABC1234`, `ABC-1234` and Mercosul `ABC1D23`.
pub const PLATE: &str = r"[A-Z]{3}-?[0-9][A-Z0-9][0-9]{2}";

/// Extra key carrying the receipt series.
pub const SERIES_KEY: &str = "numero_serie";

/// Words that can follow a plate without being a vehicle model.
pub const MODEL_STOP_WORDS: [&str; 5] = ["KM", "OBS", "MOTORISTA", "PLACA", "MODELO"];

lazy_static! {
    /// Shared rule table for fuel receipts.
    pub static ref RECEIPT_PATTERNS: PatternTable = PatternTable::receipt().unwrap();
}

/// Ordered patterns for one output key.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Output key, a field key or an extra key.
    pub key: String,
    /// Known field, `None` for extra keys.
    pub field: Option<Field>,
    patterns: Vec<Regex>,
}

impl FieldRule {
    /// Compile a rule. The first capture group of each pattern is the value.
    pub fn new(key: impl Into<String>, patterns: &[&str]) -> Result<Self, ExtractionError> {
        let key = key.into();
        let compiled = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ExtractionError::Pattern {
                    field: key.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            field: Field::from_key(&key),
            key,
            patterns: compiled,
        })
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    /// First match in pattern order, with the matched capture text.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        })
    }
}

impl FieldExtractor for FieldRule {
    type Output = String;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.find(text).map(str::to_string)
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<String> = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let value = m.as_str().trim().to_string();
                    if !value.is_empty() && !results.contains(&value) {
                        results.push(value);
                    }
                }
            }
        }
        results
    }
}

/// Rule table mapping output keys to ordered patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rules: Vec<FieldRule>,
}

impl PatternTable {
    /// Compile a table from `(key, patterns)` pairs.
    pub fn from_rules(rules: &[(&str, &[&str])]) -> Result<Self, ExtractionError> {
        let rules = rules
            .iter()
            .map(|(key, patterns)| FieldRule::new(*key, patterns))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The built-in receipt table.
    pub fn receipt() -> Result<Self, ExtractionError> {
        let decimal = format!("(?:{DECIMAL})");
        let document_number: &[&str] = &[
            r"N[ÚU]MERO\s?(?:DO\s)?(?:DOCUMENTO|DOC\.?|NF-?E|NOTA)\s?:?\s?(\d{3,9})\b",
            r"\b(?:DOCUMENTO|DOC\.?|NF-?E|NOTA)\s?(?:N[º°O]?\.?\s?)?:?\s?(\d{3,9})\b",
            r"\b(8\d{3,4})\b",
        ];
        let document_date: &[&str] = &[
            r"(?:DATA|EMISS[ÃA]O)\s?(?:DE\s)?(?:EMISS[ÃA]O)?\s?:?\s?(\d{2}/\d{2}/\d{4})\b",
            r"\b(\d{2}/\d{2}/\d{4})\b",
        ];
        let document_time: &[&str] = &[
            r"HORA\s?(?:DE\s)?(?:EMISS[ÃA]O)?\s?:?\s?(\d{2}:\d{2})\b",
            r"\b(\d{2}:\d{2})(?::\d{2})?\b",
        ];
        let fuel_type: &[&str] = &[
            r"\b(DIESEL\s?-?S-?10|DIESEL\s?-?S-?500|DIESEL|GASOLINA|ETANOL)\b",
            r"(?:PRODUTO|COMBUST[ÍI]VEL|C[ÓO]D(?:IGO)?\.?)\s?:?\s?0*([345])\b",
        ];
        let quantity: &[&str] = &[
            r"QUANT\w*\.?\s?:?\s?(\d+(?:[.,]\d+)?)",
            r"QTDE?\.?\s?:?\s?(\d+(?:[.,]\d+)?)",
            r"(\d+(?:[.,]\d+)?)\s?(?:L|LT|LTS|LITROS?)\b",
        ];
        let unit_price = [
            format!(r"(?:VALOR|VL|V)\.?\s?UNIT\w*\.?\s?:?\s?(?:R\$)?\s?({decimal})"),
            format!(r"UNIT[ÁA]RIO\s?:?\s?(?:R\$)?\s?({decimal})"),
            format!(r"PRE[ÇC]O\s?(?:UNIT\w*)?\s?:?\s?(?:R\$)?\s?({decimal})"),
        ];
        let total_price = [
            format!(r"(?:VALOR|VL|V)\.?\s?TOTAL\s?(?:A\sPAGAR)?\s?:?\s?(?:R\$)?\s?({decimal})"),
            format!(r"TOTAL\s?:?\s?(?:R\$)?\s?({decimal})"),
        ];
        let plate = [
            format!(r"PLACA\s?:?\s?({PLATE})\b"),
            format!(r"\b({PLATE})\b"),
        ];
        let odometer: &[&str] = &[
            r"\bKM\s?:?\s?(\d+(?:[.,]\d+)?)",
            r"QUILOMETRAGEM\s?:?\s?(\d+(?:[.,]\d+)?)",
            r"(\d+(?:[.,]\d+)?)\s?KM\b",
        ];
        let series: &[&str] = &[r"S[ÉE]RIE\s?:?\s?(\d+)"];

        let unit_price: Vec<&str> = unit_price.iter().map(String::as_str).collect();
        let total_price: Vec<&str> = total_price.iter().map(String::as_str).collect();
        let plate: Vec<&str> = plate.iter().map(String::as_str).collect();

        Self::from_rules(&[
            (Field::DocumentNumber.key(), document_number),
            (Field::DocumentDate.key(), document_date),
            (Field::DocumentTime.key(), document_time),
            (Field::FuelType.key(), fuel_type),
            (Field::Quantity.key(), quantity),
            (Field::UnitPrice.key(), unit_price.as_slice()),
            (Field::TotalPrice.key(), total_price.as_slice()),
            (Field::Plate.key(), plate.as_slice()),
            (Field::Odometer.key(), odometer),
            (SERIES_KEY, series),
        ])
    }

    /// Rule for a known field.
    pub fn rule(&self, field: Field) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.field == Some(field))
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Reduce a fuel name or product code to the receipt code.
///
/// `3`, `DIESEL S500` and `DIESEL` map to `D`; `4` and `DIESEL S10` to `DS`;
/// `5` and `GASOLINA` to `G`; `ETANOL` to `E`. Anything else is returned
/// upper-cased as found.
pub fn fuel_code(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();

    let code = match compact.as_str() {
        "3" | "DIESELS500" | "DIESEL" => "D",
        "4" | "DIESELS10" => "DS",
        "5" | "GASOLINA" => "G",
        "ETANOL" => "E",
        _ => return raw.trim().to_uppercase(),
    };
    code.to_string()
}

/// Vehicle model following an already extracted plate.
///
/// Searches `PLACA: <plate> <words>` first, then `<plate> <words>`, and keeps
/// the first word when it is longer than two characters and not a label.
pub fn model_after_plate(text: &str, plate: &str) -> Option<String> {
    let escaped = regex::escape(plate);
    let anchored = [
        format!(r"PLACA\s?:?\s?{escaped}\s*([A-Z\s]+)"),
        format!(r"{escaped}\s*([A-Z\s]+)"),
    ];

    for pattern in &anchored {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::debug!("Skipping model pattern for plate {}: {}", plate, e);
                continue;
            }
        };

        if let Some(caps) = re.captures(text) {
            let word = caps[1].split_whitespace().next()?;
            if word.chars().count() > 2 && !MODEL_STOP_WORDS.contains(&word) {
                return Some(word.to_string());
            }
            return None;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn find(field: Field, text: &str) -> Option<String> {
        RECEIPT_PATTERNS.rule(field).unwrap().extract(text)
    }

    #[test]
    fn test_receipt_table_compiles() {
        assert_eq!(RECEIPT_PATTERNS.len(), 10);
        assert!(RECEIPT_PATTERNS.rule(Field::VehicleModel).is_none());
        assert!(RECEIPT_PATTERNS.rules().iter().any(|r| r.key == SERIES_KEY));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let broken: &[&str] = &[r"(unclosed"];
        let err = PatternTable::from_rules(&[("placa", broken)]).unwrap_err();
        assert!(matches!(err, ExtractionError::Pattern { ref field, .. } if field == "placa"));
    }

    #[test]
    fn test_document_number_precedence() {
        assert_eq!(
            find(Field::DocumentNumber, "NUMERO DOCUMENTO: 4521 OUTRO 8123"),
            Some("4521".to_string())
        );
        assert_eq!(
            find(Field::DocumentNumber, "NF-E Nº 000812 SERIE 1"),
            Some("000812".to_string())
        );
        assert_eq!(find(Field::DocumentNumber, "CUPOM 8456 EMITIDO"), Some("8456".to_string()));
        assert_eq!(find(Field::DocumentNumber, "SERIE: 1234"), None);
    }

    #[test]
    fn test_series_goes_to_its_own_key() {
        let rule = RECEIPT_PATTERNS
            .rules()
            .iter()
            .find(|r| r.key == SERIES_KEY)
            .unwrap();
        assert_eq!(rule.field, None);
        assert_eq!(rule.extract("SÉRIE: 1 NF-E"), Some("1".to_string()));
    }

    #[test]
    fn test_date_and_time() {
        let text = "EMISSAO: 12/03/2025 HORA: 14:37 OUTRA 01/01/2020";
        assert_eq!(find(Field::DocumentDate, text), Some("12/03/2025".to_string()));
        assert_eq!(find(Field::DocumentTime, text), Some("14:37".to_string()));
        assert_eq!(find(Field::DocumentTime, "12/03/2025 09:05:33"), Some("09:05".to_string()));
    }

    #[test]
    fn test_fuel_names_and_codes() {
        assert_eq!(find(Field::FuelType, "PRODUTO DIESEL S10 ADITIVADO").as_deref(), Some("DIESEL S10"));
        assert_eq!(find(Field::FuelType, "PRODUTO: 4 QTDE 10").as_deref(), Some("4"));
        assert_eq!(fuel_code("DIESEL S10"), "DS");
        assert_eq!(fuel_code("DIESEL S-500"), "D");
        assert_eq!(fuel_code("DIESEL"), "D");
        assert_eq!(fuel_code("3"), "D");
        assert_eq!(fuel_code("4"), "DS");
        assert_eq!(fuel_code("5"), "G");
        assert_eq!(fuel_code("gasolina"), "G");
        assert_eq!(fuel_code("ETANOL"), "E");
        assert_eq!(fuel_code("gnv"), "GNV");
    }

    #[test]
    fn test_quantity_and_prices() {
        let text = "QTDE: 22,850 VL. UNIT: R$ 5,890 VALOR TOTAL: R$ 134,58";
        assert_eq!(find(Field::Quantity, text), Some("22,850".to_string()));
        assert_eq!(find(Field::UnitPrice, text), Some("5,890".to_string()));
        assert_eq!(find(Field::TotalPrice, text), Some("134,58".to_string()));

        assert_eq!(find(Field::Quantity, "ABASTECIDO 40,5 LITROS"), Some("40,5".to_string()));
        assert_eq!(find(Field::TotalPrice, "TOTAL R$ 1.234,56"), Some("1.234,56".to_string()));
    }

    #[test]
    fn test_plate_grammar() {
        assert_eq!(find(Field::Plate, "PLACA: FEI6365"), Some("FEI6365".to_string()));
        assert_eq!(find(Field::Plate, "PLACA ABC-1234"), Some("ABC-1234".to_string()));
        assert_eq!(find(Field::Plate, "VEICULO ABC1D23 ONIX"), Some("ABC1D23".to_string()));
        assert_eq!(find(Field::Plate, "PLACA: 1234"), None);
        assert_eq!(find(Field::Plate, "PLACA: AB1234"), None);
    }

    #[test]
    fn test_odometer() {
        assert_eq!(find(Field::Odometer, "KM: 120345 OBS"), Some("120345".to_string()));
        assert_eq!(find(Field::Odometer, "RODADOS 98765 KM"), Some("98765".to_string()));
    }

    #[test]
    fn test_model_after_plate() {
        assert_eq!(
            model_after_plate("PLACA: FEI6365 AMBULANCIA KM 1200", "FEI6365"),
            Some("AMBULANCIA".to_string())
        );
        assert_eq!(
            model_after_plate("VEICULO ABC-1D23 ONIX PLUS", "ABC-1D23"),
            Some("ONIX".to_string())
        );
        assert_eq!(model_after_plate("PLACA: FEI6365 KM: 1200", "FEI6365"), None);
        assert_eq!(model_after_plate("PLACA: FEI6365 UP 1200", "FEI6365"), None);
        assert_eq!(model_after_plate("PLACA: FEI6365", "FEI6365"), None);
    }

    #[test]
    fn test_extract_all_deduplicates() {
        let rule = RECEIPT_PATTERNS.rule(Field::DocumentDate).unwrap();
        let dates = rule.extract_all("DATA: 01/02/2025 01/02/2025 03/04/2025");
        assert_eq!(dates, vec!["01/02/2025".to_string(), "03/04/2025".to_string()]);
    }
}
