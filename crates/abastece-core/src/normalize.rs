//! Value normalization for extracted fields.
//!
//! Receipts print Brazilian numbers (`1.234,56`), models answer with either
//! locale, and OCR adds stray characters. Every candidate value goes through
//! [`normalize`] before it reaches a record, so downstream code only ever sees
//! `.` as the decimal separator and upper-case identifiers.

use crate::models::record::{Field, RawValue};

/// Normalize a raw candidate value.
///
/// Returns `None` for nulls and for values that reduce to nothing.
pub fn normalize(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Null => None,
        RawValue::Number(n) => Some(n.to_string()),
        RawValue::Text(s) => normalize_str(s),
    }
}

/// Normalize a candidate value headed for a known field.
///
/// Numeric fields take the locale rule even when currency or unit text
/// surrounds the number. Dates and times keep their separators. Other fields,
/// unknown keys and JSON numbers go through [`normalize`].
pub fn normalize_field(field: Option<Field>, value: &RawValue) -> Option<String> {
    let (Some(field), RawValue::Text(text)) = (field, value) else {
        return normalize(value);
    };

    match field {
        Field::DocumentDate => normalize_temporal(text, '/'),
        Field::DocumentTime => normalize_temporal(text, ':'),
        f if f.is_numeric() => {
            let cleaned = text.replace('\u{00a0}', "");
            normalize_number(cleaned.trim())
        }
        _ => normalize_str(text),
    }
}

/// Keep the first token carrying digits, with `separator` between its parts.
fn normalize_temporal(value: &str, separator: char) -> Option<String> {
    let token = value
        .split_whitespace()
        .find(|token| token.chars().any(|c| c.is_ascii_digit()))?;

    let kept: String = token
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '/' | ':' | '.' | '-' | 'h' | 'H' => Some(separator),
            _ => None,
        })
        .collect();

    let kept = kept.trim_matches(separator);
    (!kept.is_empty()).then(|| kept.to_string())
}

/// Normalize a text value.
///
/// - letters and digits (plates, codes): keep `[A-Za-z0-9- ]`, upper-case
/// - letters only (names, models): upper-case
/// - no letters (numbers): `1.234,56` becomes `1234.56`, `134,58` becomes
///   `134.58`, then anything but `[0-9.-]` is dropped
pub fn normalize_str(value: &str) -> Option<String> {
    let cleaned = value.replace('\u{00a0}', "").replace(['\r', '\n'], " ");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return None;
    }

    if cleaned.chars().any(char::is_alphabetic) {
        if cleaned.chars().any(|c| c.is_ascii_digit()) {
            let kept: String = cleaned
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ' ')
                .collect();
            let kept = kept.to_uppercase();
            let kept = kept.trim();
            return (!kept.is_empty()).then(|| kept.to_string());
        }
        return Some(cleaned.to_uppercase());
    }

    normalize_number(cleaned)
}

/// Normalize a string without letters into a plain decimal.
fn normalize_number(value: &str) -> Option<String> {
    let converted = match (value.contains('.'), value.contains(',')) {
        (true, true) => value.replace('.', "").replace(',', "."),
        (false, true) => value.replace(',', "."),
        _ => value.to_string(),
    };

    let digits: String = converted
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    match digits.as_str() {
        "" | "." | "-" => None,
        _ => Some(digits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn norm(s: &str) -> Option<String> {
        normalize_str(s)
    }

    #[test]
    fn test_brazilian_thousands_and_decimal() {
        assert_eq!(norm("1.234,56").as_deref(), Some("1234.56"));
        assert_eq!(norm("35.198,75").as_deref(), Some("35198.75"));
        assert_eq!(norm("1.234.567,8").as_deref(), Some("1234567.8"));
    }

    #[test]
    fn test_comma_only_becomes_decimal_point() {
        assert_eq!(norm("22,850").as_deref(), Some("22.850"));
        assert_eq!(norm("134,58").as_deref(), Some("134.58"));
    }

    #[test]
    fn test_dot_only_is_kept() {
        assert_eq!(norm("5.890").as_deref(), Some("5.890"));
        assert_eq!(norm("120345").as_deref(), Some("120345"));
    }

    #[test]
    fn test_numeric_noise_is_dropped() {
        assert_eq!(norm(" 12 345 ").as_deref(), Some("12345"));
        assert_eq!(norm("$ 10,00").as_deref(), Some("10.00"));
        assert_eq!(norm("-3").as_deref(), Some("-3"));
    }

    #[test]
    fn test_degenerate_numbers_are_none() {
        assert_eq!(norm("."), None);
        assert_eq!(norm("-"), None);
        assert_eq!(norm("$"), None);
        assert_eq!(norm(","), None);
        assert_eq!(norm("   "), None);
        assert_eq!(norm(""), None);
    }

    #[test]
    fn test_letters_only_upper_cased() {
        assert_eq!(norm("amb renault").as_deref(), Some("AMB RENAULT"));
        assert_eq!(norm("Gasolina").as_deref(), Some("GASOLINA"));
        assert_eq!(norm("ônibus").as_deref(), Some("ÔNIBUS"));
    }

    #[test]
    fn test_mixed_keeps_plate_characters() {
        assert_eq!(norm("fei6365").as_deref(), Some("FEI6365"));
        assert_eq!(norm("abc-1d23").as_deref(), Some("ABC-1D23"));
        assert_eq!(norm("Placa: abc 1234!").as_deref(), Some("PLACA ABC 1234"));
        assert_eq!(norm("diesel s10").as_deref(), Some("DIESEL S10"));
    }

    #[test]
    fn test_invisible_and_newline_characters() {
        assert_eq!(norm("\u{00a0}134,58\u{00a0}").as_deref(), Some("134.58"));
        assert_eq!(norm("ONIX\nLT").as_deref(), Some("ONIX LT"));
    }

    #[test]
    fn test_both_separators_leave_no_comma() {
        for input in ["1.234,56", "9.9,9", "0,1.2", "1.000.000,00"] {
            let out = norm(input).unwrap();
            assert!(!out.contains(','), "{input} -> {out}");
            assert_eq!(out.matches('.').count(), input.matches(',').count());
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "1.234,56",
            "22,850",
            "5.890",
            "fei6365",
            "ABC-1D23",
            "amb renault",
            "ônibus",
            "Placa: abc 1234!",
            "\u{00a0}10,00",
            "-7",
            "ONIX\nLT",
        ];
        for input in inputs {
            let once = norm(input).unwrap();
            assert_eq!(norm(&once), Some(once.clone()), "input {input:?}");
        }
    }

    #[test]
    fn test_dates_and_times_keep_separators() {
        let date = |s: &str| normalize_field(Some(Field::DocumentDate), &RawValue::from(s));
        let time = |s: &str| normalize_field(Some(Field::DocumentTime), &RawValue::from(s));

        assert_eq!(date("05/03/2024").as_deref(), Some("05/03/2024"));
        assert_eq!(date("DATA: 05-03-2024").as_deref(), Some("05/03/2024"));
        assert_eq!(date("05.03.2024 14:32").as_deref(), Some("05/03/2024"));
        assert_eq!(time("14:32").as_deref(), Some("14:32"));
        assert_eq!(time("14h32").as_deref(), Some("14:32"));
        assert_eq!(time("hora"), None);
        assert_eq!(date("  "), None);
    }

    #[test]
    fn test_numeric_fields_drop_currency_and_units() {
        let total = normalize_field(Some(Field::TotalPrice), &RawValue::from("R$ 134,58"));
        assert_eq!(total.as_deref(), Some("134.58"));

        let quantity = normalize_field(Some(Field::Quantity), &RawValue::from("22,850 L"));
        assert_eq!(quantity.as_deref(), Some("22.850"));

        assert_eq!(normalize_field(Some(Field::Odometer), &RawValue::from("n/a")), None);
    }

    #[test]
    fn test_other_fields_use_generic_rules() {
        let plate = normalize_field(Some(Field::Plate), &RawValue::from("fei6365"));
        assert_eq!(plate.as_deref(), Some("FEI6365"));

        let extra = normalize_field(None, &RawValue::from("1.234,56"));
        assert_eq!(extra.as_deref(), Some("1234.56"));
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(normalize(&RawValue::Null), None);
        assert_eq!(normalize(&RawValue::from("5,890")).as_deref(), Some("5.890"));

        let number: serde_json::Value = serde_json::from_str("120345").unwrap();
        assert_eq!(
            normalize(&RawValue::from_json(&number)).as_deref(),
            Some("120345")
        );
        let decimal: serde_json::Value = serde_json::from_str("5.89").unwrap();
        assert_eq!(
            normalize(&RawValue::from_json(&decimal)).as_deref(),
            Some("5.89")
        );
    }
}
