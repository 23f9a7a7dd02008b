//! Fuel-receipt record model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire key carrying the model's self-reported confidence.
pub const CONFIDENCE_KEY: &str = "certeza_ia";

/// Name of the leading CSV column holding the source file name.
pub const SOURCE_FILE_COLUMN: &str = "arquivo";

/// A named datum extracted from a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    DocumentNumber,
    DocumentDate,
    DocumentTime,
    FuelType,
    Quantity,
    UnitPrice,
    TotalPrice,
    Plate,
    Odometer,
    VehicleModel,
}

impl Field {
    /// All fields, in checklist order.
    pub const ALL: [Field; 10] = [
        Field::DocumentNumber,
        Field::DocumentDate,
        Field::DocumentTime,
        Field::FuelType,
        Field::Quantity,
        Field::UnitPrice,
        Field::TotalPrice,
        Field::Plate,
        Field::Odometer,
        Field::VehicleModel,
    ];

    /// Column order of the CSV export (after `arquivo`).
    pub const CSV_ORDER: [Field; 10] = [
        Field::DocumentDate,
        Field::DocumentTime,
        Field::FuelType,
        Field::Quantity,
        Field::UnitPrice,
        Field::TotalPrice,
        Field::DocumentNumber,
        Field::Plate,
        Field::Odometer,
        Field::VehicleModel,
    ];

    /// Key used in model responses and CSV headers.
    pub fn key(&self) -> &'static str {
        match self {
            Field::DocumentNumber => "numero_documento",
            Field::DocumentDate => "data_documento",
            Field::DocumentTime => "hora_documento",
            Field::FuelType => "tipo_combustível",
            Field::Quantity => "quantidade",
            Field::UnitPrice => "valor_unitario",
            Field::TotalPrice => "valor_total",
            Field::Plate => "placa",
            Field::Odometer => "km",
            Field::VehicleModel => "modelo_veiculo",
        }
    }

    /// Human-readable label used in the checklist.
    pub fn label(&self) -> &'static str {
        match self {
            Field::DocumentNumber => "Número do Documento",
            Field::DocumentDate => "Data do Documento",
            Field::DocumentTime => "Hora do Documento",
            Field::FuelType => "Tipo de Combustível",
            Field::Quantity => "Quantidade",
            Field::UnitPrice => "Valor Unitário",
            Field::TotalPrice => "Valor Total",
            Field::Plate => "Placa",
            Field::Odometer => "KM",
            Field::VehicleModel => "Modelo do Veículo",
        }
    }

    /// Look up a field by wire key. Case-insensitive; accepts the
    /// unaccented spelling of `tipo_combustível`.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        if key == "tipo_combustivel" {
            return Some(Field::FuelType);
        }
        Field::ALL.iter().copied().find(|f| f.key() == key)
    }

    /// Whether values of this field are decimal quantities.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Field::Quantity | Field::UnitPrice | Field::TotalPrice | Field::Odometer
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A raw candidate value before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Explicit absence.
    Null,
    /// A JSON number, kept in its textual form.
    Number(serde_json::Number),
    /// Free text.
    Text(String),
}

impl RawValue {
    /// Build from any JSON value returned by a model.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Number(n) => RawValue::Number(n.clone()),
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<Option<String>> for RawValue {
    fn from(s: Option<String>) -> Self {
        s.map(RawValue::Text).unwrap_or(RawValue::Null)
    }
}

/// Ordered key/value candidates produced by one extraction pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCandidates {
    entries: Vec<(String, RawValue)>,
}

impl FieldCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Append a candidate for a known field.
    pub fn push_field(&mut self, field: Field, value: impl Into<RawValue>) {
        self.push(field.key(), value);
    }

    /// Build from a JSON object.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let entries = object
            .iter()
            .map(|(k, v)| (k.clone(), RawValue::from_json(v)))
            .collect();
        Self { entries }
    }

    /// First candidate stored under a field's key.
    pub fn get(&self, field: Field) -> Option<&RawValue> {
        self.entries
            .iter()
            .find(|(k, _)| Field::from_key(k) == Some(field))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One finalized extraction result per source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Originating document name.
    pub source_file: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_time: Option<String>,

    /// Receipt fuel code (`G`, `D`, `DS`, ...) or free text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_model: Option<String>,

    /// Self-reported model confidence, as received (normalized).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,

    /// Keys outside the known field set.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,

    /// Operator-facing notes gathered while extracting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExtractedRecord {
    /// Create an empty record for a document.
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Default::default()
        }
    }

    /// Value of a field.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub(crate) fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::DocumentNumber => &self.document_number,
            Field::DocumentDate => &self.document_date,
            Field::DocumentTime => &self.document_time,
            Field::FuelType => &self.fuel_type,
            Field::Quantity => &self.quantity,
            Field::UnitPrice => &self.unit_price,
            Field::TotalPrice => &self.total_price,
            Field::Plate => &self.plate,
            Field::Odometer => &self.odometer,
            Field::VehicleModel => &self.vehicle_model,
        }
    }

    pub(crate) fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::DocumentNumber => &mut self.document_number,
            Field::DocumentDate => &mut self.document_date,
            Field::DocumentTime => &mut self.document_time,
            Field::FuelType => &mut self.fuel_type,
            Field::Quantity => &mut self.quantity,
            Field::UnitPrice => &mut self.unit_price,
            Field::TotalPrice => &mut self.total_price,
            Field::Plate => &mut self.plate,
            Field::Odometer => &mut self.odometer,
            Field::VehicleModel => &mut self.vehicle_model,
        }
    }

    /// Per-field found/not-found view.
    pub fn checklist(&self) -> Checklist<'_> {
        Checklist {
            entries: Field::ALL.iter().map(|&f| (f, self.get(f))).collect(),
        }
    }

    /// CSV row matching [`csv_header`].
    pub fn csv_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(Field::CSV_ORDER.len() + 1);
        row.push(self.source_file.clone());
        for field in Field::CSV_ORDER {
            row.push(self.get(field).unwrap_or_default().to_string());
        }
        row
    }
}

/// CSV header: `arquivo` followed by the field keys in export order.
pub fn csv_header() -> Vec<&'static str> {
    std::iter::once(SOURCE_FILE_COLUMN)
        .chain(Field::CSV_ORDER.iter().map(|f| f.key()))
        .collect()
}

/// Found/not-found status of every field of a record.
#[derive(Debug, Clone)]
pub struct Checklist<'a> {
    pub entries: Vec<(Field, Option<&'a str>)>,
}

impl Checklist<'_> {
    pub fn found(&self) -> usize {
        self.entries.iter().filter(|(_, v)| v.is_some()).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Labels of fields that were not extracted.
    pub fn missing_labels(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(f, _)| f.label())
            .collect()
    }

    /// Summary ratio, e.g. `7/10`.
    pub fn summary(&self) -> String {
        format!("{}/{}", self.found(), self.total())
    }
}
