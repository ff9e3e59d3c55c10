//! Conversion of raw field/value records into typed readings
//!
//! The parser is deliberately lenient: each numeric field is parsed on its own
//! and a value that does not parse is dropped, while the reading itself is kept.
//! Only a record without a machine identifier is rejected.

use crate::error::IngestError;
use crate::events::Reading;
use log::debug;

/// Column names of the reading schema
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const MACHINE_ID_FIELD: &str = "machine_id";
pub const TEMPERATURE_FIELD: &str = "temperature";
pub const VIBRATION_FIELD: &str = "vibration";
pub const ENERGY_FIELD: &str = "energy_consumption";

/// Header row of the CSV store, in column order
pub const CSV_HEADERS: [&str; 5] = [
    TIMESTAMP_FIELD,
    MACHINE_ID_FIELD,
    TEMPERATURE_FIELD,
    VIBRATION_FIELD,
    ENERGY_FIELD,
];

/// One unparsed record: an ordered list of field/value pairs
///
/// This is what a CSV row or a pushed message looks like before ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; a later duplicate shadows an earlier one
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Value of the named field, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Turn a raw record into a reading
///
/// # Errors
///
/// Returns `IngestError::MissingMachineId` if the record has no non-blank
/// `machine_id`. Malformed numeric fields never cause an error.
pub fn ingest(raw: &RawRecord) -> Result<Reading, IngestError> {
    let machine_id = raw
        .get(MACHINE_ID_FIELD)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(IngestError::MissingMachineId)?;

    Ok(Reading {
        timestamp: parse_numeric(raw, TIMESTAMP_FIELD),
        machine_id: machine_id.to_string(),
        temperature: parse_numeric(raw, TEMPERATURE_FIELD),
        vibration: parse_numeric(raw, VIBRATION_FIELD),
        energy_consumption: parse_numeric(raw, ENERGY_FIELD),
    })
}

/// Parse one numeric field, treating blank, unparsable and non-finite text as missing
fn parse_numeric(raw: &RawRecord, field: &str) -> Option<f64> {
    let text = raw.get(field)?.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            debug!("Ignoring malformed {} value: {:?}", field, text);
            None
        }
    }
}
