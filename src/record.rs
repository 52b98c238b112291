//! The recipient record handed over by the record-selection UI.
//!
//! Field names on the wire follow the record store's camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::error::CertificateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "男", alias = "male")]
    Male,
    #[serde(rename = "女", alias = "female")]
    Female,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

/// Read-only snapshot of one registrant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipientRecord {
    pub id: u64,
    pub name: String,
    pub gender: Gender,
    pub nationality: String,
    pub phone: String,
    pub address: String,
    pub email: Option<String>,
    /// Stored as `YYYY-MM-DD`.
    pub refuge_date: String,
    pub refuge_place: String,
    /// ISO-8601 timestamp.
    pub registration_time: String,
    /// Native (Tibetan) script.
    pub dharma_name: Option<String>,
    pub dharma_name_phonetic: Option<String>,
    pub dharma_name_meaning: Option<String>,
}

impl RecipientRecord {
    /// Parse a record list export: either one object or an array of them.
    pub fn parse_many(json: &str) -> Result<Vec<Self>, CertificateError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| CertificateError::Config(format!("record json: {e}")))?;
        let records = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value),
            other => serde_json::from_value(other).map(|r| vec![r]),
        };
        records.map_err(|e| CertificateError::Config(format!("record json: {e}")))
    }

    /// Trimmed value of an optional field, `None` when absent or blank.
    pub fn optional(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_json() {
        let json = r#"{
            "id": 7,
            "name": "陳小明",
            "gender": "男",
            "nationality": "台灣",
            "phone": "+886912345678",
            "address": "台北市",
            "refugeDate": "2024-01-15",
            "refugePlace": "台北",
            "registrationTime": "2024-01-10T08:00:00.000Z",
            "dharmaName": ""
        }"#;
        let records = RecipientRecord::parse_many(json).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, 7);
        assert_eq!(r.gender, Gender::Male);
        assert_eq!(r.refuge_place, "台北");
        assert_eq!(RecipientRecord::optional(&r.dharma_name), None);
        assert_eq!(r.email, None);
    }

    #[test]
    fn parses_arrays_and_blank_gender() {
        let json = r#"[{"id": 1, "name": "A", "gender": ""}, {"id": 2, "name": "B"}]"#;
        let records = RecipientRecord::parse_many(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].gender, Gender::Unspecified);
        assert_eq!(records[1].name, "B");
    }
}
