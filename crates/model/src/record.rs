use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A raw row as retrieved from the source table, before any mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub fields: Vec<FieldValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

impl FieldValue {
    pub fn new(name: &str, value: Value) -> Self {
        FieldValue {
            name: name.to_string(),
            value,
        }
    }
}

impl SourceRecord {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        SourceRecord { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
            .map(|f| &f.value)
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field).cloned().unwrap_or(Value::Null)
    }
}

/// A record in the shape the webhook expects. Field names are fixed by the
/// destination schema, so serialization renames carry the exact wire keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappedRecord {
    #[serde(rename = "Customer")]
    pub customer: String,

    #[serde(rename = "Group")]
    pub group: String,

    #[serde(rename = "Entity")]
    pub entity: String,

    /// Transaction identifier, `TJ{job_id}`.
    #[serde(rename = "TJ")]
    pub tj: String,

    /// ISO-8601 creation date.
    #[serde(rename = "Date")]
    pub date: String,

    #[serde(rename = "TJAmount (in Sales Order currency)")]
    pub amount: f64,

    #[serde(rename = "Currency")]
    pub currency: String,

    #[serde(rename = "Status")]
    pub status: String,

    /// Margin fraction, 0.0..=1.0.
    #[serde(rename = "Gross Margin")]
    pub margin: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_record_serializes_with_destination_keys() {
        let record = MappedRecord {
            customer: "Acme".into(),
            group: "EMEA".into(),
            entity: "Acme GmbH".into(),
            tj: "TJ1001".into(),
            date: "2025-04-01T10:00:00".into(),
            amount: 1250.50,
            currency: "EUR".into(),
            status: "completed".into(),
            margin: 0.42,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Customer"], "Acme");
        assert_eq!(json["TJ"], "TJ1001");
        assert_eq!(json["TJAmount (in Sales Order currency)"], 1250.50);
        assert_eq!(json["Gross Margin"], 0.42);
    }

    #[test]
    fn source_record_lookup_is_case_insensitive() {
        let record = SourceRecord::new(vec![FieldValue::new("Customer", Value::String("A".into()))]);
        assert_eq!(record.get("customer"), Some(&Value::String("A".into())));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.get_value("missing"), Value::Null);
    }
}
