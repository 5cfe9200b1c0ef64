use crate::error::MapError;
use model::{
    record::{MappedRecord, SourceRecord},
    value::Value,
};

/// Stateless transform of one source row into the destination schema.
///
/// Validation is record-scoped: a missing or mistyped field fails that record
/// only, never the batch or the run.
pub fn map_record(record: &SourceRecord) -> Result<MappedRecord, MapError> {
    let label = record_label(record);

    let job_id = required(record, &label, "job_id")?
        .as_u64()
        .ok_or_else(|| invalid(&label, "job_id", "unsigned integer"))?;

    let created = required(record, &label, "job_created")?
        .as_datetime()
        .ok_or_else(|| invalid(&label, "job_created", "datetime"))?;

    let amount = required(record, &label, "quote")?
        .as_f64()
        .ok_or_else(|| invalid(&label, "quote", "number"))?;

    let margin = required(record, &label, "gross_margin")?
        .as_f64()
        .ok_or_else(|| invalid(&label, "gross_margin", "number"))?;

    Ok(MappedRecord {
        customer: required_string(record, &label, "customer")?,
        group: required_string(record, &label, "group_name")?,
        entity: required_string(record, &label, "entity")?,
        tj: format!("TJ{job_id}"),
        date: created.format("%Y-%m-%dT%H:%M:%S").to_string(),
        amount,
        currency: required_string(record, &label, "quote_currency")?,
        status: required_string(record, &label, "job_status")?,
        margin,
    })
}

/// Identifier used in mapping diagnostics; falls back to the raw row when the
/// primary key itself is missing.
fn record_label(record: &SourceRecord) -> String {
    match record.get("job_id") {
        Some(Value::Null) | None => "<no job_id>".to_string(),
        Some(id) => format!("TJ{id}"),
    }
}

fn required<'a>(
    record: &'a SourceRecord,
    label: &str,
    field: &str,
) -> Result<&'a Value, MapError> {
    match record.get(field) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(MapError::MissingField {
            record: label.to_string(),
            field: field.to_string(),
        }),
    }
}

fn required_string(record: &SourceRecord, label: &str, field: &str) -> Result<String, MapError> {
    let value = required(record, label, field)?;
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| invalid(label, field, "string"))
}

fn invalid(label: &str, field: &str, expected: &'static str) -> MapError {
    MapError::InvalidType {
        record: label.to_string(),
        field: field.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDateTime;
    use model::record::FieldValue;
    use std::str::FromStr;

    fn valid_record() -> SourceRecord {
        let ts = NaiveDateTime::parse_from_str("2025-04-01T10:30:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        SourceRecord::new(vec![
            FieldValue::new("customer", Value::String("Acme".into())),
            FieldValue::new("group_name", Value::String("EMEA".into())),
            FieldValue::new("entity", Value::String("Acme GmbH".into())),
            FieldValue::new("job_id", Value::Uint(1001)),
            FieldValue::new("job_created", Value::DateTime(ts)),
            FieldValue::new("quote", Value::Decimal(BigDecimal::from_str("1250.50").unwrap())),
            FieldValue::new("quote_currency", Value::String("EUR".into())),
            FieldValue::new("job_status", Value::String("completed".into())),
            FieldValue::new("gross_margin", Value::Decimal(BigDecimal::from_str("0.42").unwrap())),
            FieldValue::new("updated_at", Value::DateTime(ts)),
        ])
    }

    #[test]
    fn maps_a_complete_record() {
        let mapped = map_record(&valid_record()).unwrap();
        assert_eq!(mapped.tj, "TJ1001");
        assert_eq!(mapped.date, "2025-04-01T10:30:00");
        assert_eq!(mapped.amount, 1250.50);
        assert_eq!(mapped.currency, "EUR");
        assert_eq!(mapped.margin, 0.42);
    }

    #[test]
    fn null_customer_is_a_missing_field() {
        let mut record = valid_record();
        record
            .fields
            .iter_mut()
            .find(|f| f.name == "customer")
            .unwrap()
            .value = Value::Null;

        let err = map_record(&record).unwrap_err();
        assert_eq!(
            err,
            MapError::MissingField {
                record: "TJ1001".into(),
                field: "customer".into(),
            }
        );
    }

    #[test]
    fn non_numeric_quote_is_an_invalid_type() {
        let mut record = valid_record();
        record
            .fields
            .iter_mut()
            .find(|f| f.name == "quote")
            .unwrap()
            .value = Value::String("not-a-number".into());

        let err = map_record(&record).unwrap_err();
        assert!(matches!(err, MapError::InvalidType { field, .. } if field == "quote"));
    }

    #[test]
    fn missing_pk_still_produces_a_scoped_error() {
        let record = SourceRecord::new(vec![FieldValue::new(
            "customer",
            Value::String("Acme".into()),
        )]);
        let err = map_record(&record).unwrap_err();
        assert!(matches!(err, MapError::MissingField { record, .. } if record == "<no job_id>"));
    }
}
