use apache_avro::types::Value as AvroValue;
use apache_avro::Reader;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::debug;

/// Errors raised while decoding a container. Always fatal to the run.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid Avro container: {0}")]
    Container(#[source] apache_avro::Error),

    #[error("Malformed datum at index {index}: {source}")]
    Datum {
        index: usize,
        #[source]
        source: apache_avro::Error,
    },

    #[error("Datum at index {index} does not match the event schema: {reason}")]
    SchemaMismatch { index: usize, reason: String },
}

/// One decoded behavioral event
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Event-type discriminator
    pub name: String,
    /// User identity, when the export carries a usable string value
    pub user_id: Option<String>,
    /// Event properties, normally an object
    pub properties: Value,
    /// Every other field of the datum
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Build a record from a decoded JSON object.
    ///
    /// `properties` may be a nested object or a JSON-encoded string holding
    /// one. Any other value is kept as-is.
    pub fn from_json(value: Value) -> Result<Self, String> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(format!("expected a record, found {}", type_name(&other))),
        };

        let name = match fields.remove("name") {
            Some(Value::String(name)) => name,
            Some(other) => return Err(format!("field `name` is {}", type_name(&other))),
            None => return Err("field `name` is missing".to_string()),
        };

        let user_id = match fields.remove("user_id") {
            Some(Value::String(user_id)) => Some(user_id),
            Some(Value::Null) | None => None,
            Some(other) => {
                fields.insert("user_id".to_string(), other);
                None
            }
        };

        let properties = match fields.remove("properties") {
            Some(Value::String(encoded)) => match serde_json::from_str(&encoded) {
                Ok(Value::Object(properties)) => Value::Object(properties),
                _ => Value::String(encoded),
            },
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(other) => other,
        };

        Ok(Self {
            name,
            user_id,
            properties,
            extra: fields,
        })
    }
}

/// Decode every datum of an Avro object container
pub fn decode(bytes: &[u8]) -> Result<Vec<RawRecord>, DecodeError> {
    let reader = Reader::new(bytes).map_err(DecodeError::Container)?;

    let mut records = Vec::new();
    for (index, datum) in reader.enumerate() {
        let datum = datum.map_err(|source| DecodeError::Datum { index, source })?;
        let json = to_json(datum).map_err(|source| DecodeError::Datum { index, source })?;
        let record = RawRecord::from_json(json)
            .map_err(|reason| DecodeError::SchemaMismatch { index, reason })?;
        records.push(record);
    }

    debug!(record_count = records.len(), "Decoded Avro container");

    Ok(records)
}

/// Convert a datum to JSON. Non-finite floats become `null`.
fn to_json(value: AvroValue) -> Result<Value, apache_avro::Error> {
    Ok(match value {
        AvroValue::Float(f) => finite_number(f64::from(f)),
        AvroValue::Double(d) => finite_number(d),
        AvroValue::Union(_, inner) => to_json(*inner)?,
        AvroValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(to_json)
                .collect::<Result<_, _>>()?,
        ),
        AvroValue::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| Ok((k, to_json(v)?)))
                .collect::<Result<_, apache_avro::Error>>()?,
        ),
        AvroValue::Record(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| Ok((k, to_json(v)?)))
                .collect::<Result<_, apache_avro::Error>>()?,
        ),
        other => Value::try_from(other)?,
    })
}

fn finite_number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{avro_container, event};
    use apache_avro::types::Record;
    use apache_avro::{Schema, Writer};
    use serde_json::json;

    #[test]
    fn test_decode_preserves_order_and_fields() {
        let bytes = avro_container(&[
            event("view_content", Some("u1"), r#"{"series":"Recall","episode":2}"#),
            event("other_event", Some("u2"), "{}"),
            event("view_content", None, "{}"),
        ]);

        let records = decode(&bytes).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "view_content");
        assert_eq!(records[0].user_id.as_deref(), Some("u1"));
        assert_eq!(records[0].properties["series"], "Recall");
        assert_eq!(records[0].properties["episode"], 2);
        assert!(records[0].extra.contains_key("id"));
        assert!(records[0].extra.contains_key("time"));
        assert_eq!(records[1].name, "other_event");
        assert_eq!(records[2].user_id, None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = decode(b"definitely not avro").unwrap_err();
        assert!(matches!(err, DecodeError::Container(_)));

        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_truncated_container_is_rejected() {
        let bytes = avro_container(&[
            event("view_content", Some("u1"), "{}"),
            event("view_content", Some("u2"), "{}"),
        ]);

        let truncated = &bytes[..bytes.len() - 20];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn test_properties_object_and_invalid_string() {
        let record = RawRecord::from_json(json!({
            "name": "view_content",
            "user_id": "u1",
            "properties": { "genre": "thriller" }
        }))
        .unwrap();
        assert_eq!(record.properties["genre"], "thriller");

        let record = RawRecord::from_json(json!({
            "name": "view_content",
            "properties": "not json"
        }))
        .unwrap();
        assert_eq!(record.properties, json!("not json"));
        assert!(!record.extra.contains_key("properties"));

        let record = RawRecord::from_json(json!({ "name": "view_content" })).unwrap();
        assert_eq!(record.properties, json!({}));
    }

    #[test]
    fn test_non_finite_floats_decode_as_null() {
        let schema = Schema::parse_str(
            r#"{
                "type": "record",
                "name": "PricedEvent",
                "fields": [
                    { "name": "name", "type": "string" },
                    { "name": "user_id", "type": "string" },
                    { "name": "price", "type": "double" },
                    { "name": "ratio", "type": "float" },
                    { "name": "rating", "type": "double" }
                ]
            }"#,
        )
        .unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        let mut datum = Record::new(writer.schema()).unwrap();
        datum.put("name", "view_content");
        datum.put("user_id", "u1");
        datum.put("price", f64::NAN);
        datum.put("ratio", f32::INFINITY);
        datum.put("rating", 4.5_f64);
        writer.append(datum).unwrap();
        let bytes = writer.into_inner().unwrap();

        let records = decode(&bytes).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id.as_deref(), Some("u1"));
        assert_eq!(records[0].extra["price"], Value::Null);
        assert_eq!(records[0].extra["ratio"], Value::Null);
        assert_eq!(records[0].extra["rating"], 4.5);
    }

    #[test]
    fn test_non_string_user_id_is_not_a_user_id() {
        let record = RawRecord::from_json(json!({ "name": "view_content", "user_id": 42 })).unwrap();

        assert_eq!(record.user_id, None);
        assert_eq!(record.extra["user_id"], 42);
    }

    #[test]
    fn test_missing_name_is_schema_mismatch() {
        assert!(RawRecord::from_json(json!({ "user_id": "u1" })).is_err());
        assert!(RawRecord::from_json(json!({ "name": 7 })).is_err());
        assert!(RawRecord::from_json(json!([1, 2])).is_err());
    }
}
