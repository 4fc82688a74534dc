//! Conversion between Firestore's typed REST values and plain JSON.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). Integers travel
//! as strings. Timestamps, references and bytes decode to their string form.

use serde_json::{ json, Map, Value as JsonValue };
use crate::store::Fields;

pub fn encode(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({ "nullValue": null }),
        JsonValue::Bool(b) => json!({ "booleanValue": b }),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        JsonValue::String(s) => json!({ "stringValue": s }),
        JsonValue::Array(items) => {
            let values: Vec<JsonValue> = items.iter().map(encode).collect();
            json!({ "arrayValue": { "values": values } })
        }
        JsonValue::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode(v)))
        .collect()
}

pub fn decode(value: &JsonValue) -> JsonValue {
    let Some(map) = value.as_object() else {
        return JsonValue::Null;
    };
    let Some((kind, inner)) = map.iter().next() else {
        return JsonValue::Null;
    };

    match kind.as_str() {
        "nullValue" => JsonValue::Null,
        "booleanValue" => inner.as_bool().map(JsonValue::Bool).unwrap_or(JsonValue::Null),
        "integerValue" => {
            let parsed = match inner {
                JsonValue::String(s) => s.parse::<i64>().ok(),
                JsonValue::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed.map(JsonValue::from).unwrap_or(JsonValue::Null)
        }
        "doubleValue" => {
            let parsed = match inner {
                JsonValue::Number(n) => n.as_f64(),
                // NaN and Infinity arrive as strings.
                JsonValue::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            parsed.map(JsonValue::from).unwrap_or(JsonValue::Null)
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" =>
            JsonValue::Array(
                inner
                    .get("values")
                    .and_then(|v| v.as_array())
                    .map(|values| values.iter().map(decode).collect())
                    .unwrap_or_default()
            ),
        "mapValue" =>
            JsonValue::Object(
                inner
                    .get("fields")
                    .and_then(|f| f.as_object())
                    .map(decode_fields)
                    .unwrap_or_default()
            ),
        _ => JsonValue::Null,
    }
}

pub fn decode_fields(fields: &Map<String, JsonValue>) -> Fields {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode(v)))
        .collect()
}
