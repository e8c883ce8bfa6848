//! Explicit JSON codec for attribute trees.
//!
//! Decode and encode are hand-walked over the declared schema rather than
//! reflected, so every node keeps its declared subtype (integer vs decimal)
//! and every failure names the offending dotted path.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::error::{TreeError, TreeResult};
use crate::schema::{AttrType, ObjectSchema};
use crate::value::{AttrObject, AttrValue, FieldState};

/// How strictly a JSON document is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Desired configuration: unknown fields and out-of-set enum tokens are
    /// rejected; fields the prior tree held as values but the source omits
    /// become explicit nulls.
    Desired,
    /// Remote response body: unknown (server-managed) fields are ignored and
    /// enum tokens are accepted verbatim.
    Remote,
}

/// Decode a root document against an object schema.
pub fn decode_root(
    source: &Value,
    schema: &ObjectSchema,
    prior: Option<&AttrObject>,
    mode: DecodeMode,
) -> TreeResult<AttrObject> {
    let map = source.as_object().ok_or_else(|| TreeError::SchemaMismatch {
        path: "$".to_string(),
        expected: "object".to_string(),
        found: found_name(source).to_string(),
    })?;
    decode_object(map, schema, prior, "$", mode)
}

fn decode_object(
    map: &Map<String, Value>,
    schema: &ObjectSchema,
    prior: Option<&AttrObject>,
    path: &str,
    mode: DecodeMode,
) -> TreeResult<AttrObject> {
    if mode == DecodeMode::Desired {
        for key in map.keys() {
            if !schema.has_field(key) {
                return Err(TreeError::UnknownField {
                    path: join(path, key),
                });
            }
        }
    }

    let mut out = AttrObject::new();
    for (name, field) in schema.iter() {
        let child_path = join(path, name);
        match map.get(name.as_str()) {
            Some(Value::Null) => out.set(name.clone(), FieldState::Null),
            Some(raw) => {
                let prior_value = prior.and_then(|p| p.value(name));
                let value = decode_value(raw, &field.attr_type, prior_value, &child_path, mode)?;
                out.set(name.clone(), FieldState::Value(value));
            }
            None => {
                // A field the prior tree held as a value but the new source
                // omits was removed by the user: record an explicit null.
                // A field absent from both stays unset.
                let removed = mode == DecodeMode::Desired
                    && prior.is_some_and(|p| p.value(name).is_some());
                if removed {
                    out.set(name.clone(), FieldState::Null);
                }
            }
        }
    }
    Ok(out)
}

fn decode_value(
    raw: &Value,
    ty: &AttrType,
    prior: Option<&AttrValue>,
    path: &str,
    mode: DecodeMode,
) -> TreeResult<AttrValue> {
    match ty {
        AttrType::Text => raw
            .as_str()
            .map(|s| AttrValue::Text(s.to_string()))
            .ok_or_else(|| mismatch(path, ty, raw)),
        AttrType::Integer => raw
            .as_i64()
            .map(AttrValue::Integer)
            .ok_or_else(|| mismatch(path, ty, raw)),
        AttrType::Decimal => {
            let num = raw.as_f64().ok_or_else(|| mismatch(path, ty, raw))?;
            if !num.is_finite() {
                return Err(TreeError::NonFiniteNumber {
                    path: path.to_string(),
                });
            }
            Ok(AttrValue::Decimal(num))
        }
        AttrType::Boolean => raw
            .as_bool()
            .map(AttrValue::Boolean)
            .ok_or_else(|| mismatch(path, ty, raw)),
        AttrType::DateTime => {
            let text = raw.as_str().ok_or_else(|| mismatch(path, ty, raw))?;
            DateTime::parse_from_rfc3339(text)
                .map(|dt| AttrValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| TreeError::SchemaMismatch {
                    path: path.to_string(),
                    expected: "date-time".to_string(),
                    found: format!("unparseable date-time '{text}'"),
                })
        }
        AttrType::Enum { values } => {
            let token = raw.as_str().ok_or_else(|| mismatch(path, ty, raw))?;
            if mode == DecodeMode::Desired && !values.iter().any(|v| v == token) {
                return Err(TreeError::InvalidEnumToken {
                    path: path.to_string(),
                    token: token.to_string(),
                    allowed: values.join(", "),
                });
            }
            Ok(AttrValue::EnumToken(token.to_string()))
        }
        AttrType::Reference => raw
            .as_str()
            .map(|s| AttrValue::Reference(s.to_string()))
            .ok_or_else(|| mismatch(path, ty, raw)),
        AttrType::LocalizedText => {
            let map = raw.as_object().ok_or_else(|| mismatch(path, ty, raw))?;
            let mut out = IndexMap::new();
            for (lang, entry) in map {
                let child_path = join(path, lang);
                match entry {
                    Value::Null if mode == DecodeMode::Remote => {}
                    Value::String(s) => {
                        out.insert(lang.clone(), AttrValue::Text(s.clone()));
                    }
                    other => {
                        return Err(TreeError::SchemaMismatch {
                            path: child_path,
                            expected: "text".to_string(),
                            found: found_name(other).to_string(),
                        })
                    }
                }
            }
            Ok(AttrValue::LocalizedMap(out))
        }
        AttrType::List { element, .. } => {
            let items = raw.as_array().ok_or_else(|| mismatch(path, ty, raw))?;
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let child_path = format!("{path}[{index}]");
                out.push(decode_value(item, element, None, &child_path, mode)?);
            }
            Ok(AttrValue::List(out))
        }
        AttrType::Object(schema) => {
            let map = raw.as_object().ok_or_else(|| mismatch(path, ty, raw))?;
            let prior_object = prior.and_then(AttrValue::as_object);
            Ok(AttrValue::Object(decode_object(
                map,
                schema,
                prior_object,
                path,
                mode,
            )?))
        }
    }
}

/// Encode a value back to JSON.
#[must_use]
pub fn encode_value(value: &AttrValue) -> Value {
    match value {
        AttrValue::Text(s) | AttrValue::EnumToken(s) | AttrValue::Reference(s) => {
            Value::String(s.clone())
        }
        AttrValue::Integer(i) => Value::Number(Number::from(*i)),
        AttrValue::Decimal(d) => {
            debug_assert!(d.is_finite());
            Number::from_f64(*d).map_or(Value::Null, Value::Number)
        }
        AttrValue::Boolean(b) => Value::Bool(*b),
        AttrValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        AttrValue::LocalizedMap(entries) => Value::Object(
            entries
                .iter()
                .map(|(lang, v)| (lang.clone(), encode_value(v)))
                .collect(),
        ),
        AttrValue::List(items) => Value::Array(items.iter().map(encode_value).collect()),
        AttrValue::Object(obj) => encode_object(obj),
    }
}

/// Encode an object node: explicit nulls for cleared fields, unset omitted.
#[must_use]
pub fn encode_object(obj: &AttrObject) -> Value {
    let mut map = Map::new();
    for (name, state) in obj.iter() {
        match state {
            FieldState::Unset => {}
            FieldState::Null => {
                map.insert(name.clone(), Value::Null);
            }
            FieldState::Value(v) => {
                map.insert(name.clone(), encode_value(v));
            }
        }
    }
    Value::Object(map)
}

fn mismatch(path: &str, expected: &AttrType, found: &Value) -> TreeError {
    TreeError::SchemaMismatch {
        path: path.to_string(),
        expected: expected.expected_name().to_string(),
        found: found_name(found).to_string(),
    }
}

fn found_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "decimal"
            }
        }
        Value::String(_) => "text",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, field: &str) -> String {
    format!("{path}.{field}")
}
