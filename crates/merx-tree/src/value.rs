//! Attribute values, presence states, and trees.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

use crate::codec::{self, DecodeMode};
use crate::error::TreeResult;
use crate::schema::ResourceSchema;

static UNSET: FieldState = FieldState::Unset;

/// A configuration value at one node of an attribute tree.
///
/// Integer and Decimal are distinct subtypes: `Integer(0)` never compares
/// equal to `Decimal(0.0)`, and a decimal zero is always distinguishable
/// from an explicit null through the surrounding [`FieldState`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Free-form text.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// Decimal number. Invariant: finite (decode rejects non-finite input).
    Decimal(f64),
    /// Boolean flag.
    Boolean(bool),
    /// RFC 3339 date-time.
    DateTime(DateTime<Utc>),
    /// Token from a closed enum.
    EnumToken(String),
    /// Opaque id of another resource.
    Reference(String),
    /// Language-code → text map. Insertion order is preserved for display;
    /// comparison is key-set based.
    LocalizedMap(IndexMap<String, AttrValue>),
    /// Ordered collection.
    List(Vec<AttrValue>),
    /// Nested object.
    Object(AttrObject),
}

impl AttrValue {
    /// Get as text if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a decimal if this is a decimal value.
    #[must_use]
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            AttrValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttrValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a list if this is a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get as an object if this is an object value.
    #[must_use]
    pub fn as_object(&self) -> Option<&AttrObject> {
        match self {
            AttrValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short name used in schema-mismatch messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Text(_) => "text",
            AttrValue::Integer(_) => "integer",
            AttrValue::Decimal(_) => "decimal",
            AttrValue::Boolean(_) => "boolean",
            AttrValue::DateTime(_) => "date-time",
            AttrValue::EnumToken(_) => "enum token",
            AttrValue::Reference(_) => "reference",
            AttrValue::LocalizedMap(_) => "localized text map",
            AttrValue::List(_) => "list",
            AttrValue::Object(_) => "object",
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Integer(i)
    }
}

impl From<f64> for AttrValue {
    fn from(d: f64) -> Self {
        AttrValue::Decimal(d)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Boolean(b)
    }
}

/// Tri-state presence of an object field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldState {
    /// The field is absent from the desired configuration and is never
    /// transmitted.
    #[default]
    Unset,
    /// The field is explicitly cleared; an explicit null is transmitted.
    Null,
    /// The field holds a value.
    Value(AttrValue),
}

impl FieldState {
    /// Whether this is `Unset`.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, FieldState::Unset)
    }

    /// Whether this is an explicit null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldState::Null)
    }

    /// Get the held value, if any.
    #[must_use]
    pub fn as_value(&self) -> Option<&AttrValue> {
        match self {
            FieldState::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// An object node: ordered fields, each with a presence state.
///
/// `Unset` is represented by key absence; [`AttrObject::state`] materializes
/// it on lookup. This keeps structural equality canonical: two objects that
/// differ only in which unset fields they mention compare equal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttrObject {
    fields: IndexMap<String, FieldState>,
}

impl AttrObject {
    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence state of a field. Missing keys read as `Unset`.
    #[must_use]
    pub fn state(&self, name: &str) -> &FieldState {
        self.fields.get(name).unwrap_or(&UNSET)
    }

    /// The value of a field, if it holds one.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&AttrValue> {
        self.state(name).as_value()
    }

    /// Set a field's state. Setting `Unset` removes the key.
    pub fn set(&mut self, name: impl Into<String>, state: FieldState) {
        let name = name.into();
        match state {
            FieldState::Unset => {
                self.fields.shift_remove(&name);
            }
            other => {
                self.fields.insert(name, other);
            }
        }
    }

    /// Set a field to a value, builder style.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(name, FieldState::Value(value.into()));
        self
    }

    /// Set a field to an explicit null, builder style.
    #[must_use]
    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.set(name, FieldState::Null);
        self
    }

    /// Iterate present fields (value or explicit null) in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldState)> {
        self.fields.iter()
    }

    /// Number of present fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A resource's full attribute tree: a root object validated against its
/// [`ResourceSchema`].
///
/// Trees are constructed fresh at the start of each reconciliation and owned
/// by it exclusively; they are never shared across concurrent operations.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTree {
    schema: Arc<ResourceSchema>,
    root: AttrObject,
}

impl AttributeTree {
    /// Build a tree from desired configuration.
    ///
    /// `source` is parsed strictly against `schema`: unknown fields, enum
    /// tokens outside the allowed set, and type mismatches are rejected with
    /// the offending dotted path. When `prior` is given, every field the
    /// prior tree holds as a value but `source` omits is marked as an
    /// explicit null — a field absent from both stays unset and is never
    /// transmitted.
    pub fn from_desired(
        source: &Value,
        schema: &Arc<ResourceSchema>,
        prior: Option<&AttributeTree>,
    ) -> TreeResult<Self> {
        let root = codec::decode_root(
            source,
            schema.root(),
            prior.map(|p| &p.root),
            DecodeMode::Desired,
        )?;
        Ok(Self {
            schema: Arc::clone(schema),
            root,
        })
    }

    /// Build a tree from a remote response body.
    ///
    /// Decoding is lenient: fields the schema does not declare (typically
    /// server-managed) are ignored, and enum tokens are accepted verbatim.
    pub fn from_remote(body: &Value, schema: &Arc<ResourceSchema>) -> TreeResult<Self> {
        let root = codec::decode_root(body, schema.root(), None, DecodeMode::Remote)?;
        Ok(Self {
            schema: Arc::clone(schema),
            root,
        })
    }

    /// The schema this tree was validated against.
    #[must_use]
    pub fn schema(&self) -> &Arc<ResourceSchema> {
        &self.schema
    }

    /// The root object.
    #[must_use]
    pub fn root(&self) -> &AttrObject {
        &self.root
    }

    /// Presence state of a root field.
    #[must_use]
    pub fn state(&self, name: &str) -> &FieldState {
        self.root.state(name)
    }

    /// Encode the full tree back to JSON (explicit nulls for cleared fields,
    /// unset fields omitted).
    #[must_use]
    pub fn to_json(&self) -> Value {
        codec::encode_object(&self.root)
    }
}
