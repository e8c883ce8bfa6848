//! Declared resource schemas.
//!
//! A [`ResourceSchema`] is the typed shape a resource's configuration must
//! satisfy: which fields exist, their (recursive) types, how
//! order-insensitive lists are canonically sorted, and how the removal of a
//! nested object is encoded on the wire.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Declared type of an attribute node. Object fields may nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttrType {
    /// Free-form text.
    Text,
    /// Whole number. Distinct from [`AttrType::Decimal`]; the subtype is
    /// preserved through decode so `0` and `0.0` stay distinguishable.
    Integer,
    /// Decimal number (e.g. coordinates, rates).
    Decimal,
    /// Boolean flag.
    Boolean,
    /// RFC 3339 date-time.
    DateTime,
    /// Closed token set.
    Enum { values: Vec<String> },
    /// Opaque id of another resource.
    Reference,
    /// Language-code → text map.
    LocalizedText,
    /// Ordered collection of a single element type.
    List {
        element: Box<AttrType>,
        #[serde(default)]
        ordering: ListOrdering,
    },
    /// Nested object with its own field schema.
    Object(ObjectSchema),
}

impl AttrType {
    /// A list whose element order is semantically meaningful.
    pub fn list(element: AttrType) -> Self {
        AttrType::List {
            element: Box::new(element),
            ordering: ListOrdering::Significant,
        }
    }

    /// An order-insensitive list canonically sorted by the named key fields
    /// of its (object) elements.
    pub fn canonical_list(
        element: AttrType,
        primary: impl Into<String>,
        secondary: Option<&str>,
    ) -> Self {
        AttrType::List {
            element: Box::new(element),
            ordering: ListOrdering::Canonical {
                primary: primary.into(),
                secondary: secondary.map(str::to_string),
            },
        }
    }

    /// A closed enum over the given tokens.
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrType::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// A nested object type.
    pub fn object(schema: ObjectSchema) -> Self {
        AttrType::Object(schema)
    }

    /// Short name used in schema-mismatch messages.
    #[must_use]
    pub fn expected_name(&self) -> &'static str {
        match self {
            AttrType::Text => "text",
            AttrType::Integer => "integer",
            AttrType::Decimal => "decimal",
            AttrType::Boolean => "boolean",
            AttrType::DateTime => "date-time",
            AttrType::Enum { .. } => "enum token",
            AttrType::Reference => "reference",
            AttrType::LocalizedText => "localized text map",
            AttrType::List { .. } => "list",
            AttrType::Object(_) => "object",
        }
    }
}

/// Whether a list's element order carries meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ListOrdering {
    /// Order is meaningful; elements compare positionally.
    #[default]
    Significant,
    /// Order is not meaningful. Elements are objects sorted by `primary`
    /// (then `secondary`) before comparison, so repeated reconciliations of
    /// the same elements are idempotent regardless of input order.
    Canonical {
        primary: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secondary: Option<String>,
    },
}

/// How the removal of an entire nested object is sent to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemovalEncoding {
    /// A single explicit null at the object's root path.
    #[default]
    Subtree,
    /// An explicit null per previously-set leaf. Opt-in for resources whose
    /// contract rejects subtree nulls.
    Leaves,
}

/// Schema of one object field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Declared type of the field.
    pub attr_type: AttrType,
    /// Removal encoding for object-typed fields.
    #[serde(default)]
    pub removal: RemovalEncoding,
}

impl FieldSchema {
    /// A field of the given type with the default removal encoding.
    pub fn of(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            removal: RemovalEncoding::default(),
        }
    }

    /// Set the removal encoding.
    #[must_use]
    pub fn with_removal(mut self, removal: RemovalEncoding) -> Self {
        self.removal = removal;
        self
    }
}

/// Ordered field schemas of an object. Field order determines patch and
/// display order; comparison of decoded objects is key-set based.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(flatten)]
    fields: IndexMap<String, FieldSchema>,
}

impl ObjectSchema {
    /// Create an empty object schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field using the builder pattern.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Look up a field schema.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Whether a field is declared.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSchema)> {
        self.fields.iter()
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The declared schema of a whole resource: an object schema at the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    root: ObjectSchema,
}

impl ResourceSchema {
    /// Create a resource schema from its root object schema.
    pub fn new(root: ObjectSchema) -> Self {
        Self { root }
    }

    /// The root object schema.
    #[must_use]
    pub fn root(&self) -> &ObjectSchema {
        &self.root
    }
}
