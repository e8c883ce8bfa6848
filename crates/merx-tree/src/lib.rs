//! # Merx attribute trees
//!
//! Recursive attribute-tree model with per-field presence tracking, declared
//! schemas, an explicit JSON codec, and the structural diff engine that
//! produces minimal partial-update documents.
//!
//! ## Presence
//!
//! Every object field is in one of three states: never configured
//! ([`FieldState::Unset`]), explicitly cleared ([`FieldState::Null`]), or
//! holding a value ([`FieldState::Value`]). The distinction is what lets the
//! diff engine tell "send nothing" apart from "send an explicit null" — even
//! for zero-like values such as a latitude of `0.0`.
//!
//! ## Example
//!
//! ```
//! use merx_tree::{diff, AttrType, AttributeTree, FieldSchema, ObjectSchema, ResourceSchema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Arc::new(ResourceSchema::new(
//!     ObjectSchema::new().with_field("active", FieldSchema::of(AttrType::Boolean)),
//! ));
//!
//! let prior = AttributeTree::from_desired(&json!({"active": true}), &schema, None).unwrap();
//! let desired = AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&prior)).unwrap();
//!
//! let patch = diff(&prior, &desired).unwrap();
//! assert_eq!(patch.to_body(), json!({"active": false}));
//! ```

pub mod codec;
pub mod diff;
pub mod error;
pub mod schema;
pub mod value;

pub use diff::{diff, PatchDocument, PatchEntry, PatchObject};
pub use error::{TreeError, TreeResult};
pub use schema::{
    AttrType, FieldSchema, ListOrdering, ObjectSchema, RemovalEncoding, ResourceSchema,
};
pub use value::{AttrObject, AttrValue, AttributeTree, FieldState};
