//! Structural diff engine.
//!
//! Compares the prior applied tree with the desired tree and produces a
//! minimal patch: removed fields become explicit nulls, changed fields carry
//! their new value, unchanged fields are omitted. Order-insensitive lists are
//! normalized to canonical order on both sides first, so reordering alone
//! never produces a patch.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::codec::encode_value;
use crate::error::{TreeError, TreeResult};
use crate::schema::{AttrType, FieldSchema, ListOrdering, ObjectSchema, RemovalEncoding};
use crate::value::{AttrObject, AttrValue, AttributeTree};

/// One instruction in a patch object.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchEntry {
    /// Send an explicit null (field removal or explicit clear).
    Null,
    /// Send this value.
    Set(AttrValue),
    /// Recurse: a nested object with only its changed fields.
    Partial(PatchObject),
}

/// Ordered patch instructions for one object level.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchObject {
    entries: IndexMap<String, PatchEntry>,
}

impl PatchObject {
    fn insert(&mut self, name: &str, entry: PatchEntry) {
        self.entries.insert(name.to_string(), entry);
    }

    /// Look up the entry for a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PatchEntry> {
        self.entries.get(name)
    }

    /// Iterate entries in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PatchEntry)> {
        self.entries.iter()
    }

    /// Number of entries at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this level carries no instruction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, entry) in &self.entries {
            let rendered = match entry {
                PatchEntry::Null => Value::Null,
                PatchEntry::Set(v) => encode_value(v),
                PatchEntry::Partial(obj) => obj.to_json(),
            };
            map.insert(name.clone(), rendered);
        }
        Value::Object(map)
    }

    fn count_leaves(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                PatchEntry::Null | PatchEntry::Set(_) => 1,
                PatchEntry::Partial(obj) => obj.count_leaves(),
            })
            .sum()
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, entry) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match entry {
                PatchEntry::Partial(obj) => obj.collect_paths(&path, out),
                _ => out.push(path),
            }
        }
    }
}

/// A minimal partial-update document.
///
/// An empty patch means the desired and prior trees are structurally equal
/// and no update call is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchDocument {
    root: PatchObject,
}

impl PatchDocument {
    /// The root patch object.
    #[must_use]
    pub fn root(&self) -> &PatchObject {
        &self.root
    }

    /// Whether the patch carries no instruction at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of leaf instructions (nulls and sets) in the patch.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.root.count_leaves()
    }

    /// Dotted paths of all leaf instructions, for logging.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_paths("", &mut out);
        out
    }

    /// Render the JSON body to send as a partial update. Explicit nulls are
    /// emitted as JSON `null`.
    #[must_use]
    pub fn to_body(&self) -> Value {
        self.root.to_json()
    }
}

/// Compute the minimal patch turning `prior` into `desired`.
///
/// Both trees must share a schema. Per field:
/// - desired unset over a prior value emits a null (removal);
/// - an explicit desired null is emitted regardless of the prior state;
/// - a desired value is emitted only when it differs structurally from the
///   prior value, with nested objects recursed field-by-field;
/// - everything else is omitted.
pub fn diff(prior: &AttributeTree, desired: &AttributeTree) -> TreeResult<PatchDocument> {
    if prior.schema() != desired.schema() {
        return Err(TreeError::SchemaMismatch {
            path: "$".to_string(),
            expected: "matching resource schemas".to_string(),
            found: "differing schemas".to_string(),
        });
    }
    let root = diff_object(prior.schema().root(), prior.root(), desired.root());
    Ok(PatchDocument { root })
}

fn diff_object(schema: &ObjectSchema, prior: &AttrObject, desired: &AttrObject) -> PatchObject {
    let mut out = PatchObject::default();
    for (name, field) in schema.iter() {
        let prior_state = prior.state(name);
        let desired_state = desired.state(name);

        match desired_state.as_value() {
            None if desired_state.is_null() => {
                // Explicit clears are always transmitted, even null-over-null.
                out.insert(name, PatchEntry::Null);
            }
            None => {
                if let Some(prior_value) = prior_state.as_value() {
                    out.insert(name, removal_entry(field, prior_value));
                }
            }
            Some(desired_value) => match prior_state.as_value() {
                Some(prior_value) => {
                    if let (
                        AttrType::Object(object_schema),
                        AttrValue::Object(prior_object),
                        AttrValue::Object(desired_object),
                    ) = (&field.attr_type, prior_value, desired_value)
                    {
                        let nested = diff_object(object_schema, prior_object, desired_object);
                        if !nested.is_empty() {
                            out.insert(name, PatchEntry::Partial(nested));
                        }
                    } else {
                        let normalized_prior = normalize_value(prior_value, &field.attr_type);
                        let normalized_desired = normalize_value(desired_value, &field.attr_type);
                        if normalized_prior != normalized_desired {
                            out.insert(name, PatchEntry::Set(normalized_desired));
                        }
                    }
                }
                None => {
                    out.insert(
                        name,
                        PatchEntry::Set(normalize_value(desired_value, &field.attr_type)),
                    );
                }
            },
        }
    }
    out
}

fn removal_entry(field: &FieldSchema, prior_value: &AttrValue) -> PatchEntry {
    match (&field.removal, &field.attr_type, prior_value) {
        (RemovalEncoding::Leaves, AttrType::Object(schema), AttrValue::Object(prior_object)) => {
            let nulled = null_leaves(schema, prior_object);
            if nulled.is_empty() {
                PatchEntry::Null
            } else {
                PatchEntry::Partial(nulled)
            }
        }
        _ => PatchEntry::Null,
    }
}

fn null_leaves(schema: &ObjectSchema, prior: &AttrObject) -> PatchObject {
    let mut out = PatchObject::default();
    for (name, field) in schema.iter() {
        let Some(prior_value) = prior.state(name).as_value() else {
            continue;
        };
        match (&field.removal, &field.attr_type, prior_value) {
            (RemovalEncoding::Leaves, AttrType::Object(nested), AttrValue::Object(prior_object)) => {
                let nulled = null_leaves(nested, prior_object);
                if !nulled.is_empty() {
                    out.insert(name, PatchEntry::Partial(nulled));
                }
            }
            _ => out.insert(name, PatchEntry::Null),
        }
    }
    out
}

/// Rewrite a value into comparison-canonical form: order-insensitive lists
/// sorted by their declared keys, recursively.
fn normalize_value(value: &AttrValue, ty: &AttrType) -> AttrValue {
    match (ty, value) {
        (AttrType::List { element, ordering }, AttrValue::List(items)) => {
            let mut normalized: Vec<AttrValue> = items
                .iter()
                .map(|item| normalize_value(item, element))
                .collect();
            if let ListOrdering::Canonical { primary, secondary } = ordering {
                normalized.sort_by(|a, b| canonical_cmp(a, b, primary, secondary.as_deref()));
            }
            AttrValue::List(normalized)
        }
        (AttrType::Object(schema), AttrValue::Object(obj)) => {
            AttrValue::Object(normalize_object(obj, schema))
        }
        _ => value.clone(),
    }
}

fn normalize_object(obj: &AttrObject, schema: &ObjectSchema) -> AttrObject {
    let mut out = AttrObject::new();
    for (name, state) in obj.iter() {
        let normalized = match (state.as_value(), schema.field(name)) {
            (Some(value), Some(field)) => {
                crate::value::FieldState::Value(normalize_value(value, &field.attr_type))
            }
            _ => state.clone(),
        };
        out.set(name.clone(), normalized);
    }
    out
}

fn canonical_cmp(a: &AttrValue, b: &AttrValue, primary: &str, secondary: Option<&str>) -> Ordering {
    cmp_key(key_of(a, primary), key_of(b, primary))
        .then_with(|| match secondary {
            Some(field) => cmp_key(key_of(a, field), key_of(b, field)),
            None => Ordering::Equal,
        })
        .then_with(|| encode_value(a).to_string().cmp(&encode_value(b).to_string()))
}

fn key_of<'a>(value: &'a AttrValue, field: &str) -> Option<&'a AttrValue> {
    value.as_object().and_then(|obj| obj.value(field))
}

/// Missing keys sort last so partially-keyed elements stay grouped at the end.
fn cmp_key(a: Option<&AttrValue>, b: Option<&AttrValue>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp_scalar(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_scalar(a: &AttrValue, b: &AttrValue) -> Ordering {
    if let (Some(x), Some(y)) = (text_key(a), text_key(b)) {
        return x.cmp(y);
    }
    match (a, b) {
        (AttrValue::Integer(x), AttrValue::Integer(y)) => x.cmp(y),
        (AttrValue::Decimal(x), AttrValue::Decimal(y)) => x.total_cmp(y),
        (AttrValue::Integer(x), AttrValue::Decimal(y)) => (*x as f64).total_cmp(y),
        (AttrValue::Decimal(x), AttrValue::Integer(y)) => x.total_cmp(&(*y as f64)),
        (AttrValue::Boolean(x), AttrValue::Boolean(y)) => x.cmp(y),
        (AttrValue::DateTime(x), AttrValue::DateTime(y)) => x.cmp(y),
        _ => variant_rank(a).cmp(&variant_rank(b)),
    }
}

fn text_key(value: &AttrValue) -> Option<&str> {
    match value {
        AttrValue::Text(s) | AttrValue::EnumToken(s) | AttrValue::Reference(s) => Some(s),
        _ => None,
    }
}

fn variant_rank(value: &AttrValue) -> u8 {
    match value {
        AttrValue::Boolean(_) => 0,
        AttrValue::Integer(_) => 1,
        AttrValue::Decimal(_) => 2,
        AttrValue::Text(_) | AttrValue::EnumToken(_) | AttrValue::Reference(_) => 3,
        AttrValue::DateTime(_) => 4,
        AttrValue::LocalizedMap(_) => 5,
        AttrValue::List(_) => 6,
        AttrValue::Object(_) => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, ResourceSchema};
    use serde_json::json;
    use std::sync::Arc;

    fn method_schema() -> Arc<ResourceSchema> {
        let destination = ObjectSchema::new()
            .with_field("country_code", FieldSchema::of(AttrType::Text))
            .with_field("postal_pattern", FieldSchema::of(AttrType::Text));
        Arc::new(ResourceSchema::new(
            ObjectSchema::new()
                .with_field("active", FieldSchema::of(AttrType::Boolean))
                .with_field("zone", FieldSchema::of(AttrType::Reference))
                .with_field("base_rate", FieldSchema::of(AttrType::Decimal))
                .with_field(
                    "destinations",
                    FieldSchema::of(AttrType::canonical_list(
                        AttrType::object(destination),
                        "country_code",
                        Some("postal_pattern"),
                    )),
                )
                .with_field(
                    "location",
                    FieldSchema::of(AttrType::object(
                        ObjectSchema::new()
                            .with_field("lat", FieldSchema::of(AttrType::Decimal))
                            .with_field("lng", FieldSchema::of(AttrType::Decimal)),
                    )),
                ),
        ))
    }

    fn tree(schema: &Arc<ResourceSchema>, body: Value) -> AttributeTree {
        AttributeTree::from_desired(&body, schema, None).unwrap()
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let schema = method_schema();
        let t = tree(
            &schema,
            json!({
                "active": true,
                "base_rate": 5.99,
                "destinations": [{"country_code": "US"}, {"country_code": "DE"}],
                "location": {"lat": 40.7, "lng": -73.9}
            }),
        );
        let patch = diff(&t, &t.clone()).unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.entry_count(), 0);
    }

    #[test]
    fn test_changed_scalar_only() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"active": true}));
        let desired =
            AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&prior)).unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"active": false}));
        assert_eq!(patch.paths(), vec!["active".to_string()]);
    }

    #[test]
    fn test_unset_zone_stays_untouched() {
        // Prior: {active: Value(true), zone: Unset}; desired: {active: false}.
        let schema = method_schema();
        let prior = tree(&schema, json!({"active": true}));
        let desired =
            AttributeTree::from_desired(&json!({"active": false}), &schema, Some(&prior)).unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"active": false}));
        assert!(patch.root().get("zone").is_none());
    }

    #[test]
    fn test_removed_object_emits_subtree_null() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"location": {"lat": 40.7, "lng": -73.9}}));
        let desired = AttributeTree::from_desired(&json!({}), &schema, Some(&prior)).unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"location": null}));
    }

    #[test]
    fn test_removed_object_without_prior_threading() {
        // Even when the desired tree was built without the prior (field is
        // Unset rather than Null), a prior value still yields a removal.
        let schema = method_schema();
        let prior = tree(&schema, json!({"location": {"lat": 40.7, "lng": -73.9}}));
        let desired = tree(&schema, json!({}));
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"location": null}));
    }

    #[test]
    fn test_null_round_trip_three_transitions() {
        let schema = method_schema();
        let with_rate = tree(&schema, json!({"base_rate": 5.99}));

        // 1. Remove the field: exactly an explicit null.
        let removed =
            AttributeTree::from_desired(&json!({}), &schema, Some(&with_rate)).unwrap();
        let patch1 = diff(&with_rate, &removed).unwrap();
        assert_eq!(patch1.to_body(), json!({"base_rate": null}));

        // 2. Re-add the value.
        let re_added =
            AttributeTree::from_desired(&json!({"base_rate": 5.99}), &schema, Some(&removed))
                .unwrap();
        let patch2 = diff(&removed, &re_added).unwrap();
        assert_eq!(patch2.to_body(), json!({"base_rate": 5.99}));

        // 3. Remove again.
        let removed_again =
            AttributeTree::from_desired(&json!({}), &schema, Some(&re_added)).unwrap();
        let patch3 = diff(&re_added, &removed_again).unwrap();
        assert_eq!(patch3.to_body(), json!({"base_rate": null}));
    }

    #[test]
    fn test_zero_is_a_value_not_a_null() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"base_rate": 5.99}));
        let zeroed =
            AttributeTree::from_desired(&json!({"base_rate": 0.0}), &schema, Some(&prior)).unwrap();
        let patch = diff(&prior, &zeroed).unwrap();
        assert_eq!(
            patch.root().get("base_rate"),
            Some(&PatchEntry::Set(AttrValue::Decimal(0.0)))
        );

        // Removing the zero-valued field yields a null, never Value(0).
        let removed = AttributeTree::from_desired(&json!({}), &schema, Some(&zeroed)).unwrap();
        let patch = diff(&zeroed, &removed).unwrap();
        assert_eq!(patch.root().get("base_rate"), Some(&PatchEntry::Null));
    }

    #[test]
    fn test_explicit_null_emitted_over_prior_null() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"base_rate": null}));
        let desired = tree(&schema, json!({"base_rate": null}));
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"base_rate": null}));
    }

    #[test]
    fn test_canonical_list_permutation_is_empty_diff() {
        let schema = method_schema();
        let prior = tree(
            &schema,
            json!({"destinations": [
                {"country_code": "US", "postal_pattern": "9*"},
                {"country_code": "DE"},
                {"country_code": "US", "postal_pattern": "1*"}
            ]}),
        );
        let desired = tree(
            &schema,
            json!({"destinations": [
                {"country_code": "DE"},
                {"country_code": "US", "postal_pattern": "1*"},
                {"country_code": "US", "postal_pattern": "9*"}
            ]}),
        );
        let patch = diff(&prior, &desired).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_canonical_list_real_change_detected() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"destinations": [{"country_code": "US"}]}));
        let desired = tree(
            &schema,
            json!({"destinations": [{"country_code": "DE"}, {"country_code": "US"}]}),
        );
        let patch = diff(&prior, &desired).unwrap();
        // The whole list is re-sent in canonical order.
        assert_eq!(
            patch.to_body(),
            json!({"destinations": [{"country_code": "DE"}, {"country_code": "US"}]})
        );
    }

    #[test]
    fn test_nested_partial_patch() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"location": {"lat": 40.7, "lng": -73.9}}));
        let desired = AttributeTree::from_desired(
            &json!({"location": {"lat": 40.8, "lng": -73.9}}),
            &schema,
            Some(&prior),
        )
        .unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"location": {"lat": 40.8}}));
        assert_eq!(patch.paths(), vec!["location.lat".to_string()]);
    }

    #[test]
    fn test_nested_leaf_removal_inside_kept_object() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"location": {"lat": 40.7, "lng": -73.9}}));
        let desired = AttributeTree::from_desired(
            &json!({"location": {"lat": 40.7}}),
            &schema,
            Some(&prior),
        )
        .unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"location": {"lng": null}}));
    }

    #[test]
    fn test_leaves_removal_encoding() {
        let inner = ObjectSchema::new()
            .with_field("lat", FieldSchema::of(AttrType::Decimal))
            .with_field("lng", FieldSchema::of(AttrType::Decimal));
        let schema = Arc::new(ResourceSchema::new(ObjectSchema::new().with_field(
            "location",
            FieldSchema::of(AttrType::object(inner)).with_removal(RemovalEncoding::Leaves),
        )));

        let prior = tree(&schema, json!({"location": {"lat": 40.7, "lng": -73.9}}));
        let desired = AttributeTree::from_desired(&json!({}), &schema, Some(&prior)).unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(
            patch.to_body(),
            json!({"location": {"lat": null, "lng": null}})
        );
    }

    #[test]
    fn test_value_over_prior_null_is_sent() {
        let schema = method_schema();
        let prior = tree(&schema, json!({"base_rate": null}));
        let desired =
            AttributeTree::from_desired(&json!({"base_rate": 3.5}), &schema, Some(&prior)).unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(patch.to_body(), json!({"base_rate": 3.5}));
    }

    #[test]
    fn test_schema_mismatch_between_trees() {
        let schema_a = method_schema();
        let schema_b = Arc::new(ResourceSchema::new(
            ObjectSchema::new().with_field("other", FieldSchema::of(AttrType::Text)),
        ));
        let a = tree(&schema_a, json!({"active": true}));
        let b = tree(&schema_b, json!({"other": "x"}));
        let err = diff(&a, &b).unwrap_err();
        assert!(matches!(err, TreeError::SchemaMismatch { ref path, .. } if path == "$"));
    }

    #[test]
    fn test_patch_minimality_mixed_change() {
        let schema = method_schema();
        let prior = tree(
            &schema,
            json!({
                "active": true,
                "zone": "usa",
                "base_rate": 5.99,
                "location": {"lat": 40.7, "lng": -73.9}
            }),
        );
        let desired = AttributeTree::from_desired(
            &json!({
                "active": true,
                "zone": "emea",
                "location": {"lat": 40.7, "lng": -73.9}
            }),
            &schema,
            Some(&prior),
        )
        .unwrap();
        let patch = diff(&prior, &desired).unwrap();
        assert_eq!(
            patch.to_body(),
            json!({"zone": "emea", "base_rate": null})
        );
        assert_eq!(patch.entry_count(), 2);
    }
}
