//! Resource-kind registry entries
//!
//! A [`ResourceKindSpec`] captures the per-kind policies the coordinator
//! needs: whether mutations must be serialized per tenant, what destroy does
//! remotely, and how a resource key renders into a remote path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ids::{KeyError, ResourceKey, ResourcePath};

/// What destroying local state does to the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Destroy issues a remote delete call.
    #[default]
    Delete,
    /// Destroy discards local state only; the remote resource is kept.
    Detach,
}

impl DeletePolicy {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletePolicy::Delete => "delete",
            DeletePolicy::Detach => "detach",
        }
    }

    /// Whether destroy reaches out to the remote system.
    #[must_use]
    pub fn deletes_remote(&self) -> bool {
        matches!(self, DeletePolicy::Delete)
    }
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeletePolicy {
    type Err = ParseDeletePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delete" => Ok(DeletePolicy::Delete),
            "detach" => Ok(DeletePolicy::Detach),
            _ => Err(ParseDeletePolicyError(s.to_string())),
        }
    }
}

/// Error parsing a delete policy from string.
#[derive(Debug, Clone, Error)]
#[error("invalid delete policy '{0}', expected one of: delete, detach")]
pub struct ParseDeletePolicyError(String);

/// Per-kind policies and path layout for a reconcilable resource.
///
/// Resource kinds documented as conflict-prone under concurrent mutation set
/// `serialize_mutations`; their create/update/delete calls are then routed
/// through the per-tenant lock registry. Read-only operations never take the
/// lock regardless of this flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKindSpec {
    /// Stable code for this kind (e.g. `"shipping_method"`).
    pub code: String,

    /// Remote path template with positional placeholders (`{0}`, `{1}`, ...)
    /// filled from the resource key's segments.
    pub path_template: String,

    /// Number of key segments this kind requires.
    pub key_segments: usize,

    /// Whether mutating calls must hold the tenant lock.
    #[serde(default)]
    pub serialize_mutations: bool,

    /// What destroy does remotely.
    #[serde(default)]
    pub delete_policy: DeletePolicy,
}

impl ResourceKindSpec {
    /// Create a kind spec with the given code and path template.
    ///
    /// Mutations are unserialized and destroy deletes remotely by default.
    pub fn new(code: impl Into<String>, path_template: impl Into<String>, key_segments: usize) -> Self {
        Self {
            code: code.into(),
            path_template: path_template.into(),
            key_segments,
            serialize_mutations: false,
            delete_policy: DeletePolicy::default(),
        }
    }

    /// Mark mutating calls on this kind as requiring the tenant lock.
    #[must_use]
    pub fn serialized(mut self) -> Self {
        self.serialize_mutations = true;
        self
    }

    /// Set the destroy policy.
    #[must_use]
    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    /// Parse an import identifier into a key for this kind.
    pub fn parse_import(&self, raw: &str) -> Result<ResourceKey, KeyError> {
        ResourceKey::parse_composite(self.code.clone(), raw, self.key_segments)
    }

    /// Render the remote path for a resource key.
    ///
    /// Every `{n}` placeholder in the template is replaced with the key's
    /// n-th segment; referencing a segment the key does not have is an error.
    pub fn path_for(&self, key: &ResourceKey) -> Result<ResourcePath, KeyError> {
        let mut rendered = self.path_template.clone();
        for index in 0..self.key_segments.max(key.segments().len()) {
            let placeholder = format!("{{{index}}}");
            if !rendered.contains(&placeholder) {
                continue;
            }
            let segment = key.segment(index).ok_or_else(|| KeyError::MissingTemplateSegment {
                template: self.path_template.clone(),
                index,
                key: key.to_string(),
                available: key.segments().len(),
            })?;
            rendered = rendered.replace(&placeholder, segment);
        }
        Ok(ResourcePath::new(rendered))
    }
}
