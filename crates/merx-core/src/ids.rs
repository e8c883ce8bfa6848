//! Merx identifier types
//!
//! Newtype wrappers for tenant and resource identity. Remote tenants are
//! addressed by realm strings, sites by site codes, and individual resources
//! by composite keys whose segment layout depends on the resource kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Separator between segments of a composite resource key.
const KEY_SEPARATOR: char = ':';

/// Identifier of a tenant realm.
///
/// The tenant is the isolation boundary for all resources and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id from a realm string.
    pub fn new(realm: impl Into<String>) -> Self {
        Self(realm.into())
    }

    /// Get the realm string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a site within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Create a site id from a site code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the site code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Composite identity of a single remote resource.
///
/// A key pairs a resource-kind code with the ordered path segments that
/// locate the resource, e.g. `site:zone_id:method_id` for a shipping method.
/// The `a:b:c` rendering doubles as the import identifier used to bootstrap
/// state from an existing remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    kind: String,
    segments: Vec<String>,
}

impl ResourceKey {
    /// Create a key from a kind code and path segments.
    pub fn new(kind: impl Into<String>, segments: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            segments,
        }
    }

    /// Parse a composite import identifier of the form `a:b:c`.
    ///
    /// `expected_segments` is the segment count the resource kind requires;
    /// a mismatch or an empty segment is rejected.
    pub fn parse_composite(
        kind: impl Into<String>,
        raw: &str,
        expected_segments: usize,
    ) -> Result<Self, KeyError> {
        let segments: Vec<String> = raw.split(KEY_SEPARATOR).map(str::to_string).collect();
        if segments.len() != expected_segments {
            return Err(KeyError::SegmentCount {
                value: raw.to_string(),
                expected: expected_segments,
                found: segments.len(),
            });
        }
        if let Some(position) = segments.iter().position(String::is_empty) {
            return Err(KeyError::EmptySegment {
                value: raw.to_string(),
                position,
            });
        }
        Ok(Self {
            kind: kind.into(),
            segments,
        })
    }

    /// The resource-kind code this key belongs to.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The ordered path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Get a single segment by position.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(":"))
    }
}

/// A rendered remote path for the API gateway, relative to the tenant's
/// base URL (e.g. `/sites/RefArch/shipping-zones/usa/methods/express`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Create a path. A missing leading slash is added.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        if path.starts_with('/') {
            Self(path)
        } else {
            Self(format!("/{path}"))
        }
    }

    /// Get the path string, always with a leading slash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing or rendering a composite resource key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The composite identifier has the wrong number of segments.
    #[error("invalid import identifier '{value}': expected {expected} segment(s), found {found}")]
    SegmentCount {
        value: String,
        expected: usize,
        found: usize,
    },

    /// A segment of the composite identifier is empty.
    #[error("invalid import identifier '{value}': segment {position} is empty")]
    EmptySegment { value: String, position: usize },

    /// A path template references a segment the key does not have.
    #[error("path template '{template}' references segment {index}, but key '{key}' has {available}")]
    MissingTemplateSegment {
        template: String,
        index: usize,
        key: String,
        available: usize,
    },
}
