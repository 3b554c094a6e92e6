//! Resource identifier.

use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Key of a normalized resource in the store.
///
/// Identifiers are derived from the JSON:API `type` and `id` members and are:
/// - Equal whenever type and id are equal
/// - Stable across reloads of the same resource
/// - Rendered as `type:id`
///
/// The rendered form splits at the first `:`, so a resource type may not
/// contain one. Input from outside goes through [`Identifier::try_new`] or
/// [`str::parse`], which enforce that.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    resource_type: String,
    id: String,
}

impl Identifier {
    /// Creates an identifier from a resource type and server id.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates an identifier, rejecting empty parts and types containing `:`.
    pub fn try_new(resource_type: &str, id: &str) -> Result<Self, CoreError> {
        if resource_type.is_empty() || id.is_empty() || resource_type.contains(':') {
            return Err(CoreError::InvalidIdentifier {
                value: format!("{resource_type}:{id}"),
            });
        }
        Ok(Self::new(resource_type, id))
    }

    /// Mints a temporary identifier for a resource created locally.
    ///
    /// The id is `prefix` followed by a random UUID.
    #[must_use]
    pub fn temporary(resource_type: impl Into<String>, prefix: &str) -> Self {
        Self::new(resource_type, format!("{prefix}{}", Uuid::new_v4()))
    }

    /// Returns the resource type.
    #[inline]
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns true if the id starts with the given temporary prefix.
    #[must_use]
    pub fn is_temporary(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.id.starts_with(prefix)
    }

    /// Returns the identifier of the same type with a different id.
    #[must_use]
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self::new(self.resource_type.clone(), id)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}:{})", self.resource_type, self.id)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

impl FromStr for Identifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((ty, id)) => Self::try_new(ty, id),
            None => Err(CoreError::InvalidIdentifier {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.resource_type.contains(':') {
            return Err(serde::ser::Error::custom(format!(
                "resource type {:?} contains ':'",
                self.resource_type
            )));
        }
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
