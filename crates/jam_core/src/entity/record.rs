//! Normalized entity record.

use crate::entity::Identifier;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute map of an entity.
pub type Attributes = Map<String, Value>;

/// A relationship reduced to bare identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Relationship {
    /// To-one relationship, possibly empty.
    ToOne(Option<Identifier>),
    /// To-many relationship.
    ToMany(Vec<Identifier>),
}

impl Relationship {
    /// Returns every identifier the relationship points at.
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        let (one, many) = match self {
            Relationship::ToOne(id) => (id.as_ref(), &[][..]),
            Relationship::ToMany(ids) => (None, ids.as_slice()),
        };
        one.into_iter().chain(many.iter())
    }

    /// Replaces references to `from` with `to`. Returns true if anything changed.
    fn rename(&mut self, from: &Identifier, to: &Identifier) -> bool {
        let mut changed = false;
        match self {
            Relationship::ToOne(Some(id)) if id == from => {
                *id = to.clone();
                changed = true;
            }
            Relationship::ToOne(_) => {}
            Relationship::ToMany(ids) => {
                for id in ids.iter_mut().filter(|id| *id == from) {
                    *id = to.clone();
                    changed = true;
                }
            }
        }
        changed
    }
}

/// A normalized resource.
///
/// Relationships hold identifiers only, so every resource exists once in
/// the store no matter how many others point at it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Store key.
    pub identifier: Identifier,
    /// Resource attributes.
    pub attributes: Attributes,
    /// Resource relationships.
    pub relationships: BTreeMap<String, Relationship>,
}

impl Entity {
    /// Creates an entity with no attributes or relationships.
    #[must_use]
    pub fn new(identifier: Identifier) -> Self {
        Self {
            identifier,
            attributes: Attributes::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Sets the attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn with_relationship(mut self, name: impl Into<String>, rel: Relationship) -> Self {
        self.relationships.insert(name.into(), rel);
        self
    }

    /// Returns the resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.identifier.resource_type()
    }

    /// Gets an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Gets a relationship.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Merges `newer` into this entity, last write wins per field.
    ///
    /// Attributes and relationships present in `newer` overwrite the ones
    /// with the same name; everything else is kept.
    pub fn merge(&mut self, newer: &Entity) {
        for (key, value) in &newer.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
        for (key, rel) in &newer.relationships {
            self.relationships.insert(key.clone(), rel.clone());
        }
    }

    /// Returns true if the entity carries no fields at all.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.attributes.is_empty() && self.relationships.is_empty()
    }

    /// Rewrites relationship references from `from` to `to`.
    pub(crate) fn rename_references(&mut self, from: &Identifier, to: &Identifier) -> bool {
        let mut changed = false;
        for rel in self.relationships.values_mut() {
            changed |= rel.rename(from, to);
        }
        changed
    }

    /// Returns the attributes and relationships that differ from `base`.
    ///
    /// A field counts as changed when `base` lacks it or holds another value.
    #[must_use]
    pub fn changes_since(&self, base: &Entity) -> (Attributes, BTreeMap<String, Relationship>) {
        let attributes = self
            .attributes
            .iter()
            .filter(|(key, value)| base.attributes.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let relationships = self
            .relationships
            .iter()
            .filter(|(key, rel)| base.relationships.get(*key) != Some(*rel))
            .map(|(key, rel)| (key.clone(), rel.clone()))
            .collect();
        (attributes, relationships)
    }
}
