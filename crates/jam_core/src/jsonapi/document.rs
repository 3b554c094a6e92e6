//! JSON:API document model.

use crate::entity::{Attributes, Entity, Identifier, Relationship};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A top-level JSON:API document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Primary data.
    #[serde(default)]
    pub data: PrimaryData,
    /// Included resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    /// Non-standard meta information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// Links, e.g. pagination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,
}

/// Primary data of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    /// A resource collection.
    Many(Vec<ResourceObject>),
    /// A single resource, or `null`.
    One(Option<ResourceObject>),
}

impl Default for PrimaryData {
    fn default() -> Self {
        PrimaryData::One(None)
    }
}

/// Identifiers of a document's primary data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PrimaryIdentifiers {
    /// Collection primary data.
    Many(Vec<Identifier>),
    /// Single resource primary data.
    One(Identifier),
    /// `null` primary data.
    None,
}

/// A resource object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    /// Resource type.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Server-assigned id.
    #[serde(default)]
    pub id: String,
    /// Attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Attributes,
    /// Relationships.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipObject>,
    /// Resource-level meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// Resource-level links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,
}

/// A relationship object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipObject {
    /// Resource linkage. `None` when the member is absent, `Some(None)` when
    /// it is `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Option<Linkage>>,
    /// Relationship links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Map<String, Value>>,
    /// Relationship meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Resource linkage inside a relationship object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    /// To-many linkage.
    Many(Vec<ResourceIdentifier>),
    /// To-one linkage.
    One(ResourceIdentifier),
}

/// A resource identifier object. Any other members are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// Resource type.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Resource id.
    #[serde(default)]
    pub id: String,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn identifier_of(resource_type: &str, id: &str, what: &str) -> CoreResult<Identifier> {
    if resource_type.is_empty() {
        return Err(CoreError::malformed(format!("{what} without type")));
    }
    if id.is_empty() {
        return Err(CoreError::malformed(format!(
            "{what} of type {resource_type} without id"
        )));
    }
    Identifier::try_new(resource_type, id)
        .map_err(|_| CoreError::malformed(format!("{what} type {resource_type:?} contains ':'")))
}

impl Document {
    /// Parses a document from JSON text.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::malformed(e.to_string()))
    }

    /// Parses a document from a JSON value.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        serde_json::from_value(value).map_err(|e| CoreError::malformed(e.to_string()))
    }

    /// Creates a document with a single primary resource.
    #[must_use]
    pub fn single(resource: ResourceObject) -> Self {
        Self {
            data: PrimaryData::One(Some(resource)),
            ..Self::default()
        }
    }

    /// Creates a document with collection primary data.
    #[must_use]
    pub fn collection(resources: Vec<ResourceObject>) -> Self {
        Self {
            data: PrimaryData::Many(resources),
            ..Self::default()
        }
    }

    /// Adds included resources.
    #[must_use]
    pub fn with_included(mut self, included: Vec<ResourceObject>) -> Self {
        self.included = included;
        self
    }

    /// Returns true if the primary data is a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self.data, PrimaryData::Many(_))
    }

    /// Iterates primary then included resource objects.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceObject> {
        let primary: &[ResourceObject] = match &self.data {
            PrimaryData::Many(items) => items.as_slice(),
            PrimaryData::One(Some(item)) => std::slice::from_ref(item),
            PrimaryData::One(None) => &[],
        };
        primary.iter().chain(self.included.iter())
    }

    /// Returns the identifiers of the primary data.
    pub fn identifiers(&self) -> CoreResult<PrimaryIdentifiers> {
        Ok(match &self.data {
            PrimaryData::Many(items) => PrimaryIdentifiers::Many(
                items
                    .iter()
                    .map(ResourceObject::identifier)
                    .collect::<CoreResult<_>>()?,
            ),
            PrimaryData::One(Some(item)) => PrimaryIdentifiers::One(item.identifier()?),
            PrimaryData::One(None) => PrimaryIdentifiers::None,
        })
    }
}

impl ResourceObject {
    /// Creates a resource object with no attributes.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the attributes from a JSON object. Non-objects are ignored.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        if let Value::Object(map) = attributes {
            self.attributes = map;
        }
        self
    }

    /// Adds a relationship with the given linkage.
    #[must_use]
    pub fn with_relationship(mut self, name: impl Into<String>, rel: &Relationship) -> Self {
        self.relationships
            .insert(name.into(), RelationshipObject::from_relationship(rel));
        self
    }

    /// Computes the identifier, rejecting objects without type or id.
    pub fn identifier(&self) -> CoreResult<Identifier> {
        identifier_of(&self.resource_type, &self.id, "resource object")
    }

    /// Normalizes into an entity.
    ///
    /// Relationship linkage is reduced to identifiers; relationships without
    /// a `data` member carry no linkage and are skipped.
    pub fn to_entity(&self) -> CoreResult<Entity> {
        let mut entity = Entity::new(self.identifier()?).with_attributes(self.attributes.clone());
        for (name, rel) in &self.relationships {
            if let Some(linkage) = &rel.data {
                entity
                    .relationships
                    .insert(name.clone(), Linkage::normalize(linkage.as_ref())?);
            }
        }
        Ok(entity)
    }

    /// Builds a resource object from an entity.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        let mut object = Self::new(entity.resource_type(), entity.identifier.id());
        object.attributes = entity.attributes.clone();
        object.relationships = entity
            .relationships
            .iter()
            .map(|(name, rel)| (name.clone(), RelationshipObject::from_relationship(rel)))
            .collect();
        object
    }
}

impl RelationshipObject {
    /// Builds a relationship object with linkage only.
    #[must_use]
    pub fn from_relationship(rel: &Relationship) -> Self {
        let data = match rel {
            Relationship::ToOne(id) => id.as_ref().map(|id| Linkage::One(id.into())),
            Relationship::ToMany(ids) => Some(Linkage::Many(ids.iter().map(Into::into).collect())),
        };
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

impl Linkage {
    fn normalize(linkage: Option<&Linkage>) -> CoreResult<Relationship> {
        Ok(match linkage {
            None => Relationship::ToOne(None),
            Some(Linkage::One(rid)) => Relationship::ToOne(Some(rid.identifier()?)),
            Some(Linkage::Many(rids)) => Relationship::ToMany(
                rids.iter()
                    .map(ResourceIdentifier::identifier)
                    .collect::<CoreResult<_>>()?,
            ),
        })
    }
}

impl ResourceIdentifier {
    /// Computes the identifier, rejecting linkage without type or id.
    pub fn identifier(&self) -> CoreResult<Identifier> {
        identifier_of(&self.resource_type, &self.id, "resource linkage")
    }
}

impl From<&Identifier> for ResourceIdentifier {
    fn from(id: &Identifier) -> Self {
        Self {
            resource_type: id.resource_type().to_string(),
            id: id.id().to_string(),
        }
    }
}
