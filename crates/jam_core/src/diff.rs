//! Diffs of committed changes and their server acknowledgement.
//!
//! [`Db::commit_diff`] turns the oldest committed change set into a
//! [`Diff`] for the server. Once the server answers, the [`CommitResponse`]
//! goes back through [`Db::post_commit_diff`], which folds the change set
//! into the server layer and swaps temporary ids for the ids the server
//! assigned. Until that happens `commit_diff` keeps returning the same diff,
//! so a failed round trip is simply retried.

use crate::db::Db;
use crate::entity::{Attributes, Entity, Identifier, Relationship};
use crate::error::{CoreError, CoreResult};
use crate::jsonapi::{normalize, Document, ResourceObject};
use crate::transaction::Slot;
use crate::types::SequenceNumber;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// One change inside a diff.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOperation {
    /// A resource created locally, still under its temporary identifier.
    Add {
        /// The new entity.
        entity: Entity,
    },
    /// Locally edited fields of a resource the server already knows.
    Update {
        /// Resource identifier.
        identifier: Identifier,
        /// Attributes whose value differs from the server's.
        attributes: Attributes,
        /// Relationships whose linkage differs from the server's.
        relationships: BTreeMap<String, Relationship>,
    },
    /// A resource removed locally.
    Remove {
        /// Resource identifier.
        identifier: Identifier,
    },
}

impl DiffOperation {
    /// Returns the identifier the operation targets.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        match self {
            DiffOperation::Add { entity } => &entity.identifier,
            DiffOperation::Update { identifier, .. } | DiffOperation::Remove { identifier } => {
                identifier
            }
        }
    }
}

/// The server-bound form of one committed change set.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
    /// Sequence number of the change set.
    pub sequence: SequenceNumber,
    /// Operations, adds first, then updates, then removes.
    pub operations: Vec<DiffOperation>,
    temporary_prefix: String,
}

impl Diff {
    /// Prefix marking temporary identifiers in this diff.
    #[must_use]
    pub fn temporary_prefix(&self) -> &str {
        &self.temporary_prefix
    }

    /// Returns true if the change set turned out to hold no differences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Renders the diff as a JSON:API Atomic Operations document.
    ///
    /// Temporary identifiers are sent as `lid` so the server can tell them
    /// apart from its own ids.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let operations: Vec<Value> = self
            .operations
            .iter()
            .map(|op| match op {
                DiffOperation::Add { entity } => json!({
                    "op": "add",
                    "data": self.resource(
                        &entity.identifier,
                        &entity.attributes,
                        &entity.relationships,
                    ),
                }),
                DiffOperation::Update {
                    identifier,
                    attributes,
                    relationships,
                } => json!({
                    "op": "update",
                    "data": self.resource(identifier, attributes, relationships),
                }),
                DiffOperation::Remove { identifier } => json!({
                    "op": "remove",
                    "ref": self.reference(identifier),
                }),
            })
            .collect();
        json!({ "atomic:operations": operations })
    }

    fn reference(&self, id: &Identifier) -> Value {
        let key = if id.is_temporary(&self.temporary_prefix) {
            "lid"
        } else {
            "id"
        };
        let mut object = Map::new();
        object.insert("type".to_string(), json!(id.resource_type()));
        object.insert(key.to_string(), json!(id.id()));
        Value::Object(object)
    }

    fn resource(
        &self,
        id: &Identifier,
        attributes: &Attributes,
        relationships: &BTreeMap<String, Relationship>,
    ) -> Value {
        let mut object = self.reference(id);
        if !attributes.is_empty() {
            object["attributes"] = Value::Object(attributes.clone());
        }
        if !relationships.is_empty() {
            let rels: Map<String, Value> = relationships
                .iter()
                .map(|(name, rel)| {
                    let data = match rel {
                        Relationship::ToOne(None) => Value::Null,
                        Relationship::ToOne(Some(id)) => self.reference(id),
                        Relationship::ToMany(ids) => {
                            Value::Array(ids.iter().map(|id| self.reference(id)).collect())
                        }
                    };
                    (name.clone(), json!({ "data": data }))
                })
                .collect();
            object["relationships"] = Value::Object(rels);
        }
        object
    }
}

/// The server's answer to a diff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitResponse {
    /// Sequence number of the diff being acknowledged.
    pub sequence: u64,
    /// Server ids for resources sent under temporary identifiers.
    pub assigned_ids: BTreeMap<Identifier, String>,
    /// Authoritative resource bodies returned by the server.
    pub document: Option<Document>,
}

impl CommitResponse {
    /// Creates a bare acknowledgement of a diff.
    #[must_use]
    pub fn acknowledge(diff: &Diff) -> Self {
        Self {
            sequence: diff.sequence.as_u64(),
            ..Self::default()
        }
    }

    /// Records the server id assigned to a temporary identifier.
    #[must_use]
    pub fn with_assigned_id(mut self, temporary: Identifier, id: impl Into<String>) -> Self {
        self.assigned_ids.insert(temporary, id.into());
        self
    }

    /// Attaches resource bodies returned by the server.
    #[must_use]
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    /// Builds a response from a JSON:API Atomic Operations result document.
    ///
    /// `atomic:results` must line up with the diff's operations. The `id` of
    /// each add result becomes the assigned id of the matching temporary
    /// identifier, and every returned resource is kept as authoritative data.
    pub fn from_atomic_results(diff: &Diff, results: &Value) -> CoreResult<Self> {
        let entries = results
            .get("atomic:results")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::malformed("missing atomic:results array"))?;
        if entries.len() != diff.operations.len() {
            return Err(CoreError::malformed(format!(
                "expected {} atomic results, got {}",
                diff.operations.len(),
                entries.len()
            )));
        }

        let mut response = Self::acknowledge(diff);
        let mut resources = Vec::new();
        for (op, entry) in diff.operations.iter().zip(entries) {
            let Some(data) = entry.get("data").filter(|d| !d.is_null()) else {
                continue;
            };
            let resource: ResourceObject = serde_json::from_value(data.clone())
                .map_err(|e| CoreError::malformed(e.to_string()))?;
            if let DiffOperation::Add { entity } = op {
                if resource.id.is_empty() {
                    return Err(CoreError::malformed(format!(
                        "no id assigned to {}",
                        entity.identifier
                    )));
                }
                response
                    .assigned_ids
                    .insert(entity.identifier.clone(), resource.id.clone());
            }
            resources.push(resource);
        }
        if !resources.is_empty() {
            response.document = Some(Document::collection(resources));
        }
        Ok(response)
    }
}

impl Db {
    /// Returns the diff of the oldest committed change set.
    ///
    /// Returns `None` when every committed change has been acknowledged.
    /// The change set stays in flight, and this keeps returning the same
    /// diff, until [`post_commit_diff`](Self::post_commit_diff) consumes it.
    #[must_use]
    pub fn commit_diff(&self) -> Option<Diff> {
        let set = self.committed.front()?;
        let mut adds = Vec::new();
        let mut updates = Vec::new();
        let mut removes = Vec::new();

        for (id, slot) in set.changes.iter() {
            match (slot, self.server.get(id)) {
                (Slot::Changed(entity) | Slot::Replaced(entity), None) => {
                    adds.push(DiffOperation::Add {
                        entity: entity.clone(),
                    });
                }
                (Slot::Changed(entity) | Slot::Replaced(entity), Some(server)) => {
                    let (attributes, relationships) = entity.changes_since(server);
                    if !attributes.is_empty() || !relationships.is_empty() {
                        updates.push(DiffOperation::Update {
                            identifier: id.clone(),
                            attributes,
                            relationships,
                        });
                    }
                }
                (Slot::Removed, Some(_)) => removes.push(DiffOperation::Remove {
                    identifier: id.clone(),
                }),
                (Slot::Removed, None) => {}
            }
        }

        adds.extend(updates);
        adds.extend(removes);
        Some(Diff {
            sequence: set.sequence,
            operations: adds,
            temporary_prefix: self.config.temporary_id_prefix.clone(),
        })
    }

    /// Applies the server's response to the diff in flight.
    ///
    /// The fields the acknowledged change set edited are merged into the
    /// server layer,
    /// temporary identifiers are renamed everywhere, and returned resources
    /// are loaded as server data. Fails with [`CoreError::StaleDiff`] if the
    /// response is not for the oldest change set; on any error the store is
    /// left unchanged.
    pub fn post_commit_diff(&mut self, response: &CommitResponse) -> CoreResult<()> {
        let expected = self.committed.front().map(|set| set.sequence.as_u64());
        if expected != Some(response.sequence) {
            return Err(CoreError::StaleDiff {
                expected,
                actual: response.sequence,
            });
        }
        let confirmed = match &response.document {
            Some(document) => normalize(document)?,
            None => Vec::new(),
        };
        let Some(set) = self.committed.pop_front() else {
            return Err(CoreError::StaleDiff {
                expected,
                actual: response.sequence,
            });
        };

        for (id, slot) in set.changes.iter() {
            match slot {
                Slot::Changed(fields) => self.merge_server(fields.clone()),
                Slot::Replaced(entity) => {
                    self.server.insert(id.clone(), entity.clone());
                }
                Slot::Removed => {
                    self.server.remove(id);
                }
            }
        }
        for (temporary, server_id) in &response.assigned_ids {
            let assigned = temporary.with_id(server_id.as_str());
            self.rename(temporary, &assigned);
        }
        for entity in confirmed {
            self.merge_server(entity);
        }
        Ok(())
    }
}
