//! The store snapshot.

use crate::config::Config;
use crate::entity::{Attributes, Entity, Identifier, Relationship};
use crate::error::{CoreError, CoreResult};
use crate::jsonapi::{normalize, Document};
use crate::transaction::{Overlay, Slot, TransactionManager};
use crate::types::SequenceNumber;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Changes handed to `commit()` and waiting to reach the server.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChangeSet {
    pub(crate) sequence: SequenceNumber,
    pub(crate) changes: Overlay,
}

/// An in-memory, normalized store of JSON:API resources.
///
/// A `Db` is a plain value: the engine publishes a new one after every
/// write and readers hold on to whichever snapshot they were given.
///
/// Entities live in layers, innermost first:
/// 1. Open transactions, newest on top
/// 2. Pending local changes not yet passed to [`commit`](Self::commit)
/// 3. Committed change sets waiting for the server, newest first
/// 4. The last known server state
///
/// Overlay layers record only the fields they changed. A lookup starts from
/// the server entity and applies every layer above it, so local edits shadow
/// server data until the server confirms them while fields nobody touched
/// keep following later server loads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Db {
    pub(crate) config: Config,
    pub(crate) server: BTreeMap<Identifier, Entity>,
    pub(crate) committed: VecDeque<ChangeSet>,
    pub(crate) pending: Overlay,
    pub(crate) transactions: TransactionManager,
    pub(crate) last_sequence: SequenceNumber,
}

impl Db {
    /// Creates an empty store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- reads ----

    /// Resolves an identifier through every layer, transactions included.
    #[must_use]
    pub fn get(&self, id: &Identifier) -> Option<Entity> {
        self.resolve(self.transactions.overlays().chain(self.base_layers()), id)
    }

    /// Resolves an identifier ignoring open transactions.
    #[must_use]
    pub fn get_base(&self, id: &Identifier) -> Option<Entity> {
        self.resolve(self.base_layers(), id)
    }

    /// Resolves an identifier as seen from inside the named transaction.
    ///
    /// Transactions opened after `name` are ignored.
    pub fn get_in(&self, name: &str, id: &Identifier) -> CoreResult<Option<Entity>> {
        let overlays = self.transactions.overlays_from(name)?;
        Ok(self.resolve(overlays.chain(self.base_layers()), id))
    }

    /// Returns the entity as last confirmed by the server.
    #[must_use]
    pub fn get_server(&self, id: &Identifier) -> Option<&Entity> {
        self.server.get(id)
    }

    /// Returns true if the identifier resolves to an entity.
    #[must_use]
    pub fn contains(&self, id: &Identifier) -> bool {
        self.get(id).is_some()
    }

    /// Returns every resolved entity in identifier order.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        let mut ids: BTreeSet<&Identifier> = self.server.keys().collect();
        for overlay in self.transactions.overlays().chain(self.base_layers()) {
            ids.extend(overlay.iter().map(|(id, _)| id));
        }
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Returns resolved entities of one resource type.
    #[must_use]
    pub fn entities_of(&self, resource_type: &str) -> Vec<Entity> {
        self.entities()
            .into_iter()
            .filter(|e| e.resource_type() == resource_type)
            .collect()
    }

    /// Returns the number of resolved entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities().len()
    }

    /// Returns true if no entity resolves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the names of open transactions, outermost first.
    #[must_use]
    pub fn transaction_names(&self) -> Vec<&str> {
        self.transactions.names()
    }

    /// Returns the changes recorded in an open transaction.
    #[must_use]
    pub fn overlay(&self, name: &str) -> Option<&Overlay> {
        self.transactions.get(name).map(|t| t.overlay())
    }

    /// Returns local changes not yet passed to `commit()`.
    #[must_use]
    pub fn pending(&self) -> &Overlay {
        &self.pending
    }

    /// Returns the number of committed change sets not yet synced.
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    fn base_layers(&self) -> impl Iterator<Item = &Overlay> {
        std::iter::once(&self.pending).chain(self.committed.iter().rev().map(|c| &c.changes))
    }

    fn resolve<'a>(
        &'a self,
        overlays: impl Iterator<Item = &'a Overlay>,
        id: &Identifier,
    ) -> Option<Entity> {
        let mut slots = Vec::new();
        for slot in overlays.filter_map(|overlay| overlay.get(id)) {
            slots.push(slot);
            if slot.hides_below() {
                break;
            }
        }
        slots
            .into_iter()
            .rev()
            .fold(self.server.get(id).cloned(), |below, slot| slot.apply(below))
    }

    /// Resolves beneath the pending overlay: committed sets, then server.
    fn get_committed(&self, id: &Identifier) -> Option<Entity> {
        self.resolve(self.committed.iter().rev().map(|c| &c.changes), id)
    }

    // ---- transactions ----

    /// Opens a named transaction.
    pub fn start_transaction(&mut self, name: &str) -> CoreResult<()> {
        self.transactions.start(name)
    }

    /// Replaces the contents of a named transaction.
    pub fn save_transaction(&mut self, name: &str, overlay: Overlay) -> CoreResult<()> {
        self.transactions.save(name, overlay)
    }

    /// Discards a named transaction and every transaction opened after it.
    pub fn abort_transaction(&mut self, name: &str) -> CoreResult<()> {
        self.transactions.abort(name).map(|_| ())
    }

    /// Merges a named transaction into its parent scope.
    pub fn commit_transaction(&mut self, name: &str) -> CoreResult<()> {
        self.transactions.commit(name, &mut self.pending)
    }

    /// Moves pending local changes into a new committed change set.
    ///
    /// Fields that match what the layers below already hold are dropped,
    /// and so are identifiers left with nothing to change.
    /// Returns the sequence number of the new change set, or `None` if
    /// nothing was left to commit.
    pub fn commit(&mut self) -> Option<SequenceNumber> {
        let mut changes = std::mem::take(&mut self.pending);
        changes.retain(|id, slot| {
            let below = self.get_committed(id);
            match (slot, below) {
                (Slot::Changed(fields), Some(below)) => {
                    let (attributes, relationships) = fields.changes_since(&below);
                    fields.attributes = attributes;
                    fields.relationships = relationships;
                    !fields.is_bare()
                }
                (Slot::Changed(_), None) => true,
                (Slot::Replaced(entity), below) => below.as_ref() != Some(&*entity),
                (Slot::Removed, below) => below.is_some(),
            }
        });
        if changes.is_empty() {
            return None;
        }
        self.last_sequence = self.last_sequence.next();
        self.committed.push_back(ChangeSet {
            sequence: self.last_sequence,
            changes,
        });
        Some(self.last_sequence)
    }

    /// Resets the store to empty, discarding transactions and unsynced
    /// changes.
    pub fn clear(&mut self) {
        *self = Self::with_config(self.config.clone());
    }

    // ---- local edits ----

    /// Creates a resource with a temporary identifier in the innermost scope.
    pub fn create(&mut self, resource_type: &str, attributes: Attributes) -> Identifier {
        let id = Identifier::temporary(resource_type, &self.config.temporary_id_prefix);
        self.scope_mut()
            .patch(Entity::new(id.clone()).with_attributes(attributes));
        id
    }

    /// Updates attributes of a resource in the innermost scope.
    pub fn update(&mut self, id: &Identifier, attributes: Attributes) -> CoreResult<()> {
        self.require(id)?;
        self.scope_mut()
            .patch(Entity::new(id.clone()).with_attributes(attributes));
        Ok(())
    }

    /// Sets one relationship of a resource in the innermost scope.
    pub fn set_relationship(
        &mut self,
        id: &Identifier,
        name: &str,
        relationship: Relationship,
    ) -> CoreResult<()> {
        self.require(id)?;
        self.scope_mut()
            .patch(Entity::new(id.clone()).with_relationship(name, relationship));
        Ok(())
    }

    /// Removes a resource in the innermost scope.
    pub fn remove(&mut self, id: &Identifier) -> CoreResult<()> {
        self.require(id)?;
        self.scope_mut().remove(id.clone());
        Ok(())
    }

    fn require(&self, id: &Identifier) -> CoreResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(CoreError::entity_not_found(id))
        }
    }

    fn scope_mut(&mut self) -> &mut Overlay {
        match self.transactions.innermost_mut() {
            Some(overlay) => overlay,
            None => &mut self.pending,
        }
    }

    // ---- loading ----

    /// Merges a JSON:API document into the current scope.
    ///
    /// With a transaction open the resources land in its overlay as changed
    /// fields, otherwise in the server layer. Either way each resource is
    /// merged per field into the entity it resolves to. Returns the number
    /// of resource objects merged.
    pub fn load_json_api(&mut self, document: &Document) -> CoreResult<usize> {
        let entities = normalize(document)?;
        let count = entities.len();
        self.merge_loaded(entities);
        Ok(count)
    }

    /// Merges several documents, all or nothing.
    pub fn load_documents(&mut self, documents: &[Document]) -> CoreResult<usize> {
        let mut entities = Vec::new();
        for document in documents {
            entities.extend(normalize(document)?);
        }
        let count = entities.len();
        self.merge_loaded(entities);
        Ok(count)
    }

    fn merge_loaded(&mut self, entities: Vec<Entity>) {
        for entity in entities {
            if self.transactions.is_empty() {
                self.merge_server(entity);
            } else {
                self.scope_mut().patch(entity);
            }
        }
    }

    pub(crate) fn merge_server(&mut self, entity: Entity) {
        match self.server.get_mut(&entity.identifier) {
            Some(existing) => existing.merge(&entity),
            None => {
                self.server.insert(entity.identifier.clone(), entity);
            }
        }
    }

    /// Renames an identifier in every layer, keys and references alike.
    pub(crate) fn rename(&mut self, from: &Identifier, to: &Identifier) {
        if let Some(mut entity) = self.server.remove(from) {
            entity.identifier = to.clone();
            self.merge_server(entity);
        }
        for entity in self.server.values_mut() {
            entity.rename_references(from, to);
        }
        self.pending.rename(from, to);
        for set in &mut self.committed {
            set.changes.rename(from, to);
        }
        for overlay in self.transactions.overlays_mut() {
            overlay.rename(from, to);
        }
    }
}
