//! Overlay maps: the fields each scope changed, keyed by identifier.

use crate::entity::{Entity, Identifier};
use std::collections::BTreeMap;

/// State of one identifier inside an overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Fields changed in this overlay, applied over the entity beneath.
    Changed(Entity),
    /// A whole entity hiding whatever lies beneath, as when a resource is
    /// loaded again after being removed in the same scope.
    Replaced(Entity),
    /// The entity was removed in this overlay.
    Removed,
}

impl Slot {
    /// Returns the recorded fields, or `None` for a removal.
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Slot::Changed(entity) | Slot::Replaced(entity) => Some(entity),
            Slot::Removed => None,
        }
    }

    /// Returns true if the slot ignores the layers beneath it.
    #[must_use]
    pub fn hides_below(&self) -> bool {
        !matches!(self, Slot::Changed(_))
    }

    /// Applies the slot to the entity resolved beneath it.
    #[must_use]
    pub fn apply(&self, below: Option<Entity>) -> Option<Entity> {
        match self {
            Slot::Changed(changes) => {
                let mut entity =
                    below.unwrap_or_else(|| Entity::new(changes.identifier.clone()));
                entity.merge(changes);
                Some(entity)
            }
            Slot::Replaced(entity) => Some(entity.clone()),
            Slot::Removed => None,
        }
    }
}

/// A set of entity changes layered over a parent scope.
///
/// Only changed fields are kept, so data loaded into the parent later still
/// shows through every field this overlay left alone. A removal shadows
/// everything beneath it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    slots: BTreeMap<Identifier, Slot>,
}

impl Overlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the slot for an identifier.
    #[must_use]
    pub fn get(&self, id: &Identifier) -> Option<&Slot> {
        self.slots.get(id)
    }

    /// Records changed fields, merging them into earlier changes.
    ///
    /// Changes to an identifier removed in this overlay bring it back
    /// holding only the given fields.
    pub fn patch(&mut self, changes: Entity) {
        match self.slots.get_mut(&changes.identifier) {
            Some(Slot::Changed(existing) | Slot::Replaced(existing)) => existing.merge(&changes),
            Some(slot) => *slot = Slot::Replaced(changes),
            None => {
                self.slots
                    .insert(changes.identifier.clone(), Slot::Changed(changes));
            }
        }
    }

    /// Records a removal.
    pub fn remove(&mut self, id: Identifier) {
        self.slots.insert(id, Slot::Removed);
    }

    /// Returns true if the overlay holds no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the number of changed identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Iterates slots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Slot)> {
        self.slots.iter()
    }

    /// Keeps only the slots matching the predicate, which may also trim them.
    pub fn retain(&mut self, mut keep: impl FnMut(&Identifier, &mut Slot) -> bool) {
        self.slots.retain(|id, slot| keep(id, slot));
    }

    /// Merges a child overlay into this one, last write wins.
    ///
    /// Changed fields merge per field into this overlay's slot. Removals
    /// and replacements take the slot over.
    pub fn absorb(&mut self, child: Overlay) {
        for (id, slot) in child.slots {
            match slot {
                Slot::Changed(changes) => self.patch(changes),
                other => {
                    self.slots.insert(id, other);
                }
            }
        }
    }

    /// Renames an identifier and rewrites relationship references to it.
    pub fn rename(&mut self, from: &Identifier, to: &Identifier) {
        if let Some(mut slot) = self.slots.remove(from) {
            if let Slot::Changed(entity) | Slot::Replaced(entity) = &mut slot {
                entity.identifier = to.clone();
            }
            self.slots.insert(to.clone(), slot);
        }
        for slot in self.slots.values_mut() {
            if let Slot::Changed(entity) | Slot::Replaced(entity) = slot {
                entity.rename_references(from, to);
            }
        }
    }
}

impl FromIterator<Entity> for Overlay {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut overlay = Overlay::new();
        for entity in iter {
            overlay.patch(entity);
        }
        overlay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Relationship;
    use serde_json::json;

    fn post(id: &str, title: &str) -> Entity {
        Entity::new(Identifier::new("post", id))
            .with_attributes(json!({ "title": title }).as_object().cloned().unwrap())
    }

    #[test]
    fn patch_merges_into_earlier_changes() {
        let mut overlay = Overlay::new();
        let mut first = post("1", "A");
        first.attributes.insert("body".into(), json!("kept"));
        overlay.patch(first);
        overlay.patch(post("1", "B"));

        assert_eq!(overlay.len(), 1);
        let entity = overlay.get(&Identifier::new("post", "1")).unwrap().entity().unwrap();
        assert_eq!(entity.attribute("title"), Some(&json!("B")));
        assert_eq!(entity.attribute("body"), Some(&json!("kept")));
    }

    #[test]
    fn changed_slot_applies_over_entity_below() {
        let below = Entity::new(Identifier::new("post", "1")).with_attributes(
            json!({"title": "A", "body": "x"}).as_object().cloned().unwrap(),
        );
        let slot = Slot::Changed(post("1", "B"));

        let applied = slot.apply(Some(below)).unwrap();
        assert_eq!(applied.attribute("title"), Some(&json!("B")));
        assert_eq!(applied.attribute("body"), Some(&json!("x")));
        assert!(!slot.hides_below());
        assert_eq!(Slot::Removed.apply(Some(applied)), None);
    }

    #[test]
    fn patch_after_remove_replaces() {
        let mut overlay = Overlay::new();
        overlay.remove(Identifier::new("post", "1"));
        overlay.patch(post("1", "B"));

        let slot = overlay.get(&Identifier::new("post", "1")).unwrap();
        assert_eq!(slot, &Slot::Replaced(post("1", "B")));
        assert!(slot.hides_below());
    }

    #[test]
    fn absorb_merges_per_field() {
        let mut parent = Overlay::new();
        let mut base = post("1", "A");
        base.attributes.insert("body".into(), json!("kept"));
        parent.patch(base);

        let mut child = Overlay::new();
        child.patch(post("1", "B"));
        child.remove(Identifier::new("post", "2"));
        parent.absorb(child);

        let merged = parent.get(&Identifier::new("post", "1")).unwrap().entity().unwrap();
        assert_eq!(merged.attribute("title"), Some(&json!("B")));
        assert_eq!(merged.attribute("body"), Some(&json!("kept")));
        assert_eq!(parent.get(&Identifier::new("post", "2")), Some(&Slot::Removed));
    }

    #[test]
    fn absorb_removal_replaces_entity() {
        let mut parent: Overlay = vec![post("1", "A")].into_iter().collect();
        let mut child = Overlay::new();
        child.remove(Identifier::new("post", "1"));
        parent.absorb(child);

        assert_eq!(parent.get(&Identifier::new("post", "1")), Some(&Slot::Removed));
    }

    #[test]
    fn rename_moves_key_and_references() {
        let tmp = Identifier::new("post", "tmp-1");
        let real = Identifier::new("post", "7");
        let comment = Entity::new(Identifier::new("comment", "1"))
            .with_relationship("post", Relationship::ToOne(Some(tmp.clone())));
        let mut overlay: Overlay = vec![Entity::new(tmp.clone()), comment].into_iter().collect();

        overlay.rename(&tmp, &real);

        assert!(overlay.get(&tmp).is_none());
        assert_eq!(
            overlay.get(&real).unwrap().entity().unwrap().identifier,
            real
        );
        let comment = overlay.get(&Identifier::new("comment", "1")).unwrap().entity().unwrap();
        assert_eq!(
            comment.relationship("post"),
            Some(&Relationship::ToOne(Some(real)))
        );
    }
}
