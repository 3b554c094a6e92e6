//! Transaction manager.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Overlay;

/// An open, named transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    name: String,
    overlay: Overlay,
}

impl Transaction {
    fn new(name: String) -> Self {
        Self {
            name,
            overlay: Overlay::new(),
        }
    }

    /// Returns the transaction name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the changes made inside this transaction.
    #[must_use]
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }
}

/// Manages the stack of open transactions.
///
/// The manager provides:
/// - Unique names among open transactions
/// - Nesting: the last transaction started is the innermost scope
/// - Commit into the enclosing transaction, or into the root overlay
///   supplied by the caller when the transaction is outermost
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionManager {
    stack: Vec<Transaction>,
}

impl TransactionManager {
    /// Creates a manager with no open transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new, empty transaction as the innermost scope.
    pub fn start(&mut self, name: &str) -> CoreResult<()> {
        if self.position(name).is_some() {
            return Err(CoreError::duplicate_transaction(name));
        }
        self.stack.push(Transaction::new(name.to_string()));
        Ok(())
    }

    /// Replaces the contents of a transaction.
    pub fn save(&mut self, name: &str, overlay: Overlay) -> CoreResult<()> {
        let pos = self.require(name)?;
        self.stack[pos].overlay = overlay;
        Ok(())
    }

    /// Discards a transaction and every transaction opened after it.
    ///
    /// Returns the discarded transactions, outermost first.
    pub fn abort(&mut self, name: &str) -> CoreResult<Vec<Transaction>> {
        let pos = self.require(name)?;
        Ok(self.stack.split_off(pos))
    }

    /// Merges a transaction into its parent scope and closes it.
    ///
    /// The parent is the enclosing transaction, or `root` for the outermost
    /// one. Fails if transactions opened after this one are still active.
    pub fn commit(&mut self, name: &str, root: &mut Overlay) -> CoreResult<()> {
        let pos = self.require(name)?;
        if pos + 1 != self.stack.len() {
            return Err(CoreError::NestedTransactionOpen {
                name: name.to_string(),
                nested: self.stack[pos + 1..]
                    .iter()
                    .map(|t| t.name.clone())
                    .collect(),
            });
        }
        let Some(txn) = self.stack.pop() else {
            return Err(CoreError::unknown_transaction(name));
        };
        match self.stack.last_mut() {
            Some(parent) => parent.overlay.absorb(txn.overlay),
            None => root.absorb(txn.overlay),
        }
        Ok(())
    }

    /// Gets an open transaction by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Transaction> {
        self.stack.iter().find(|t| t.name == name)
    }

    /// Returns the innermost overlay, if any transaction is open.
    pub fn innermost_mut(&mut self) -> Option<&mut Overlay> {
        self.stack.last_mut().map(|t| &mut t.overlay)
    }

    /// Iterates overlays from innermost to outermost.
    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.stack.iter().rev().map(|t| &t.overlay)
    }

    /// Iterates overlays of the named transaction and its enclosing ones,
    /// innermost first.
    pub fn overlays_from(&self, name: &str) -> CoreResult<impl Iterator<Item = &Overlay>> {
        let pos = self.require(name)?;
        Ok(self.stack[..=pos].iter().rev().map(|t| &t.overlay))
    }

    /// Iterates every overlay mutably.
    pub fn overlays_mut(&mut self) -> impl Iterator<Item = &mut Overlay> {
        self.stack.iter_mut().map(|t| &mut t.overlay)
    }

    /// Returns the names of open transactions, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stack.iter().map(|t| t.name.as_str()).collect()
    }

    /// Returns true if no transaction is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.stack.iter().position(|t| t.name == name)
    }

    fn require(&self, name: &str) -> CoreResult<usize> {
        self.position(name)
            .ok_or_else(|| CoreError::unknown_transaction(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Identifier};

    fn entity(id: &str) -> Entity {
        Entity::new(Identifier::new("post", id))
    }

    #[test]
    fn start_rejects_duplicate_names() {
        let mut tm = TransactionManager::new();
        tm.start("edit").unwrap();
        assert_eq!(
            tm.start("edit"),
            Err(CoreError::duplicate_transaction("edit"))
        );
        assert_eq!(tm.names(), vec!["edit"]);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut tm = TransactionManager::new();
        let mut root = Overlay::new();
        assert!(matches!(
            tm.abort("missing"),
            Err(CoreError::UnknownTransaction { .. })
        ));
        assert!(matches!(
            tm.commit("missing", &mut root),
            Err(CoreError::UnknownTransaction { .. })
        ));
        assert!(tm.save("missing", Overlay::new()).is_err());
    }

    #[test]
    fn abort_pops_descendants() {
        let mut tm = TransactionManager::new();
        tm.start("a").unwrap();
        tm.start("b").unwrap();
        tm.start("c").unwrap();

        let dropped = tm.abort("b").unwrap();

        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped[0].name(), "b");
        assert_eq!(tm.names(), vec!["a"]);
    }

    #[test]
    fn commit_merges_into_parent() {
        let mut tm = TransactionManager::new();
        let mut root = Overlay::new();
        tm.start("outer").unwrap();
        tm.start("inner").unwrap();
        tm.innermost_mut().unwrap().patch(entity("1"));

        tm.commit("inner", &mut root).unwrap();
        assert!(root.is_empty());
        assert_eq!(tm.get("outer").unwrap().overlay().len(), 1);

        tm.commit("outer", &mut root).unwrap();
        assert_eq!(root.len(), 1);
        assert!(tm.is_empty());
    }

    #[test]
    fn commit_with_open_nested_fails() {
        let mut tm = TransactionManager::new();
        let mut root = Overlay::new();
        tm.start("outer").unwrap();
        tm.start("inner").unwrap();

        let err = tm.commit("outer", &mut root).unwrap_err();
        assert_eq!(
            err,
            CoreError::NestedTransactionOpen {
                name: "outer".into(),
                nested: vec!["inner".into()],
            }
        );
        assert_eq!(tm.names(), vec!["outer", "inner"]);
    }

    #[test]
    fn save_replaces_overlay() {
        let mut tm = TransactionManager::new();
        tm.start("edit").unwrap();
        tm.innermost_mut().unwrap().patch(entity("1"));

        let checkpoint: Overlay = vec![entity("2"), entity("3")].into_iter().collect();
        tm.save("edit", checkpoint.clone()).unwrap();

        assert_eq!(tm.get("edit").unwrap().overlay(), &checkpoint);
    }

    #[test]
    fn overlays_walk_innermost_first() {
        let mut tm = TransactionManager::new();
        tm.start("a").unwrap();
        tm.innermost_mut().unwrap().patch(entity("a"));
        tm.start("b").unwrap();
        tm.innermost_mut().unwrap().patch(entity("b"));

        let first = tm.overlays().next().unwrap();
        assert!(first.get(&Identifier::new("post", "b")).is_some());

        let from_a: Vec<_> = tm.overlays_from("a").unwrap().collect();
        assert_eq!(from_a.len(), 1);
    }
}
