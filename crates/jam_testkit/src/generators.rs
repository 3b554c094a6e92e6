//! Property-based test generators using proptest.
//!
//! Identifiers are drawn from a deliberately small space so that random
//! documents and operations collide on the same resources.

use jam_core::{
    Attributes, CoreResult, Db, Document, Identifier, Relationship, ResourceObject,
};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating resource types.
pub fn resource_type_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["post", "user", "comment"]).prop_map(str::to_string)
}

/// Strategy for generating server-assigned ids.
pub fn server_id_strategy() -> impl Strategy<Value = String> {
    (1u8..=4).prop_map(|n| n.to_string())
}

/// Strategy for generating server identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = Identifier> {
    (resource_type_strategy(), server_id_strategy())
        .prop_map(|(resource_type, id)| Identifier::new(resource_type, id))
}

/// Strategy for generating attribute values.
pub fn attribute_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for generating attribute maps over a small key set.
pub fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map(
        prop::sample::select(vec!["title", "body", "rank", "draft"]),
        attribute_value_strategy(),
        0..4,
    )
    .prop_map(|map| {
        map.into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    })
}

/// Strategy for generating resource objects.
pub fn resource_strategy() -> impl Strategy<Value = ResourceObject> {
    (
        identifier_strategy(),
        attributes_strategy(),
        prop::option::of(server_id_strategy()),
    )
        .prop_map(|(identifier, attributes, author)| {
            let resource = ResourceObject::new(identifier.resource_type(), identifier.id())
                .with_attributes(Value::Object(attributes));
            match author {
                Some(id) => resource.with_relationship(
                    "author",
                    &Relationship::ToOne(Some(Identifier::new("user", id))),
                ),
                None => resource,
            }
        })
}

/// Strategy for generating documents.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop_oneof![
        resource_strategy().prop_map(Document::single),
        prop::collection::vec(resource_strategy(), 0..4).prop_map(Document::collection),
        (
            resource_strategy(),
            prop::collection::vec(resource_strategy(), 1..3)
        )
            .prop_map(|(primary, included)| Document::single(primary).with_included(included)),
    ]
}

/// Strategy for generating transaction names.
pub fn transaction_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["form", "wizard", "inline"]).prop_map(str::to_string)
}

/// A random store operation.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Load a document
    Load(Document),
    /// Create a resource locally
    Create {
        /// Resource type
        resource_type: String,
        /// Attributes
        attributes: Attributes,
    },
    /// Update a resource
    Update {
        /// Target resource
        identifier: Identifier,
        /// Attributes to set
        attributes: Attributes,
    },
    /// Remove a resource
    Remove {
        /// Target resource
        identifier: Identifier,
    },
    /// Open a transaction
    StartTransaction(String),
    /// Discard a transaction
    AbortTransaction(String),
    /// Merge a transaction into its parent
    CommitTransaction(String),
    /// Seal pending changes
    Commit,
}

/// Strategy for generating store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        3 => document_strategy().prop_map(StoreOperation::Load),
        1 => (resource_type_strategy(), attributes_strategy()).prop_map(
            |(resource_type, attributes)| StoreOperation::Create {
                resource_type,
                attributes,
            }
        ),
        3 => (identifier_strategy(), attributes_strategy())
            .prop_map(|(identifier, attributes)| StoreOperation::Update {
                identifier,
                attributes,
            }),
        1 => identifier_strategy().prop_map(|identifier| StoreOperation::Remove { identifier }),
        2 => transaction_name_strategy().prop_map(StoreOperation::StartTransaction),
        1 => transaction_name_strategy().prop_map(StoreOperation::AbortTransaction),
        1 => transaction_name_strategy().prop_map(StoreOperation::CommitTransaction),
        1 => Just(StoreOperation::Commit),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Applies an operation to a store.
///
/// Errors are the store's own; on error the store may be partially
/// modified, so callers compare against a copy taken beforehand.
pub fn apply_operation(db: &mut Db, op: &StoreOperation) -> CoreResult<()> {
    match op {
        StoreOperation::Load(document) => db.load_json_api(document).map(|_| ()),
        StoreOperation::Create {
            resource_type,
            attributes,
        } => {
            db.create(resource_type, attributes.clone());
            Ok(())
        }
        StoreOperation::Update {
            identifier,
            attributes,
        } => db.update(identifier, attributes.clone()),
        StoreOperation::Remove { identifier } => db.remove(identifier),
        StoreOperation::StartTransaction(name) => db.start_transaction(name),
        StoreOperation::AbortTransaction(name) => db.abort_transaction(name),
        StoreOperation::CommitTransaction(name) => db.commit_transaction(name),
        StoreOperation::Commit => {
            db.commit();
            Ok(())
        }
    }
}

/// Applies operations in order, undoing any that fail.
pub fn apply_all(db: &mut Db, ops: &[StoreOperation]) {
    for op in ops {
        let mut next = db.clone();
        if apply_operation(&mut next, op).is_ok() {
            *db = next;
        }
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
