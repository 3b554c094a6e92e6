//! Fixtures for building documents and stores.

use jam_core::{Attributes, Db, Document, ResourceObject};
use serde_json::{json, Value};

/// Builds an attribute map from a JSON object.
///
/// Non-object values produce an empty map.
pub fn attrs(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

/// A `post` resource with a title.
pub fn post(id: &str, title: &str) -> ResourceObject {
    ResourceObject::new("post", id).with_attributes(json!({ "title": title }))
}

/// A `user` resource with a name.
pub fn user(id: &str, name: &str) -> ResourceObject {
    ResourceObject::new("user", id).with_attributes(json!({ "name": name }))
}

/// A collection document.
pub fn collection(resources: Vec<ResourceObject>) -> Document {
    Document::collection(resources)
}

/// A store whose server layer holds the given resources.
///
/// # Panics
///
/// Panics if a resource is malformed.
pub fn seeded_db(resources: &[ResourceObject]) -> Db {
    let mut db = Db::new();
    db.load_json_api(&Document::collection(resources.to_vec()))
        .expect("fixture resources must be well formed");
    db
}
