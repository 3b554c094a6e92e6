//! JSON:API documents and their normalization.
//!
//! Documents arrive from the server or from caller-supplied fetch
//! functions. The loader flattens every resource object, primary and
//! included, into [`Entity`](crate::Entity) records keyed by
//! [`Identifier`](crate::Identifier).

mod document;
mod loader;

pub use document::{
    Document, Linkage, PrimaryData, PrimaryIdentifiers, RelationshipObject, ResourceIdentifier,
    ResourceObject,
};
pub use loader::normalize;
