//! Entity types.

mod id;
mod record;

pub use id::Identifier;
pub use record::{Attributes, Entity, Relationship};
