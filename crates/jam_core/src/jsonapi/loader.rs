//! Document normalization.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::jsonapi::Document;

/// Flattens a document into entities, primary data first.
///
/// Every resource object is validated before anything is returned, so a
/// malformed document yields an error and no entities at all.
pub fn normalize(document: &Document) -> CoreResult<Vec<Entity>> {
    document.resources().map(|r| r.to_entity()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Identifier;
    use crate::error::CoreError;
    use crate::jsonapi::ResourceObject;
    use serde_json::json;

    #[test]
    fn normalizes_primary_and_included() {
        let doc = Document::collection(vec![
            ResourceObject::new("post", "1").with_attributes(json!({"title": "A"}))
        ])
        .with_included(vec![ResourceObject::new("user", "2")]);

        let entities = normalize(&doc).unwrap();
        let ids: Vec<_> = entities.iter().map(|e| e.identifier.clone()).collect();
        assert_eq!(
            ids,
            vec![Identifier::new("post", "1"), Identifier::new("user", "2")]
        );
    }

    #[test]
    fn one_bad_included_resource_fails_everything() {
        let doc = Document::single(ResourceObject::new("post", "1"))
            .with_included(vec![ResourceObject::new("user", "")]);

        assert!(matches!(
            normalize(&doc),
            Err(CoreError::MalformedDocument { .. })
        ));
    }
}
