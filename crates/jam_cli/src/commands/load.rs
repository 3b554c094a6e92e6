//! Load command implementation.

use jam_core::{Db, Entity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::read_document;

/// Result of loading documents.
#[derive(Debug, Serialize)]
pub struct LoadResult {
    /// Number of documents read.
    pub documents: usize,
    /// Number of resource objects merged, duplicates included.
    pub resources: usize,
    /// Number of distinct entities per resource type.
    pub types: BTreeMap<String, usize>,
    /// The normalized entities.
    pub entities: Vec<Entity>,
}

/// Loads documents into an empty store.
pub fn load(files: &[PathBuf]) -> Result<LoadResult, Box<dyn std::error::Error>> {
    let mut db = Db::new();
    let mut resources = 0;
    for path in files {
        resources += db.load_json_api(&read_document(path)?)?;
    }

    let entities: Vec<Entity> = db.entities();
    let mut types = BTreeMap::new();
    for entity in &entities {
        *types.entry(entity.resource_type().to_string()).or_insert(0) += 1;
    }

    Ok(LoadResult {
        documents: files.len(),
        resources,
        types,
        entities,
    })
}

/// Runs the load command.
pub fn run(files: &[PathBuf], format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = load(files)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &LoadResult) {
    println!("Loaded {} document(s)", result.documents);
    println!(
        "  {} resource object(s), {} entit(ies)",
        result.resources,
        result.entities.len()
    );
    println!();
    for (resource_type, count) in &result.types {
        println!("  {:<20} {}", resource_type, count);
    }
    println!();
    for entity in &result.entities {
        let fields: Vec<&str> = entity.attributes.keys().map(String::as_str).collect();
        println!("{} [{}]", entity.identifier, fields.join(", "));
    }
}
