//! Diff command implementation.

use jam_core::{Diff, DiffOperation};
use std::path::Path;

use super::staged_db;

/// Computes the diff local edits produce against a server document.
pub fn compute(base: &Path, edits: &Path) -> Result<Option<Diff>, Box<dyn std::error::Error>> {
    Ok(staged_db(base, edits)?.commit_diff())
}

/// Runs the diff command.
pub fn run(base: &Path, edits: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let diff = compute(base, edits)?;

    match format {
        "json" => {
            let document = diff.map(|d| d.to_document());
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        _ => match diff {
            Some(diff) => print_text_output(&diff),
            None => println!("No changes"),
        },
    }

    Ok(())
}

/// One line per operation.
pub fn describe(op: &DiffOperation) -> String {
    match op {
        DiffOperation::Add { entity } => {
            let fields: Vec<&str> = entity.attributes.keys().map(String::as_str).collect();
            format!("add    {} [{}]", entity.identifier, fields.join(", "))
        }
        DiffOperation::Update {
            identifier,
            attributes,
            relationships,
        } => {
            let fields: Vec<&str> = attributes
                .keys()
                .chain(relationships.keys())
                .map(String::as_str)
                .collect();
            format!("update {} [{}]", identifier, fields.join(", "))
        }
        DiffOperation::Remove { identifier } => format!("remove {}", identifier),
    }
}

fn print_text_output(diff: &Diff) {
    println!("Diff {} ({} operation(s))", diff.sequence, diff.operations.len());
    for op in &diff.operations {
        println!("  {}", describe(op));
    }
}
