//! Jam CLI
//!
//! Command-line tools for inspecting JSON:API data the way the Jam store
//! sees it.
//!
//! # Commands
//!
//! - `load` - Normalize documents and list the resulting entities
//! - `diff` - Show the diff that local edits would send to the server
//! - `sync` - Run a sync against an in-memory server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Jam command-line tools.
#[derive(Parser)]
#[command(name = "jam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize JSON:API documents and list the entities
    Load {
        /// Documents to load, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the diff produced by local edits
    Diff {
        /// Document holding the server state
        base: PathBuf,

        /// Document holding the local edits
        edits: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Sync local edits against an in-memory server
    Sync {
        /// Document holding the server state
        base: PathBuf,

        /// Document holding the local edits
        edits: PathBuf,

        /// Number of round trips to fail before succeeding
        #[arg(long, default_value = "0")]
        fail: u32,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Load { files, format } => {
            commands::load::run(&files, &format)?;
        }
        Commands::Diff {
            base,
            edits,
            format,
        } => {
            commands::diff::run(&base, &edits, &format)?;
        }
        Commands::Sync { base, edits, fail } => {
            commands::sync::run(&base, &edits, fail)?;
        }
        Commands::Version => {
            println!("Jam CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Jam Core v{}", jam_core::VERSION);
        }
    }

    Ok(())
}
