//! docstore CLI
//!
//! Command-line tools for JSON document files managed by docstore. Every
//! write goes through `JsonFile::save`, so edits made here are atomic.
//!
//! # Commands
//!
//! - `show` - Print the document and whether the file exists
//! - `get` / `set` / `remove` - Read or edit a top-level key
//! - `nuke` - Delete the file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docstore command-line tools.
#[derive(Parser)]
#[command(name = "docstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON document file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Label used in log messages
    #[arg(global = true, short, long, default_value = "config")]
    label: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the document
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the value stored under a top-level key
    Get {
        /// Key to read
        key: String,
    },

    /// Store a value under a top-level key
    Set {
        /// Key to write
        key: String,

        /// JSON value; anything that does not parse is stored as a string
        value: String,
    },

    /// Remove a top-level key
    Remove {
        /// Key to remove
        key: String,
    },

    /// Delete the document file
    Nuke,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    // Logs go to stderr so `show --format json` stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Show { format } => {
            let path = cli.path.ok_or("Document path required for show")?;
            commands::show::run(&path, &cli.label, &format)?;
        }
        Commands::Get { key } => {
            let path = cli.path.ok_or("Document path required for get")?;
            commands::edit::get(&path, &cli.label, &key)?;
        }
        Commands::Set { key, value } => {
            let path = cli.path.ok_or("Document path required for set")?;
            commands::edit::set(&path, &cli.label, &key, &value)?;
        }
        Commands::Remove { key } => {
            let path = cli.path.ok_or("Document path required for remove")?;
            commands::edit::remove(&path, &cli.label, &key)?;
        }
        Commands::Nuke => {
            let path = cli.path.ok_or("Document path required for nuke")?;
            commands::nuke::run(&path, &cli.label)?;
        }
        Commands::Version => {
            println!("docstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("docstore core v{}", docstore_core::VERSION);
        }
    }

    Ok(())
}
