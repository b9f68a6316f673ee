//! hfstore CLI
//!
//! Command-line tools for hfstore store maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics
//! - `verify` - Verify store integrity
//! - `checkpoint` - Rewrite the commit log as a snapshot
//! - `dump-wal` - Dump commit log records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// hfstore command-line store tools.
#[derive(Parser)]
#[command(name = "hfstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// List every object with its blob
        #[arg(short, long)]
        objects: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify store integrity
    Verify,

    /// Rewrite the commit log as a single snapshot
    Checkpoint,

    /// Dump commit log records for debugging
    DumpWal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        Commands::Inspect { objects, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, objects, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Checkpoint => {
            let path = cli.path.ok_or("Store path required for checkpoint")?;
            commands::checkpoint::run(&path)?;
        }
        Commands::DumpWal { limit, format } => {
            let path = cli.path.ok_or("Store path required for dump-wal")?;
            commands::dump_wal::run(&path, limit, &format)?;
        }
        Commands::Version => {
            println!("hfstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("hfstore core v{}", hfstore_core::VERSION);
        }
    }

    Ok(())
}
