//! deferdb CLI
//!
//! Command-line tools for deferdb operation logs.
//!
//! # Commands
//!
//! - `inspect` - Display log statistics and live collections
//! - `dump` - Print log operations for debugging
//! - `verify` - Check every frame of a log
//! - `compact` - Rewrite a log to one frame per live record

mod commands;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// deferdb command-line log tools.
#[derive(Parser)]
#[command(name = "deferdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the operation log
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
    /// Display log statistics and live collections
    Inspect {
        /// List live records per collection
        #[arg(short, long)]
        collections: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print log operations for debugging
    Dump {
        /// Maximum number of operations to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip this many operations first
        #[arg(short, long, default_value = "0")]
        skip: usize,

        /// Only print operations on this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Check every frame of a log
    Verify {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Rewrite a log to one frame per live record
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

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
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            collections,
            format,
        } => {
            let path = cli.path.ok_or("Log path required for inspect")?;
            commands::inspect::run(&path, collections, format)?;
        }
        Commands::Dump {
            limit,
            skip,
            collection,
            format,
        } => {
            let path = cli.path.ok_or("Log path required for dump")?;
            commands::dump::run(&path, skip, limit, collection.as_deref(), format)?;
        }
        Commands::Verify { format } => {
            let path = cli.path.ok_or("Log path required for verify")?;
            commands::verify::run(&path, format)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Log path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("deferdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("deferdb Core v{}", deferdb_core::VERSION);
            println!(
                "Log format v{}",
                deferdb_storage::log::LOG_VERSION
            );
        }
    }

    Ok(())
}
