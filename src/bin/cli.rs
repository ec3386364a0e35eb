//! tubstore CLI
//!
//! Inspect and maintain a tub directory.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use tubstore::{Result, Tub, TubConfig};

/// tubstore CLI
#[derive(Parser, Debug)]
#[command(name = "tubstore-cli")]
#[command(about = "Inspect and maintain tub datastores")]
#[command(version)]
struct Args {
    /// Tub directory
    #[arg(short, long, default_value = "./data/tub")]
    tub: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show schema, counts, catalogs and sessions
    Info,

    /// Print live records as JSON lines
    Cat {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print one record by index
    Get {
        /// Global record index
        index: u64,
    },

    /// Mark records as deleted
    Delete {
        /// Global record indexes
        #[arg(required = true)]
        indexes: Vec<u64>,
    },

    /// Restore deleted records
    Restore {
        /// Global record indexes
        #[arg(required = true)]
        indexes: Vec<u64>,
    },

    /// Mark the last N records as deleted
    DeleteLast {
        /// Number of records
        n: u64,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tubstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let read_only = matches!(
        args.command,
        Commands::Info | Commands::Cat { .. } | Commands::Get { .. }
    );
    let config = TubConfig::builder()
        .base_path(&args.tub)
        .read_only(read_only)
        .build()?;
    let mut tub = Tub::open(config)?;

    match args.command {
        Commands::Info => print_info(&tub),
        Commands::Cat { limit } => {
            for record in tub.records().take(limit.unwrap_or(usize::MAX)) {
                println!("{}", serde_json::to_string(&record?)?);
            }
        }
        Commands::Get { index } => match tub.manifest().read_record(index)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("Record {} is deleted", index),
        },
        Commands::Delete { indexes } => {
            tub.delete_records(indexes)?;
            println!("{} live records", tub.len());
        }
        Commands::Restore { indexes } => {
            tub.restore_records(indexes)?;
            println!("{} live records", tub.len());
        }
        Commands::DeleteLast { n } => {
            tub.delete_last_n_records(n)?;
            println!("{} live records", tub.len());
        }
    }

    tub.close()
}

fn print_info(tub: &Tub) {
    let manifest = tub.manifest();

    println!("Tub: {}", tub.base_path().display());
    println!("Fields:");
    for (name, field_type) in tub.schema().fields() {
        println!("  {:<24} {}", name, field_type);
    }
    println!("Records: {} live, {} written, {} deleted",
        tub.len(),
        manifest.current_index(),
        manifest.deleted_indexes().len()
    );
    println!("Catalogs ({} records max):", manifest.max_len());
    for path in manifest.catalog_paths() {
        println!("  {}", path);
    }
    if let Some(sessions) = &manifest.manifest_metadata().sessions {
        println!("Sessions: {}", sessions.all_full_ids.join(", "));
    }
    if !manifest.metadata().is_empty() {
        println!("Metadata: {}", serde_json::Value::Object(manifest.metadata().clone()));
    }
}
