//! CaskDB CLI
//!
//! Command-line interface over one CaskDB data directory.

use std::path::PathBuf;
use std::process::ExitCode;

use caskdb::{CaskError, Config, Engine, IndexType, IteratorConfig};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// CaskDB CLI
#[derive(Parser, Debug)]
#[command(name = "caskdb-cli")]
#[command(about = "CLI for the CaskDB embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./caskdb_data")]
    dir: PathBuf,

    /// Segment size limit in MB before rolling over
    #[arg(short = 's', long, default_value = "256")]
    segment_mb: u64,

    /// Index backend
    #[arg(short, long, value_enum, default_value = "btree")]
    index: IndexArg,

    /// fsync after every write
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IndexArg {
    Btree,
    Art,
    Persistent,
}

impl From<IndexArg> for IndexType {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::Btree => IndexType::BTree,
            IndexArg::Art => IndexType::AdaptiveRadixTree,
            IndexArg::Persistent => IndexType::Persistent,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// List key-value pairs in key order
    Scan {
        /// Only keys starting with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Descending key order
        #[arg(short, long)]
        reverse: bool,
    },

    /// Compact older segments
    Merge,

    /// Print storage statistics
    Stat,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caskdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("CaskDB CLI v{}", caskdb::VERSION);
    tracing::info!("Data directory: {}", args.dir.display());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CaskError::KeyNotFound) => {
            eprintln!("(not found)");
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            ExitCode::from(2)
        }
    }
}

/// `--segment-mb` in bytes, rejecting sizes that do not fit in a u64
fn segment_bytes(segment_mb: u64) -> caskdb::Result<u64> {
    segment_mb.checked_mul(1024 * 1024).ok_or_else(|| {
        CaskError::InvalidConfiguration(format!("segment size of {} MB is too large", segment_mb))
    })
}

fn run(args: Args) -> caskdb::Result<()> {
    let config = Config::builder()
        .dir_path(&args.dir)
        .max_segment_size(segment_bytes(args.segment_mb)?)
        .sync_on_write(args.sync)
        .index_type(args.index.into())
        .build();
    let engine = Engine::open(config)?;

    match args.command {
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Get { key } => {
            let value = engine.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Delete { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { prefix, reverse } => {
            let mut iter = engine.new_iterator(IteratorConfig {
                reverse,
                prefix: prefix.into_bytes(),
            });
            while let Some(key) = iter.key() {
                let value = iter.value()?;
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(&value)
                );
                iter.next();
            }
        }
        Commands::Merge => {
            engine.merge()?;
            println!("Merge written; it takes effect on the next open");
        }
        Commands::Stat => {
            let stat = engine.stat()?;
            println!("keys:     {}", stat.key_count);
            println!("segments: {}", stat.segment_count);
            println!("disk:     {} bytes", stat.disk_size);
        }
    }

    engine.close()
}
