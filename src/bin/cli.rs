//! radixkv CLI
//!
//! Command-line interface for inspecting and editing a radixkv file set.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use radixkv::{AccessMode, Config, Database, Outcome, WriteMode};
use tracing_subscriber::{fmt, EnvFilter};

/// radixkv CLI
#[derive(Parser, Debug)]
#[command(name = "radixkv-cli")]
#[command(about = "CLI for the radixkv embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./radixkv_data")]
    data_dir: PathBuf,

    /// Queue writes to the background writer
    #[arg(long = "async")]
    async_writer: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Fail if the key already exists
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Value of the longest stored key that prefixes KEY
    Prefix {
        key: String,
    },

    /// Load tab-separated `key<TAB>value` lines from a file
    Load {
        file: PathBuf,
    },

    /// Remove every key
    Clear,

    /// Number of keys
    Count,

    /// Copy the file set into a new directory
    Backup {
        dest: PathBuf,
    },

    /// Give free space at the end of the files back to the filesystem
    Shrink,

    /// Print engine statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,radixkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::debug!("radixkv CLI v{}", radixkv::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> radixkv::Result<()> {
    let writes = matches!(
        args.command,
        Commands::Put { .. }
            | Commands::Del { .. }
            | Commands::Load { .. }
            | Commands::Clear
            | Commands::Shrink
    );

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .access(if writes {
            AccessMode::Writer
        } else {
            AccessMode::Reader
        })
        .write_mode(if args.async_writer {
            WriteMode::Async
        } else {
            WriteMode::Sync
        })
        .build();
    let db = Database::open(config)?;

    match args.command {
        Commands::Get { key } => match db.find(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(not found)"),
        },
        Commands::Put {
            key,
            value,
            no_overwrite,
        } => {
            let ack = if no_overwrite {
                db.insert_new(key.as_bytes(), value.as_bytes())?
            } else {
                db.add(key.as_bytes(), value.as_bytes())?
            };
            db.flush()?;
            match ack.outcome() {
                Some(Outcome::Updated) => println!("updated"),
                _ => println!("OK"),
            }
        }
        Commands::Del { key } => {
            let ack = db.remove(key.as_bytes())?;
            db.flush()?;
            match ack.outcome() {
                Some(Outcome::NotFound) => println!("(not found)"),
                _ => println!("OK"),
            }
        }
        Commands::Prefix { key } => match db.find_longest_prefix(key.as_bytes())? {
            Some((len, value)) => println!(
                "{}\t{}",
                String::from_utf8_lossy(&key.as_bytes()[..len]),
                String::from_utf8_lossy(&value)
            ),
            None => println!("(not found)"),
        },
        Commands::Load { file } => {
            let text = fs::read_to_string(&file)?;
            let mut loaded = 0u64;
            for line in text.lines().filter(|l| !l.is_empty()) {
                let (key, value) = line.split_once('\t').unwrap_or((line, ""));
                db.add(key.as_bytes(), value.as_bytes())?;
                loaded += 1;
            }
            db.flush()?;
            println!("loaded {} entries", loaded);
        }
        Commands::Clear => {
            db.remove_all()?;
            db.flush()?;
            println!("OK");
        }
        Commands::Count => println!("{}", db.count()),
        Commands::Backup { dest } => {
            let report = db.backup(&dest)?;
            println!(
                "backed up {} keys at generation {} ({} index + {} data bytes)",
                report.keys, report.generation, report.index_bytes, report.data_bytes
            );
        }
        Commands::Shrink => println!("released {} bytes", db.shrink()?),
        Commands::Stats => {
            let stats = db.stats();
            println!("keys:               {}", stats.key_count);
            println!("generation:         {}", stats.generation);
            println!("durable generation: {}", stats.durable_generation);
            println!("index file:         {} bytes ({} used)", stats.index_file_size, stats.index_end);
            println!("data file:          {} bytes ({} used)", stats.data_file_size, stats.data_end);
            println!("index free:         {} bytes", stats.index_free_bytes);
            println!("data free:          {} bytes", stats.data_free_bytes);
        }
    }

    db.close()
}
