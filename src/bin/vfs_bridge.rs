//! vfs-bridge
//!
//! Runs SQL against a database stored in memory through a bridged VFS and
//! prints every result row as a JSON object.

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;
use vfs_bridge::{register_vfs, BridgeConfig, Control, Database, FileRole, Handlers, MemoryStorage};

#[derive(Parser, Debug)]
#[command(name = "vfs-bridge")]
#[command(about = "Run SQL on an in-memory database served through a bridged SQLite VFS")]
struct Args {
    /// SQL batches to execute, in order
    sql: Vec<String>,

    /// Read an additional SQL batch from a file (runs after positional SQL)
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Bridge configuration (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Database name handed to SQLite
    #[arg(short = 'd', long, default_value = "main.db")]
    database: String,

    /// Print storage usage per file role when done
    #[arg(long)]
    stats: bool,
}

fn row_json(values: &[Option<String>], names: &[String]) -> Value {
    let mut row = Map::new();
    for (name, value) in names.iter().zip(values) {
        let value = match value {
            Some(text) => Value::String(text.clone()),
            None => Value::Null,
        };
        row.insert(name.clone(), value);
    }
    Value::Object(row)
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    let mut batches = args.sql.clone();
    if let Some(path) = &args.file {
        let sql = std::fs::read_to_string(path)
            .with_context(|| format!("reading SQL from {}", path.display()))?;
        batches.push(sql);
    }
    if batches.is_empty() {
        bail!("no SQL given; pass statements as arguments or use --file");
    }

    let cx = Control::new(config)?;
    let store = MemoryStorage::new();
    let vfs = register_vfs(&cx, Handlers::immediate(store.clone()))?;
    info!(vfs = %vfs.name(), "using bridged VFS");

    let db = Database::init(&cx, |_, values, names| {
        println!("{}", row_json(values, names));
    });
    cx.block_on(db.open(&args.database, &vfs))
        .with_context(|| format!("opening {}", args.database))?;

    let mut outcome = Ok(());
    for (index, sql) in batches.iter().enumerate() {
        if let Err(err) = cx.block_on(db.exec(sql)) {
            outcome = Err(anyhow::Error::new(err).context(format!("batch {} failed", index + 1)));
            break;
        }
    }

    cx.block_on(db.close())?;
    vfs.unregister()?;

    if args.stats {
        for role in [FileRole::Primary, FileRole::Journal, FileRole::Wal] {
            if store.exists(role) {
                eprintln!(
                    "{role}: {} bytes in {} pages",
                    store.file_size(role),
                    store.pages(role).len()
                );
            }
        }
    }

    outcome
}
