use clap::Parser;
use miette::{IntoDiagnostic, Result};
use ridequeue::application::orchestrator::Orchestrator;
use ridequeue::config::CoreConfig;
use ridequeue::domain::ports::RecordStoreBox;
use ridequeue::infrastructure::broadcast::BroadcastPublisher;
use ridequeue::infrastructure::clock::SystemClock;
use ridequeue::infrastructure::in_memory::InMemoryRecordStore;
use ridequeue::interfaces::csv::command_reader::CommandReader;
use ridequeue::interfaces::csv::queue_writer::QueueWriter;
use ridequeue::interfaces::replay::Replay;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script (CSV) to replay
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Core configuration file (JSON)
    #[arg(long, env = "RIDEQUEUE_CONFIG")]
    config: Option<PathBuf>,

    /// Also list rides completed within the configured window
    #[arg(long)]
    include_completed: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn open_store(db_path: Option<PathBuf>) -> Result<RecordStoreBox> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = ridequeue::infrastructure::rocksdb::RocksDBStore::open(db_path)
            .into_diagnostic()?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok(Arc::new(InMemoryRecordStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path).into_diagnostic()?,
        None => CoreConfig::default(),
    };
    let store = open_store(cli.db_path)?;
    let publisher = Arc::new(BroadcastPublisher::new(config.channel_capacity));
    let orchestrator = Orchestrator::new(store, publisher, &config, Arc::new(SystemClock));

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let mut replay = Replay::new(&orchestrator);
    for row in reader.commands() {
        match row {
            Ok(row) => {
                if let Err(e) = replay.apply(row).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Output final state
    let rows = replay.queue_rows(cli.include_completed).await.into_diagnostic()?;
    let mut writer = QueueWriter::new(io::stdout());
    writer.write_rows(rows).into_diagnostic()?;

    drop(replay);
    orchestrator.shutdown().await;
    Ok(())
}
