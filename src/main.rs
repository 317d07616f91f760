use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use roomledger::application::engine::BookingEngine;
use roomledger::config::Config;
use roomledger::domain::ports::Stores;
use roomledger::infrastructure::clock::{FixedClock, SystemClock};
use roomledger::infrastructure::gateway::SimulatedGateway;
use roomledger::infrastructure::in_memory::in_memory_stores;
#[cfg(feature = "storage-rocksdb")]
use roomledger::infrastructure::rocksdb::RocksDBStore;
use roomledger::interfaces::csv::booking_writer::BookingWriter;
use roomledger::interfaces::csv::catalog_reader::CatalogReader;
use roomledger::interfaces::csv::command_reader::CommandReader;
use roomledger::interfaces::csv::replay::{LOCAL_WEBHOOK_SECRET, ReplayDriver};
use roomledger::interfaces::http::{AppState, router};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command script through the engine and print the bookings as CSV
    Replay {
        /// Command script CSV file
        script: PathBuf,

        /// Users catalog CSV file
        #[arg(long)]
        users: PathBuf,

        /// Rooms catalog CSV file
        #[arg(long)]
        rooms: PathBuf,

        /// Date the replay clock starts on. Defaults to today.
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        /// Users catalog CSV file to import at startup
        #[arg(long)]
        users: Option<PathBuf>,

        /// Rooms catalog CSV file to import at startup
        #[arg(long)]
        rooms: Option<PathBuf>,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().into_diagnostic()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            script,
            users,
            rooms,
            today,
            db_path,
        } => replay(config, script, users, rooms, today, db_path).await,
        Commands::Serve {
            users,
            rooms,
            db_path,
        } => serve(config, users, rooms, db_path).await,
    }
}

async fn replay(
    mut config: Config,
    script: PathBuf,
    users: PathBuf,
    rooms: PathBuf,
    today: Option<NaiveDate>,
    db_path: Option<PathBuf>,
) -> Result<()> {
    if config.engine.webhook_secret.is_none() {
        config.engine.webhook_secret = Some(LOCAL_WEBHOOK_SECRET.to_string());
    }
    let clock = Arc::new(FixedClock::at_start_of(
        today.unwrap_or_else(|| Utc::now().date_naive()),
    ));
    let engine = Arc::new(BookingEngine::new(
        open_stores(db_path)?,
        Arc::new(SimulatedGateway::new()),
        clock.clone(),
        config.engine,
    ));
    import_catalogs(&engine, Some(&users), Some(&rooms)).await?;

    let mut driver = ReplayDriver::new(engine, clock);
    let file = File::open(script).into_diagnostic()?;
    for (row, command) in CommandReader::new(file).commands().enumerate() {
        match command {
            Ok(command) => {
                if let Err(e) = driver.apply(command).await {
                    tracing::warn!("Error processing command {}: {}", row + 1, e);
                }
            }
            Err(e) => {
                tracing::warn!("Error reading command {}: {}", row + 1, e);
            }
        }
    }

    let bookings = driver.bookings().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BookingWriter::new(stdout.lock());
    writer
        .write_bookings(bookings.iter().map(|(label, booking)| (label.as_str(), booking)))
        .into_diagnostic()?;

    Ok(())
}

async fn serve(
    config: Config,
    users: Option<PathBuf>,
    rooms: Option<PathBuf>,
    db_path: Option<PathBuf>,
) -> Result<()> {
    if config.engine.webhook_secret.is_none() {
        tracing::warn!("ROOMLEDGER_WEBHOOK_SECRET is not set; gateway webhooks will be rejected");
    }
    let engine = Arc::new(BookingEngine::new(
        open_stores(db_path)?,
        Arc::new(SimulatedGateway::new().settling_refunds_immediately()),
        Arc::new(SystemClock),
        config.engine,
    ));
    import_catalogs(&engine, users.as_deref(), rooms.as_deref()).await?;

    let sweeper = engine.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.expire_stale_payments().await {
                tracing::error!(error = %e, "payment expiry failed");
            }
            if let Err(e) = sweeper.complete_elapsed_stays().await {
                tracing::error!(error = %e, "stay completion failed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router(AppState::new(engine)))
        .await
        .into_diagnostic()?;

    Ok(())
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(RocksDBStore::open(path).into_diagnostic()?.into_stores()),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

async fn import_catalogs(
    engine: &BookingEngine,
    users: Option<&Path>,
    rooms: Option<&Path>,
) -> Result<()> {
    if let Some(path) = users {
        let file = File::open(path).into_diagnostic()?;
        for user in CatalogReader::new(file).users() {
            match user {
                Ok(user) => engine.register_user(user).await.into_diagnostic()?,
                Err(e) => tracing::warn!("Error reading user: {}", e),
            }
        }
    }
    if let Some(path) = rooms {
        let file = File::open(path).into_diagnostic()?;
        for room in CatalogReader::new(file).rooms() {
            match room {
                Ok(room) => engine.import_room(room).await.into_diagnostic()?,
                Err(e) => tracing::warn!("Error reading room: {}", e),
            }
        }
    }
    Ok(())
}
