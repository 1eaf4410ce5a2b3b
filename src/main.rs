use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use duckdb::Connection;
use reqwest::Client;
use std::{num::NonZeroUsize, path::PathBuf};
use taxiload::{
    config::DEFAULT_CHUNK_SIZE, duck::DuckTable, fetch, process, CreateMode, DecodePolicy,
    IngestConfig, UnknownColumns,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Load NYC taxi CSV data into a DuckDB table, one chunk at a time.
#[derive(Parser, Debug)]
#[command(name = "taxiload", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    dataset: Dataset,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Dataset {
    /// Monthly yellow-taxi trip records.
    Trips {
        #[arg(long, default_value_t = 2021)]
        year: u16,

        /// Month of data (1-12).
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=12))]
        month: u8,

        /// Base table name; the year and month are appended.
        #[arg(long, default_value = "yellow_taxi_data")]
        target_table: String,
    },
    /// The taxi zone lookup table.
    Zones {
        #[arg(long, default_value = "zones")]
        target_table: String,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// DuckDB database file.
    #[arg(long, global = true, env = "TAXILOAD_DATABASE", default_value = "ny_taxi.duckdb")]
    database: PathBuf,

    /// Read from this URL or local path instead of the published file.
    #[arg(long, global = true)]
    source: Option<String>,

    /// Rows per batch.
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: NonZeroUsize,

    /// What to do if the table already exists.
    #[arg(long, global = true, value_enum, default_value_t = CreateMode::Replace)]
    if_exists: CreateMode,

    /// What to do with a row that does not match the schema.
    #[arg(long, global = true, value_enum, default_value_t = DecodePolicy::Abort)]
    on_decode_error: DecodePolicy,

    /// How to treat source columns the schema does not know.
    #[arg(long, global = true, value_enum, default_value_t = UnknownColumns::Pass)]
    unknown_columns: UnknownColumns,
}

impl Cli {
    fn ingest_config(&self) -> IngestConfig {
        let base = match &self.dataset {
            Dataset::Trips {
                year,
                month,
                target_table,
            } => IngestConfig::trips(*year, *month, target_table),
            Dataset::Zones { target_table } => IngestConfig::zones(target_table),
        };
        let base = match &self.common.source {
            Some(location) => base.with_location(location.clone()),
            None => base,
        };
        base.with_chunk_size(self.common.chunk_size)
            .with_mode(self.common.if_exists)
            .with_decode_policy(self.common.on_decode_error)
            .with_unknown_columns(self.common.unknown_columns)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) resolve configuration ────────────────────────────────────
    let cli = Cli::parse();
    let config = cli.ingest_config();
    let database = cli.common.database;
    info!(
        table = %config.table,
        source = %config.location,
        chunk_size = config.chunk_size.get(),
        mode = ?config.mode,
        database = %database.display(),
        "startup"
    );

    // ─── 3) stop between batches on Ctrl-C ───────────────────────────
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current batch");
                cancel.cancel();
            }
        }
    });

    // ─── 4) stage the source on local disk ───────────────────────────
    let client = Client::new();
    let staged = fetch::stage(&client, &config.location)
        .await
        .with_context(|| format!("staging {}", config.location))?;

    // ─── 5) decode + load on the blocking pool ───────────────────────
    let summary = tokio::task::spawn_blocking(move || -> Result<process::RunSummary> {
        let conn = Connection::open(&database)
            .with_context(|| format!("opening DuckDB database {}", database.display()))?;
        let reader = fetch::open_decompressed(staged.path())
            .with_context(|| format!("opening {}", staged.path().display()))?;
        let mut table = DuckTable::new(&conn, config.table.clone());
        let summary = process::ingest(reader, &config, &mut table, cancel)?;
        Ok(summary)
    })
    .await??;

    info!(
        table = %summary.table,
        batches = summary.batches,
        rows = summary.rows,
        skipped = summary.skipped,
        "all done"
    );
    Ok(())
}
