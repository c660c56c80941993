//! Exoscope server and command-line tools.
//!
//! Run with: cargo run -p exoscope-web -- serve

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use exoscope_common::{AppConfig, Mission};
use exoscope_db::{CandidateRepository, Database, DatasetRepository, NewDataset};
use exoscope_ingestion::{errors_by_field, BulkLoader};
use exoscope_web::{router::build_router, state::AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "exoscope", version, about = "Exoplanet candidate catalogue and classifier front end")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web server (default).
    Serve,
    /// Load candidates from a CSV, Excel or JSON Lines file.
    Import {
        /// File to read.
        file: PathBuf,
        /// Dataset to import into; created when missing.
        #[arg(long)]
        dataset: String,
        /// Mission of a newly created dataset.
        #[arg(long, default_value = "Kepler", value_parser = parse_mission)]
        mission: Mission,
        /// Stop after this many valid rows.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Create the sample mission datasets.
    Seed,
}

fn parse_mission(s: &str) -> Result<Mission, String> {
    Mission::parse(s).ok_or_else(|| format!("unknown mission `{s}` (Kepler, K2, TESS or Other)"))
}

/// Datasets every fresh installation starts with.
const SEED_DATASETS: [(&str, Mission, &str, &str); 3] = [
    (
        "Kepler Confirmed Planets",
        Mission::Kepler,
        "Kepler Objects of Interest from the cumulative KOI table.",
        "https://exoplanetarchive.ipac.caltech.edu/cgi-bin/TblView/nph-tblView?app=ExoTbls&config=cumulative",
    ),
    (
        "K2 Candidates",
        Mission::K2,
        "Planet candidates observed during the K2 extended mission.",
        "https://exoplanetarchive.ipac.caltech.edu/cgi-bin/TblView/nph-tblView?app=ExoTbls&config=k2pandc",
    ),
    (
        "TESS Objects of Interest",
        Mission::Tess,
        "TESS Objects of Interest (TOI) catalogue.",
        "https://exoplanetarchive.ipac.caltech.edu/cgi-bin/TblView/nph-tblView?app=ExoTbls&config=TOI",
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("cannot load configuration")?;

    // Initialise structured logging
    let default_filter = if config.server.debug { "exoscope=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Import { file, dataset, mission, limit } => import(config, file, dataset, mission, limit).await,
        Command::Seed => seed(config).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    config.validate_for_server().context("refusing to start the server")?;
    if config.server.debug {
        warn!("Debug mode is on; do not expose this server");
    }
    info!("Exoscope starting up, version {}", env!("CARGO_PKG_VERSION"));

    let bind = config.server.bind.clone();
    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;
    info!(address = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn open_db(config: &AppConfig) -> anyhow::Result<Arc<Database>> {
    let db = Database::open(&config.database.path)
        .await
        .with_context(|| format!("cannot open database {}", config.database.path))?;
    Ok(Arc::new(db))
}

async fn import(
    config: AppConfig,
    file: PathBuf,
    dataset: String,
    mission: Mission,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let db = open_db(&config).await?;
    let datasets = DatasetRepository::new(db.clone());
    let loader = BulkLoader::from_config(CandidateRepository::new(db), &config.import)
        .context("invalid [import] configuration")?;

    let new = NewDataset::new(dataset, mission)
        .normalized()
        .map_err(|errors| anyhow::anyhow!("invalid dataset: {errors}"))?;
    let dataset = datasets.get_or_create(&new).await?;

    let report = loader
        .import_file(&dataset, &file, limit)
        .await
        .with_context(|| format!("cannot import {}", file.display()))?;

    for error in report.errors.iter().take(20) {
        warn!(row = error.row, "{}", error.errors);
    }
    if report.rejected() > 20 {
        let mut by_field: Vec<_> = errors_by_field(&report.errors).into_iter().collect();
        by_field.sort();
        warn!(more = report.rejected() - 20, ?by_field, "Further rejected rows not shown");
    }
    info!(
        dataset = %report.dataset_name,
        total = report.total_rows,
        imported = report.imported,
        rejected = report.rejected(),
        "Import finished"
    );
    Ok(())
}

async fn seed(config: AppConfig) -> anyhow::Result<()> {
    let datasets = DatasetRepository::new(open_db(&config).await?);
    for (name, mission, description, url) in SEED_DATASETS {
        let new = NewDataset::new(name, mission).with_description(description).with_source_url(url);
        let dataset = datasets.get_or_create(&new).await?;
        info!(id = dataset.id, name = %dataset.name, "Dataset ready");
    }
    Ok(())
}
