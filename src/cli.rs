use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use proofpack::config::AppConfig;
use proofpack::datasource::FixtureSource;
use proofpack::http::{self, AppState};
use proofpack::integrity::verify_archive_bytes;
use proofpack::ledger::LedgerStore;
use proofpack::pack::{
    ExportPackBody, FilterParams, PackRequest, PackService, Requester, Role, TimeRangePreset,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "proofpack", about = "Compliance proof-pack service and tools")]
pub struct Cli {
    /// JSON config file. Missing file means built-in defaults.
    #[arg(long, global = true, env = "PROOFPACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Dataset file for the fixture data source (overrides config)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Socket address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Build one proof pack and write the archive to disk
    Build {
        /// Dataset file for the fixture data source (overrides config)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Organization id
        #[arg(long)]
        org: String,

        /// Requesting user id
        #[arg(long, default_value = "cli")]
        user: String,

        /// Requesting role
        #[arg(long, default_value = "admin")]
        role: String,

        /// Time range preset: 7d, 30d, 90d or custom
        #[arg(long, default_value = "30d")]
        time_range: String,

        /// Start date for a custom range (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// End date for a custom range (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: Option<String>,

        /// Filters as a JSON object, e.g. '{"status":"overdue"}'
        #[arg(long)]
        filters: Option<String>,

        /// Output file or directory. Defaults to the current directory.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Verify a downloaded pack archive against its bundled manifest
    Verify {
        /// Path to the `.zip` archive
        archive: PathBuf,
    },
}

fn dataset_path(config: &AppConfig, flag: Option<PathBuf>) -> Result<PathBuf> {
    flag.or_else(|| config.storage.dataset_path.clone())
        .context("No dataset configured; pass --dataset or set PROOFPACK_DATASET")
}

fn build_service(config: &AppConfig, dataset: &Path) -> Result<PackService> {
    let source = FixtureSource::load(dataset)
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
    let store = LedgerStore::open(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to open ledger at {}",
            config.storage.data_dir.display()
        )
    })?;
    Ok(PackService::new(
        Arc::new(source),
        store,
        config.export.clone(),
    ))
}

pub async fn run_command(config: AppConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Serve { dataset, bind } => handle_serve(config, dataset, bind).await,
        Commands::Build {
            dataset,
            org,
            user,
            role,
            time_range,
            start,
            end,
            filters,
            out,
        } => {
            let requester = Requester {
                name: user.clone(),
                user_id: user,
                role: role.parse::<Role>()?,
            };
            let body = ExportPackBody {
                time_range: time_range.parse::<TimeRangePreset>()?,
                start_date: start,
                end_date: end,
                filters: filters
                    .as_deref()
                    .map(serde_json::from_str::<FilterParams>)
                    .transpose()
                    .context("--filters is not a valid filter object")?,
            };
            handle_build(config, dataset, &org, requester, body, out).await
        }
        Commands::Verify { archive } => handle_verify(&archive),
    }
}

async fn handle_serve(
    mut config: AppConfig,
    dataset: Option<PathBuf>,
    bind: Option<String>,
) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    config.validate()?;
    let dataset = dataset_path(&config, dataset)?;
    let service = build_service(&config, &dataset)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    http::serve(listener, AppState::new(service)).await?;
    Ok(())
}

async fn handle_build(
    config: AppConfig,
    dataset: Option<PathBuf>,
    org: &str,
    requester: Requester,
    body: ExportPackBody,
    out: Option<PathBuf>,
) -> Result<()> {
    let dataset = dataset_path(&config, dataset)?;
    let service = build_service(&config, &dataset)?;

    let now = Utc::now();
    let request = PackRequest::validate(org, requester, body, now)?;
    let built = service.build_pack(request, now).await?;

    let out = out.unwrap_or_else(|| PathBuf::from("."));
    let target = if out.is_dir() {
        out.join(&built.archive.download_name)
    } else {
        out
    };
    std::fs::write(&target, &built.archive.bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    let summary = built.manifest.summary;
    println!("Pack {} written to {}", built.manifest.pack_id, target.display());
    println!("  sha256:       {}", built.archive.sha256);
    println!(
        "  controls:     {} ({} completed, {} overdue, {} high severity)",
        summary.total_controls,
        summary.controls_completed,
        summary.controls_overdue,
        summary.controls_high_severity
    );
    println!(
        "  attestations: {} ({} signed, {} pending)",
        summary.total_attestations, summary.attestations_signed, summary.attestations_pending
    );
    Ok(())
}

fn handle_verify(archive: &Path) -> Result<()> {
    let bytes = std::fs::read(archive)
        .with_context(|| format!("Failed to read {}", archive.display()))?;
    let report = verify_archive_bytes(&bytes)?;
    println!("{}", report.format_cli());
    if !report.ok {
        bail!("{}", report.message);
    }
    Ok(())
}
