use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use bar_feed::providers::{
    HistoricalSource,
    alpaca_rest::{AlpacaProvider, params::AlpacaBarsParams},
    polling::PollingLiveFeed,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use series_sync::{
    config::{ProviderKind, Settings, load_config_path},
    db::migrate,
    pipeline::SeriesPipeline,
    store::{BarStore, MemoryBarStore, SqliteBarStore},
    writer::SeriesWriter,
};
use shared_utils::env::get_env_var_opt;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Backfill and live-sync price bars into SQLite")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply embedded schema migrations.
    Migrate {
        /// SQLite path or `sqlite:` URL; falls back to DATABASE_URL.
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Print where each series would resume.
    Plan {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Backfill every series, then stream live bars until Ctrl-C.
    Run {
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Write to an in-memory store instead of the database.
        #[arg(long)]
        dry_run: bool,
        /// Stop after backfill.
        #[arg(long)]
        no_live: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("series_sync=info,bar_feed=info,bar_sync=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn load_settings(path: &Path) -> Result<Settings> {
    let cfg = load_config_path(path)?.with_database_url_override(get_env_var_opt("DATABASE_URL"));
    Ok(cfg
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?)
}

fn build_provider(settings: &Settings) -> Result<Arc<dyn HistoricalSource>> {
    match settings.provider.kind {
        ProviderKind::Alpaca => {
            let mut provider = AlpacaProvider::new()
                .context("create Alpaca provider")?
                .with_params(AlpacaBarsParams {
                    feed: settings.provider.feed,
                    ..Default::default()
                });
            if let Some(rpm) = settings.provider.requests_per_minute {
                provider = provider.with_rate_limit(rpm);
            }
            if let Some(url) = &settings.provider.base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
    }
}

async fn plan(config: PathBuf) -> Result<()> {
    let settings = load_settings(&config)?;
    migrate::run_all(&settings.database_url)?;
    let store = SqliteBarStore::open(&settings.database_url)?;

    for spec in &settings.series {
        let last = store.last_timestamp(&spec.key).await?;
        let decision = series_sync::planner::ResumeDecision::new(
            spec.configured_start,
            last,
            spec.key.timeframe().bar_duration(),
        );
        let last = decision
            .last_persisted
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\tconfigured_start={}\tlast_persisted={}\teffective_start={}",
            spec.key,
            decision.configured_start.to_rfc3339(),
            last,
            decision.effective_start.to_rfc3339(),
        );
    }
    Ok(())
}

async fn run(config: PathBuf, dry_run: bool, no_live: bool) -> Result<()> {
    let settings = load_settings(&config)?;

    let store: Arc<dyn BarStore> = if dry_run {
        info!("dry run: bars are kept in memory only");
        Arc::new(MemoryBarStore::new())
    } else {
        migrate::run_all(&settings.database_url)?;
        Arc::new(SqliteBarStore::open(&settings.database_url)?)
    };
    let writer = SeriesWriter::new(store);

    let historical = build_provider(&settings)?;
    let mut pipeline = SeriesPipeline::new(
        Arc::clone(&historical),
        writer,
        settings.backfill.clone(),
        settings.live,
    );
    if !no_live {
        pipeline = pipeline.with_live(Arc::new(PollingLiveFeed::new(
            historical,
            settings.live.poll_interval,
        )));
    }

    let mut summary = pipeline.run_all(settings.series.clone(), Utc::now()).await;
    let failed = summary.failed.len();
    let subscriptions = summary.subscriptions();

    if !subscriptions.is_empty() {
        info!(series = subscriptions.len(), "streaming live bars; Ctrl-C to stop");
        tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
        info!("shutting down live subscriptions");
        for sub in &subscriptions {
            sub.cancel();
        }
        for sub in subscriptions {
            let series = sub.series().to_string();
            match sub.join().await {
                Ok(written) => info!(%series, written, "live merge stopped"),
                Err(e) if e.is_cancelled() => info!(%series, "live merge cancelled"),
                Err(e) => warn!(%series, error = %e, "live merge ended abnormally"),
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} series failed", settings.series.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Migrate { database_url } => {
            let url = database_url
                .or_else(|| get_env_var_opt("DATABASE_URL"))
                .context("pass --database-url or set DATABASE_URL")?;
            migrate::run_all(&url)?;
            info!(%url, "migrations applied");
        }
        Cmd::Plan { config } => plan(config).await?,
        Cmd::Run {
            config,
            dry_run,
            no_live,
        } => run(config, dry_run, no_live).await?,
    }

    Ok(())
}
