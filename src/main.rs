use anyhow::Context;
use monitor_service::Scheduler;
use postwatch_core::{AppConfig, ErrorReporter};
use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;
use storage::{DedupFile, MediaStore, PostLog};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x_client::{build_extractor, HttpMediaFetcher};

const DEFAULT_LOG_FILTER: &str = "postwatch=info,monitor_service=info,x_client=info,storage=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = AppConfig::resolve_path(std::env::args().nth(1));
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    init_logging(&config)?;

    tracing::info!(
        config = %config_path.display(),
        accounts = ?config.accounts,
        renderer = ?config.extractor.renderer,
        "Starting Postwatch"
    );

    let reporter = ErrorReporter::default();

    let media_store = MediaStore::new(&config.paths.media_dir);
    media_store
        .ensure_dir()
        .await
        .with_context(|| format!("creating media dir {}", config.paths.media_dir.display()))?;

    let extractor = build_extractor(&config.extractor)
        .inspect_err(|e| reporter.report_error(e))
        .context("building extractor")?;
    let media = HttpMediaFetcher::new(
        media_store,
        Duration::from_secs(config.media.timeout_secs),
        config.media.max_attempts,
    )
    .inspect_err(|e| reporter.report_error(e))
    .context("building media client")?;

    let scheduler = Scheduler::open(
        config.accounts.clone(),
        extractor,
        Arc::new(media),
        DedupFile::new(&config.paths.dedup_file),
        PostLog::new(&config.paths.post_log),
        config.schedule(),
    )
    .await
    .inspect_err(|e| reporter.report_error(e))
    .context("loading dedup state")?;

    scheduler.run().await?;

    Ok(())
}

/// Console output plus an appended process log file, both behind one
/// `RUST_LOG`-overridable filter.
fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let path = &config.paths.process_log;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening process log {}", path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(())
}
