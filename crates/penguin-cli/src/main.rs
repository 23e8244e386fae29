mod cli;
mod server;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use penguin_ai::PredictionEngine;
use penguin_core::FeatureRecord;
use penguin_store::{ArtifactStore, StoreConfig};
use penguin_sync::{FetchConfig, GcsFetcher};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Must run before parsing so `.env` values reach clap's `env` lookups.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log.file_path().as_deref());

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "failed to read .env file"),
    }
    if cli::on_cloud_run() {
        info!("running on Cloud Run");
    }
    let fetcher = GcsFetcher::new(FetchConfig::from(cli.fetch))
        .context("configuring object storage client")?;
    let store = Arc::new(ArtifactStore::new(
        StoreConfig::from(cli.artifacts),
        Arc::new(fetcher),
    ));

    match cli.command {
        Command::Serve { host, port } => serve(store, &host, port).await,
        Command::Predict { json, file } => {
            let text = match (json, file) {
                (Some(json), _) => json,
                (None, Some(path)) => read_record(&path)?,
                (None, None) => anyhow::bail!("either --json or --file is required"),
            };
            let record = FeatureRecord::from_json(&text).context("invalid feature record")?;
            let species = PredictionEngine::new(store).predict(&record).await?;
            println!("{species}");
            Ok(())
        }
        Command::Fetch => {
            store.ensure_loaded().await?;
            let status = store.status();
            let config = store.config();
            let source = status.source.map_or("unknown", |s| s.as_str());
            println!("source:   {source}");
            println!("model:    {}", config.model_path().display());
            println!("metadata: {}", config.encoder_path().display());
            Ok(())
        }
    }
}

/// Stderr always; the file sink too when a path is configured and writable.
/// The returned guard flushes the file writer on drop.
fn init_logging(file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, guard, open_error) = match file.map(open_log_file) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    match (file, open_error) {
        (Some(path), Some(e)) => {
            warn!(path = %path.display(), error = %e, "log file unavailable, logging to stderr only")
        }
        (Some(path), None) => debug!(path = %path.display(), "logging to file"),
        _ => {}
    }
    guard
}

fn open_log_file(path: &Path) -> anyhow::Result<RollingFileAppender> {
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("opening {}", path.display()))
}

fn read_record(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

async fn serve(store: Arc<ArtifactStore>, host: &str, port: u16) -> anyhow::Result<()> {
    info!("penguin v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = store.ensure_loaded().await {
        warn!(error = %e, "model not loaded at startup, will retry on first request");
    }

    let app = server::router(PredictionEngine::new(store));
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/prediction.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        open_log_file(&path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn log_path_needs_a_file_name() {
        assert!(open_log_file(Path::new("/")).is_err());
    }
}
