mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use gapfill_core::classifier::{CandidateClassifier, RuleBook};
use gapfill_core::config::{DownloadClientBackend, IndexerBackend, LoggingConfig};
use gapfill_core::download::{DownloadClient, HttpTorrentIntrospector, QBittorrentBackend};
use gapfill_core::events::LogEventSink;
use gapfill_core::identity::{NoLibrary, TmdbResolver};
use gapfill_core::searcher::JackettIndexer;
use gapfill_core::subscription::SqliteSubscriptionStore;
use gapfill_core::{
    load_config, validate_config, Config, MediaSearcher, SelectionEngine, SubscriptionRunner,
};

use api::create_router;
use state::{Acquisition, AppState};

/// Timeout for fetching `.torrent` files during pack introspection.
const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn run() -> Result<()> {
    let config_path = std::env::var("GAPFILL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Logging settings live in the config, so load it before logging is up
    let config = match load_config(&config_path) {
        Ok(config) => {
            init_logging(&config.logging);
            config
        }
        Err(e) => {
            init_logging(&LoggingConfig::default());
            return Err(e)
                .with_context(|| format!("Failed to load config from {:?}", config_path));
        }
    };
    info!("Configuration loaded from {:?}", config_path);

    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    let store = Arc::new(
        SqliteSubscriptionStore::new(&config.database.path)
            .context("Failed to open subscription store")?,
    );
    info!("Subscription store initialized");

    let acquisition = build_acquisition(&config, store.clone())?;
    let runner = acquisition.as_ref().map(|a| a.runner.clone());
    if let Some(runner) = &runner {
        if config.subscription.enabled {
            runner.start();
            info!(
                interval_secs = config.subscription.scan_interval_secs,
                "Subscription runner started"
            );
        } else {
            info!("Subscription scanning disabled in config");
        }
    }

    let state = Arc::new(AppState::new(config.clone(), store, acquisition));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting operator endpoint on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(runner) = &runner {
        info!("Stopping subscription runner...");
        runner.stop();
    }
    info!("Shut down");
    Ok(())
}

/// Wire the acquisition pipeline; `None` when a backend section is missing.
fn build_acquisition(
    config: &Config,
    store: Arc<SqliteSubscriptionStore>,
) -> Result<Option<Acquisition>> {
    let (Some(indexer_config), Some(client_config), Some(tmdb_config)) =
        (&config.indexer, &config.download_client, &config.tmdb)
    else {
        warn!(
            indexer = config.indexer.is_some(),
            download_client = config.download_client.is_some(),
            tmdb = config.tmdb.is_some(),
            "Acquisition backends not fully configured, serving operator endpoint only"
        );
        return Ok(None);
    };

    let indexer = match indexer_config.backend {
        IndexerBackend::Jackett => {
            let jackett = indexer_config
                .jackett
                .clone()
                .context("indexer.jackett section missing")?;
            info!("Initializing Jackett indexer at {}", jackett.url);
            Arc::new(JackettIndexer::new(jackett).context("Failed to create Jackett indexer")?)
        }
    };

    let backend = match client_config.backend {
        DownloadClientBackend::QBittorrent => {
            let qbit = client_config
                .qbittorrent
                .clone()
                .context("download_client.qbittorrent section missing")?;
            info!("Initializing qBittorrent backend at {}", qbit.url);
            Arc::new(QBittorrentBackend::new(qbit).context("Failed to create qBittorrent backend")?)
        }
    };

    let resolver = Arc::new(
        TmdbResolver::new(tmdb_config.clone()).context("Failed to create TMDB resolver")?,
    );
    let introspector = Arc::new(
        HttpTorrentIntrospector::new(INTROSPECT_TIMEOUT)
            .context("Failed to create torrent introspector")?,
    );
    let rules = Arc::new(
        RuleBook::from_config(&config.rule_groups, config.default_rule_group.clone())
            .context("Failed to compile quality rules")?,
    );
    let events = Arc::new(LogEventSink);

    let downloads = Arc::new(DownloadClient::new(
        backend,
        config.selection.poll_policy(),
    ));
    let engine = Arc::new(SelectionEngine::new(
        config.selection.clone(),
        downloads.clone(),
        introspector,
        events.clone(),
    ));
    let classifier = Arc::new(CandidateClassifier::new(rules.clone(), resolver.clone()));
    let searcher = Arc::new(
        MediaSearcher::new(
            config.search.clone(),
            indexer,
            classifier,
            engine,
            store.clone(),
            events.clone(),
        )
        .with_download_order(config.selection.download_order),
    );

    let runner = Arc::new(SubscriptionRunner::new(
        config.subscription.clone(),
        searcher,
        store,
        resolver,
        Arc::new(NoLibrary),
        rules,
        events,
    ));
    Ok(Some(Acquisition { runner, downloads }))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
