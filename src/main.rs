//! lutforge - LUT weight optimizer backend.
//!
//! Serves mode analysis, bucket-constrained weight optimization (one-shot and
//! streaming brute force), weight apply/backup/restore, and cached payout
//! distributions over HTTP/WebSocket. A file watcher reloads tables and
//! refills the distribution cache when weight files change on disk.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lutforge::api::{self, AppState};
use lutforge::lut::distribution::DistributionCache;
use lutforge::lut::Loader;
use lutforge::watcher::{FileWatcher, ReloadFn};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let lut_dir = resolve_data_path(env::var("LUT_DIR").ok(), "data");
    info!(dir = %lut_dir.display(), "loading LUT directory");

    let loader = Arc::new(
        Loader::discover(&lut_dir)
            .with_context(|| format!("failed to scan LUT directory {}", lut_dir.display()))?,
    );
    let modes = loader.modes();
    if modes.is_empty() {
        warn!(dir = %lut_dir.display(), "no weight files found (lookUpTable_<mode>_<n>.csv)");
    }
    for spec in &modes {
        info!(mode = %spec.mode, file = %spec.filename, cost = spec.cost, "mode registered");
    }

    let distributions = Arc::new(DistributionCache::new());

    // Warm the distribution cache off the startup path.
    for spec in &modes {
        match loader.get_mode(&spec.mode) {
            Ok(table) => {
                let buckets = api::lut::payout_buckets_for(&table);
                distributions
                    .clone()
                    .generate_async(&spec.mode, table, buckets);
            }
            Err(e) => warn!(mode = %spec.mode, error = %e, "failed to preload mode"),
        }
    }

    // File watcher: reload the table and refill the distribution cache when a
    // weight file settles after a change.
    let watcher = if watcher_enabled() {
        let reload_loader = loader.clone();
        let reload_distributions = distributions.clone();
        let on_reload: ReloadFn = Arc::new(move |mode: &str| {
            let table = reload_loader.reload(mode)?;
            reload_distributions.invalidate(mode);
            let buckets = api::lut::payout_buckets_for(&table);
            reload_distributions
                .clone()
                .generate_async(mode, table, buckets);
            Ok(())
        });

        match FileWatcher::start(&lut_dir, loader.watched_files(), on_reload) {
            Ok(watcher) => {
                if let Some(secs) = env::var("WATCHER_DEBOUNCE_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    watcher.set_debounce(std::time::Duration::from_secs(secs));
                }
                info!("file watcher started");
                Some(Arc::new(watcher))
            }
            Err(e) => {
                warn!(error = %e, "file watcher failed to start; continuing without it");
                None
            }
        }
    } else {
        info!("file watcher disabled via WATCHER_ENABLED");
        None
    };

    let state = AppState {
        loader,
        distributions,
        watcher,
    };

    let app = api::create_router(state)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(
            lutforge::middleware::logging::request_logging,
        ));

    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(3000);
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "lutforge listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lutforge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn watcher_enabled() -> bool {
    env::var("WATCHER_ENABLED")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(true)
}

fn load_env() {
    // Standard dotenv search (cwd + parents), plus the crate directory for
    // runs started with --manifest-path from elsewhere.
    let _ = dotenv();
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

/// Resolve a data path: absolute stays as-is, relative anchors to the crate
/// directory so running from the repo root doesn't silently point elsewhere.
fn resolve_data_path(env_value: Option<String>, default_dir: &str) -> PathBuf {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let raw = env_value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default_dir.to_string());

    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
