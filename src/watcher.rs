//! File watcher for LUT weight files.
//!
//! Debounces rapid write bursts per file, then waits for the file size to
//! hold still before firing the reload callback; large CSV rewrites arrive
//! in many partial writes and must never be parsed mid-flight. Callback
//! errors are logged and dropped, never propagated into the watch loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const STABILITY_CHECK_INTERVAL: Duration = Duration::from_millis(200);
const STABILITY_REQUIRED_CHECKS: u32 = 3;
const STABILITY_MAX_WAIT: Duration = Duration::from_secs(30);
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Called with the mode name when its weight file has settled after a change.
pub type ReloadFn = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

struct WatcherState {
    base_dir: PathBuf,
    /// filename -> mode name
    files: RwLock<HashMap<String, String>>,
    debounce: RwLock<Duration>,
    last_change: Mutex<HashMap<String, Instant>>,
    enabled: RwLock<bool>,
    on_reload: ReloadFn,
}

/// Watches a directory of weight files and triggers debounced,
/// stability-gated reloads.
pub struct FileWatcher {
    state: Arc<WatcherState>,
    shutdown_tx: mpsc::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    /// Start watching `base_dir`. `files` maps filenames to mode names, e.g.
    /// `{"lookUpTable_base_0.csv": "base"}`.
    pub fn start(
        base_dir: impl Into<PathBuf>,
        files: HashMap<String, String>,
        on_reload: ReloadFn,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        let state = Arc::new(WatcherState {
            base_dir: base_dir.clone(),
            files: RwLock::new(files),
            debounce: RwLock::new(DEFAULT_DEBOUNCE),
            last_change: Mutex::new(HashMap::new()),
            enabled: RwLock::new(true),
            on_reload,
        });

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(512);
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = event_tx.blocking_send(event);
                }
            })
            .context("notify watcher init failed")?;

        watcher
            .watch(&base_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch failed for {}", base_dir.display()))?;

        info!(dir = %base_dir.display(), "watching directory");
        for filename in state.files.read().keys() {
            info!(file = %filename, "tracking file");
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let loop_state = state.clone();
        let task = tokio::spawn(async move {
            // Keep the notify handle alive for the lifetime of the loop.
            let _watcher_keepalive = watcher;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    event = event_rx.recv() => {
                        match event {
                            Some(event) => loop_state.handle_event(event),
                            None => break,
                        }
                    }
                }
            }
            debug!("watcher loop exited");
        });

        Ok(Self {
            state,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Stop the watcher and join its worker task.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        info!("watcher stopped");
    }

    pub fn enabled(&self) -> bool {
        *self.state.enabled.read()
    }

    pub fn set_enabled(&self, enabled: bool) {
        *self.state.enabled.write() = enabled;
        if enabled {
            info!("watcher enabled");
        } else {
            info!("watcher disabled");
        }
    }

    pub fn set_debounce(&self, debounce: Duration) {
        *self.state.debounce.write() = debounce;
    }

    pub fn add_file(&self, filename: impl Into<String>, mode: impl Into<String>) {
        let (filename, mode) = (filename.into(), mode.into());
        info!(file = %filename, mode = %mode, "tracking file");
        self.state.files.write().insert(filename, mode);
    }

    pub fn files(&self) -> HashMap<String, String> {
        self.state.files.read().clone()
    }
}

impl WatcherState {
    fn handle_event(&self, event: Event) {
        if !*self.enabled.read() {
            return;
        }

        // Only writes and creations matter; metadata churn is noise.
        let relevant = match &event.kind {
            EventKind::Create(_) => true,
            EventKind::Modify(kind) => {
                !matches!(*kind, notify::event::ModifyKind::Metadata(_))
            }
            _ => false,
        };
        if !relevant {
            return;
        }

        for path in event.paths {
            let Some(filename) = path.file_name().map(|f| f.to_string_lossy().to_string())
            else {
                continue;
            };
            let Some(mode) = self.files.read().get(&filename).cloned() else {
                continue;
            };

            // Debounce per file.
            let debounce = *self.debounce.read();
            {
                let mut last_change = self.last_change.lock();
                let now = Instant::now();
                if let Some(&last) = last_change.get(&filename) {
                    if now.duration_since(last) < debounce {
                        continue;
                    }
                }
                last_change.insert(filename.clone(), now);
            }

            info!(file = %filename, mode = %mode, "file changed");

            let on_reload = self.on_reload.clone();
            let full_path = self.base_dir.join(&filename);
            tokio::spawn(async move {
                wait_for_file_stable(&full_path).await;

                info!(mode = %mode, "reloading");
                match on_reload(&mode) {
                    Ok(()) => info!(mode = %mode, "reload complete"),
                    Err(e) => warn!(mode = %mode, error = %e, "reload failed"),
                }
            });
        }
    }
}

/// Poll the file size until it holds still for three consecutive checks.
/// Gives up (and proceeds) after the max wait so a pathological writer can't
/// wedge reloads forever.
async fn wait_for_file_stable(path: &Path) {
    let start = Instant::now();
    let mut last_size: Option<u64> = None;
    let mut stable_count = 0u32;

    loop {
        if start.elapsed() > STABILITY_MAX_WAIT {
            warn!(file = %path.display(), "max stability wait exceeded, proceeding anyway");
            return;
        }

        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => Some(meta.len()),
            // The file can briefly vanish mid-rename.
            Err(_) => None,
        };

        match (size, last_size) {
            (Some(size), Some(last)) if size == last && size > 0 => {
                stable_count += 1;
                if stable_count >= STABILITY_REQUIRED_CHECKS {
                    debug!(
                        file = %path.display(),
                        size,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "file stable"
                    );
                    return;
                }
            }
            _ => stable_count = 0,
        }

        last_size = size;
        sleep(STABILITY_CHECK_INTERVAL).await;
    }
}
