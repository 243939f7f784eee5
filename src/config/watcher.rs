//! Hot reload of the supervisor configuration.
//!
//! The watcher owns the reload: it parses and validates the file, swaps the
//! result into [`LiveConfig`], and only then tells listeners which phase
//! thresholds moved. Attaches made after the swap see the new delays.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::live::LiveConfig;
use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::SupervisorConfig;
use crate::phase::Phase;

/// A configuration swap that already took effect.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub previous: Arc<SupervisorConfig>,
    pub current: Arc<SupervisorConfig>,
}

impl ConfigChange {
    /// Phases whose threshold was added, removed or changed.
    pub fn changed_phases(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|phase| self.previous.delays.get(*phase) != self.current.delays.get(*phase))
            .collect()
    }
}

/// Reload `path` into `live`.
///
/// Returns `None` when there is nothing to apply: the file is empty (a
/// writer truncated it and has not written yet) or parses to the config
/// already live. On error the live config is left as it was.
pub fn apply_reload(path: &Path, live: &LiveConfig) -> Result<Option<ConfigChange>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        tracing::debug!(path = %path.display(), "Config file empty, waiting for write");
        return Ok(None);
    }

    let config = parse_config(&raw)?;
    if *live.snapshot() == config {
        return Ok(None);
    }

    let previous = live.replace(config);
    Ok(Some(ConfigChange {
        previous,
        current: live.snapshot(),
    }))
}

/// Watches the configuration file and keeps a [`LiveConfig`] current.
pub struct ConfigWatcher {
    path: PathBuf,
    live: Arc<LiveConfig>,
    change_tx: mpsc::UnboundedSender<ConfigChange>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for every applied change.
    pub fn new(path: &Path, live: Arc<LiveConfig>) -> (Self, mpsc::UnboundedReceiver<ConfigChange>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                live,
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching the file. Events arrive on notify's own thread.
    ///
    /// The returned watcher must be kept alive for reloads to happen.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            live,
            change_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match apply_reload(&path, &live) {
                        Ok(Some(change)) => {
                            tracing::info!(
                                path = %path.display(),
                                changed = ?change.changed_phases(),
                                "Config reloaded"
                            );
                            let _ = change_tx.send(change);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(
                                "Failed to reload config: {}. Keeping current configuration.",
                                e
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}
