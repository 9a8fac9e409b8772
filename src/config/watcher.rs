//! Hot reload for the config file.
//!
//! The watcher polls the file's mtime and holds the config the session is
//! running with. A touched file is only forwarded when its reloaded contents
//! actually differ from that config, so saving an unchanged file never
//! reaches the session.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::Config;

/// What one poll found.
#[derive(Debug, PartialEq)]
enum Reload {
    /// File untouched since the last poll.
    Untouched,
    /// File touched but it still yields the running config.
    Unchanged,
    /// File failed to parse or validate; the running config stays.
    Rejected,
    Changed(Config),
}

/// Watches one config file on behalf of a running session.
pub struct ConfigWatcher {
    path: PathBuf,
    poll_interval: Duration,
    last_mtime: Option<SystemTime>,
    running: Config,
}

impl ConfigWatcher {
    /// `running` is the config the session started with.
    pub fn new(path: PathBuf, poll_interval: Duration, running: Config) -> Self {
        let last_mtime = read_mtime(&path);
        Self {
            path,
            poll_interval,
            last_mtime,
            running,
        }
    }

    /// Poll until shutdown, sending each config that differs from the one
    /// last sent (or the initial one).
    pub async fn watch(
        mut self,
        tx: mpsc::UnboundedSender<Config>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, stopping config watcher");
                        return;
                    }
                }
                _ = ticker.tick() => {}
            }
            if *shutdown_rx.borrow() {
                info!("Config watcher shutting down");
                return;
            }

            if let Reload::Changed(config) = self.poll() {
                if tx.send(config).is_err() {
                    warn!("Config receiver dropped, stopping watcher");
                    return;
                }
            }
        }
    }

    fn poll(&mut self) -> Reload {
        let mtime = read_mtime(&self.path);
        let touched = match (self.last_mtime, mtime) {
            (Some(prev), Some(next)) => next != prev,
            (None, Some(_)) => true,
            _ => false,
        };
        if !touched {
            return Reload::Untouched;
        }
        self.last_mtime = mtime;

        match Config::load_at(&self.path) {
            Ok(config) if config == self.running => {
                debug!(path = %self.path.display(), "Config file touched, contents unchanged");
                Reload::Unchanged
            }
            Ok(config) => {
                debug!(
                    path = %self.path.display(),
                    invalidates_cache = self.running.invalidates_cache(&config),
                    "Config file changed"
                );
                self.running = config.clone();
                Reload::Changed(config)
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Config reload rejected; keeping running configuration"
                );
                Reload::Rejected
            }
        }
    }
}

fn read_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
