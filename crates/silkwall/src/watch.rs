use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{select, unbounded, Receiver};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use silkconfig::SilkConfig;
use tracing::{debug, info, warn};

/// Reads and validates a configuration file. A missing file is `Ok(None)`.
pub fn load_config(path: &Path) -> Result<Option<SilkConfig>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };
    let config = SilkConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(Some(config))
}

/// Why [`ConfigWatcher::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The file was touched and no further events arrived within the settle window.
    Changed,
    /// The `closed` channel fired or disconnected.
    Closed,
}

/// Watches the directory holding the configuration file so that editors which
/// replace the file by rename are seen as well as in-place writes.
pub struct ConfigWatcher {
    path: PathBuf,
    events: Receiver<()>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf) -> Result<Self> {
        let dir = watch_dir(&path).to_path_buf();
        let (tx, events) = unbounded();
        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_config_event(&event, &target) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "file watcher error"),
        })
        .context("failed to create file watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;

        Ok(Self {
            path,
            events,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the file changes or `closed` wakes. Bursts of events closer
    /// together than `settle` collapse into one `Changed`.
    pub fn wait<T>(&self, closed: &Receiver<T>, settle: Duration) -> Wake {
        select! {
            recv(self.events) -> event => {
                if event.is_err() {
                    return Wake::Closed;
                }
            }
            recv(closed) -> _ => return Wake::Closed,
        }
        loop {
            select! {
                recv(self.events) -> event => {
                    if event.is_err() {
                        return Wake::Closed;
                    }
                }
                recv(closed) -> _ => return Wake::Closed,
                default(settle) => return Wake::Changed,
            }
        }
    }

    /// Re-reads the file after a change. Invalid or deleted files keep the
    /// running settings and yield `None`.
    pub fn reload(&self) -> Option<SilkConfig> {
        while self.events.try_recv().is_ok() {}

        match load_config(&self.path) {
            Ok(Some(config)) => {
                info!(path = %self.path.display(), "configuration reloaded");
                Some(config)
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "configuration file removed; keeping current settings");
                None
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %format!("{err:#}"),
                    "ignoring invalid configuration; keeping current settings"
                );
                None
            }
        }
    }
}

fn watch_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// True for content, creation, rename and removal events naming the file.
/// Access events are ignored so that our own reads never retrigger a reload.
pub fn is_config_event(event: &Event, path: &Path) -> bool {
    let kind = &event.kind;
    if !(kind.is_modify() || kind.is_create() || kind.is_remove()) {
        return false;
    }
    let Some(name) = path.file_name() else {
        return false;
    };
    event
        .paths
        .iter()
        .any(|changed| changed.file_name() == Some(name))
}
