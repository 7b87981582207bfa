//! Hot reload: watches the gateway config file and emits validated configs.
//!
//! Editors usually produce several modify events per save (truncate, write,
//! metadata). Each event re-reads the file, but a config is only emitted
//! when the text differs from the last one seen, so one save yields at most
//! one reload.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::GatewayConfig;

/// Remembers the fingerprint of the last config text seen.
#[derive(Debug, Default)]
struct Fingerprint(Option<u64>);

impl Fingerprint {
    /// Records `content` and reports whether it differs from the previous text.
    fn changed(&mut self, content: &str) -> bool {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        let digest = hasher.finish();
        if self.0 == Some(digest) {
            return false;
        }
        self.0 = Some(digest);
        true
    }
}

pub struct ConfigWatcher {
    path: PathBuf,
    seen: Arc<Mutex<Fingerprint>>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for validated updates.
    ///
    /// The file's current text counts as seen, so touching it without
    /// editing does not trigger a reload.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let mut seen = Fingerprint::default();
        if let Ok(content) = std::fs::read_to_string(path) {
            seen.changed(&content);
        }
        (
            Self {
                path: path.to_path_buf(),
                seen: Arc::new(Mutex::new(seen)),
                update_tx,
            },
            update_rx,
        )
    }

    /// Re-read the file; `Ok(None)` when its text is unchanged.
    fn reload(path: &Path, seen: &Mutex<Fingerprint>) -> Result<Option<GatewayConfig>, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let changed = match seen.lock() {
            Ok(mut seen) => seen.changed(&content),
            Err(poisoned) => poisoned.into_inner().changed(&content),
        };
        if !changed {
            return Ok(None);
        }
        parse_config(&content).map(Some)
    }

    /// Start watching on notify's background thread. Updates stop when the
    /// returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, seen, update_tx } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                match Self::reload(&path, &seen) {
                    Ok(Some(config)) => {
                        tracing::info!(path = %path.display(), "Config file changed, reloading");
                        let _ = update_tx.send(config);
                    }
                    Ok(None) => tracing::debug!(path = %path.display(), "Config event without content change"),
                    Err(e) => {
                        tracing::error!(error = %e, "Config reload rejected, keeping current configuration")
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %watched.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(tag: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("gateway-watch-{tag}-{}.toml", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_fingerprint_detects_changes_only() {
        let mut seen = Fingerprint::default();
        assert!(seen.changed("a = 1"));
        assert!(!seen.changed("a = 1"));
        assert!(seen.changed("a = 2"));
    }

    #[test]
    fn test_reload_skips_untouched_text() {
        let path = temp_config("same", "[[listeners]]\nbind_address = \"127.0.0.1:0\"\n");
        let (watcher, _rx) = ConfigWatcher::new(&path);
        assert!(ConfigWatcher::reload(&path, &watcher.seen).unwrap().is_none());

        std::fs::write(&path, "[[listeners]]\nbind_address = \"127.0.0.1:1\"\n").unwrap();
        let config = ConfigWatcher::reload(&path, &watcher.seen).unwrap().unwrap();
        assert_eq!(config.listeners[0].bind_address, "127.0.0.1:1");
        assert!(ConfigWatcher::reload(&path, &watcher.seen).unwrap().is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_edit_is_rejected() {
        let path = temp_config("bad", "");
        let (watcher, _rx) = ConfigWatcher::new(&path);
        std::fs::write(&path, "[client]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(
            ConfigWatcher::reload(&path, &watcher.seen),
            Err(ConfigError::Validation(_))
        ));
        let _ = std::fs::remove_file(&path);
    }
}
