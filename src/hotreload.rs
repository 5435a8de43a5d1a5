//! [`HotReloadWatcher`]: a filesystem watcher that turns raw change events
//! into a debounced batch of changed [`ModuleId`]s, polled once per frame by
//! the frame driver.
//!
//! The watcher itself runs on a background thread (via `notify`'s async
//! event channel); everything it reports is buffered behind an
//! `mpsc::Receiver` and only ever drained on the host thread, the same
//! thread-boundary rule the rest of the core follows. Debouncing coalesces
//! a burst of edits (e.g. an editor's save-as-rename-then-write) into one
//! batch by waiting for a quiet period after the last event before
//! reporting it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use notify::event::EventKind;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::module::ModuleId;
use crate::path::PathNormalizer;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct HotReloadConfig {
    pub debounce: Duration,
    /// Root the watched paths are relative to, mirroring
    /// `ResolverConfig::assets_root` so watcher-reported paths normalize to
    /// the same [`ModuleId`]s `require` resolves.
    pub assets_root: PathBuf,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            assets_root: PathBuf::new(),
        }
    }
}

/// Watches one or more directories for script edits. `poll()` is the only
/// method the frame driver calls; everything else happens on the watcher's
/// own background thread.
pub struct HotReloadWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Event>,
    config: HotReloadConfig,
    normalizer: PathNormalizer,
    pending: HashSet<PathBuf>,
    last_event_at: Option<Instant>,
}

impl HotReloadWatcher {
    pub fn new(watch_root: impl AsRef<Path>, config: HotReloadConfig) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if tx.send(event).is_err() {
                    log::warn!("hot-reload watcher event dropped: host side closed");
                }
            }
            Err(err) => log::error!("hot-reload watcher error: {err}"),
        })?;
        watcher.watch(watch_root.as_ref(), RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            events: rx,
            config,
            normalizer: PathNormalizer::new(),
            pending: HashSet::new(),
            last_event_at: None,
        })
    }

    /// Non-blocking: drain whatever the background thread produced since
    /// the last poll, then return a debounced batch once the edit burst has
    /// gone quiet. Returns an empty set most frames.
    pub fn poll(&mut self) -> HashSet<ModuleId> {
        while let Ok(event) = self.events.try_recv() {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                continue;
            }
            for path in event.paths {
                self.pending.insert(path);
            }
            self.last_event_at = Some(Instant::now());
        }

        let quiet = self.last_event_at.map(|t| t.elapsed() >= self.config.debounce).unwrap_or(false);
        if !quiet || self.pending.is_empty() {
            return HashSet::new();
        }

        self.last_event_at = None;
        let paths = std::mem::take(&mut self.pending);
        paths
            .into_iter()
            .filter_map(|path| self.to_module_id(&path))
            .collect()
    }

    fn to_module_id(&self, path: &Path) -> Option<ModuleId> {
        let relative = path.strip_prefix(&self.config.assets_root).unwrap_or(path);
        let as_str = relative.to_string_lossy();
        match self.normalizer.normalize(&as_str) {
            Ok(id) => Some(id),
            Err(_) => {
                log::warn!("hot-reload: could not normalize changed path `{}`", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `HotReloadWatcher::new` spins up a real OS filesystem watcher, so unit
    // tests here exercise the pure debounce/normalize logic directly rather
    // than going through `notify`.

    fn normalize(root: &Path, path: &Path) -> Option<ModuleId> {
        let normalizer = PathNormalizer::new();
        let relative = path.strip_prefix(root).unwrap_or(path);
        normalizer.normalize(&relative.to_string_lossy()).ok()
    }

    #[test]
    fn changed_path_normalizes_relative_to_assets_root() {
        let root = Path::new("/game/Assets");
        let changed = Path::new("/game/Assets/weapons/sword.js");
        let id = normalize(root, changed).unwrap();
        assert_eq!(id.as_str(), "weapons/sword.js");
    }

    #[test]
    fn path_outside_assets_root_is_used_as_is() {
        let root = Path::new("/game/Assets");
        let changed = Path::new("/other/thing.js");
        let id = normalize(root, changed).unwrap();
        assert_eq!(id.as_str(), "other/thing.js");
    }
}
