//! Window-class indexed application cache.
//!
//! Maps a declared `StartupWMClass` to the resolved application identity.
//! The index is rebuilt wholesale whenever the desktop-entry registry
//! changes; lookups clone out of an `Arc` that is swapped atomically, so a
//! reader sees either the complete old index or the complete new one,
//! never a partially populated map.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::desktop::DesktopDatabase;
use super::AppIdentity;

/// Quiet period after a registry change before rebuilding, so bursts of
/// file events (package installs touch many entries) coalesce into one
/// rebuild.
const REBUILD_DEBOUNCE: Duration = Duration::from_millis(500);

type ClassIndex = HashMap<String, AppIdentity>;

/// Process-wide cache of window-class -> application identity.
///
/// Constructed explicitly and shared via `Arc`; there is no global
/// instance, so tests can build isolated caches over fixture databases.
pub struct AppInfoCache {
    database: Arc<DesktopDatabase>,
    index: RwLock<Arc<ClassIndex>>,
}

impl AppInfoCache {
    /// Build the cache and populate it with an initial rebuild.
    pub fn new(database: Arc<DesktopDatabase>) -> Self {
        let cache = Self {
            database,
            index: RwLock::new(Arc::new(ClassIndex::new())),
        };
        cache.rebuild();
        cache
    }

    /// Look up an identity by window-class hint.
    pub fn lookup(&self, wm_class: &str) -> Option<AppIdentity> {
        self.index.read().get(wm_class).cloned()
    }

    /// Re-enumerate the desktop-entry registry and swap in a fresh index.
    ///
    /// The new index is built entirely outside the lock; the write lock is
    /// held only for the pointer swap. When two descriptors declare the
    /// same `StartupWMClass` the one enumerated last wins; the enumeration
    /// order among colliding entries is unspecified.
    pub fn rebuild(&self) {
        let mut fresh = ClassIndex::new();
        for entry in self.database.entries() {
            if let Some(class) = &entry.startup_wm_class {
                fresh.insert(class.clone(), AppIdentity::from_entry(&entry));
            }
        }

        let count = fresh.len();
        *self.index.write() = Arc::new(fresh);
        debug!("application cache rebuilt: {} window-class entries", count);
    }

    /// The underlying desktop-entry database.
    pub fn database(&self) -> &Arc<DesktopDatabase> {
        &self.database
    }
}

/// Watch the cache's desktop-entry directories and rebuild on changes.
///
/// Returns the watcher, which must be kept alive for events to keep
/// flowing, or `None` when the watcher cannot be created. The rebuild runs
/// on a dedicated thread; cache swaps are safe against concurrent lookups
/// from any context.
pub fn spawn_registry_watcher(cache: Arc<AppInfoCache>) -> Option<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel();

    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
        match res {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("desktop entry watcher error: {}", e),
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            warn!("failed to create desktop entry watcher: {}", e);
            return None;
        }
    };

    for dir in cache.database().dirs() {
        if let Err(e) = watcher.watch(dir, RecursiveMode::Recursive) {
            debug!("not watching {}: {}", dir.display(), e);
        }
    }

    let spawned = thread::Builder::new()
        .name("swaytasks-appcache".into())
        .spawn(move || {
            while rx.recv().is_ok() {
                // Drain further events until the registry settles.
                while rx.recv_timeout(REBUILD_DEBOUNCE).is_ok() {}
                debug!("desktop entry registry changed, rebuilding cache");
                cache.rebuild();
            }
        });

    if let Err(e) = spawned {
        warn!("failed to spawn cache rebuild thread: {}", e);
        return None;
    }

    Some(watcher)
}
