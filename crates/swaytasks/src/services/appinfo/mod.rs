//! Application identity resolution.
//!
//! The compositor only reports low-level window metadata (app id, legacy
//! window class, pid). This module maps that metadata to the installed
//! application's desktop entry through an ordered chain of heuristics,
//! falling back to a synthesized identity when nothing matches:
//!
//! 1. instance hint via the window-class cache (sandboxed/web-app windows)
//! 2. direct lookup of `<app_id>.desktop`
//! 3. snap security label of the owning process
//! 4. `BAMF_DESKTOP_FILE_HINT` in the owning process environment
//! 5. flatpak manifest at the owning process's filesystem root
//! 6. lower-cased retry of the direct lookup
//! 7. synthesized fallback: `<app_id>.desktop`, no icon
//!
//! Each strategy swallows its own failures and declines; exhausting the
//! chain is not an error.

pub mod cache;
pub mod desktop;
mod keyfile;
pub mod sandbox;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::trace;

use super::tree::WindowProps;

pub use cache::{spawn_registry_watcher, AppInfoCache};
pub use desktop::{DesktopDatabase, DesktopEntry};

/// A window's resolved application identity.
///
/// Either a descriptor found in the desktop-entry registry, or a fallback
/// synthesized from the raw class hint. Never absent in a published model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppIdentity {
    /// Matched an installed application descriptor.
    Resolved {
        desktop_id: String,
        icon: Option<String>,
    },
    /// No strategy matched; identity synthesized from the class hint.
    Fallback { desktop_id: String },
}

impl AppIdentity {
    /// Build an identity from a matched desktop entry.
    pub fn from_entry(entry: &DesktopEntry) -> Self {
        Self::Resolved {
            desktop_id: entry.id.clone(),
            icon: entry.icon.clone(),
        }
    }

    /// Synthesize the terminal fallback identity for a class hint.
    pub fn fallback(class_hint: &str) -> Self {
        Self::Fallback {
            desktop_id: format!("{}.desktop", class_hint),
        }
    }

    /// The stable identity string, e.g. `firefox.desktop`.
    pub fn desktop_id(&self) -> &str {
        match self {
            Self::Resolved { desktop_id, .. } | Self::Fallback { desktop_id } => desktop_id,
        }
    }

    /// Icon reference, when the matched descriptor declared one.
    pub fn icon(&self) -> Option<&str> {
        match self {
            Self::Resolved { icon, .. } => icon.as_deref(),
            Self::Fallback { .. } => None,
        }
    }

    /// True when no resolution strategy matched.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Stateless resolver over a desktop-entry database and the window-class
/// cache. `proc_root` is `/proc` in production and a fixture tree in tests.
pub struct IdentityResolver {
    database: Arc<DesktopDatabase>,
    cache: Arc<AppInfoCache>,
    proc_root: PathBuf,
}

impl IdentityResolver {
    pub fn new(database: Arc<DesktopDatabase>, cache: Arc<AppInfoCache>) -> Self {
        Self::with_proc_root(database, cache, PathBuf::from("/proc"))
    }

    /// Resolver with an explicit procfs mount point.
    pub fn with_proc_root(
        database: Arc<DesktopDatabase>,
        cache: Arc<AppInfoCache>,
        proc_root: PathBuf,
    ) -> Self {
        Self {
            database,
            cache,
            proc_root,
        }
    }

    /// Resolve a window's identity. Deterministic for fixed cache contents
    /// and fixed process attributes; never fails.
    pub fn resolve(&self, props: &WindowProps) -> AppIdentity {
        self.from_instance_hint(props)
            .or_else(|| self.from_desktop_id(&props.app_id))
            .or_else(|| self.from_snap(props.pid))
            .or_else(|| self.from_bamf(props.pid))
            .or_else(|| self.from_flatpak(props.pid))
            .or_else(|| self.from_lowercase(&props.app_id))
            .unwrap_or_else(|| AppIdentity::fallback(&props.app_id))
    }

    /// Strategy 1: windows that set an instance hint (x11 web apps, mostly)
    /// advertise their real identity there; the cache indexes it by
    /// declared window class.
    fn from_instance_hint(&self, props: &WindowProps) -> Option<AppIdentity> {
        if props.instance.is_empty() {
            return None;
        }
        let identity = self.cache.lookup(&props.instance)?;
        trace!("resolved {:?} via instance hint {:?}", props.title, props.instance);
        Some(identity)
    }

    /// Strategy 2: the app id names the desktop file directly.
    fn from_desktop_id(&self, app_id: &str) -> Option<AppIdentity> {
        if app_id.is_empty() {
            return None;
        }
        let entry = self.database.find(&format!("{}.desktop", app_id))?;
        Some(AppIdentity::from_entry(&entry))
    }

    /// Strategy 3: snap-confined process.
    fn from_snap(&self, pid: u32) -> Option<AppIdentity> {
        let desktop_id = sandbox::snap_desktop_id(&self.proc_root, pid)?;
        let entry = self.database.find(&desktop_id)?;
        trace!("resolved pid {} via snap label", pid);
        Some(AppIdentity::from_entry(&entry))
    }

    /// Strategy 4: desktop file hint in the process environment. The hint
    /// carries a full path, so the file is loaded directly rather than
    /// searched in the database.
    fn from_bamf(&self, pid: u32) -> Option<AppIdentity> {
        let path = sandbox::bamf_desktop_file(&self.proc_root, pid)?;
        let entry = DesktopEntry::from_path(&path)
            .map_err(|e| trace!("bamf hint {} unreadable: {}", path.display(), e))
            .ok()?;
        trace!("resolved pid {} via desktop file hint", pid);
        Some(AppIdentity::from_entry(&entry))
    }

    /// Strategy 5: flatpak-confined process.
    fn from_flatpak(&self, pid: u32) -> Option<AppIdentity> {
        let name = sandbox::flatpak_app_name(&self.proc_root, pid)?;
        let entry = self.database.find(&format!("{}.desktop", name))?;
        trace!("resolved pid {} via flatpak manifest", pid);
        Some(AppIdentity::from_entry(&entry))
    }

    /// Strategy 6: retry the direct lookup case-insensitively.
    fn from_lowercase(&self, app_id: &str) -> Option<AppIdentity> {
        self.from_desktop_id(&app_id.to_lowercase())
    }
}
