//! Desktop-entry database.
//!
//! Scans the `applications/` subdirectories of the XDG data directories for
//! `.desktop` files and exposes lookup by desktop-file id as well as full
//! enumeration (used by the application cache rebuild). Directory order
//! follows XDG precedence: `$XDG_DATA_HOME` first, then `$XDG_DATA_DIRS`.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::keyfile::KeyFile;

const DESKTOP_ENTRY_GROUP: &str = "Desktop Entry";
const DESKTOP_SUFFIX: &str = ".desktop";

/// Fallback for `$XDG_DATA_DIRS` when the variable is unset, per the XDG
/// base directory spec.
const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";

/// The fields of an installed-application descriptor that matter for
/// identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    /// Desktop-file id, e.g. `firefox.desktop`.
    pub id: String,
    /// Human-readable application name.
    pub name: Option<String>,
    /// Icon name or absolute icon path.
    pub icon: Option<String>,
    /// Declared startup window class, the application-cache key.
    pub startup_wm_class: Option<String>,
    /// Whether the entry asks not to be displayed in menus.
    pub no_display: bool,
}

impl DesktopEntry {
    /// Load a desktop entry from an explicit path. The id is derived from
    /// the file name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let keyfile = KeyFile::load(path)?;

        Ok(Self {
            id,
            name: keyfile
                .get(DESKTOP_ENTRY_GROUP, "Name")
                .map(str::to_string),
            icon: keyfile
                .get(DESKTOP_ENTRY_GROUP, "Icon")
                .map(str::to_string),
            startup_wm_class: keyfile
                .get(DESKTOP_ENTRY_GROUP, "StartupWMClass")
                .map(str::to_string),
            no_display: keyfile.get(DESKTOP_ENTRY_GROUP, "NoDisplay") == Some("true"),
        })
    }
}

/// The set of directories searched for desktop entries.
pub struct DesktopDatabase {
    dirs: Vec<PathBuf>,
}

impl DesktopDatabase {
    /// Build the database over the host's XDG data directories, with
    /// `extra` appended after them (lowest precedence).
    pub fn system(extra: &[PathBuf]) -> Self {
        let mut dirs = Vec::new();

        let data_home = env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(dirs::data_dir);
        if let Some(home) = data_home {
            dirs.push(home.join("applications"));
        }

        let data_dirs =
            env::var("XDG_DATA_DIRS").unwrap_or_else(|_| DEFAULT_DATA_DIRS.to_string());
        for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
            dirs.push(PathBuf::from(dir).join("applications"));
        }

        dirs.extend(extra.iter().cloned());
        debug!("desktop entry directories: {:?}", dirs);

        Self { dirs }
    }

    /// Build a database over an explicit directory list. Used by tests and
    /// by callers that manage their own search path.
    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// The directories this database scans, in precedence order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Look up a descriptor by desktop-file id. The first directory
    /// containing the id wins.
    pub fn find(&self, desktop_id: &str) -> Option<DesktopEntry> {
        if desktop_id.is_empty() || !desktop_id.ends_with(DESKTOP_SUFFIX) {
            return None;
        }

        for dir in &self.dirs {
            let path = dir.join(desktop_id);
            if !path.is_file() {
                continue;
            }
            match DesktopEntry::from_path(&path) {
                Ok(entry) => return Some(entry),
                Err(e) => {
                    debug!("failed to read desktop entry {}: {}", path.display(), e);
                }
            }
        }

        None
    }

    /// Enumerate every descriptor in every directory.
    ///
    /// Shadowed ids (the same file name in a later directory) are skipped so
    /// the result matches what `find` would return for each id.
    pub fn entries(&self) -> Vec<DesktopEntry> {
        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();

        for dir in &self.dirs {
            let Ok(listing) = std::fs::read_dir(dir) else {
                trace!("skipping unreadable directory {}", dir.display());
                continue;
            };

            for file in listing.flatten() {
                let path = file.path();
                let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    continue;
                };
                if !name.ends_with(DESKTOP_SUFFIX) || !seen.insert(name) {
                    continue;
                }
                match DesktopEntry::from_path(&path) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        debug!("failed to read desktop entry {}: {}", path.display(), e);
                    }
                }
            }
        }

        entries
    }
}
