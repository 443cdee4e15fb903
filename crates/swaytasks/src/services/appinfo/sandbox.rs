//! Identity recovery for confined processes.
//!
//! Three probes against a process's `/proc` entry, each returning `None`
//! when the process is not confined that way (or the probe fails):
//!
//! - snap: the LSM security profile in `/proc/<pid>/attr/current` carries a
//!   `snap.<name>.<app>` label; the matching desktop file is
//!   `<name>_<app>.desktop`.
//! - BAMF: some launchers export `BAMF_DESKTOP_FILE_HINT=<path>` into the
//!   process environment, pointing straight at the desktop file.
//! - flatpak: a confined process sees `/.flatpak-info` at its filesystem
//!   root; the manifest's `[Application]` name keys the desktop file.
//!
//! The `proc_root` argument is the mount point of procfs, injectable so
//! tests can run against a fixture tree.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::keyfile::KeyFile;

const SNAP_LABEL_PREFIX: &str = "snap.";
const BAMF_HINT_VAR: &str = "BAMF_DESKTOP_FILE_HINT=";
const FLATPAK_INFO_NAME: &str = ".flatpak-info";
const FLATPAK_APPLICATION_GROUP: &str = "Application";

/// Derive a desktop-file id from the process's snap security label.
///
/// The label for the firefox snap reads `snap.firefox.firefox (enforce)`;
/// the desktop file to look up is `firefox_firefox.desktop`.
pub fn snap_desktop_id(proc_root: &Path, pid: u32) -> Option<String> {
    let path = proc_root.join(pid.to_string()).join("attr/current");
    let data = fs::read_to_string(&path)
        .map_err(|e| debug!("snap probe: cannot read {}: {}", path.display(), e))
        .ok()?;

    let label = data.lines().next()?;
    let rest = label.strip_prefix(SNAP_LABEL_PREFIX)?;
    let profile = rest.split_whitespace().next()?;
    if profile.is_empty() {
        return None;
    }

    Some(format!("{}.desktop", profile.replace('.', "_")))
}

/// Find the `BAMF_DESKTOP_FILE_HINT` variable in the process environment.
///
/// Returns the desktop-file path the hint points at.
pub fn bamf_desktop_file(proc_root: &Path, pid: u32) -> Option<PathBuf> {
    let path = proc_root.join(pid.to_string()).join("environ");
    let data = fs::read(&path)
        .map_err(|e| debug!("bamf probe: cannot read {}: {}", path.display(), e))
        .ok()?;

    for raw in data.split(|b| *b == 0) {
        let var = String::from_utf8_lossy(raw);
        if let Some(hint) = var.strip_prefix(BAMF_HINT_VAR) {
            if hint.is_empty() {
                return None;
            }
            return Some(PathBuf::from(hint.to_string()));
        }
    }

    None
}

/// Read the application name from the flatpak manifest at the process's
/// filesystem root.
pub fn flatpak_app_name(proc_root: &Path, pid: u32) -> Option<String> {
    let path = proc_root
        .join(pid.to_string())
        .join("root")
        .join(FLATPAK_INFO_NAME);
    if !path.is_file() {
        return None;
    }

    let manifest = KeyFile::load(&path)
        .map_err(|e| debug!("flatpak probe: cannot read {}: {}", path.display(), e))
        .ok()?;

    manifest
        .get(FLATPAK_APPLICATION_GROUP, "name")
        .map(str::to_string)
}
