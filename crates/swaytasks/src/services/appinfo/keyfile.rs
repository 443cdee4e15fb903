//! Minimal parser for the freedesktop keyfile format.
//!
//! Covers the subset needed here: `.desktop` entries and flatpak's
//! `.flatpak-info` manifest. Groups are `[Name]` headers, entries are
//! `key=value` lines, `#` lines and blank lines are ignored. Localized
//! keys (`Name[de]`) are stored verbatim, so plain-key lookups skip them.

use std::collections::HashMap;
use std::io;
use std::path::Path;

/// A parsed keyfile: group name -> key -> value.
#[derive(Debug, Default)]
pub struct KeyFile {
    groups: HashMap<String, HashMap<String, String>>,
}

impl KeyFile {
    /// Read and parse a keyfile from disk.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse keyfile text. Malformed lines are skipped rather than failing
    /// the whole document; on a duplicate key the last occurrence wins.
    pub fn parse(text: &str) -> Self {
        let mut groups: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(name.to_string());
                groups.entry(name.to_string()).or_default();
                continue;
            }

            let Some(group) = &current else {
                // Entry before any group header
                continue;
            };

            if let Some((key, value)) = line.split_once('=') {
                groups
                    .entry(group.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Self { groups }
    }

    /// Look up a value by group and key.
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups.get(group)?.get(key).map(String::as_str)
    }

    /// Returns true if the keyfile contains the given group.
    #[allow(dead_code)]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }
}
