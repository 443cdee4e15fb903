//! Configuration parsing from TOML.
//!
//! The config file lives at `$XDG_CONFIG_HOME/swaytasks/config.toml` and is
//! optional; every field has a default so a missing file yields a usable
//! configuration. An explicitly passed path that does not exist is an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Default configuration document, written out by `--print-default-config`
/// and used as the reference for all supported keys.
pub const DEFAULT_CONFIG_TOML: &str = r#"# swaytasks configuration

[ipc]
# Path to the compositor IPC socket. Defaults to $SWAYSOCK.
# socket = "/run/user/1000/sway-ipc.1000.1.sock"

[apps]
# Extra directories scanned for .desktop files, in addition to the
# XDG data directories.
extra_data_dirs = []

# Rebuild the application cache when desktop entries change on disk.
watch = true
"#;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub apps: AppsConfig,
}

/// Compositor IPC settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpcConfig {
    /// Socket path override. When unset, `$SWAYSOCK` is used.
    pub socket: Option<PathBuf>,
}

/// Application identity resolution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppsConfig {
    /// Extra desktop-entry directories, searched after the XDG set.
    #[serde(default)]
    pub extra_data_dirs: Vec<PathBuf>,
    /// Whether to watch the desktop-entry directories for changes.
    #[serde(default = "default_watch")]
    pub watch: bool,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            extra_data_dirs: Vec::new(),
            watch: true,
        }
    }
}

fn default_watch() -> bool {
    true
}

/// Result of loading a configuration: the parsed config plus the path it
/// came from (`None` when defaults were used).
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Config {
    /// Default config file location under the XDG config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("swaytasks").join("config.toml"))
    }

    /// Load configuration from `explicit` if given, else from the default
    /// location, else fall back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<ConfigLoadResult> {
        let path = match explicit {
            Some(p) => {
                if !p.is_file() {
                    return Err(Error::ConfigNotFound(p.to_path_buf()));
                }
                Some(p.to_path_buf())
            }
            None => Self::default_path().filter(|p| p.is_file()),
        };

        let config = match &path {
            Some(p) => Self::parse_file(p)?,
            None => {
                debug!("no config file found, using defaults");
                Config::default()
            }
        };

        let problems = config.validate();
        if !problems.is_empty() {
            return Err(Error::ConfigValidation(problems));
        }

        Ok(ConfigLoadResult { config, path })
    }

    fn parse_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Collect validation problems. An empty vec means the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(socket) = &self.ipc.socket {
            if !socket.is_absolute() {
                problems.push(format!(
                    "ipc.socket: {} is not an absolute path",
                    socket.display()
                ));
            }
        }

        for dir in &self.apps.extra_data_dirs {
            if !dir.is_absolute() {
                problems.push(format!(
                    "apps.extra_data_dirs: {} is not an absolute path",
                    dir.display()
                ));
            }
        }

        problems
    }
}
