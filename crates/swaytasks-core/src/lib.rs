//! Core configuration and utilities for swaytasks.
//!
//! This crate provides:
//! - Configuration parsing from TOML
//! - Logging setup
//! - Shared error types

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ConfigLoadResult, DEFAULT_CONFIG_TOML};
pub use error::{Error, Result};
