//! Configuration for opening a layer store.
//!
//! The configuration uses TOML format:
//! ```toml
//! root = "/var/lib/layerdb"
//!
//! # Digest algorithms whose layer directories are enumerated.
//! algorithms = ["sha256"]
//! ```
//!
//! Both keys are optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{digest::Algorithm, error::Result};

/// Default location of the store.
pub const DEFAULT_ROOT: &str = "/var/lib/layerdb";

/// Store configuration, typically parsed from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory of the store.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Digest algorithms scanned by listings and orphan scans.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_algorithms() -> Vec<Algorithm> {
    Algorithm::DEFAULT_SUPPORTED.to_vec()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            algorithms: default_algorithms(),
        }
    }
}

impl StoreConfig {
    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }
}
