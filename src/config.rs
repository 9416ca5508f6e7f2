use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{StorageRoot, DEFAULT_PRIMARY_STORAGE};
use crate::copy::DEFAULT_BUFFER_SIZE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: Storage,
    pub scope: Scope,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub copy: Transfer,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Storage {
    #[serde(default = "default_primary_storage")]
    pub primary_storage: String,
    /// Host directory standing in for the storage mount.
    pub host_root: PathBuf,
    #[serde(default = "default_grants_file")]
    pub grants_file: PathBuf,
}
fn default_primary_storage() -> String { DEFAULT_PRIMARY_STORAGE.to_string() }
fn default_grants_file() -> PathBuf { PathBuf::from("grants.json") }

#[derive(Debug, Deserialize, Clone)]
pub struct Scope { pub permission_dir: String }

#[derive(Debug, Deserialize, Clone)]
pub struct Platform {
    #[serde(default = "default_api_level")]
    pub api_level: u32,
}
fn default_api_level() -> u32 { 30 }

impl Default for Platform {
    fn default() -> Self { Self { api_level: default_api_level() } }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Transfer {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}
fn default_buffer_size() -> usize { DEFAULT_BUFFER_SIZE }

impl Default for Transfer {
    fn default() -> Self { Self { buffer_size: default_buffer_size() } }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.storage.host_root.is_dir() {
            anyhow::bail!("host_root does not exist or is not a directory: {}", self.storage.host_root.display());
        }
        StorageRoot::new(&self.storage.primary_storage)?;
        if self.scope.permission_dir.trim().is_empty() { anyhow::bail!("permission_dir must not be empty"); }
        if self.platform.api_level == 0 { anyhow::bail!("api_level must be > 0"); }
        if self.copy.buffer_size == 0 { anyhow::bail!("buffer_size must be > 0"); }
        Ok(())
    }

    pub fn storage_root(&self) -> anyhow::Result<StorageRoot> {
        Ok(StorageRoot::new(&self.storage.primary_storage)?)
    }

    /// Grants file, relative paths taken from `host_root`.
    pub fn grants_path(&self) -> PathBuf {
        if self.storage.grants_file.is_absolute() {
            self.storage.grants_file.clone()
        } else {
            self.storage.host_root.join(&self.storage.grants_file)
        }
    }
}
