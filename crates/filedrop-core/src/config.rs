//! Configuration module
//!
//! Uploader settings loaded from the environment (and a `.env` file when present).
//! The command-line front end overlays its flags on top of these values.

use std::env;
use std::path::PathBuf;

use crate::models::normalize_extension;
use crate::storage_types::StorageBackend;

const DEFAULT_STORAGE_PATH: &str = "./uploads";
const DEFAULT_BASE_URL: &str = "http://localhost:3000/files";
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Uploader configuration.
#[derive(Clone, Debug)]
pub struct UploaderConfig {
    /// Normalized extensions (lowercase, no leading dot). Empty accepts everything.
    pub accepted_extensions: Vec<String>,
    /// Maximum number of items in the queue. `None` means unbounded.
    pub max_items: Option<usize>,
    /// Route intake through the transform stage before uploading.
    pub transform_enabled: bool,
    /// Reject intake and removal.
    pub read_only: bool,
    pub storage_backend: StorageBackend,
    pub storage_path: PathBuf,
    pub base_url: String,
    /// Per-file limit enforced by the local transport.
    pub max_file_size_bytes: Option<u64>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            accepted_extensions: Vec::new(),
            max_items: None,
            transform_enabled: false,
            read_only: false,
            storage_backend: StorageBackend::Local,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_file_size_bytes: None,
        }
    }
}

impl UploaderConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Missing keys fall back to
    /// the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let accepted_extensions = lookup("FILEDROP_ACCEPTED_EXTENSIONS")
            .map(|s| parse_extension_list(&s))
            .unwrap_or_default();

        let max_items = match lookup("FILEDROP_MAX_ITEMS") {
            Some(s) if !s.trim().is_empty() => Some(
                s.trim()
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("FILEDROP_MAX_ITEMS must be a valid number"))?,
            ),
            _ => None,
        };

        let storage_backend = match lookup("FILEDROP_STORAGE_BACKEND") {
            Some(s) => s.parse::<StorageBackend>()?,
            None => defaults.storage_backend,
        };

        let max_file_size_bytes = lookup("FILEDROP_MAX_FILE_SIZE_MB")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|mb| mb.saturating_mul(BYTES_PER_MB));

        let config = Self {
            accepted_extensions,
            max_items,
            transform_enabled: lookup("FILEDROP_TRANSFORM_ENABLED")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.transform_enabled),
            read_only: lookup("FILEDROP_READ_ONLY")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.read_only),
            storage_backend,
            storage_path: lookup("FILEDROP_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            base_url: lookup("FILEDROP_BASE_URL").unwrap_or(defaults.base_url),
            max_file_size_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_items == Some(0) {
            return Err(anyhow::anyhow!(
                "FILEDROP_MAX_ITEMS must be greater than zero when set"
            ));
        }

        if self.max_file_size_bytes == Some(0) {
            return Err(anyhow::anyhow!(
                "FILEDROP_MAX_FILE_SIZE_MB must be greater than zero when set"
            ));
        }

        if self.storage_backend == StorageBackend::Local {
            if self.storage_path.as_os_str().is_empty() {
                return Err(anyhow::anyhow!(
                    "FILEDROP_STORAGE_PATH must be set when using local storage backend"
                ));
            }
            if self.base_url.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "FILEDROP_BASE_URL must be set when using local storage backend"
                ));
            }
        }

        Ok(())
    }
}

/// Parse a comma separated extension list such as `".png, JPG,gif"`.
pub fn parse_extension_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(normalize_extension)
        .filter(|e| !e.is_empty())
        .collect()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
