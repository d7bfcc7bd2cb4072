//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\crate-catalogue\config.toml
//! - macOS: ~/Library/Application Support/crate-catalogue/config.toml
//! - Linux: ~/.config/crate-catalogue/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded
//! at startup; `scan`/`playlist`/`compat` commands fall back to these
//! values when the matching CLI flag is omitted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalogue store connection settings.
    pub catalogue: CatalogueConfig,

    /// Default scan behavior.
    pub scan: ScanDefaultsConfig,

    /// Default playlist sequencing behavior.
    pub playlist: PlaylistDefaultsConfig,
}

/// Catalogue store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogueConfig {
    /// Path to the SQLite catalogue file.
    pub db_path: PathBuf,

    /// Size of the long-lived connection pool.
    pub pool_size: u32,

    /// Memory-mapped region size in MiB.
    pub mmap_mib: u32,

    /// Page cache size in pages.
    pub page_cache_pages: u32,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("catalogue.db"),
            pool_size: 5,
            mmap_mib: 256,
            page_cache_pages: 10_000,
        }
    }
}

/// Default values applied to `scan` when a flag is not given on the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanDefaultsConfig {
    /// `full` | `incremental` | `smart`.
    pub mode: String,

    /// Cache-miss batch size passed to `batch_upsert_analyses`.
    pub batch_size: usize,

    /// Case-insensitive extensions the Discovery Generator will emit.
    pub supported_extensions: Vec<String>,

    /// Emit a progress snapshot every N processed files.
    pub progress_interval: u64,

    /// Soft warning threshold for resident memory.
    pub memory_limit_mb: u64,

    /// Count a per-file extractor failure and continue the scan. When
    /// `false`, the first extractor failure closes the session with a
    /// terminal error status instead.
    pub skip_corrupted: bool,

    /// Re-validate path accessibility (exists, readable) immediately
    /// before extraction, catching files removed or locked mid-scan.
    pub validate_permissions: bool,

    /// Bounded parallelism for cache-miss extraction.
    pub workers: usize,
}

impl Default for ScanDefaultsConfig {
    fn default() -> Self {
        Self {
            mode: "smart".to_string(),
            batch_size: 200,
            supported_extensions: vec![
                "mp3".into(),
                "flac".into(),
                "wav".into(),
                "m4a".into(),
                "aac".into(),
                "ogg".into(),
            ],
            progress_interval: 50,
            memory_limit_mb: 500,
            skip_corrupted: true,
            validate_permissions: true,
            workers: 10,
        }
    }
}

/// Default values applied to `playlist generate` when a flag is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistDefaultsConfig {
    pub length: usize,
    pub curve: String,
    pub bpm_tolerance: f64,
    pub prefer_relative: bool,
}

impl Default for PlaylistDefaultsConfig {
    fn default() -> Self {
        Self {
            length: 10,
            curve: "ascending".to_string(),
            bpm_tolerance: 0.15,
            prefer_relative: false,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("crate-catalogue"))
}

/// Get the full path to the config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - callers always get a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk, creating the config directory if needed.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename).
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[catalogue]"));
        assert!(toml.contains("[scan]"));
        assert!(toml.contains("[playlist]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.catalogue.db_path = PathBuf::from("/music/catalogue.db");
        config.scan.batch_size = 500;
        config.playlist.length = 20;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.catalogue.db_path, PathBuf::from("/music/catalogue.db"));
        assert_eq!(parsed.scan.batch_size, 500);
        assert_eq!(parsed.playlist.length, 20);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[scan]
batch_size = 50
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.scan.batch_size, 50);
        assert_eq!(config.catalogue.pool_size, 5);
        assert_eq!(config.playlist.curve, "ascending");
    }
}
