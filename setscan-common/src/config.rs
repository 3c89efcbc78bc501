//! Configuration loading, resolution and validation
//!
//! Configuration file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `SETSCAN_CONFIG` environment variable
//! 3. `setscan.toml` in the working directory
//! 4. `<user config dir>/setscan/config.toml`
//! 5. Compiled defaults (fallback)
//!
//! Every section is optional; missing keys take their defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SETSCAN_CONFIG";

/// Config file name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "setscan.toml";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub input: InputConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub output: OutputConfig,
    pub oracle: OracleConfig,
    pub logging: LoggingConfig,
}

/// Where the source recording comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Local audio file (also the download target)
    pub audio_path: PathBuf,
    /// Use the local file when it already exists
    pub prefer_local: bool,
    /// Explicit source identifier; derived from the environment when unset
    pub source_id: Option<String>,
    pub youtube: YoutubeConfig,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            audio_path: PathBuf::from("input/source.mp3"),
            prefer_local: true,
            source_id: None,
            youtube: YoutubeConfig::default(),
        }
    }
}

/// yt-dlp download settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub enabled: bool,
    pub audio_format: String,
    pub audio_quality: u8,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            audio_format: "mp3".to_string(),
            audio_quality: 0,
        }
    }
}

/// Window planning and clip format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub chunk_seconds: u32,
    pub overlap_seconds: u32,
    /// Mono sample rate of clips sent to the oracle (Hz)
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 30,
            overlap_seconds: 10,
            sample_rate: 16_000,
        }
    }
}

/// Chunk scheduling limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum oracle calls in flight at once
    pub max_parallel_chunks: usize,
    /// Windows submitted per group
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_chunks: 4,
            batch_size: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub sqlite_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("cache/chunk_cache.sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent folder of per-run output folders
    pub base_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("runs"),
        }
    }
}

/// Recognition oracle endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Minimum spacing between consecutive requests (0 disables)
    pub min_interval_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8765/recognize".to_string(),
            timeout_secs: 30,
            min_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read TOML failed ({}): {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject structurally invalid configuration before any work starts
    ///
    /// `overlap_seconds >= chunk_seconds` is legal: the planner clamps the step to one second.
    pub fn validate(&self) -> Result<()> {
        if self.audio.chunk_seconds == 0 {
            return Err(Error::Config("audio.chunk_seconds must be positive".to_string()));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.pipeline.max_parallel_chunks == 0 {
            return Err(Error::Config(
                "pipeline.max_parallel_chunks must be at least 1".to_string(),
            ));
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config("pipeline.batch_size must be at least 1".to_string()));
        }
        if self.cache.sqlite_path.as_os_str().is_empty() {
            return Err(Error::Config("cache.sqlite_path must not be empty".to_string()));
        }
        if self.oracle.endpoint.trim().is_empty() {
            return Err(Error::Config("oracle.endpoint must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Resolve which configuration file to load, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    // Priority 4: User config directory
    dirs::config_dir()
        .map(|d| d.join("setscan").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load the resolved configuration, or defaults when no file is found
///
/// An explicitly named file that cannot be read is an error; implicit
/// locations are only used when they exist.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    load_resolved_config(cli_arg).map(|(config, _)| config)
}

/// Like [`load_config`], also returning the file the values came from
///
/// Does not log; the caller reports the source once tracing is installed.
pub fn load_resolved_config(cli_arg: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            let config = TomlConfig::load(&path)?;
            Ok((config, Some(path)))
        }
        None => Ok((TomlConfig::default(), None)),
    }
}

/// Write configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.chunk_seconds, 30);
        assert_eq!(config.audio.overlap_seconds, 10);
        assert_eq!(config.pipeline.batch_size, 40);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [audio]
            chunk_seconds = 20

            [pipeline]
            max_parallel_chunks = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.chunk_seconds, 20);
        assert_eq!(config.audio.overlap_seconds, 10);
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.pipeline.max_parallel_chunks, 8);
        assert_eq!(config.pipeline.batch_size, 40);
        assert_eq!(config.output.base_dir, PathBuf::from("runs"));
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let mut config = TomlConfig::default();
        config.audio.chunk_seconds = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = TomlConfig::default();
        config.pipeline.max_parallel_chunks = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_overlap_larger_than_chunk_allowed() {
        let mut config = TomlConfig::default();
        config.audio.overlap_seconds = 45;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("[audio\nchunk_seconds = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
