//! Configuration loading and cache folder resolution
//!
//! Settings are layered in the following priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file is never fatal: the resolver logs a
//! warning and continues with the compiled defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SEGPLAY_CONFIG";

/// Environment variable overriding the cache folder
pub const CACHE_DIR_ENV_VAR: &str = "SEGPLAY_CACHE_DIR";

/// Contents of `config.toml`
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub cache_dir: Option<PathBuf>,
    pub clip_cache_capacity: Option<usize>,
    pub decode_timeout_secs: Option<u64>,
    pub player_startup_timeout_ms: Option<u64>,
    pub process_grace_ms: Option<u64>,
    pub terminate_wait_ms: Option<u64>,
    pub load_settle_ms: Option<u64>,
    pub min_duration_secs: Option<f64>,
    /// "hidden" or "small-visible"
    pub window_mode: Option<String>,
    pub log_level: Option<String>,
    pub tools: ToolPathsConfig,
}

/// `[tools]` table: explicit binary locations
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolPathsConfig {
    pub transcoder: Option<PathBuf>,
    pub prober: Option<PathBuf>,
    pub seek_player: Option<PathBuf>,
    pub persistent_player: Option<PathBuf>,
    pub native_player: Option<PathBuf>,
}

impl TomlConfig {
    /// Parse a config file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub cache_dir: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            log_level: "info".to_string(),
        }
    }
}

/// Resolves the config file and cache folder for one program
pub struct ConfigResolver {
    program_name: String,
}

impl ConfigResolver {
    pub fn new(program_name: &str) -> Self {
        Self {
            program_name: program_name.to_string(),
        }
    }

    /// Load the TOML config, degrading to defaults on any problem
    ///
    /// `cli_path` wins over `SEGPLAY_CONFIG`, which wins over the
    /// platform config locations.
    pub fn load(&self, cli_path: Option<&Path>) -> TomlConfig {
        self.try_load(cli_path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable config file");
            TomlConfig::default()
        })
    }

    /// Like [`load`](Self::load) but reports a bad config file to the caller
    ///
    /// Finding no config file at all is not an error.
    pub fn try_load(&self, cli_path: Option<&Path>) -> Result<TomlConfig> {
        let Some(path) = self.locate_config_file(cli_path) else {
            debug!(program = %self.program_name, "No config file found, using defaults");
            return Ok(TomlConfig::default());
        };

        let config = TomlConfig::from_file(&path).map_err(|e| {
            Error::Config(format!("{}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Resolve the cache folder following the priority order
    pub fn resolve_cache_dir(&self, cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CACHE_DIR_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &toml.cache_dir {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().cache_dir
    }

    /// Log level from the config file, else the compiled default
    pub fn resolve_log_level(&self, toml: Option<&TomlConfig>) -> String {
        toml.and_then(|c| c.log_level.as_deref())
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().log_level)
    }

    fn locate_config_file(&self, cli_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_path {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        default_config_file(&self.program_name).ok()
    }
}

/// Create the cache folder (and parents) if missing
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(Error::Config(format!(
            "Cache path exists but is not a directory: {}",
            path.display()
        )));
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Get default configuration file path for the platform
fn default_config_file(program_name: &str) -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(program_name).join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(program_name).join("config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default cache folder
fn default_cache_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.cache/segplay
        dirs::cache_dir()
            .map(|d| d.join("segplay"))
            .unwrap_or_else(|| PathBuf::from("/tmp/segplay"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Caches/segplay
        dirs::cache_dir()
            .map(|d| d.join("segplay"))
            .unwrap_or_else(|| PathBuf::from("/tmp/segplay"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\segplay\cache
        dirs::data_local_dir()
            .map(|d| d.join("segplay").join("cache"))
            .unwrap_or_else(|| std::env::temp_dir().join("segplay"))
    } else {
        PathBuf::from("./segplay_cache")
    }
}
