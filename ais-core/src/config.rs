//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/ais/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/ais/` (~/.config/ais/)
//! - Data: `$XDG_DATA_HOME/ais/` (~/.local/share/ais/)
//! - State/Logs: `$XDG_STATE_HOME/ais/` (~/.local/state/ais/)

use crate::error::{Error, Result};
use crate::types::Source;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if path.to_string_lossy().starts_with("~/") => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Transcript root directories
    #[serde(default)]
    pub roots: RootsConfig,

    /// Database location and connection behaviour
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Override paths for transcript roots
#[derive(Debug, Deserialize, Default)]
pub struct RootsConfig {
    /// Claude Code projects directory (default `~/.claude/projects`)
    pub claude: Option<PathBuf>,
    /// Codex sessions directory (default `~/.codex/sessions`)
    pub codex: Option<PathBuf>,
}

/// Database configuration
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Override for the database file
    pub path: Option<PathBuf>,

    /// How long to wait on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Search configuration
#[derive(Debug, Deserialize)]
pub struct SearchConfig {
    /// Results returned when the caller asks for 0
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    100
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Resolved root directories for one indexing run.
///
/// A `None` root is simply not scanned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRoots {
    pub claude: Option<PathBuf>,
    pub codex: Option<PathBuf>,
}

impl SourceRoots {
    pub fn new(claude: impl Into<PathBuf>, codex: impl Into<PathBuf>) -> Self {
        Self {
            claude: Some(claude.into()),
            codex: Some(codex.into()),
        }
    }

    /// Root directory configured for a source.
    pub fn root_for(&self, source: Source) -> Option<&Path> {
        match source {
            Source::Claude => self.claude.as_deref(),
            Source::Codex => self.codex.as_deref(),
        }
    }

    /// Configured (source, root) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Source, &Path)> + '_ {
        Source::ALL
            .into_iter()
            .filter_map(move |source| self.root_for(source).map(|root| (source, root)))
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Roots to scan, with defaults applied and `~/` expanded.
    pub fn source_roots(&self) -> SourceRoots {
        let home = home_dir();
        let claude = self
            .roots
            .claude
            .clone()
            .unwrap_or_else(|| home.join(".claude").join("projects"));
        let codex = self
            .roots
            .codex
            .clone()
            .unwrap_or_else(|| home.join(".codex").join("sessions"));

        SourceRoots {
            claude: Some(expand_home(&claude, &home)),
            codex: Some(expand_home(&codex, &home)),
        }
    }

    /// Database file, honouring the `[database] path` override.
    pub fn database_path(&self) -> PathBuf {
        match &self.database.path {
            Some(path) => expand_home(path, &home_dir()),
            None => Self::default_database_path(),
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/ais/config.toml` (~/.config/ais/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("ais").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/ais/` (~/.local/share/ais/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("ais")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/ais/` (~/.local/state/ais/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("ais")
    }

    /// `$XDG_DATA_HOME/ais/ais.db` (~/.local/share/ais/ais.db)
    pub fn default_database_path() -> PathBuf {
        Self::data_dir().join("ais.db")
    }

    /// Directory holding the daily-rotated `ais.YYYY-MM-DD.log` files
    ///
    /// `$XDG_STATE_HOME/ais/` (~/.local/state/ais/)
    pub fn log_dir() -> PathBuf {
        Self::state_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.roots.claude.is_none());
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.search.default_limit, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[roots]
claude = "/data/claude"
codex = "~/work/codex"

[database]
path = "/tmp/ais-test.db"
busy_timeout_ms = 250

[search]
default_limit = 20

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.roots.claude, Some(PathBuf::from("/data/claude")));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/ais-test.db"));
        assert_eq!(config.database.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.search.default_limit, 20);
        assert_eq!(config.logging.level, "debug");

        let roots = config.source_roots();
        assert_eq!(roots.claude, Some(PathBuf::from("/data/claude")));
        assert!(!roots.codex.unwrap().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/someone");
        assert_eq!(
            expand_home(Path::new("~/logs"), home),
            PathBuf::from("/home/someone/logs")
        );
        assert_eq!(
            expand_home(Path::new("/abs/logs"), home),
            PathBuf::from("/abs/logs")
        );
        assert_eq!(expand_home(Path::new("~user"), home), PathBuf::from("~user"));
    }

    #[test]
    fn test_source_roots_iter_skips_missing() {
        let roots = SourceRoots {
            claude: None,
            codex: Some(PathBuf::from("/codex")),
        };
        let pairs: Vec<_> = roots.iter().collect();
        assert_eq!(pairs, vec![(Source::Codex, Path::new("/codex"))]);
    }
}
