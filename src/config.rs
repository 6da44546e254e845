use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ErrorPolicy;
use crate::ledger::DEFAULT_LEDGER_FILE;

/// Main configuration structure for starmirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory that receives the `{language}/{owner}@{repo}` tree and the ledger
    #[serde(default = "default_root_directory")]
    pub root_directory: String,

    /// GitHub authentication and listing settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Mirroring behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token"

    /// User whose stars are mirrored (authenticated user if null)
    pub username: Option<String>,

    /// REST API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Repositories requested per page
    #[serde(default = "default_per_page")]
    pub per_page: u8,

    /// Stop after this many pages (all pages if null)
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Timeout for each API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause between listing pages while requests remain, in milliseconds
    #[serde(default = "default_page_cooldown")]
    pub page_cooldown_ms: u64,
}

/// Mirroring configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// History depth for fresh clones (full clone if null)
    #[serde(default = "default_clone_depth")]
    pub clone_depth: Option<u32>,

    /// What happens when a git invocation fails
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Also mirror companion wikis
    #[serde(default = "default_true")]
    pub mirror_wikis: bool,

    /// Print the transfer progress block while cloning
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Ledger file name inside the root directory
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_root_directory() -> String {
    ".".to_string()
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_per_page() -> u8 {
    100
}
fn default_request_timeout() -> u64 {
    10
}
fn default_page_cooldown() -> u64 {
    2500
}
fn default_clone_depth() -> Option<u32> {
    Some(1)
}
fn default_true() -> bool {
    true
}
fn default_ledger_file() -> String {
    DEFAULT_LEDGER_FILE.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            auth_method: default_auth_method(),
            username: None,
            api_base_url: default_api_base_url(),
            per_page: default_per_page(),
            max_pages: None,
            request_timeout_secs: default_request_timeout(),
            page_cooldown_ms: default_page_cooldown(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            clone_depth: default_clone_depth(),
            error_policy: ErrorPolicy::default(),
            mirror_wikis: default_true(),
            show_progress: default_true(),
            ledger_file: default_ledger_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GitHubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_cooldown(&self) -> Duration {
        Duration::from_millis(self.page_cooldown_ms)
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("starmirror").join("config.yml"))
    }

    /// Expanded, normalised root directory.
    ///
    /// Relative roots are resolved against the current directory once, here,
    /// so nothing downstream depends on the process working directory.
    pub fn root_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.root_directory)
            .context("Failed to expand root_directory path")?;
        let path = PathBuf::from(expanded.as_ref());

        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .context("Failed to determine current directory")?
                .join(path)
        };

        Ok(path_clean::clean(absolute))
    }

    /// Ledger file location
    pub fn ledger_path(&self) -> Result<PathBuf> {
        Ok(self.root_path()?.join(&self.sync.ledger_file))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_directory: default_root_directory(),
            github: GitHubConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.root_directory, ".");
        assert_eq!(config.github.auth_method, "auto");
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.github.per_page, 100);
        assert_eq!(config.github.max_pages, None);
        assert_eq!(config.github.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.github.page_cooldown(), Duration::from_millis(2500));
        assert_eq!(config.sync.clone_depth, Some(1));
        assert_eq!(config.sync.error_policy, ErrorPolicy::Continue);
        assert!(config.sync.mirror_wikis);
        assert!(config.sync.show_progress);
        assert_eq!(config.sync.ledger_file, "cloned_repos.json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_root_path_expansion() {
        env::set_var("TEST_STARMIRROR_HOME", "/test/home");

        let mut config = Config::default();
        config.root_directory = "${TEST_STARMIRROR_HOME}/stars/../starred".to_string();

        assert_eq!(config.root_path().unwrap(), PathBuf::from("/test/home/starred"));
        assert_eq!(
            config.ledger_path().unwrap(),
            PathBuf::from("/test/home/starred/cloned_repos.json")
        );

        env::remove_var("TEST_STARMIRROR_HOME");
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let config = Config::default();
        let root = config.root_path().unwrap();
        assert!(root.is_absolute());
        assert_eq!(root, path_clean::clean(env::current_dir().unwrap()));
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.root_directory = "/custom/path".to_string();
        config.github.username = Some("testuser".to_string());
        config.sync.clone_depth = None;
        config.sync.error_policy = ErrorPolicy::Exit;

        config.save(&config_path).expect("Failed to save config");
        let loaded = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded.root_directory, "/custom/path");
        assert_eq!(loaded.github.username, Some("testuser".to_string()));
        assert_eq!(loaded.sync.clone_depth, None);
        assert_eq!(loaded.sync.error_policy, ErrorPolicy::Exit);
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("starmirror"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
root_directory: "${HOME}/starred"
github:
  auth_method: "token"
  username: "testuser"
  max_pages: 3
  page_cooldown_ms: 0
sync:
  clone_depth: 5
  error_policy: "break"
  mirror_wikis: false
logging:
  level: "debug"
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.root_directory, "${HOME}/starred");
        assert_eq!(config.github.auth_method, "token");
        assert_eq!(config.github.username, Some("testuser".to_string()));
        assert_eq!(config.github.max_pages, Some(3));
        assert_eq!(config.github.page_cooldown(), Duration::ZERO);
        assert_eq!(config.github.per_page, 100);
        assert_eq!(config.sync.clone_depth, Some(5));
        assert_eq!(config.sync.error_policy, ErrorPolicy::Break);
        assert!(!config.sync.mirror_wikis);
        assert!(config.sync.show_progress);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").expect("Failed to parse YAML");
        assert_eq!(config.root_directory, ".");
        assert_eq!(config.sync.clone_depth, Some(1));
    }
}
