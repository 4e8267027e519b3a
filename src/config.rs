use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = ".pr-review-timeline.toml";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-review-timeline.toml.
/// All sections are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    #[serde(default)]
    pub prefs: PrefsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// Override for the REST API root (GitHub Enterprise, mock servers)
    pub api_base: Option<String>,
}

/// Time windows and page size used by the dashboard views.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// PR list window in days (8 weeks)
    pub list_days: u32,
    /// Build metrics window in days
    pub metrics_days: u32,
    /// Trends window in calendar months
    pub trend_months: u32,
    /// PR list page size
    pub per_page: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            list_days: 56,
            metrics_days: 14,
            trend_months: 6,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrefsConfig {
    /// Location of the preference file (token, per-repo flags)
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from .pr-review-timeline.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: explicit value wins, then the config file,
    /// then GITHUB_TOKEN, then whatever the preference store remembered.
    pub fn github_token(&self, explicit: Option<&str>, remembered: Option<String>) -> Option<String> {
        let usable = |t: &String| !t.trim().is_empty();
        explicit
            .map(str::to_string)
            .filter(usable)
            .or_else(|| self.github.token.clone().filter(usable))
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(usable))
            .or_else(|| remembered.filter(usable))
    }

    pub fn api_base(&self) -> &str {
        self.github.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    pub fn prefs_path(&self) -> PathBuf {
        self.prefs
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".pr-review-timeline-state.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
        assert_eq!(config.dashboard.list_days, 56);
        assert_eq!(config.dashboard.metrics_days, 14);
        assert_eq!(config.dashboard.trend_months, 6);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
api_base = "https://ghe.example.com/api/v3"

[dashboard]
list_days = 28
per_page = 50

[prefs]
path = "/tmp/state.json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_base(), "https://ghe.example.com/api/v3");
        assert_eq!(config.dashboard.list_days, 28);
        assert_eq!(config.dashboard.per_page, 50);
        // Unset keys keep their defaults
        assert_eq!(config.dashboard.metrics_days, 14);
        assert_eq!(config.prefs_path(), PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_explicit_token_wins() {
        let mut config = Config::default();
        config.github.token = Some("from-file".to_string());
        let token = config.github_token(Some("from-flag"), Some("remembered".to_string()));
        assert_eq!(token.as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_config_token_before_remembered() {
        let mut config = Config::default();
        config.github.token = Some("from-file".to_string());
        let token = config.github_token(None, Some("remembered".to_string()));
        assert_eq!(token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let mut config = Config::default();
        config.github.token = Some("from-file".to_string());
        let token = config.github_token(Some("  "), None);
        assert_eq!(token.as_deref(), Some("from-file"));
    }
}
