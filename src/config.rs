//! Configuration management for clinicscan
//!
//! All configuration is loaded from `./config/clinicscan.toml`.
//! No defaults live in source code; the shipped template is the only place.

use crate::browser::SessionSettings;
use crate::orchestrator::ScanSettings;
use crate::visitor::VisitSettings;
use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/clinicscan.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/clinicscan.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is {value}, expected {expected}")]
    OutOfRange {
        field: String,
        value: u64,
        expected: String,
    },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub scan: ScanConfig,
    pub sheet: SheetConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub homepage_timeout_secs: u64,
    pub subpage_timeout_secs: u64,
    pub homepage_settle_ms: u64,
    pub subpage_settle_ms: u64,
    pub block_resources: bool,
    pub max_instances: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    pub concurrency: usize,
    pub site_budget_secs: u64,
    pub max_pages: usize,
    pub robots_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetConfig {
    pub path: String,
    pub url_column: usize,
    pub resume_column: String,
}

/// Signature catalog source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// Empty means the built-in catalog
    #[serde(default)]
    pub path: String,
}

impl CatalogConfig {
    pub fn override_path(&self) -> Option<&Path> {
        let trimmed = self.path.trim();
        (!trimmed.is_empty()).then(|| Path::new(trimmed))
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.sheet.path.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "sheet.path".to_string(),
            });
        }
        if self.sheet.resume_column.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "sheet.resume_column".to_string(),
            });
        }

        let positive = [
            ("http.request_timeout_secs", self.http.request_timeout_secs),
            ("browser.homepage_timeout_secs", self.browser.homepage_timeout_secs),
            ("browser.subpage_timeout_secs", self.browser.subpage_timeout_secs),
            ("browser.max_instances", self.browser.max_instances as u64),
            ("scan.concurrency", self.scan.concurrency as u64),
            ("scan.site_budget_secs", self.scan.site_budget_secs),
            ("scan.max_pages", self.scan.max_pages as u64),
            ("scan.robots_timeout_secs", self.scan.robots_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    field: field.to_string(),
                    value,
                    expected: "a value greater than 0".to_string(),
                });
            }
        }

        if self.scan.site_budget_secs < self.browser.homepage_timeout_secs {
            return Err(ConfigError::OutOfRange {
                field: "scan.site_budget_secs".to_string(),
                value: self.scan.site_budget_secs,
                expected: format!(
                    "at least browser.homepage_timeout_secs ({})",
                    self.browser.homepage_timeout_secs
                ),
            });
        }

        Ok(())
    }

    pub fn visit_settings(&self) -> VisitSettings {
        VisitSettings {
            homepage_timeout: Duration::from_secs(self.browser.homepage_timeout_secs),
            subpage_timeout: Duration::from_secs(self.browser.subpage_timeout_secs),
            homepage_settle: Duration::from_millis(self.browser.homepage_settle_ms),
            subpage_settle: Duration::from_millis(self.browser.subpage_settle_ms),
            max_pages: self.scan.max_pages,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            user_agent: self.http.user_agent.clone(),
            block_resources: self.browser.block_resources,
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            visit: self.visit_settings(),
            session: self.session_settings(),
            site_budget: Duration::from_secs(self.scan.site_budget_secs),
            robots_timeout: Duration::from_secs(self.scan.robots_timeout_secs),
        }
    }

    /// Shared HTTP client for header and robots.txt fetches
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(&self.http.user_agent)
            .timeout(Duration::from_secs(self.http.request_timeout_secs))
            .build()?)
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> AppConfig {
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let config: Result<AppConfig, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok(), "Default config should parse: {:?}", config.err());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(default_config().validate().is_ok(), "Default config should validate");
    }

    #[test]
    fn test_default_values() {
        let config = default_config();
        let settings = config.scan_settings();
        assert_eq!(settings.visit.homepage_timeout, Duration::from_secs(30));
        assert_eq!(settings.visit.subpage_timeout, Duration::from_secs(10));
        assert_eq!(settings.visit.homepage_settle, Duration::from_millis(2000));
        assert_eq!(settings.visit.max_pages, 5);
        assert_eq!(settings.site_budget, Duration::from_secs(180));
        assert_eq!(config.scan.concurrency, 3);
        assert_eq!(config.browser.max_instances, 4);
        assert_eq!(config.sheet.resume_column, "scraping_date");
        assert!(config.catalog.override_path().is_none());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = default_config();
        config.scan.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field, .. }) if field == "scan.concurrency"
        ));
    }

    #[test]
    fn test_budget_shorter_than_homepage_timeout_rejected() {
        let mut config = default_config();
        config.scan.site_budget_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let mut config = default_config();
        config.http.user_agent = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyRequired { .. })));
    }

    #[test]
    fn test_catalog_section_optional() {
        let trimmed: String = DEFAULT_CONFIG
            .split("[catalog]")
            .next()
            .unwrap()
            .to_string();
        let config: AppConfig = toml::from_str(&trimmed).expect("Config should parse without catalog section");
        assert!(config.catalog.override_path().is_none());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load_from_path(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
