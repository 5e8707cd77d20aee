//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Environment variable that overrides any configured bearer token
pub const TOKEN_ENV_VAR: &str = "GATE_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout; keeps a hung request from starving a poller
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Page size for bulk listings (backfill search, pending exits)
    #[serde(default = "default_rows_per_page")]
    pub rows_per_page: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            rows_per_page: default_rows_per_page(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_rows_per_page() -> u32 {
    1000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    /// Inline bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the bearer token (trimmed)
    #[serde(default)]
    pub token_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    /// Delay between portal open and red buzzer activation
    #[serde(default = "default_buzzer_delay_ms")]
    pub buzzer_delay_ms: u64,
    /// Request a still when a card shows a transaction without pictures
    #[serde(default = "default_true")]
    pub auto_capture: bool,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            auto_refresh: true,
            buzzer_delay_ms: default_buzzer_delay_ms(),
            auto_capture: true,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_buzzer_delay_ms() -> u64 {
    5000
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { utc_offset_hours: default_utc_offset_hours() }
    }
}

fn default_utc_offset_hours() -> i32 {
    7 // Asia/Jakarta
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    api_base_url: String,
    api_timeout_ms: u64,
    rows_per_page: u32,
    token: Option<String>,
    token_file: Option<String>,
    default_interval_secs: u64,
    auto_refresh: bool,
    buzzer_delay_ms: u64,
    auto_capture: bool,
    metrics_interval_secs: u64,
    utc_offset_hours: i32,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            api_base_url: toml_config.api.base_url.trim_end_matches('/').to_string(),
            api_timeout_ms: toml_config.api.timeout_ms,
            rows_per_page: toml_config.api.rows_per_page.max(1),
            token: toml_config.session.token,
            token_file: toml_config.session.token_file,
            // A zero interval would spin the poller
            default_interval_secs: toml_config.dashboard.default_interval_secs.max(1),
            auto_refresh: toml_config.dashboard.auto_refresh,
            buzzer_delay_ms: toml_config.dashboard.buzzer_delay_ms,
            auto_capture: toml_config.dashboard.auto_capture,
            metrics_interval_secs: toml_config.dashboard.metrics_interval_secs.max(1),
            utc_offset_hours: toml_config.display.utc_offset_hours,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Bearer token: env var, then inline value, then token file
    pub fn resolve_token(&self) -> anyhow::Result<Option<String>> {
        if let Ok(token) = env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                return Ok(Some(token.trim().to_string()));
            }
        }
        if let Some(token) = self.token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(Some(token.trim().to_string()));
        }
        if let Some(path) = &self.token_file {
            let token = fs::read_to_string(path)
                .with_context(|| format!("Failed to read token file {path}"))?;
            let token = token.trim();
            return Ok((!token.is_empty()).then(|| token.to_string()));
        }
        Ok(None)
    }

    // Getters for all config fields
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn api_timeout_ms(&self) -> u64 {
        self.api_timeout_ms
    }

    pub fn rows_per_page(&self) -> u32 {
        self.rows_per_page
    }

    pub fn token_file(&self) -> Option<&str> {
        self.token_file.as_deref()
    }

    pub fn default_interval_secs(&self) -> u64 {
        self.default_interval_secs
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn buzzer_delay_ms(&self) -> u64 {
        self.buzzer_delay_ms
    }

    pub fn auto_capture(&self) -> bool {
        self.auto_capture
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point at a local backend
    pub fn with_api_base_url(mut self, url: &str) -> Self {
        self.api_base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Builder method for tests to set an inline token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}
