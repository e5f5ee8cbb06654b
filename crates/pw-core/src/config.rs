use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable overriding `weather.api_key`.
pub const ENV_API_KEY: &str = "WEATHER_API_KEY";
/// Environment variable overriding `database.path`.
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";

const APP_DIR: &str = "personal-weather";

/// Backoff before the first HTTP retry; doubles per retry up to the max.
pub const RETRY_INITIAL_DELAY_MS: u64 = 100;
pub const RETRY_MAX_DELAY_MS: u64 = 1000;

/// Longest accepted `refresh.claim_seconds` (one day).
pub const MAX_CLAIM_SECONDS: u64 = 86_400;
/// Most accepted `weather.max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// One problem found by [`Config::validate`], keyed by its TOML path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.field)
    }
}

/// Errors block startup; warnings are only logged.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(ConfigIssue { field, message: message.into() });
    }

    fn warning(&mut self, field: &'static str, message: impl Into<String>) {
        self.warnings.push(ConfigIssue { field, message: message.into() });
    }

    /// All errors on one line, for `ConfigError::Invalid`.
    pub fn error_summary(&self) -> String {
        let parts: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        parts.join("; ")
    }
}

/// Measurement system requested from the weather provider.
///
/// Stored temperatures are in whatever system was configured when they were
/// fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Fahrenheit
    #[default]
    Imperial,
    /// Celsius
    Metric,
    /// Kelvin
    Standard,
}

impl Units {
    /// Query-string value understood by OpenWeather.
    pub fn as_query(&self) -> &'static str {
        match self {
            Units::Imperial => "imperial",
            Units::Metric => "metric",
            Units::Standard => "standard",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the tracked locations
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("weather.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OpenWeather API key (prefer the WEATHER_API_KEY environment variable)
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the OpenWeather API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub units: Units,

    /// HTTP timeout for a single request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for transient HTTP failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    2
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            units: Units::default(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl WeatherConfig {
    /// Worst case for one temperature request: every attempt hits the
    /// request timeout, plus the backoff sleeps between attempts.
    pub fn retry_budget(&self) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let requests = Duration::from_secs(self.request_timeout_secs.saturating_mul(attempts));

        let mut backoff_ms: u64 = 0;
        let mut delay = RETRY_INITIAL_DELAY_MS;
        for retry in 0..self.max_retries {
            if delay >= RETRY_MAX_DELAY_MS {
                let remaining = u64::from(self.max_retries - retry);
                backoff_ms = backoff_ms.saturating_add(RETRY_MAX_DELAY_MS.saturating_mul(remaining));
                break;
            }
            backoff_ms = backoff_ms.saturating_add(delay);
            delay = delay.saturating_mul(2);
        }

        requests.saturating_add(Duration::from_millis(backoff_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// How long a sweep may hold a record before another sweep can take it
    #[serde(default = "default_claim_seconds")]
    pub claim_seconds: u64,

    /// Upper bound on one provider call during a sweep. Unset means the
    /// whole HTTP retry budget, see [`WeatherConfig::retry_budget`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_timeout_secs: Option<u64>,
}

fn default_claim_seconds() -> u64 {
    60
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            claim_seconds: default_claim_seconds(),
            provider_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from `path`, writing defaults there if the file is missing.
    ///
    /// Environment overrides are applied after the file is read.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::Malformed(e.to_string()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            config
        };

        config.apply_overrides(
            std::env::var(ENV_API_KEY).ok(),
            std::env::var(ENV_DATABASE_PATH).ok(),
        );
        Ok(config)
    }

    /// Load configuration and validate it.
    ///
    /// Fails on validation errors; warnings are logged and returned.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Timeout for one provider call in a refresh sweep.
    pub fn provider_timeout(&self) -> Duration {
        match self.refresh.provider_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.weather.retry_budget(),
        }
    }

    /// Apply environment-style overrides. Empty values are ignored.
    pub fn apply_overrides(&mut self, api_key: Option<String>, database_path: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.weather.api_key = key;
        }
        if let Some(path) = database_path.filter(|p| !p.trim().is_empty()) {
            self.database.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(problem) = http_url_problem(&self.weather.base_url) {
            result.error("weather.base_url", problem);
        }

        if self.weather.api_key.trim().is_empty() {
            result.warning(
                "weather.api_key",
                format!("No API key configured; set {} or weather.api_key", ENV_API_KEY),
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        if self.weather.max_retries > MAX_RETRIES {
            result.error(
                "weather.max_retries",
                format!("At most {} retries are allowed", MAX_RETRIES),
            );
        }

        let budget = self.weather.retry_budget();
        match self.refresh.provider_timeout_secs {
            Some(0) => result.error(
                "refresh.provider_timeout_secs",
                "Provider timeout must be greater than 0",
            ),
            Some(secs) if Duration::from_secs(secs) < budget => result.warning(
                "refresh.provider_timeout_secs",
                format!(
                    "Shorter than the HTTP retry budget ({:.1}s); timed-out requests will not be retried",
                    budget.as_secs_f64()
                ),
            ),
            Some(secs) if secs > 60 => result.warning(
                "refresh.provider_timeout_secs",
                "Provider timeout above 60 seconds makes `list` hang on a dead provider",
            ),
            _ => {}
        }

        if self.refresh.claim_seconds == 0 {
            result.error("refresh.claim_seconds", "Claim duration must be greater than 0");
        } else if self.refresh.claim_seconds > MAX_CLAIM_SECONDS {
            result.error(
                "refresh.claim_seconds",
                format!("Claim duration must be at most {} seconds", MAX_CLAIM_SECONDS),
            );
        } else if Duration::from_secs(self.refresh.claim_seconds) < self.provider_timeout() {
            result.warning(
                "refresh.claim_seconds",
                "Shorter than the provider timeout; a slow refresh may be repeated by another sweep",
            );
        }

        if self.database.path.as_os_str().is_empty() {
            result.error("database.path", "Database path cannot be empty");
        }

        result
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Path of the configuration file in the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Missing("platform config directory".into()))?
            .join(APP_DIR);

        Ok(config_dir.join("config.toml"))
    }
}

/// Why `raw` is not a usable http(s) base URL, if it isn't.
fn http_url_problem(raw: &str) -> Option<String> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => return Some(format!("not a URL: {}", e)),
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Some(format!("expected http or https, got {}", url.scheme()));
    }
    if url.host().is_none() {
        return Some("missing host".into());
    }
    None
}
