//! Runtime configuration
//!
//! Defaults, optionally overridden by a TOML file, then by environment
//! variables, then by command-line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::default_cache_dir;
use crate::data::football_api::DEFAULT_API_BASE_URL;
use crate::data::League;
use crate::fetch::FetchPolicy;

/// Environment variable holding the REST API token
pub const API_TOKEN_ENV: &str = "FOOTBALL_API_KEY";

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "MATCHSTATS_CACHE_DIR";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Response bodies and identity mappings
    #[serde(default = "default_cache_dir_path")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Lower bound of the spacing between requests, in seconds
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,

    /// Upper bound of the spacing between requests, in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,

    /// Attempts allowed while the server keeps answering 429
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between teams in batch runs, in seconds
    #[serde(default = "default_team_pause_min")]
    pub team_pause_min_secs: f64,

    #[serde(default = "default_team_pause_max")]
    pub team_pause_max_secs: f64,

    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub api_token: Option<String>,

    /// Back up existing output files before replacing them
    #[serde(default = "default_backup")]
    pub backup_outputs: bool,

    /// Serve fresh responses from the cache
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,

    /// League name to API competition code, consulted before the built-in table
    #[serde(default)]
    pub competitions: BTreeMap<String, String>,
}

fn default_cache_dir_path() -> PathBuf {
    default_cache_dir().unwrap_or_else(|| PathBuf::from("data/cache"))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_delay() -> f64 {
    5.0
}

fn default_max_delay() -> f64 {
    10.0
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_rate_limit_cooldown() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_team_pause_min() -> f64 {
    1.0
}

fn default_team_pause_max() -> f64 {
    3.0
}

fn default_site_base_url() -> String {
    "https://fbref.com/en/".to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_backup() -> bool {
    true
}

fn default_use_cache() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir_path(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            cache_ttl_hours: default_cache_ttl_hours(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            max_attempts: default_max_attempts(),
            team_pause_min_secs: default_team_pause_min(),
            team_pause_max_secs: default_team_pause_max(),
            site_base_url: default_site_base_url(),
            api_base_url: default_api_base_url(),
            api_token: None,
            backup_outputs: default_backup(),
            use_cache: default_use_cache(),
            competitions: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the file if given, else defaults, then applies the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.api_token = Some(token.trim().to_string());
        }
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            min_delay: secs(self.min_delay_secs),
            max_delay: secs(self.max_delay_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_hours.saturating_mul(60 * 60)),
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            max_attempts: self.max_attempts.max(1),
        }
    }

    /// Bounds of the pause between teams
    pub fn team_pause(&self) -> (Duration, Duration) {
        (secs(self.team_pause_min_secs), secs(self.team_pause_max_secs))
    }

    /// Site identity mapping file
    pub fn site_mapping_path(&self) -> PathBuf {
        self.cache_dir.join("team_mapping.json")
    }

    /// API identity mapping file
    pub fn api_mapping_path(&self) -> PathBuf {
        self.cache_dir.join("api_team_mapping.json")
    }

    /// Response cache directory
    pub fn response_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("responses")
    }

    /// Competition code for a league name: config overrides, then the catalogue
    pub fn competition_code(&self, league_name: &str) -> Option<String> {
        let league_name = league_name.trim();
        self.competitions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(league_name))
            .map(|(_, code)| code.clone())
            .or_else(|| {
                crate::data::find_league(league_name)
                    .and_then(|l: &League| l.api_code)
                    .map(String::from)
            })
    }
}

/// Seconds as a Duration; negative or NaN values become zero, oversized ones saturate
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.cache_ttl_hours, 24);
        assert!(config.backup_outputs);
        assert!(config.use_cache);
        assert!(config.api_token.is_none());

        let policy = config.fetch_policy();
        assert_eq!(policy.min_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(policy.rate_limit_cooldown, Duration::from_secs(60));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            min_delay_secs = 1.5
            max_attempts = 3
            cache_dir = "/tmp/matchstats"

            [competitions]
            "Scottish Premiership" = "SPL"
            "#,
        )
        .expect("Should parse");

        assert_eq!(config.fetch_policy().min_delay, Duration::from_millis(1500));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_delay_secs, 10.0);
        assert_eq!(config.site_mapping_path(), PathBuf::from("/tmp/matchstats/team_mapping.json"));
        assert_eq!(config.competition_code("scottish premiership").as_deref(), Some("SPL"));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let result = Config::from_toml("max_attempts = \"many\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (API_TOKEN_ENV, " abc123 "),
            (CACHE_DIR_ENV, "/var/cache/matchstats"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();

        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_token.as_deref(), Some("abc123"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/matchstats"));
    }

    #[test]
    fn test_blank_env_token_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|key| (key == API_TOKEN_ENV).then(|| "  ".to_string()));
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_competition_code_falls_back_to_catalogue() {
        let config = Config::default();
        assert_eq!(config.competition_code("Premier League").as_deref(), Some("PL"));
        assert_eq!(config.competition_code("MLS"), None);
        assert_eq!(config.competition_code("Unknown"), None);
    }

    #[test]
    fn test_oversized_durations_saturate() {
        let config = Config::from_toml(
            r#"
            cache_ttl_hours = 9223372036854775807
            max_delay_secs = 1e300
            team_pause_max_secs = inf
            "#,
        )
        .expect("Should parse");

        let policy = config.fetch_policy();
        assert_eq!(policy.cache_ttl, Duration::from_secs(u64::MAX));
        assert_eq!(policy.max_delay, Duration::MAX);
        assert_eq!(config.team_pause().1, Duration::MAX);
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let config = Config {
            team_pause_min_secs: -1.0,
            ..Config::default()
        };
        assert_eq!(config.team_pause().0, Duration::ZERO);
    }
}
