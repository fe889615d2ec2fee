//! Configuration management.
//!
//! Settings come from a TOML file layered under `PATENT_HARVEST__*`
//! environment variables (e.g. `PATENT_HARVEST__BACKOFF__STEPS=5`).
//! OPS credentials are never part of the file; see
//! [`Credentials::from_env`](crate::ops::Credentials::from_env).
//!
//! # Configuration File Format
//!
//! ```toml
//! [ops]
//! auth_url = "https://ops.epo.org/3.2/auth/accesstoken"
//! base_url = "https://ops.epo.org/3.2/rest-services"
//! request_timeout_secs = 20
//! page_size = 100
//!
//! [backoff]
//! start_secs = 10.0
//! end_secs = 120.0
//! steps = 10
//! renew_delay_secs = 2.0
//!
//! [retrieval]
//! max_attempts = 50
//!
//! [paths]
//! nace_codes_csv = "data/nace_codes.csv"
//! queries_dir = "data/"
//! store = "data/search_results.json"
//! biblio_store = "data/biblio_responses.json"
//!
//! [reference.industries]
//! C = ["Manufacturing"]
//!
//! [reference.cpc_schemes]
//! climate = ["Y02A", "Y02E"]
//!
//! [reference.countries]
//! DE = "Germany"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ops::{Backoff, OpsError, RetryLimits, DEFAULT_AUTH_URL, DEFAULT_BASE_URL, MAX_PAGE_SIZE};

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "patent-harvest.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ops: OpsConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub reference: ReferenceConfig,
}

/// OPS endpoints and request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,

    /// Results per search call (at most 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            auth_timeout_secs: default_auth_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_auth_timeout() -> u64 {
    10
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

/// Robot-detection backoff schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_start")]
    pub start_secs: f64,

    #[serde(default = "default_backoff_end")]
    pub end_secs: f64,

    #[serde(default = "default_backoff_steps")]
    pub steps: usize,

    /// Pause after renewing an expired token
    #[serde(default = "default_renew_delay")]
    pub renew_delay_secs: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            start_secs: default_backoff_start(),
            end_secs: default_backoff_end(),
            steps: default_backoff_steps(),
            renew_delay_secs: default_renew_delay(),
        }
    }
}

impl BackoffConfig {
    pub fn build(&self) -> Backoff {
        Backoff::new(self.start_secs, self.end_secs, self.steps)
    }

    pub fn renew_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.renew_delay_secs).unwrap_or_default()
    }
}

fn default_backoff_start() -> f64 {
    10.0
}

fn default_backoff_end() -> f64 {
    120.0
}

fn default_backoff_steps() -> usize {
    10
}

fn default_renew_delay() -> f64 {
    2.0
}

/// Escape hatches for the otherwise unbounded retrieval loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,

    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

impl RetrievalConfig {
    pub fn limits(&self) -> RetryLimits {
        RetryLimits {
            max_attempts: self.max_attempts,
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_nace_csv")]
    pub nace_codes_csv: PathBuf,

    #[serde(default = "default_queries_dir")]
    pub queries_dir: PathBuf,

    #[serde(default = "default_store")]
    pub store: PathBuf,

    #[serde(default = "default_biblio_store")]
    pub biblio_store: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            nace_codes_csv: default_nace_csv(),
            queries_dir: default_queries_dir(),
            store: default_store(),
            biblio_store: default_biblio_store(),
        }
    }
}

fn default_nace_csv() -> PathBuf {
    PathBuf::from("data/nace_codes.csv")
}

fn default_queries_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_store() -> PathBuf {
    PathBuf::from("data/search_results.json")
}

fn default_biblio_store() -> PathBuf {
    PathBuf::from("data/biblio_responses.json")
}

/// Reference tables that drive query construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// NACE section code -> industry descriptions (mandatory title keywords)
    #[serde(default)]
    pub industries: BTreeMap<String, Vec<String>>,

    /// Scheme name -> CPC codes required by every query
    #[serde(default)]
    pub cpc_schemes: BTreeMap<String, Vec<String>>,

    /// Applicant country code -> country name
    #[serde(default)]
    pub countries: BTreeMap<String, String>,
}

impl ReferenceConfig {
    /// Industry descriptions keyed by upper-case section code
    pub fn industries(&self) -> BTreeMap<String, Vec<String>> {
        self.industries
            .iter()
            .map(|(code, descriptions)| (code.to_uppercase(), descriptions.clone()))
            .collect()
    }

    /// All CPC codes, flattened in scheme order
    pub fn cpc_codes(&self) -> Vec<String> {
        self.cpc_schemes.values().flatten().cloned().collect()
    }

    /// Upper-case country codes
    pub fn country_codes(&self) -> Vec<String> {
        self.countries.keys().map(|code| code.to_uppercase()).collect()
    }
}

impl Config {
    /// Reject settings the OPS API would refuse
    pub fn validate(&self) -> Result<(), OpsError> {
        if self.ops.page_size == 0 || self.ops.page_size > MAX_PAGE_SIZE {
            return Err(OpsError::Config(format!(
                "ops.page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.ops.page_size
            )));
        }
        if self.backoff.steps == 0 {
            return Err(OpsError::Config("backoff.steps must be at least 1".to_string()));
        }
        if self.backoff.end_secs < self.backoff.start_secs {
            return Err(OpsError::Config(
                "backoff.end_secs must not be smaller than backoff.start_secs".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), OpsError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| OpsError::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A starter configuration with a small reference table
    pub fn example() -> Self {
        let mut config = Self::default();
        config.reference.industries.insert(
            "C".to_string(),
            vec!["Manufacturing".to_string()],
        );
        config.reference.industries.insert(
            "D".to_string(),
            vec!["Electricity, gas, steam and air conditioning supply".to_string()],
        );
        config.reference.cpc_schemes.insert(
            "climate_change_mitigation".to_string(),
            vec!["Y02A".to_string(), "Y02E".to_string(), "Y02P".to_string()],
        );
        config
            .reference
            .countries
            .insert("DE".to_string(), "Germany".to_string());
        config
            .reference
            .countries
            .insert("FR".to_string(), "France".to_string());
        config
    }
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix("PATENT_HARVEST")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

/// Find a configuration file in the usual places
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("patent-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Get the default configuration
pub fn get_config() -> Config {
    Config::default()
}
