//! Application configuration.
//!
//! Read once at startup: built-in defaults, then an optional TOML file
//! (`exoscope.toml` or the path in `EXOSCOPE_CONFIG`), then `EXOSCOPE_*`
//! environment overrides (a `.env` file is honoured). The resulting
//! [`AppConfig`] is passed explicitly to everything that needs it.

use std::collections::HashMap;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "exoscope.toml";

/// Minimum secret key length, in bytes, accepted for cookie signing.
pub const MIN_SECRET_KEY_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key: key.to_string(), message: message.into() }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub predictor: PredictorConfig,
    pub security: SecurityConfig,
    pub import: ImportConfig,
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Verbose logging and relaxed secret requirements.
    pub debug: bool,
    /// Upper bound for handling any single request.
    pub request_timeout_secs: u64,
    /// Directory served under `/static`.
    pub static_dir: String,
    /// Lifetime of an analysis session after its last activity.
    pub session_ttl_secs: u64,
}

fn default_bind() -> String { "127.0.0.1:3001".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_static_dir() -> String { "static".to_string() }
fn default_session_ttl() -> u64 { 24 * 60 * 60 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            debug: false,
            request_timeout_secs: default_request_timeout(),
            static_dir: default_static_dir(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

// ── Database ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// libSQL database file, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "./data/exoscope.db".to_string() }
    }
}

// ── Predictor ─────────────────────────────────────────────────────────────────

/// Wire contract spoken by the external predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractVersion {
    /// App field names in, `{label, confidence}` out.
    #[default]
    V1,
    /// Kepler `koi_*` field names in, binary `{label: 0|1, probability}` out.
    Koi,
}

impl ContractVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractVersion::V1  => "v1",
            ContractVersion::Koi => "koi",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1"  => Some(ContractVersion::V1),
            "koi" => Some(ContractVersion::Koi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Full URL the parameter set is POSTed to.
    pub endpoint: String,
    pub contract: ContractVersion,
    pub timeout_secs: u64,
}

fn default_endpoint() -> String { "http://127.0.0.1:8000/predict".to_string() }
fn default_predictor_timeout() -> u64 { 10 }

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            contract: ContractVersion::default(),
            timeout_secs: default_predictor_timeout(),
        }
    }
}

// ── Security ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key material for signing the session cookie.
    pub secret_key: Option<SecretString>,
    /// When set, `/admin` and `/upload` require `Authorization: Bearer <token>`,
    /// `?token=` or the cookie issued by `/admin/login`.
    pub admin_token: Option<SecretString>,
}

impl SecurityConfig {
    /// Constant-time-ish comparison of a presented admin token.
    pub fn admin_token_matches(&self, presented: Option<&str>) -> bool {
        match (&self.admin_token, presented) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(expected), Some(given)) => {
                let a = expected.expose_secret().as_bytes();
                let b = given.as_bytes();
                a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
            }
        }
    }
}

// ── Import ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub max_upload_bytes: usize,
    /// Extra header aliases per candidate field, e.g.
    /// `orbital_period = ["period_days"]`.
    pub aliases: HashMap<String, Vec<String>>,
}

fn default_max_upload() -> usize { 10 * 1024 * 1024 }

impl Default for ImportConfig {
    fn default() -> Self {
        Self { max_upload_bytes: default_max_upload(), aliases: HashMap::new() }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load defaults → config file → environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        // Missing .env is fine.
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var("EXOSCOPE_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `EXOSCOPE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EXOSCOPE_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("EXOSCOPE_DEBUG") {
            self.server.debug = parse_bool("EXOSCOPE_DEBUG", &v)?;
        }
        if let Some(v) = lookup("EXOSCOPE_DATABASE") {
            self.database.path = v;
        }
        if let Some(v) = lookup("EXOSCOPE_PREDICTOR_URL") {
            self.predictor.endpoint = v;
        }
        if let Some(v) = lookup("EXOSCOPE_PREDICTOR_CONTRACT") {
            self.predictor.contract = ContractVersion::parse(&v)
                .ok_or_else(|| invalid("EXOSCOPE_PREDICTOR_CONTRACT", "expected `v1` or `koi`"))?;
        }
        if let Some(v) = lookup("EXOSCOPE_PREDICTOR_TIMEOUT_SECS") {
            self.predictor.timeout_secs = v
                .trim()
                .parse()
                .map_err(|_| invalid("EXOSCOPE_PREDICTOR_TIMEOUT_SECS", "expected whole seconds"))?;
        }
        if let Some(v) = lookup("EXOSCOPE_SECRET_KEY") {
            self.security.secret_key = Some(SecretString::from(v));
        }
        if let Some(v) = lookup("EXOSCOPE_ADMIN_TOKEN") {
            self.security.admin_token = Some(SecretString::from(v));
        }
        Ok(())
    }

    /// Checks that apply to every entry point.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.predictor.endpoint)
            .map_err(|e| invalid("predictor.endpoint", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("predictor.endpoint", "must be an http or https URL"));
        }
        if self.predictor.timeout_secs == 0 {
            return Err(invalid("predictor.timeout_secs", "must be at least 1"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(invalid("server.request_timeout_secs", "must be at least 1"));
        }
        // Otherwise the request timeout cuts a slow prediction short before
        // the predictor error can be reported.
        if self.predictor.timeout_secs >= self.server.request_timeout_secs {
            return Err(invalid(
                "predictor.timeout_secs",
                format!(
                    "must be less than server.request_timeout_secs ({})",
                    self.server.request_timeout_secs
                ),
            ));
        }
        if self.import.max_upload_bytes == 0 {
            return Err(invalid("import.max_upload_bytes", "must be positive"));
        }
        Ok(())
    }

    /// Checks that only the web server needs: outside debug mode a strong
    /// secret key must be configured.
    pub fn validate_for_server(&self) -> Result<(), ConfigError> {
        if self.server.debug {
            return Ok(());
        }
        match &self.security.secret_key {
            Some(key) if key.expose_secret().len() >= MIN_SECRET_KEY_LEN => Ok(()),
            Some(_) => Err(invalid(
                "security.secret_key",
                format!("must be at least {MIN_SECRET_KEY_LEN} bytes"),
            )),
            None => Err(invalid("security.secret_key", "required unless server.debug is enabled")),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, "expected a boolean")),
    }
}
