use record_store::SecretNames;
use record_store::client::DEFAULT_BASE_URL;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Empty secret name for {0}")]
    EmptySecretName(&'static str),

    #[error("max_body_bytes cannot be 0")]
    InvalidBodyLimit,

    #[error("{0} cannot be 0")]
    ZeroTimeout(&'static str),
}

/// Bridge configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for upsert and lookup requests
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Upper bound on inbound request bodies
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub record_store: RecordStoreConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Remote log sink. When absent, outcome events only go to the local log.
    pub telemetry: Option<TelemetryConfig>,
    /// Serializes same-key upserts within this process
    #[serde(default)]
    pub key_lock: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }

        if self.credentials.api_token.is_empty() {
            return Err(ValidationError::EmptySecretName("api_token"));
        }
        if self.credentials.base_id.is_empty() {
            return Err(ValidationError::EmptySecretName("base_id"));
        }

        if self.record_store.timeout_secs == Some(0) {
            return Err(ValidationError::ZeroTimeout("record_store.timeout_secs"));
        }
        if let Some(telemetry) = &self.telemetry
            && telemetry.timeout_secs == Some(0)
        {
            return Err(ValidationError::ZeroTimeout("telemetry.timeout_secs"));
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RecordStoreConfig {
    /// Base URL of the record API, without the base id
    #[serde(default = "default_record_store_url")]
    pub url: String,
    /// Whole-request timeout. Unset means the HTTP client's default.
    pub timeout_secs: Option<u64>,
}

impl RecordStoreConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        RecordStoreConfig {
            url: default_record_store_url(),
            timeout_secs: None,
        }
    }
}

/// Where the record API credentials come from, and under which names.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub source: SecretSource,
    #[serde(default = "default_api_token_name")]
    pub api_token: String,
    #[serde(default = "default_base_id_name")]
    pub base_id: String,
}

impl CredentialsConfig {
    pub fn secret_names(&self) -> SecretNames {
        SecretNames {
            api_token: self.api_token.clone(),
            base_id: self.base_id.clone(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig {
            source: SecretSource::default(),
            api_token: default_api_token_name(),
            base_id: default_base_id_name(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SecretSource {
    #[default]
    Env,
    Static {
        values: HashMap<String, String>,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    pub url: Url,
    pub timeout_secs: Option<u64>,
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_record_store_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_token_name() -> String {
    "AIRTABLE_API_KEY".to_string()
}

fn default_base_id_name() -> String {
    "AIRTABLE_BASE_ID".to_string()
}
