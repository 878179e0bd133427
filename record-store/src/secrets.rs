//! Secrets are resolved on every call; nothing is cached between requests.

use crate::types::Credentials;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum SecretError {
    #[error("secret {0} is set but is not valid unicode")]
    NotUnicode(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("missing credential: {0}")]
    Missing(String),
    #[error(transparent)]
    Provider(#[from] SecretError),
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Returns `None` when the secret is not set.
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError>;
}

/// Reads secrets from the process environment. Empty values count as unset.
pub struct EnvSecretProvider {}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError> {
        match std::env::var(name) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => {
                Err(SecretError::NotUnicode(name.to_string()))
            }
        }
    }
}

/// Fixed secrets, for local development and tests.
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new(values: HashMap<String, String>) -> Self {
        StaticSecretProvider { values }
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(name).filter(|v| !v.is_empty()).cloned())
    }
}

/// Names under which the record API credentials are stored.
#[derive(Clone, Debug, PartialEq)]
pub struct SecretNames {
    pub api_token: String,
    pub base_id: String,
}

impl Credentials {
    pub async fn resolve(
        provider: &dyn SecretProvider,
        names: &SecretNames,
    ) -> Result<Credentials, CredentialError> {
        let api_token = required(provider, &names.api_token).await?;
        let base_id = required(provider, &names.base_id).await?;
        Ok(Credentials { api_token, base_id })
    }
}

async fn required(provider: &dyn SecretProvider, name: &str) -> Result<String, CredentialError> {
    provider
        .get(name)
        .await?
        .ok_or_else(|| CredentialError::Missing(name.to_string()))
}
