//! Client for the upstream record API and the secrets it authenticates with.

pub mod client;
pub mod secrets;
pub mod types;

pub use client::{HttpRecordStore, RecordStore, StoreError};
pub use secrets::{
    CredentialError, EnvSecretProvider, SecretError, SecretNames, SecretProvider,
    StaticSecretProvider,
};
pub use types::{Credentials, Fields, Record};
