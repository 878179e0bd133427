//! Stateless upsert bridge in front of the record API.
//!
//! Every call is independent: validate, resolve credentials, look the record
//! up, then create or update it, reporting one outcome event either way.

pub mod config;
pub mod errors;
pub mod key;
pub mod key_lock;
pub mod metrics_defs;
pub mod reconciler;
pub mod request;
pub mod sanitize;
pub mod service;
pub mod table;
pub mod telemetry;

#[cfg(test)]
mod testutils;

use config::{Config, SecretSource, ValidationError};
use key_lock::KeyLocks;
use reconciler::Reconciler;
use record_store::{
    EnvSecretProvider, HttpRecordStore, SecretProvider, StaticSecretProvider, StoreError,
};
use service::BridgeService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use telemetry::{EventSink, HttpEventSink, LogEventSink, Reporter, TelemetryError};

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] ValidationError),
    #[error("record store client: {0}")]
    Store(#[from] StoreError),
    #[error("telemetry client: {0}")]
    Telemetry(#[from] TelemetryError),
}

pub fn build_reconciler(config: &Config) -> Result<Reconciler, BridgeError> {
    let store = HttpRecordStore::new(&config.record_store.url, config.record_store.timeout())?;

    let secrets: Arc<dyn SecretProvider> = match &config.credentials.source {
        SecretSource::Env => Arc::new(EnvSecretProvider {}),
        SecretSource::Static { values } => Arc::new(StaticSecretProvider::new(values.clone())),
    };

    let sink: Arc<dyn EventSink> = match &config.telemetry {
        Some(telemetry) => Arc::new(HttpEventSink::new(
            telemetry.url.clone(),
            telemetry.timeout(),
        )?),
        None => {
            tracing::info!("no telemetry url configured, outcome events go to the local log");
            Arc::new(LogEventSink {})
        }
    };

    let reconciler = Reconciler::new(
        Arc::new(store),
        secrets,
        config.credentials.secret_names(),
        Reporter::new(sink),
    );

    Ok(match config.key_lock {
        true => reconciler.with_key_locks(KeyLocks::new()),
        false => reconciler,
    })
}

pub async fn run(config: Config) -> Result<(), BridgeError> {
    config.validate()?;

    let reconciler = Arc::new(build_reconciler(&config)?);
    let bridge_service = BridgeService::new(reconciler, config.max_body_bytes);

    let bridge_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        bridge_service,
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(|| true),
    );

    tokio::try_join!(bridge_task, admin_task)?;
    Ok(())
}
