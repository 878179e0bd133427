//! Create-or-update of one record per call.
//!
//! Each call runs validate → credentials → lookup → write strictly in
//! sequence, and reports exactly one outcome event whichever way it ends.
//!
//! Without [`KeyLocks`], two concurrent upserts for a new key can both see
//! zero matches and both create: the record API has no conditional write.

use crate::errors::{ReconcileError, Stage};
use crate::key::{ResolvedKey, TITLE_FIELD};
use crate::key_lock::KeyLocks;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS};
use crate::request::{LookupRequest, UpsertRequest, payload_scalar, payload_str};
use crate::sanitize::sanitize_fields;
use crate::table::TableId;
use crate::telemetry::{Level, Reporter};
use record_store::{
    Credentials, Fields, Record, RecordStore, SecretNames, SecretProvider, StoreError,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use shared::{counter, histogram};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }

    fn stage(&self) -> Stage {
        match self {
            Operation::Create => Stage::Create,
            Operation::Update => Stage::Update,
        }
    }
}

/// Result of a successful upsert.
///
/// `fields` is whatever the record API echoed for the write. Creates echo the
/// full record; an update may echo only the patched fields.
#[derive(Clone, Debug, PartialEq)]
pub struct UpsertOutcome {
    pub operation: Operation,
    pub record_id: String,
    pub fields: Fields,
}

pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    secrets: Arc<dyn SecretProvider>,
    secret_names: SecretNames,
    reporter: Reporter,
    key_locks: Option<KeyLocks>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        secrets: Arc<dyn SecretProvider>,
        secret_names: SecretNames,
        reporter: Reporter,
    ) -> Self {
        Reconciler {
            store,
            secrets,
            secret_names,
            reporter,
            key_locks: None,
        }
    }

    pub fn with_key_locks(mut self, key_locks: KeyLocks) -> Self {
        self.key_locks = Some(key_locks);
        self
    }

    pub async fn upsert(&self, payload: &Value) -> Result<UpsertOutcome, ReconcileError> {
        let started = Instant::now();
        let result = self.try_upsert(payload).await;

        let outcome = match result {
            Ok((request, outcome)) => {
                let mut meta = key_meta(request.table, &request.key);
                meta.insert(
                    "service".into(),
                    outcome.operation.stage().service(request.table).into(),
                );
                if let Some(title) = &request.title {
                    meta.insert("title".into(), title.clone().into());
                }
                meta.insert("operation".into(), outcome.operation.as_str().into());
                meta.insert("recordId".into(), outcome.record_id.clone().into());

                let message = match outcome.operation {
                    Operation::Create => "Record created",
                    Operation::Update => "Record updated",
                };
                self.reporter.report(Level::Info, message, meta).await;
                Ok(outcome)
            }
            Err(e) => {
                self.report_error(&e, payload).await;
                Err(e)
            }
        };

        record_metrics(
            "upsert",
            match &outcome {
                Ok(o) => o.operation.as_str(),
                Err(e) => e.kind(),
            },
            started,
        );
        outcome
    }

    /// Read-only retrieval of every record matching the given field and value.
    pub async fn lookup(&self, payload: &Value) -> Result<Vec<Record>, ReconcileError> {
        let started = Instant::now();
        let result = self.try_lookup(payload).await;

        let records = match result {
            Ok((request, records)) => {
                let mut meta = key_meta(request.table, &request.key);
                meta.insert(
                    "service".into(),
                    Stage::Lookup.service(request.table).into(),
                );
                meta.insert("matches".into(), records.len().into());
                self.reporter
                    .report(Level::Info, "Lookup completed", meta)
                    .await;
                Ok(records)
            }
            Err(e) => {
                self.report_error(&e, payload).await;
                Err(e)
            }
        };

        record_metrics(
            "lookup",
            match &records {
                Ok(_) => "found",
                Err(e) => e.kind(),
            },
            started,
        );
        records
    }

    /// Reports a failure that escaped every classified stage and returns it
    /// as an [`ReconcileError::Unhandled`].
    pub async fn report_unhandled(
        &self,
        err: &(dyn StdError + Send + Sync + 'static),
        payload: &Value,
    ) -> ReconcileError {
        let error = ReconcileError::unhandled(err);
        tracing::error!(error = %err, "unhandled failure");
        self.report_error(&error, payload).await;
        error
    }

    /// Emits the error outcome event for `error`. `payload` is the request as
    /// received, valid or not.
    pub async fn report_error(&self, error: &ReconcileError, payload: &Value) {
        let mut meta = Map::new();
        meta.insert("service".into(), error.service().into());
        if let Some(table) = payload_str(payload, "table") {
            meta.insert("table".into(), table.into());
        }
        if let Some(title) = payload_scalar(payload, "title") {
            meta.insert("title".into(), title.into());
        }
        meta.insert("error".into(), error.to_string().into());

        match error {
            ReconcileError::Upstream { status, body, .. } => {
                meta.insert("status".into(), (*status).into());
                meta.insert("body".into(), body.clone().into());
            }
            ReconcileError::Unhandled { message, stack } => {
                meta.insert("error".into(), message.clone().into());
                meta.insert("stack".into(), json!(stack));
                meta.insert("payload".into(), payload.clone());
            }
            _ => {}
        }

        self.reporter
            .report(Level::Error, error.to_string(), meta)
            .await;
    }

    async fn try_upsert(
        &self,
        payload: &Value,
    ) -> Result<(UpsertRequest, UpsertOutcome), ReconcileError> {
        let request = UpsertRequest::from_json(payload)?;
        let creds = self.credentials().await?;
        let table = request.table;

        let _guard = match &self.key_locks {
            Some(locks) => Some(locks.acquire(table, &request.key).await),
            None => None,
        };

        let fields = sanitize_fields(&request.fields);

        let matches = self
            .store
            .search(
                &creds,
                table.name(),
                &request.key.filter_field,
                &request.key.filter_value,
                Some(1),
            )
            .await
            .map_err(|e| upstream_error(Stage::Search, table, e))?;

        let outcome = match matches.first() {
            None => {
                let mut create_fields = Fields::new();
                if let Some(title) = &request.title {
                    create_fields.insert(TITLE_FIELD.into(), title.clone().into());
                }
                create_fields.extend(fields);

                tracing::debug!(
                    table = %table,
                    field = %request.key.filter_field,
                    "no matching record, creating"
                );
                let record = self
                    .store
                    .create(&creds, table.name(), &create_fields)
                    .await
                    .map_err(|e| upstream_error(Stage::Create, table, e))?;

                UpsertOutcome {
                    operation: Operation::Create,
                    record_id: record.id,
                    fields: record.fields,
                }
            }
            Some(existing) => {
                tracing::debug!(
                    table = %table,
                    record_id = %existing.id,
                    "matching record found, updating"
                );
                let record = self
                    .store
                    .update(&creds, table.name(), &existing.id, &fields)
                    .await
                    .map_err(|e| upstream_error(Stage::Update, table, e))?;

                UpsertOutcome {
                    operation: Operation::Update,
                    record_id: existing.id.clone(),
                    fields: record.fields,
                }
            }
        };

        Ok((request, outcome))
    }

    async fn try_lookup(
        &self,
        payload: &Value,
    ) -> Result<(LookupRequest, Vec<Record>), ReconcileError> {
        let request = LookupRequest::from_json(payload)?;
        let creds = self.credentials().await?;

        let records = self
            .store
            .search(
                &creds,
                request.table.name(),
                &request.key.filter_field,
                &request.key.filter_value,
                None,
            )
            .await
            .map_err(|e| upstream_error(Stage::Lookup, request.table, e))?;

        Ok((request, records))
    }

    async fn credentials(&self) -> Result<Credentials, ReconcileError> {
        Credentials::resolve(self.secrets.as_ref(), &self.secret_names)
            .await
            .map_err(|e| ReconcileError::Configuration(e.to_string()))
    }
}

fn key_meta(table: TableId, key: &ResolvedKey) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("table".into(), table.name().into());
    meta.insert("matchField".into(), key.filter_field.clone().into());
    meta.insert("matchValue".into(), key.filter_value.clone().into());
    meta
}

// Non-success statuses keep the upstream's status and body; anything else
// (connection failures, timeouts, undecodable responses) is unclassified.
fn upstream_error(stage: Stage, table: TableId, err: StoreError) -> ReconcileError {
    match err {
        StoreError::Upstream { status, body } => ReconcileError::Upstream {
            service: stage.service(table),
            status,
            body,
        },
        other => ReconcileError::unhandled(&other),
    }
}

fn record_metrics(endpoint: &'static str, outcome: &'static str, started: Instant) {
    counter!(REQUESTS, "endpoint" => endpoint, "outcome" => outcome).increment(1);
    histogram!(REQUEST_DURATION, "endpoint" => endpoint).record(started.elapsed().as_secs_f64());
}
