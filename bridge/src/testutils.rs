use crate::reconciler::Reconciler;
use crate::telemetry::{EventSink, OutcomeEvent, Reporter, TelemetryError};
use async_trait::async_trait;
use record_store::{
    Credentials, Fields, HttpRecordStore, Record, RecordStore, SecretNames, StaticSecretProvider,
    StoreError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keeps every delivered event for inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OutcomeEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Asserts exactly one event was delivered and returns it.
    pub fn single(&self) -> OutcomeEvent {
        let events = self.events();
        assert_eq!(events.len(), 1, "expected one outcome event, got {events:?}");
        events.into_iter().next().unwrap()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, event: &OutcomeEvent) -> Result<(), TelemetryError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Rejects every event.
pub struct FailingSink {}

#[async_trait]
impl EventSink for FailingSink {
    async fn deliver(&self, _event: &OutcomeEvent) -> Result<(), TelemetryError> {
        Err(TelemetryError::Rejected {
            status: 500,
            body: "sink down".into(),
        })
    }
}

/// Panics on any call, standing in for a programming error.
pub struct PanickingStore {}

#[async_trait]
impl RecordStore for PanickingStore {
    async fn search(
        &self,
        _creds: &Credentials,
        _table: &str,
        _field: &str,
        _value: &str,
        _max_records: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        panic!("search exploded");
    }

    async fn create(
        &self,
        _creds: &Credentials,
        _table: &str,
        _fields: &Fields,
    ) -> Result<Record, StoreError> {
        panic!("create exploded");
    }

    async fn update(
        &self,
        _creds: &Credentials,
        _table: &str,
        _record_id: &str,
        _fields: &Fields,
    ) -> Result<Record, StoreError> {
        panic!("update exploded");
    }
}

pub fn secret_names() -> SecretNames {
    SecretNames {
        api_token: "RECORDS_TOKEN".into(),
        base_id: "RECORDS_BASE".into(),
    }
}

pub fn test_secrets() -> Arc<StaticSecretProvider> {
    Arc::new(StaticSecretProvider::new(HashMap::from([
        ("RECORDS_TOKEN".to_string(), "test-token".to_string()),
        ("RECORDS_BASE".to_string(), "appTest".to_string()),
    ])))
}

pub fn reconciler_with_store(store: Arc<dyn RecordStore>, sink: Arc<dyn EventSink>) -> Reconciler {
    Reconciler::new(store, test_secrets(), secret_names(), Reporter::new(sink))
}

/// A reconciler talking to the record API at `store_url`.
pub fn test_reconciler(store_url: &str, sink: Arc<dyn EventSink>) -> Reconciler {
    let store = HttpRecordStore::new(store_url, None).unwrap();
    reconciler_with_store(Arc::new(store), sink)
}
