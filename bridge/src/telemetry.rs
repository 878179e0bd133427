//! Outcome events sent to the remote log sink.
//!
//! Delivery is best-effort: a failed delivery is logged locally and dropped,
//! and never changes the result of the call that produced the event.

use crate::metrics_defs::TELEMETRY_DELIVERY_FAILED;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Identifies this system as the origin of every event.
pub const EVENT_SOURCE: &str = "gr8r-record-bridge";
pub const DEFAULT_SERVICE: &str = "gr8r-unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutcomeEvent {
    pub level: Level,
    pub message: String,
    pub meta: Map<String, Value>,
}

impl OutcomeEvent {
    pub fn service(&self) -> &str {
        self.meta
            .get("service")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SERVICE)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sink rejected event with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: &OutcomeEvent) -> Result<(), TelemetryError>;
}

/// Posts each event as JSON to the log sink.
pub struct HttpEventSink {
    client: reqwest::Client,
    url: Url,
}

impl HttpEventSink {
    pub fn new(url: Url, timeout: Option<Duration>) -> Result<Self, TelemetryError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpEventSink {
            client: builder.build()?,
            url,
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn deliver(&self, event: &OutcomeEvent) -> Result<(), TelemetryError> {
        let response = self.client.post(self.url.clone()).json(event).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Writes events to the local log. Used when no sink URL is configured.
pub struct LogEventSink {}

#[async_trait]
impl EventSink for LogEventSink {
    async fn deliver(&self, event: &OutcomeEvent) -> Result<(), TelemetryError> {
        let meta = Value::Object(event.meta.clone());
        match event.level {
            Level::Info => tracing::info!(service = event.service(), %meta, "{}", event.message),
            Level::Error => tracing::error!(service = event.service(), %meta, "{}", event.message),
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn EventSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Reporter { sink }
    }

    /// Merges `metadata` over the default `source` and `service` and delivers
    /// one event. Never fails.
    pub async fn report(
        &self,
        level: Level,
        message: impl Into<String>,
        metadata: Map<String, Value>,
    ) {
        let mut meta = Map::new();
        meta.insert("source".into(), EVENT_SOURCE.into());
        meta.insert("service".into(), DEFAULT_SERVICE.into());
        meta.extend(metadata);

        let event = OutcomeEvent {
            level,
            message: message.into(),
            meta,
        };

        if let Err(e) = self.sink.deliver(&event).await {
            counter!(TELEMETRY_DELIVERY_FAILED).increment(1);
            tracing::warn!(
                error = %e,
                service = event.service(),
                "failed to deliver outcome event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{FailingSink, RecordingSink};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_defaults_are_merged_under_metadata() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());

        reporter
            .report(Level::Info, "no service given", Map::new())
            .await;
        reporter
            .report(
                Level::Error,
                "with service",
                meta(json!({"service": "validation", "table": "Subscribers"})),
            )
            .await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].meta["source"], EVENT_SOURCE);
        assert_eq!(events[0].service(), DEFAULT_SERVICE);
        assert_eq!(events[1].level, Level::Error);
        assert_eq!(events[1].service(), "validation");
        assert_eq!(events[1].meta["table"], "Subscribers");
        assert_eq!(events[1].meta["source"], EVENT_SOURCE);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let reporter = Reporter::new(Arc::new(FailingSink {}));
        // Completes without panicking or returning an error
        reporter.report(Level::Info, "dropped", Map::new()).await;
    }

    #[tokio::test]
    async fn test_http_sink_posts_event() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/log"))
            .and(body_json(json!({
                "level": "info",
                "message": "Record created",
                "meta": {"source": EVENT_SOURCE, "service": "Subscribers-create"}
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/log", mock_server.uri())).unwrap();
        let sink = HttpEventSink::new(url, Some(Duration::from_secs(5))).unwrap();
        let event = OutcomeEvent {
            level: Level::Info,
            message: "Record created".into(),
            meta: meta(json!({"source": EVENT_SOURCE, "service": "Subscribers-create"})),
        };

        sink.deliver(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_sink_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&mock_server.uri()).unwrap();
        let sink = HttpEventSink::new(url, None).unwrap();
        let event = OutcomeEvent {
            level: Level::Error,
            message: "x".into(),
            meta: Map::new(),
        };

        let err = sink.deliver(&event).await.unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Rejected { status: 503, ref body } if body == "overloaded"
        ));
    }
}
