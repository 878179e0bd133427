use crate::errors::ReconcileError;
use crate::reconciler::{Operation, Reconciler};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use record_store::{Fields, Record};
use serde::Serialize;
use serde_json::{Map, Value};
use shared::http::{ResponseBody, make_error_response, make_json_response};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse<'a> {
    success: bool,
    record_id: &'a str,
    fields: &'a Fields,
    operation: Operation,
}

#[derive(Serialize)]
struct LookupResponse<'a> {
    success: bool,
    records: &'a [Record],
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    success: bool,
    error: String,
    service: &'a str,
}

fn error_response(error: &ReconcileError) -> Response<ResponseBody> {
    make_json_response(
        error.status(),
        &ErrorResponse {
            success: false,
            error: error.to_string(),
            service: error.service(),
        },
    )
}

/// Inbound surface: `POST /upsert` and `GET /lookup`.
#[derive(Clone)]
pub struct BridgeService {
    reconciler: Arc<Reconciler>,
    max_body_bytes: usize,
}

impl BridgeService {
    pub fn new(reconciler: Arc<Reconciler>, max_body_bytes: usize) -> Self {
        BridgeService {
            reconciler,
            max_body_bytes,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match (method, path.as_str()) {
            (Method::POST, "/upsert") => self.upsert(req.into_body()).await,
            (Method::GET, "/lookup") => self.lookup(lookup_payload(req.uri().query())).await,
            (_, "/upsert" | "/lookup") => make_error_response(StatusCode::METHOD_NOT_ALLOWED),
            _ => make_error_response(StatusCode::NOT_FOUND),
        }
    }

    async fn upsert<B>(&self, body: B) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let payload = match self.read_payload(body).await {
            Ok(payload) => payload,
            Err(e) => return error_response(&e),
        };

        let reconciler = self.reconciler.clone();
        let task_payload = payload.clone();
        let result = self
            .isolated(&payload, async move { reconciler.upsert(&task_payload).await })
            .await;

        match result {
            Ok(outcome) => make_json_response(
                StatusCode::OK,
                &UpsertResponse {
                    success: true,
                    record_id: &outcome.record_id,
                    fields: &outcome.fields,
                    operation: outcome.operation,
                },
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn lookup(&self, payload: Value) -> Response<ResponseBody> {
        let reconciler = self.reconciler.clone();
        let task_payload = payload.clone();
        let result = self
            .isolated(&payload, async move { reconciler.lookup(&task_payload).await })
            .await;

        match result {
            Ok(records) => make_json_response(
                StatusCode::OK,
                &LookupResponse {
                    success: true,
                    records: &records,
                },
            ),
            Err(e) => error_response(&e),
        }
    }

    /// Reads and parses the body. Failures are reported here since the
    /// reconciler never sees the request.
    async fn read_payload<B>(&self, body: B) -> Result<Value, ReconcileError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let bytes = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                let error = ReconcileError::Validation(format!(
                    "request body exceeds {} bytes",
                    self.max_body_bytes
                ));
                self.reconciler.report_error(&error, &Value::Null).await;
                return Err(error);
            }
            Err(e) => {
                return Err(self
                    .reconciler
                    .report_unhandled(e.as_ref(), &Value::Null)
                    .await);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                let raw = Value::String(String::from_utf8_lossy(&bytes).into_owned());
                Err(self.reconciler.report_unhandled(&e, &raw).await)
            }
        }
    }

    /// Runs `task` on its own tokio task so a panic inside it still produces
    /// a reported, well-formed response.
    async fn isolated<T, F>(&self, payload: &Value, task: F) -> Result<T, ReconcileError>
    where
        F: Future<Output = Result<T, ReconcileError>> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(task).await {
            Ok(result) => result,
            Err(join_error) => Err(self.reconciler.report_unhandled(&join_error, payload).await),
        }
    }
}

fn lookup_payload(query: Option<&str>) -> Value {
    let params: Map<String, Value> = url::form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(params)
}

impl Service<Request<Incoming>> for BridgeService {
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}
