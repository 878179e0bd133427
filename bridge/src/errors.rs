use crate::table::TableId;
use http::StatusCode;
use std::error::Error as StdError;

pub const VALIDATION_SERVICE: &str = "validation";
pub const SECRETS_SERVICE: &str = "secrets";
pub const UNHANDLED_SERVICE: &str = "unhandled";

/// Upstream calls a reconciliation can fail in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Search,
    Create,
    Update,
    Lookup,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Search => "search",
            Stage::Create => "create",
            Stage::Update => "update",
            Stage::Lookup => "lookup",
        }
    }

    /// The outcome event service label, e.g. `Video posts-create`.
    pub fn service(&self, table: TableId) -> String {
        format!("{}-{}", table.name(), self.as_str())
    }
}

/// Terminal failures of a single upsert or lookup call.
#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("table not allowed: {0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{service} failed with status {status}: {body}")]
    Upstream {
        service: String,
        status: u16,
        body: String,
    },

    #[error("unhandled error: {message}")]
    Unhandled { message: String, stack: Vec<String> },
}

impl ReconcileError {
    /// Captures the error and its source chain.
    pub fn unhandled(err: &(dyn StdError + 'static)) -> Self {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }

        ReconcileError::Unhandled {
            message: err.to_string(),
            stack,
        }
    }

    /// Low-cardinality classification, used as a metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Validation(_) => "validation",
            ReconcileError::Forbidden(_) => "forbidden",
            ReconcileError::Configuration(_) => "configuration",
            ReconcileError::Upstream { .. } => "upstream",
            ReconcileError::Unhandled { .. } => "unhandled",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ReconcileError::Validation(_) => StatusCode::BAD_REQUEST,
            ReconcileError::Forbidden(_) => StatusCode::FORBIDDEN,
            ReconcileError::Configuration(_)
            | ReconcileError::Upstream { .. }
            | ReconcileError::Unhandled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label of the stage that failed, reported as the outcome event's `service`.
    pub fn service(&self) -> &str {
        match self {
            ReconcileError::Validation(_) | ReconcileError::Forbidden(_) => VALIDATION_SERVICE,
            ReconcileError::Configuration(_) => SECRETS_SERVICE,
            ReconcileError::Upstream { service, .. } => service,
            ReconcileError::Unhandled { .. } => UNHANDLED_SERVICE,
        }
    }
}
