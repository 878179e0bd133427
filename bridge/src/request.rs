//! Shape validation of inbound payloads.
//!
//! Shape is checked before the allowlist, so a malformed payload naming an
//! unknown table is reported as malformed rather than forbidden.

use crate::errors::ReconcileError;
use crate::key::{ResolvedKey, resolve_key};
use crate::table::TableId;
use record_store::Fields;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct UpsertRequest {
    pub table: TableId,
    pub title: Option<String>,
    pub key: ResolvedKey,
    pub fields: Fields,
}

impl UpsertRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ReconcileError> {
        let body = as_object(payload)?;
        let table = required_table(body)?;

        let fields = match body.get("fields") {
            Some(Value::Object(fields)) => fields.clone(),
            _ => return invalid("fields must be an object"),
        };

        let title = scalar_str(body, "title");
        let key = match resolve_key(
            title.as_deref(),
            scalar_str(body, "matchField").as_deref(),
            scalar_str(body, "matchValue").as_deref(),
        ) {
            Some(key) => key,
            None => return invalid("either title or matchField and matchValue is required"),
        };
        check_field_name(&key.filter_field)?;

        Ok(UpsertRequest {
            table: allowed_table(&table)?,
            title,
            key,
            fields,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LookupRequest {
    pub table: TableId,
    pub key: ResolvedKey,
}

impl LookupRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ReconcileError> {
        let body = as_object(payload)?;
        let table = required_table(body)?;

        let (Some(filter_field), Some(filter_value)) =
            (scalar_str(body, "matchField"), scalar_str(body, "matchValue"))
        else {
            return invalid("matchField and matchValue are required");
        };
        check_field_name(&filter_field)?;

        Ok(LookupRequest {
            table: allowed_table(&table)?,
            key: ResolvedKey {
                filter_field,
                filter_value,
            },
        })
    }
}

/// Best-effort string read from a payload that may not have passed validation.
pub fn payload_str<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}

/// Like [`payload_str`], but reads identifiers the way validation does, so a
/// numeric title is reported as its text.
pub fn payload_scalar(payload: &Value, name: &str) -> Option<String> {
    payload.as_object().and_then(|body| scalar_str(body, name))
}

fn invalid<T>(message: &str) -> Result<T, ReconcileError> {
    Err(ReconcileError::Validation(message.to_string()))
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, ReconcileError> {
    match payload {
        Value::Object(body) => Ok(body),
        _ => invalid("request body must be a JSON object"),
    }
}

fn required_table(body: &Map<String, Value>) -> Result<String, ReconcileError> {
    match body.get("table") {
        Some(Value::String(table)) if !table.is_empty() => Ok(table.clone()),
        _ => invalid("table is required"),
    }
}

// Field names are interpolated into `{...}` in the lookup formula, which has
// no escape for braces.
fn check_field_name(name: &str) -> Result<(), ReconcileError> {
    if name.contains(['{', '}']) {
        return invalid("matchField must not contain braces");
    }
    Ok(())
}

fn allowed_table(name: &str) -> Result<TableId, ReconcileError> {
    TableId::from_name(name).ok_or_else(|| ReconcileError::Forbidden(name.to_string()))
}

// Identifiers may arrive as numbers (e.g. numeric transcript ids); they are
// matched by their JSON text. Empty strings count as absent.
fn scalar_str(body: &Map<String, Value>, name: &str) -> Option<String> {
    match body.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
