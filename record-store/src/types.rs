use serde::{Deserialize, Serialize};
use std::fmt;

/// Field values keyed by column name, in insertion order.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A record as stored upstream. The id is assigned by the upstream store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(
        rename = "createdTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

#[derive(Clone)]
pub struct Credentials {
    pub api_token: String,
    pub base_id: String,
}

impl Credentials {
    pub fn new<T, B>(api_token: T, base_id: B) -> Self
    where
        T: Into<String>,
        B: Into<String>,
    {
        Credentials {
            api_token: api_token.into(),
            base_id: base_id.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &"<redacted>")
            .field("base_id", &self.base_id)
            .finish()
    }
}
