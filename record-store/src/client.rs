use crate::types::{Credentials, Fields, Record};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// The upstream record API, scoped by table.
///
/// The API offers no conditional writes: a search followed by a create is
/// not atomic, and callers must not assume the upstream deduplicates.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the records whose `field` equals `value` exactly, in upstream
    /// order. With `max_records`, stops once that many have been read.
    async fn search(
        &self,
        creds: &Credentials,
        table: &str,
        field: &str,
        value: &str,
        max_records: Option<usize>,
    ) -> Result<Vec<Record>, StoreError>;

    async fn create(
        &self,
        creds: &Credentials,
        table: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError>;

    /// Patch semantics: fields not named in `fields` are left untouched.
    async fn update(
        &self,
        creds: &Credentials,
        table: &str,
        record_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError>;
}

#[derive(Deserialize)]
struct RecordPage {
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Serialize)]
struct WriteBody<'a> {
    fields: &'a Fields,
}

/// [`RecordStore`] backed by an Airtable-compatible REST API.
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRecordStore {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpRecordStore {
            client: builder.build()?,
            base_url,
        })
    }

    fn table_url(
        &self,
        creds: &Credentials,
        table: &str,
        record_id: Option<&str>,
    ) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push(&creds.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }
}

/// Exact-match formula on one field. The value is quoted as a string literal.
pub fn filter_formula(field: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{{{field}}}=\"{escaped}\"")
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<T>().await?)
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn search(
        &self,
        creds: &Credentials,
        table: &str,
        field: &str,
        value: &str,
        max_records: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let formula = filter_formula(field, value);
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0;

        loop {
            let mut url = self.table_url(creds, table, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("filterByFormula", &formula);
                if let Some(max) = max_records {
                    query.append_pair("maxRecords", &max.to_string());
                }
                if let Some(ref o) = offset {
                    query.append_pair("offset", o);
                }
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(&creds.api_token)
                .send()
                .await?;
            let page: RecordPage = read_json(response).await?;

            records.extend(page.records);
            pages += 1;

            if let Some(max) = max_records
                && records.len() >= max
            {
                records.truncate(max);
                break;
            }

            match page.offset {
                Some(next) if offset.as_ref() != Some(&next) => offset = Some(next),
                Some(next) => {
                    tracing::warn!(table, offset = %next, "upstream repeated a page offset");
                    break;
                }
                None => break,
            }
        }

        tracing::debug!(table, pages, matches = records.len(), "searched records");
        Ok(records)
    }

    async fn create(
        &self,
        creds: &Credentials,
        table: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        let url = self.table_url(creds, table, None)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&creds.api_token)
            .json(&WriteBody { fields })
            .send()
            .await?;

        read_json(response).await
    }

    async fn update(
        &self,
        creds: &Credentials,
        table: &str,
        record_id: &str,
        fields: &Fields,
    ) -> Result<Record, StoreError> {
        let url = self.table_url(creds, table, Some(record_id))?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&creds.api_token)
            .json(&WriteBody { fields })
            .send()
            .await?;

        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> Credentials {
        Credentials::new("test-token", "appTest")
    }

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_filter_formula() {
        assert_eq!(filter_formula("Title", "Ep12"), r#"{Title}="Ep12""#);
        assert_eq!(
            filter_formula("Title", r#"say "hi" \o/"#),
            r#"{Title}="say \"hi\" \\o/""#
        );
        // No case or whitespace normalization
        assert_eq!(filter_formula("Id", " AbC "), r#"{Id}=" AbC ""#);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpRecordStore::new("not a url", None),
            Err(StoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpRecordStore::new("mailto:someone@example.com", None),
            Err(StoreError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_search_sends_formula_and_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/appTest/Subscribers"))
            .and(query_param("filterByFormula", r#"{Email}="a@example.com""#))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [
                    {"id": "rec1", "createdTime": "2024-01-01T00:00:00.000Z", "fields": {"Email": "a@example.com"}}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = HttpRecordStore::new(&mock_server.uri(), None).unwrap();
        let records = store
            .search(&creds(), "Subscribers", "Email", "a@example.com", None)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "rec1");
        assert_eq!(records[0].fields["Email"], "a@example.com");
    }

    #[tokio::test]
    async fn test_search_follows_offset() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/appTest/Subscribers"))
            .and(query_param("offset", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec2", "fields": {}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/appTest/Subscribers"))
            .and(query_param_is_missing("offset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec1", "fields": {}}],
                "offset": "page2"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = HttpRecordStore::new(&mock_server.uri(), None).unwrap();
        let records = store
            .search(&creds(), "Subscribers", "Title", "dup", None)
            .await
            .unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rec1", "rec2"]);
    }

    #[tokio::test]
    async fn test_search_stops_at_max_records() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/appTest/Video%20posts"))
            .and(query_param("maxRecords", "1"))
            .and(query_param_is_missing("offset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec1", "fields": {}}, {"id": "rec2", "fields": {}}],
                "offset": "page2"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("offset", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let store = HttpRecordStore::new(&mock_server.uri(), None).unwrap();
        let records = store
            .search(&creds(), "Video posts", "Title", "Ep12", Some(1))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "rec1");
    }

    #[tokio::test]
    async fn test_search_stops_on_repeated_offset() {
        let mock_server = MockServer::start().await;

        // Every page points back at itself
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec1", "fields": {}}],
                "offset": "same"
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        let store = HttpRecordStore::new(&mock_server.uri(), None).unwrap();
        let records = store
            .search(&creds(), "Subscribers", "Title", "loop", None)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_create_and_update_bodies() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/appTest/Video%20posts"))
            .and(body_json(json!({"fields": {"Title": "Ep12", "Status": "Published"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "recNew",
                "fields": {"Title": "Ep12", "Status": "Published"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/appTest/Video%20posts/recNew"))
            .and(body_json(json!({"fields": {"Status": "Draft"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "recNew",
                "fields": {"Status": "Draft"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = HttpRecordStore::new(&mock_server.uri(), None).unwrap();
        let created = store
            .create(
                &creds(),
                "Video posts",
                &fields(json!({"Title": "Ep12", "Status": "Published"})),
            )
            .await
            .unwrap();
        assert_eq!(created.id, "recNew");

        let updated = store
            .update(
                &creds(),
                "Video posts",
                "recNew",
                &fields(json!({"Status": "Draft"})),
            )
            .await
            .unwrap();
        assert_eq!(updated.fields, fields(json!({"Status": "Draft"})));
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_status_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_string(r#"{"error":{"type":"INVALID_VALUE_FOR_COLUMN"}}"#),
            )
            .mount(&mock_server)
            .await;

        let store = HttpRecordStore::new(&mock_server.uri(), None).unwrap();
        let err = store
            .create(&creds(), "Subscribers", &Fields::new())
            .await
            .unwrap_err();

        match err {
            StoreError::Upstream { status, body } => {
                assert_eq!(status, 422);
                assert!(body.contains("INVALID_VALUE_FOR_COLUMN"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
