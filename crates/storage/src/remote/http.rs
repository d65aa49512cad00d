use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{Document, DocumentStore, DocumentWrite, FieldOp, Filter, RemoteError, WriteMode};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl HttpStoreConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Document store reached over a small REST API.
///
/// Writes are `PUT`/`PATCH {base}/{collection}/{id}` with a body of
/// `{"set": {..}, "increment": {..}}`; compare-and-set sends `If-Match: <version>`
/// and maps `412` to [`RemoteError::VersionConflict`].
#[derive(Clone)]
pub struct HttpDocumentStore {
    client: Client,
    config: HttpStoreConfig,
}

#[derive(Debug, Serialize, Default)]
struct WriteBody {
    #[serde(skip_serializing_if = "Map::is_empty")]
    set: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    increment: Map<String, Value>,
}

impl From<&DocumentWrite> for WriteBody {
    fn from(write: &DocumentWrite) -> Self {
        let mut body = Self::default();
        for (field, op) in write.ops() {
            match op {
                FieldOp::Set(value) => {
                    body.set.insert(field.to_owned(), value.clone());
                }
                FieldOp::Increment(by) => {
                    body.increment.insert(field.to_owned(), Value::from(*by));
                }
            }
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct VersionBody {
    version: u64,
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    id: String,
    version: u64,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl From<DocumentBody> for Document {
    fn from(body: DocumentBody) -> Self {
        Self {
            id: body.id,
            version: body.version,
            fields: body.fields,
        }
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Unavailable(e.to_string())
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl HttpDocumentStore {
    /// Build a store with a client that enforces the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Unavailable` if the HTTP client cannot be built.
    pub fn new(config: HttpStoreConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { client, config })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.config.base_url.trim_end_matches('/'))
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{id}", self.collection_url(collection))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        self.authed(request).send().await.map_err(transport)
    }

    async fn version_of(response: Response) -> Result<u64, RemoteError> {
        let body: VersionBody = response.json().await.map_err(transport)?;
        Ok(body.version)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn set(
        &self,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
        mode: WriteMode,
    ) -> Result<u64, RemoteError> {
        let request = self
            .client
            .put(self.document_url(collection, id))
            .query(&[("mode", mode.as_str())])
            .json(&WriteBody::from(write));
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        debug!(collection, id, mode = mode.as_str(), "remote set");
        Self::version_of(response).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        write: &DocumentWrite,
    ) -> Result<u64, RemoteError> {
        let request = self
            .client
            .patch(self.document_url(collection, id))
            .json(&WriteBody::from(write));
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
            s if s.is_success() => Self::version_of(response).await,
            s => Err(RemoteError::Status(s.as_u16())),
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        let response = self
            .send(self.client.get(self.document_url(collection, id)))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body: DocumentBody = response.json().await.map_err(transport)?;
                Ok(Some(body.into()))
            }
            s => Err(RemoteError::Status(s.as_u16())),
        }
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, RemoteError> {
        let params: Vec<(&str, String)> = filters
            .iter()
            .map(|f| (f.field.as_str(), query_value(&f.value)))
            .collect();
        let request = self.client.get(self.collection_url(collection)).query(&params);
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        let body: Vec<DocumentBody> = response.json().await.map_err(transport)?;
        let mut docs: Vec<Document> = body.into_iter().map(Document::from).collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        id: &str,
        expected_version: Option<u64>,
        write: &DocumentWrite,
    ) -> Result<u64, RemoteError> {
        let request = self
            .client
            .put(self.document_url(collection, id))
            .query(&[("mode", WriteMode::Merge.as_str())])
            .header(reqwest::header::IF_MATCH, expected_version.unwrap_or(0).to_string())
            .json(&WriteBody::from(write));
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::PRECONDITION_FAILED => {
                let actual = response
                    .json::<VersionBody>()
                    .await
                    .map_or(0, |body| body.version);
                Err(RemoteError::VersionConflict {
                    expected: expected_version,
                    actual,
                })
            }
            s if s.is_success() => Self::version_of(response).await,
            s => Err(RemoteError::Status(s.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_body_splits_sets_and_increments() {
        let write = DocumentWrite::new()
            .set("score", 80)
            .increment("plays", 1);
        let body = serde_json::to_value(WriteBody::from(&write)).unwrap();
        assert_eq!(body, json!({"set": {"score": 80}, "increment": {"plays": 1}}));
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let store = HttpDocumentStore::new(HttpStoreConfig::new("http://localhost:8080/v1/")).unwrap();
        assert_eq!(
            store.document_url("child_progress", "kid_abc_song"),
            "http://localhost:8080/v1/child_progress/kid_abc_song"
        );
    }

    #[test]
    fn query_values_are_unquoted_strings() {
        assert_eq!(query_value(&json!("p1")), "p1");
        assert_eq!(query_value(&json!(3)), "3");
    }
}
