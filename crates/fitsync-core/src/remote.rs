//! Remote document store contract and the HTTP reference client.
//!
//! The remote is a network-backed key/value and query provider; everything
//! this crate needs from it fits in four calls. Every round trip is
//! bounded at [`REMOTE_TIMEOUT`]; expiry is a retryable failure, never
//! silently "no data".

use crate::error::SyncError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bound applied to every remote round trip.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON object as stored in a remote collection.
pub type Document = serde_json::Map<String, Value>;

/// A document together with its remote id.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Document,
}

/// Contract consumed from the remote document store.
///
/// `query_equal` is a single-field equality filter; anything narrower
/// (compound filters, date ranges) is the caller's job. The backend may
/// reject writes carrying unset-value markers, so optional fields are
/// stripped by this crate before `insert` is ever called.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// All documents in `collection` where `field == value`.
    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, SyncError>;

    /// Insert a document, returning its remote id.
    async fn insert(&self, collection: &str, document: Document) -> Result<String, SyncError>;

    /// Delete a document by id.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), SyncError>;

    /// Fetch the full payload backing a cached collection.
    async fn fetch_collection(&self, collection: &str) -> Result<Value, SyncError>;
}

/// Run a remote call under [`REMOTE_TIMEOUT`].
pub(crate) async fn bounded<T, F>(operation: &str, fut: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    match tokio::time::timeout(REMOTE_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            operation: operation.to_string(),
            timeout_secs: REMOTE_TIMEOUT.as_secs(),
        }),
    }
}

/// REST client for a document-store endpoint.
///
/// Routes follow the usual collection shape: `GET /{collection}` for the
/// whole payload, `GET /{collection}?field=value` for equality queries,
/// `POST /{collection}` answering `{"id": "..."}`, and
/// `DELETE /{collection}/{id}`.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|e| SyncError::remote(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn transport_error(operation: &str, error: reqwest::Error) -> SyncError {
        if error.is_timeout() {
            SyncError::Timeout {
                operation: operation.to_string(),
                timeout_secs: REMOTE_TIMEOUT.as_secs(),
            }
        } else {
            SyncError::remote(error.to_string())
        }
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, SyncError> {
        // Scalars go on the query string bare; anything else as JSON text.
        let value_param = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        debug!(collection, field, "querying remote collection");
        let response = self
            .client
            .get(self.url(collection))
            .query(&[(field, value_param.as_str())])
            .send()
            .await
            .map_err(|e| Self::transport_error("query", e))?
            .error_for_status()
            .map_err(|e| Self::transport_error("query", e))?;

        let raw: Vec<Document> = response
            .json()
            .await
            .map_err(|e| SyncError::decode(collection, e.to_string()))?;

        let mut documents = Vec::with_capacity(raw.len());
        for mut fields in raw {
            let id = match fields.remove("id") {
                Some(Value::String(id)) => id,
                _ => {
                    return Err(SyncError::decode(collection, "document missing string `id`"));
                }
            };
            documents.push(StoredDocument { id, fields });
        }
        Ok(documents)
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<String, SyncError> {
        #[derive(Deserialize)]
        struct InsertReply {
            id: String,
        }

        debug!(collection, "inserting document");
        let response = self
            .client
            .post(self.url(collection))
            .json(&Value::Object(document))
            .send()
            .await
            .map_err(|e| Self::transport_error("insert", e))?
            .error_for_status()
            .map_err(|e| Self::transport_error("insert", e))?;

        let reply: InsertReply = response
            .json()
            .await
            .map_err(|e| SyncError::decode(collection, e.to_string()))?;
        Ok(reply.id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), SyncError> {
        debug!(collection, id, "deleting document");
        self.client
            .delete(self.url(&format!("{collection}/{id}")))
            .send()
            .await
            .map_err(|e| Self::transport_error("delete", e))?
            .error_for_status()
            .map_err(|e| Self::transport_error("delete", e))?;
        Ok(())
    }

    async fn fetch_collection(&self, collection: &str) -> Result<Value, SyncError> {
        debug!(collection, "fetching collection payload");
        let response = self
            .client
            .get(self.url(collection))
            .send()
            .await
            .map_err(|e| Self::transport_error("fetch", e))?
            .error_for_status()
            .map_err(|e| Self::transport_error("fetch", e))?;

        response
            .json()
            .await
            .map_err(|e| SyncError::decode(collection, e.to_string()))
    }
}
