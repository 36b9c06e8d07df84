//! Remote sync backend client.
//!
//! REST, JSON bodies, bearer-token auth:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /{collection}` |
//! | create    | `POST /{collection}` |
//! | update    | `PUT /{collection}/{id}` |
//! | delete    | `DELETE /{collection}/{id}` |
//!
//! A 401 maps to `Error::Unauthorized` so callers can clear the session. A
//! 404 on update is `Error::NotFound` (the record was deleted elsewhere); a
//! 404 on delete is success. Every other failure (transport, timeout,
//! non-2xx) is `Error::RemoteSync`.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use tether_core::{Error, Result};

use crate::config::SyncConfig;

/// Backend operations for one collection of wire records.
#[async_trait]
pub trait RemoteStore<W>: Send + Sync {
    /// All records of the collection.
    async fn list(&self, token: &str) -> Result<Vec<W>>;

    /// Create a record; the response carries the backend-assigned id.
    async fn create(&self, token: &str, record: &W) -> Result<W>;

    /// Replace the record stored under `id`.
    ///
    /// Fails with `Error::NotFound` if the backend no longer has it.
    async fn update(&self, token: &str, id: &str, record: &W) -> Result<()>;

    /// Delete the record stored under `id`. Deleting a missing record succeeds.
    async fn delete(&self, token: &str, id: &str) -> Result<()>;
}

/// reqwest-backed [`RemoteStore`].
pub struct HttpRemoteStore<W> {
    client: Client,
    base_url: String,
    collection: String,
    _wire: PhantomData<fn() -> W>,
}

impl<W> HttpRemoteStore<W> {
    /// Create a client for `collection` under `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            _wire: PhantomData,
        })
    }

    /// Create a client using the configured base URL and timeout.
    pub fn from_config(config: &SyncConfig, collection: impl Into<String>) -> Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            collection,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.collection)
    }

    /// `id` is opaque backend data; it is always one encoded path segment.
    fn record_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.collection_url())
            .map_err(|e| Error::Config(format!("Invalid API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("API base URL cannot have a path: {}", self.base_url)))?
            .push(id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, token: &str, op: &str) -> Result<Response> {
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::RemoteSync(format!("{} {}: request timed out", op, self.collection))
            } else {
                Error::RemoteSync(format!("{} {}: request failed: {}", op, self.collection, e))
            }
        })?;

        let status = response.status();
        debug!(
            collection = %self.collection,
            op,
            http_status = status.as_u16(),
            "remote response"
        );

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized(format!(
                "{} {} rejected the session token",
                op, self.collection
            )));
        }
        Ok(response)
    }
}

async fn error_for_status(response: Response, op: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteSync(format!(
        "{} failed: {} - {}",
        op,
        status,
        body.chars().take(200).collect::<String>()
    )))
}

#[async_trait]
impl<W> RemoteStore<W> for HttpRemoteStore<W>
where
    W: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn list(&self, token: &str) -> Result<Vec<W>> {
        let response = self
            .send(self.client.get(self.collection_url()), token, "list")
            .await?;
        let response = error_for_status(response, "list").await?;
        response
            .json()
            .await
            .map_err(|e| Error::RemoteSync(format!("Failed to parse list response: {}", e)))
    }

    async fn create(&self, token: &str, record: &W) -> Result<W> {
        let response = self
            .send(
                self.client.post(self.collection_url()).json(record),
                token,
                "create",
            )
            .await?;
        let response = error_for_status(response, "create").await?;
        response
            .json()
            .await
            .map_err(|e| Error::RemoteSync(format!("Failed to parse create response: {}", e)))
    }

    async fn update(&self, token: &str, id: &str, record: &W) -> Result<()> {
        let response = self
            .send(
                self.client.put(self.record_url(id)?).json(record),
                token,
                "update",
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{} {}", self.collection, id)));
        }
        error_for_status(response, "update").await?;
        Ok(())
    }

    async fn delete(&self, token: &str, id: &str) -> Result<()> {
        let response = self
            .send(self.client.delete(self.record_url(id)?), token, "delete")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(collection = %self.collection, record_id = %id, "delete: already gone");
            return Ok(());
        }
        error_for_status(response, "delete").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let remote: HttpRemoteStore<serde_json::Value> =
            HttpRemoteStore::new("http://api.test/v1/", "reminders", Duration::from_secs(1))
                .unwrap();
        assert_eq!(remote.collection_url(), "http://api.test/v1/reminders");
        assert_eq!(
            remote.record_url("abc").unwrap().as_str(),
            "http://api.test/v1/reminders/abc"
        );
    }

    #[test]
    fn test_record_id_is_a_single_path_segment() {
        let remote: HttpRemoteStore<serde_json::Value> =
            HttpRemoteStore::new("http://api.test/v1", "reminders", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            remote.record_url("a/b?c#d").unwrap().as_str(),
            "http://api.test/v1/reminders/a%2Fb%3Fc%23d"
        );
    }
}
