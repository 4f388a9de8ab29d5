//! REST client for the remote document API.
//!
//! `GET /{collection}`, `GET /{collection}/{id}`, `POST /{collection}`,
//! `PATCH /{collection}/{id}`, `DELETE /{collection}/{id}`. Non-success statuses are
//! classified into [`SyncError`]; transport failures become [`SyncError::Network`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::marker::PhantomData;
use std::time::Duration;
use sync_framework::{Backend, FieldErrors, SyncEntity, SyncError};
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct ValidationBody {
    errors: FieldErrors,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(alias = "error")]
    message: String,
}

/// Turns an error response into the matching [`SyncError`].
///
/// 422 bodies shaped `{"errors": {"field": ["message"]}}` keep their field keys. Other
/// bodies contribute their `message` (or `error`) string when they have one.
pub fn classify(status: u16, body: &str) -> SyncError {
    if status == 422 {
        if let Ok(parsed) = serde_json::from_str::<ValidationBody>(body) {
            if !parsed.errors.is_empty() {
                return SyncError::Validation(parsed.errors);
            }
        }
    }
    let message = serde_json::from_str::<MessageBody>(body)
        .map(|parsed| parsed.message)
        .unwrap_or_else(|_| body.trim().to_string());
    SyncError::from_status(status, message)
}

#[derive(Debug)]
pub struct HttpBackend<T> {
    client: Client,
    base_url: String,
    token: Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for HttpBackend<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: SyncEntity> HttpBackend<T> {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, token))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token,
            _entity: PhantomData,
        }
    }

    pub fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, T::COLLECTION)
    }

    pub fn item_url(&self, id: &T::Id) -> String {
        format!("{}/{}/{}", self.base_url, T::COLLECTION, id)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, SyncError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let error = classify(status.as_u16(), &body);
        warn!(entity_type = T::KIND, status = status.as_u16(), error = %error, "Request rejected");
        Err(error)
    }

    async fn json<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, SyncError> {
        self.execute(request)
            .await?
            .json::<R>()
            .await
            .map_err(|e| SyncError::Other(format!("unreadable {} response: {e}", T::KIND)))
    }
}

#[async_trait]
impl<T: SyncEntity> Backend<T> for HttpBackend<T> {
    #[instrument(skip(self), fields(entity_type = T::KIND))]
    async fn list(&self) -> Result<Vec<T>, SyncError> {
        self.json(self.client.get(self.collection_url())).await
    }

    #[instrument(skip(self), fields(entity_type = T::KIND))]
    async fn get(&self, id: &T::Id) -> Result<T, SyncError> {
        self.json(self.client.get(self.item_url(id))).await
    }

    #[instrument(skip(self, draft), fields(entity_type = T::KIND))]
    async fn create(&self, draft: T::Draft) -> Result<T, SyncError> {
        self.json(self.client.post(self.collection_url()).json(&draft))
            .await
    }

    #[instrument(skip(self, patch), fields(entity_type = T::KIND))]
    async fn update(&self, id: &T::Id, patch: T::Patch) -> Result<T, SyncError> {
        self.json(self.client.patch(self.item_url(id)).json(&patch))
            .await
    }

    #[instrument(skip(self), fields(entity_type = T::KIND))]
    async fn delete(&self, id: &T::Id) -> Result<(), SyncError> {
        self.execute(self.client.delete(self.item_url(id))).await?;
        debug!(%id, "Deleted remotely");
        Ok(())
    }
}
