//! # REST Actuator
//!
//! JSON-over-HTTPS implementation of [`ResourceActuator`].
//!
//! Paths follow the provider's resource-name layout:
//! - `GET    {endpoint}/v1/{name}`
//! - `POST   {endpoint}/v1/{parent}/{collection}?resourceId={id}`
//! - `PATCH  {endpoint}/v1/{name}`
//! - `DELETE {endpoint}/v1/{name}`
//!
//! Error responses are mapped to [`ProviderErrorCode`] from the `error.status` field of a
//! Google-style error body when present, otherwise from the HTTP status code.

use super::{DesiredState, ObservedState, ProviderError, ProviderErrorCode, ProviderOperation, ResourceActuator};
use crate::observability::metrics;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// REST actuator
#[derive(Debug, Clone)]
pub struct RestActuator {
    http: Client,
    endpoint: String,
    token: Option<String>,
}

/// `{"error": {"code": 403, "message": "...", "status": "PERMISSION_DENIED"}}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl RestActuator {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("cloud-resource-controller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::unstructured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn object_url(&self, desired: &DesiredState) -> String {
        format!("{}/v1/{}", self.endpoint, desired.name())
    }

    fn collection_url(&self, desired: &DesiredState) -> String {
        format!(
            "{}/v1/{}/{}",
            self.endpoint, desired.parent, desired.collection
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, operation: ProviderOperation, request: RequestBuilder) -> Result<Response, ProviderError> {
        let label = operation.to_string();
        let started = Instant::now();
        metrics::increment_provider_operations(&label);
        let result = self.execute(request).await;
        metrics::observe_provider_operation_duration(&label, started.elapsed().as_secs_f64());
        if let Err(error) = &result {
            let code = error.code.map_or_else(|| "Unknown".to_string(), |c| format!("{c:?}"));
            metrics::increment_provider_operation_errors(&label, &code);
        }
        result
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &body))
    }

    async fn observed(response: Response) -> Result<ObservedState, ProviderError> {
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::unstructured(format!("invalid provider response: {e}")))?;
        Ok(ObservedState::from_payload(payload))
    }
}

#[async_trait]
impl ResourceActuator for RestActuator {
    async fn get(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError> {
        debug!(name = %desired.name(), "provider.get");
        let response = self
            .send(ProviderOperation::Get, self.http.get(self.object_url(desired)))
            .await?;
        Self::observed(response).await
    }

    async fn create(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError> {
        debug!(name = %desired.name(), "provider.create");
        let request = self
            .http
            .post(self.collection_url(desired))
            .query(&[("resourceId", desired.resource_id.as_str())])
            .json(&desired.config);
        let response = self.send(ProviderOperation::Create, request).await?;
        Self::observed(response).await
    }

    async fn update(&self, desired: &DesiredState) -> Result<ObservedState, ProviderError> {
        debug!(name = %desired.name(), "provider.update");
        let request = self.http.patch(self.object_url(desired)).json(&desired.config);
        let response = self.send(ProviderOperation::Update, request).await?;
        Self::observed(response).await
    }

    async fn delete(&self, desired: &DesiredState) -> Result<(), ProviderError> {
        debug!(name = %desired.name(), "provider.delete");
        self.send(ProviderOperation::Delete, self.http.delete(self.object_url(desired)))
            .await?;
        Ok(())
    }
}

fn transport_error(error: &reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::new(ProviderErrorCode::DeadlineExceeded, error.to_string())
    } else if error.is_connect() {
        ProviderError::new(ProviderErrorCode::Unavailable, error.to_string())
    } else {
        ProviderError::unstructured(error.to_string())
    }
}

/// Build a [`ProviderError`] from a non-success HTTP response
///
/// The canonical status in the body wins over the HTTP status code, since several
/// canonical codes share one HTTP status (e.g. `ABORTED` and `ALREADY_EXISTS` are both 409).
pub(crate) fn error_from_response(status: u16, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
    let message = match &detail {
        Some(d) if !d.message.is_empty() => format!("Error {status}: {}", d.message),
        _ if body.trim().is_empty() => format!("Error {status}"),
        _ => format!("Error {status}: {}", body.trim()),
    };
    let code = detail
        .as_ref()
        .and_then(|d| d.status.as_deref())
        .and_then(ProviderErrorCode::from_status)
        .or_else(|| ProviderErrorCode::from_http_status(status));
    // Quota errors arrive as RESOURCE_EXHAUSTED; only a hard quota limit is permanent.
    let code = match code {
        Some(ProviderErrorCode::ResourceExhausted)
            if message.to_lowercase().contains("quota exceeded") =>
        {
            Some(ProviderErrorCode::QuotaExceeded)
        }
        other => other,
    };
    ProviderError { code, message }
}
