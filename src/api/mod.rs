//! Backend API client
//!
//! Talks to the Reklam Pro REST backend for the two metadata steps of the
//! upload protocol:
//!
//! | Step | Request | Response |
//! |------|---------|----------|
//! | Upload target | `POST /files/upload-url` | `{data: {upload_url, object_key, folder_path}}` |
//! | Link | `POST /files/link` | success or failure only |
//!
//! Requests carry `Authorization: Bearer <token>` when a token is configured.

use crate::config::ApiConfig;
use crate::upload::{
    LinkRegistrar, LinkRequest, TargetResolver, UploadError, UploadTarget, UploadTargetRequest,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API client errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {}", request_failure(.0))]
    RequestError(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    StatusError { status: u16, message: String },

    #[error("Response error: {0}")]
    ResponseError(String),
}

/// `{data: ...}` envelope used by the backend
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(default)]
    data: Option<T>,
}

/// Optional acknowledgement body of `POST /files/link`
#[derive(Debug, Default, Deserialize)]
struct LinkAck {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// Error body shapes returned by the backend
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|token| !token.is_empty()),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.http_client.post(self.endpoint(path)).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::StatusError {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::ResponseError(e.to_string()))
    }

    /// Request an upload target (`POST /files/upload-url`)
    ///
    /// A response without `data` yields an empty target; callers decide
    /// whether a target is usable.
    #[tracing::instrument(
        name = "api.upload_url",
        skip(self, request),
        fields(
            file.name = %request.filename,
            ref_type = %request.ref_type,
            ref_id = %request.ref_id,
            object_key = tracing::field::Empty
        ),
        err
    )]
    pub async fn request_upload_url(
        &self,
        request: &UploadTargetRequest,
    ) -> Result<UploadTarget, ApiError> {
        let response = self.post_json("/files/upload-url", request).await?;
        let envelope: DataEnvelope<UploadTarget> = Self::read_json(response).await?;
        let target = envelope.data.unwrap_or_default();

        tracing::Span::current().record("object_key", target.object_key.as_str());
        tracing::debug!(folder_path = %target.folder_path, "Upload target issued");

        Ok(target)
    }

    /// Link an uploaded object to its owning record (`POST /files/link`)
    ///
    /// Any 2xx response counts as success unless its body says
    /// `"success": false`.
    #[tracing::instrument(
        name = "api.link",
        skip(self, request),
        fields(
            object_key = %request.object_key,
            file.size = request.file_size,
            ref_type = %request.ref_type,
            ref_id = %request.ref_id
        ),
        err
    )]
    pub async fn link_file(&self, request: &LinkRequest) -> Result<(), ApiError> {
        let response = self.post_json("/files/link", request).await?;
        let status = response.status();
        let body = response.bytes().await?;

        let ack: LinkAck = serde_json::from_slice(&body).unwrap_or_default();
        if ack.success == Some(false) {
            return Err(ApiError::StatusError {
                status: status.as_u16(),
                message: ack
                    .message
                    .unwrap_or_else(|| "file could not be linked".to_string()),
            });
        }

        tracing::debug!("File linked");
        Ok(())
    }
}

/// Pick the most useful message out of an error response
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            if !message.trim().is_empty() {
                return message;
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

/// Describe a transport failure with its cause chain
pub(crate) fn request_failure(error: &reqwest::Error) -> String {
    let mut message = if error.is_timeout() {
        format!("request timed out: {}", error)
    } else {
        error.to_string()
    };

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[async_trait]
impl TargetResolver for ApiClient {
    async fn resolve(&self, request: &UploadTargetRequest) -> Result<UploadTarget, UploadError> {
        self.request_upload_url(request)
            .await
            .map_err(|e| UploadError::TargetResolution(e.to_string()))
    }
}

#[async_trait]
impl LinkRegistrar for ApiClient {
    async fn link(&self, request: &LinkRequest) -> Result<(), UploadError> {
        self.link_file(request)
            .await
            .map_err(|e| UploadError::Link(e.to_string()))
    }
}
