//! Request/response types and the transport seam.
//!
//! `Transport` is the black box that moves an `ApiRequest` to the server and
//! back. `HttpTransport` is the reqwest-backed implementation; its cookie
//! store carries the refresh cookie the reissue endpoint relies on.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::ApiError;
use crate::auth::Credential;
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

/// Header that carries the access token, both outbound and on login/reissue
/// responses. Deliberately not `Authorization`.
pub const CREDENTIAL_HEADER: &str = "access";

/// `error` value protected endpoints return once the access token expired.
pub const EXPIRED_TOKEN_MESSAGE: &str = "Access token expired";

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// Everything needed to send, and later replay, a call.
///
/// Never carries the credential; the transport attaches it per attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a header. The credential header is silently dropped.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name.as_str() != CREDENTIAL_HEADER {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssuedTokenBody {
    access_token: Option<String>,
}

/// A fully-read server response. Business errors are ordinary responses.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response body: {}", e)))
    }

    /// Whether the server reported an expired access token, as opposed to
    /// any other authorization failure.
    pub fn is_expired_credential(&self) -> bool {
        if self.status.is_success() {
            return false;
        }
        serde_json::from_str::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.error)
            .is_some_and(|e| e == EXPIRED_TOKEN_MESSAGE)
    }

    /// A freshly issued credential: the `access` header, else the
    /// `access_token` body field.
    pub fn issued_credential(&self) -> Option<Credential> {
        let from_header = self
            .headers
            .get(CREDENTIAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Credential::from);

        from_header.or_else(|| {
            serde_json::from_str::<IssuedTokenBody>(&self.body)
                .ok()
                .and_then(|b| b.access_token)
                .filter(|t| !t.trim().is_empty())
                .map(Credential::from)
        })
    }

    /// Turn a non-success response into the matching `ApiError`.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, attaching `credential` when given.
    async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(request.path());
        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone());

        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(credential) = credential {
            builder = builder.header(CREDENTIAL_HEADER, credential.as_str());
        }
        builder = match request.body() {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        debug!(method = %request.method(), url = %url, status = status.as_u16(), "Response received");

        Ok(ApiResponse::new(status, body).with_headers(headers))
    }
}

// ============================================================================
// Tests
// ============================================================================
