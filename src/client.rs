//! HTTP boundary.
//!
//! The engine composes an [`ApiRequest`] (method, path, query, JSON body)
//! and inspects the [`ApiResponse`] status and body. Authentication, base URL
//! and timeouts belong to the [`HttpClient`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{ClientOptions, Credentials};
use crate::error::ProviderError;

/// HTTP verbs used by the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// The verb as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the platform base URL, without a leading slash.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a request without body or query.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// A DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// A POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append query parameters.
    pub fn with_query(mut self, query: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(query);
        self
    }
}

/// Status and raw body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body text.
    pub body: String,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Create a response with a JSON body.
    pub fn json_body(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Decode the body as JSON, treating an empty or non-JSON body as `null`.
    ///
    /// Some write endpoints answer with plain text; types that accept `null`
    /// (`Option<_>`, `IgnoredAny`) still decode in that case.
    pub fn json_or_null<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        match serde_json::from_str(&self.body) {
            Ok(v) => Ok(v),
            Err(err) => serde_json::from_value(Value::Null).map_err(|_| err.into()),
        }
    }

    /// Turn a non-2xx response into the matching error.
    pub fn into_error(self) -> ProviderError {
        if let Some(message) = decode_error_body(&self.body) {
            if self.status == 404 {
                return ProviderError::NotFound(message);
            }
            return ProviderError::Remote {
                status: self.status,
                message,
            };
        }
        if self.status == 404 {
            return ProviderError::NotFound(self.body);
        }
        ProviderError::Http {
            status: self.status,
            body: self.body,
        }
    }
}

#[derive(Deserialize)]
struct ErrorsBody {
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct AccessErrorBody {
    #[serde(default)]
    code: String,
    message: String,
    #[serde(default)]
    detail: Option<String>,
}

/// Decode the two structured error shapes the platform returns.
///
/// Artifactory: `{"errors":[{"status":400,"message":"..."}]}`.
/// Access: `{"code":"...","message":"...","detail":"..."}`.
fn decode_error_body(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ErrorsBody>(body) {
        let messages: Vec<String> = parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .collect();
        if !messages.is_empty() {
            return Some(messages.join("; "));
        }
    }
    if let Ok(parsed) = serde_json::from_str::<AccessErrorBody>(body) {
        let mut message = parsed.message;
        if !parsed.code.is_empty() {
            message = format!("{}: {}", parsed.code, message);
        }
        if let Some(detail) = parsed.detail.filter(|d| !d.is_empty()) {
            message = format!("{} ({})", message, detail);
        }
        return Some(message);
    }
    None
}

/// Substitute the `{placeholder}` of an item path template with `key`.
pub fn expand_path(template: &str, key: &str) -> String {
    match (template.find('{'), template.find('}')) {
        (Some(open), Some(close)) if open < close => {
            format!("{}{}{}", &template[..open], key, &template[close + 1..])
        }
        _ => format!("{}/{}", template.trim_end_matches('/'), key),
    }
}

/// Executes REST calls against the platform.
///
/// Implementations return `Err` only when no HTTP response was received;
/// non-2xx statuses are returned as responses for the caller to interpret.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute one request. No retries.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ProviderError>;
}

/// `reqwest`-backed [`HttpClient`].
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    /// Build a client for `base_url` authenticating with `credentials`.
    pub fn new(
        base_url: &str,
        credentials: &Credentials,
        options: &ClientOptions,
    ) -> Result<Self, ProviderError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|e| {
            ProviderError::Configuration(format!("invalid url {:?}: {}", base_url, e))
        })?;

        let mut headers = HeaderMap::new();
        let (name, value) = match credentials {
            Credentials::AccessToken(token) => (AUTHORIZATION, format!("Bearer {}", token)),
            Credentials::ApiKey(key) => (HeaderName::from_static("x-jfrog-art-api"), key.clone()),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|_| ProviderError::Configuration("credentials contain invalid characters".into()))?;
        value.set_sensitive(true);
        headers.insert(name, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .connect_timeout(Duration::from_secs(10).min(options.request_timeout))
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ProviderError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| ProviderError::Transport(format!("invalid path {:?}: {}", request.path, e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpClient for RestClient {
    #[instrument(skip(self, request), fields(method = request.method.as_str(), path = %request.path))]
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ProviderError> {
        let url = self.url_for(&request)?;
        let mut builder = self.http.request(request.method.into(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, "Request completed");

        Ok(ApiResponse { status, body })
    }
}
