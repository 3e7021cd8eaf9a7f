//! HTTP client for the Jellyseerr REST API.
//!
//! [`JellyseerrClient`] wraps `reqwest::Client` and is the single point of
//! contact with the Jellyseerr server. All responses are returned as
//! `serde_json::Value`; the resolver and tools layers interpret the shape.
//!
//! ## Authentication
//!
//! Every request carries the `X-Api-Key` header.
//!
//! ## Connection lifecycle
//!
//! The underlying `reqwest::Client` (and its connection pool) is built lazily
//! on the first request and reused afterwards. [`JellyseerrClient::close`]
//! releases it; dropping the client does the same.
//!
//! ## Error handling
//!
//! Failures are normalized into [`ClientError`]: HTTP status >= 400 becomes
//! [`ClientError::RemoteApi`], transport failures become
//! [`ClientError::Connection`], anything else [`ClientError::Unexpected`].

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Url;
use serde_json::{Map, Value};
use tracing::debug;

/// Path prefix of the versioned Jellyseerr API.
const API_PREFIX: &str = "api/v1";

/// Upper bound for TCP/TLS connection setup.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP methods accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 4] = [Self::Get, Self::Post, Self::Put, Self::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ClientError;

    /// Case-insensitive parse; anything outside GET/POST/PUT/DELETE is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                ClientError::InvalidArgument(format!(
                    "Unsupported method: {s}. Must be one of {}",
                    allowed.join(", ")
                ))
            })
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Errors surfaced by the gateway client and the request resolver.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Bad input or an unsatisfiable selection (media type, service, season, method).
    #[error("{0}")]
    InvalidArgument(String),

    /// Jellyseerr answered with HTTP status >= 400.
    #[error("Jellyseerr API error for '{method} {url}': HTTP {status} - {detail}")]
    RemoteApi {
        method: HttpMethod,
        url: String,
        status: u16,
        detail: String,
    },

    /// The server could not be reached (DNS, refused, timeout, TLS).
    #[error("Jellyseerr connection error for '{method} {url}': {kind} - {message}")]
    Connection {
        method: HttpMethod,
        url: String,
        kind: &'static str,
        message: String,
    },

    /// Anything else that went wrong around a call.
    #[error("Unexpected error calling Jellyseerr API '{method} {url}': {kind}: {message}")]
    Unexpected {
        method: HttpMethod,
        url: String,
        kind: &'static str,
        message: String,
    },
}

impl ClientError {
    /// HTTP status of a [`ClientError::RemoteApi`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map a `reqwest` failure onto the taxonomy.
    fn from_reqwest(method: HttpMethod, url: &str, err: &reqwest::Error) -> Self {
        let (kind, transport) = if err.is_timeout() {
            ("Timeout", true)
        } else if err.is_connect() {
            ("Connect", true)
        } else if err.is_redirect() {
            ("Redirect", true)
        } else if err.is_body() {
            ("Body", true)
        } else if err.is_request() {
            ("Request", true)
        } else if err.is_decode() {
            ("Decode", false)
        } else if err.is_builder() {
            ("Builder", false)
        } else {
            ("Other", false)
        };
        let url = url.to_string();
        let message = error_chain(err);
        if transport {
            ClientError::Connection {
                method,
                url,
                kind,
                message,
            }
        } else {
            ClientError::Unexpected {
                method,
                url,
                kind,
                message,
            }
        }
    }
}

/// Render an error together with its sources (reqwest hides the root cause).
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// The raw call surface the resolver depends on.
#[async_trait]
pub trait JellyseerrApi: Send + Sync {
    /// Issue one call against `{base}/api/v1/{endpoint}` and return the parsed JSON body.
    async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Option<&Map<String, Value>>,
        body: Option<&Value>,
    ) -> Result<Value, ClientError>;

    /// Absolute URL of `endpoint`, as reported in errors.
    fn url_for(&self, endpoint: &str) -> String;

    /// `GET search?query=`: the query is percent-encoded before transmission.
    async fn search_media(&self, query: &str, page: Option<u32>) -> Result<Value, ClientError> {
        let endpoint = format!("search?query={}", urlencoding::encode(query));
        let params = page.map(|p| {
            let mut m = Map::new();
            m.insert("page".into(), Value::from(p));
            m
        });
        self.request(HttpMethod::Get, &endpoint, params.as_ref(), None)
            .await
    }

    /// `GET request/{id}`: one existing request's record.
    async fn get_request(&self, request_id: i64) -> Result<Value, ClientError> {
        self.request(HttpMethod::Get, &format!("request/{request_id}"), None, None)
            .await
    }
}

/// HTTP client for a single Jellyseerr server.
pub struct JellyseerrClient {
    /// `{url}/api/v1`, no trailing slash.
    base_url: String,
    api_key: String,
    timeout: Duration,
    /// Lazily built on first request; emptied by [`close`](Self::close).
    http: Mutex<Option<reqwest::Client>>,
}

impl JellyseerrClient {
    /// Configure endpoint and credentials. No connection is opened here.
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Self {
        let base_url = format!("{}/{}", base_url.trim_end_matches('/'), API_PREFIX);
        Self {
            base_url,
            api_key,
            timeout,
            http: Mutex::new(None),
        }
    }

    /// The resolved API base (`{url}/api/v1`).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Release the underlying HTTP client. Safe to call repeatedly, or before
    /// any request was made.
    pub fn close(&self) {
        let released = self
            .http
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!("jellyseerr HTTP client closed");
        }
    }

    /// Return the shared HTTP client, building it on first use.
    fn http(&self) -> Result<reqwest::Client, String> {
        let mut slot = self.http.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let mut key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| format!("API key is not a valid header value: {e}"))?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(HeaderName::from_static("x-api-key"), key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT.min(self.timeout))
            .timeout(self.timeout)
            .build()
            .map_err(|e| error_chain(&e))?;
        debug!(base_url = %self.base_url, "jellyseerr HTTP client opened");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Build the full URL for an endpoint plus optional query parameters.
    ///
    /// Any query string already present in `endpoint` is kept verbatim, so
    /// pre-encoded values survive untouched.
    fn endpoint_url(
        &self,
        endpoint: &str,
        params: Option<&Map<String, Value>>,
    ) -> Result<Url, ClientError> {
        let raw = self.url_for(endpoint);
        let mut url = Url::parse(&raw).map_err(|e| {
            ClientError::InvalidArgument(format!("Invalid endpoint URL '{raw}': {e}"))
        })?;

        if let Some(params) = params.filter(|p| !p.is_empty()) {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                match value {
                    Value::Null => {}
                    Value::Array(items) => {
                        for item in items.iter().filter(|v| !v.is_null()) {
                            pairs.append_pair(key, &param_value(item));
                        }
                    }
                    other => {
                        pairs.append_pair(key, &param_value(other));
                    }
                }
            }
        }
        Ok(url)
    }

    /// Parse an HTTP response. Returns the JSON body on success, or a
    /// [`ClientError`] describing the failure.
    async fn handle_response(
        method: HttpMethod,
        url: &str,
        resp: reqwest::Response,
    ) -> Result<Value, ClientError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::from_reqwest(method, url, &e))?;

        if status.as_u16() >= 400 {
            let detail = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                body
            };
            return Err(ClientError::RemoteApi {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                detail,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Unexpected {
            method,
            url: url.to_string(),
            kind: "InvalidJson",
            message: e.to_string(),
        })
    }
}

impl Drop for JellyseerrClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl JellyseerrApi for JellyseerrClient {
    async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Option<&Map<String, Value>>,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = self.endpoint_url(endpoint, params)?;
        let url_str = url.to_string();
        let http = self.http().map_err(|e| ClientError::Unexpected {
            method,
            url: url_str.clone(),
            kind: "ClientBuild",
            message: e,
        })?;

        debug!(%method, url = %url_str, "jellyseerr request");
        let mut builder = http.request(method.into(), url);
        if let Some(body) = body.filter(|b| !b.is_null()) {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(method, &url_str, &e))?;
        Self::handle_response(method, &url_str, resp).await
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

/// Stringify a scalar JSON value for use in a query string.
fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
