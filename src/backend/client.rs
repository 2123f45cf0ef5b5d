//! HTTP client for the care-team backend with secret handling and safe logging.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config::AppConfig;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all backend requests.
const CLIENT_USER_AGENT: &str = "CareteamAssign/0.1.0";

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &["token", "api_key", "access_token", "authorization"];

// ─────────────────────────────────────────────────────────────────────────────
// Log sanitizing
// ─────────────────────────────────────────────────────────────────────────────

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging.
///
/// Keeps the path and query; values of sensitive query keys become `***`.
/// Never includes scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url) -> String {
    let path = url.path();
    let query_pairs: Vec<_> = url.query_pairs().collect();
    if query_pairs.is_empty() {
        return path.to_string();
    }

    let redacted_pairs: Vec<String> = query_pairs
        .into_iter()
        .map(|(key, value)| {
            if is_sensitive_param(&key) {
                format!("{}=***", key)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect();

    format!("{}?{}", path, redacted_pairs.join("&"))
}

/// Redacts an identifier for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire error format
// ─────────────────────────────────────────────────────────────────────────────

/// Error body returned by the backend (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiClient
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe JSON client for the backend API.
///
/// Cloning is cheap; the underlying `reqwest::Client` shares its pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiClient {
    /// Creates a client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(
        mut base_url: Url,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http: build_http_client(timeout)?,
            base_url,
            token,
        })
    }

    /// Creates a client from application configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.api_url.clone(),
            config.api_token.clone(),
            config.request_timeout,
        )
    }

    /// Builds a full URL for an API path.
    ///
    /// The path is resolved below the base URL, so a base such as
    /// `https://host/backend` keeps its `/backend` prefix.
    pub fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// Sends a GET and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self.send(Method::GET, path, None::<&()>).await?;
        decode_json(response).await
    }

    /// Sends a POST with a JSON body and decodes the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(body)).await?;
        decode_json(response).await
    }

    /// Executes a request with timing, logging, and status mapping.
    ///
    /// # Security
    ///
    /// - Never logs the Authorization header
    /// - Never logs request/response bodies
    /// - Error messages never contain raw URLs or tokens
    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, AppError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.build_url(path)?;
        let sanitized_url = sanitize_url_for_logs(&url);
        let start = Instant::now();

        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                info!(
                    "[API] {} {} FAILED {}ms",
                    method,
                    sanitized_url,
                    start.elapsed().as_millis()
                );
                let reason = if e.is_timeout() {
                    "request timed out"
                } else {
                    "connection to the server failed"
                };
                return Err(AppError::ConnectionFailed(reason.to_string()));
            }
        };

        let status = response.status();
        info!(
            "[API] {} {} {} {}ms",
            method,
            sanitized_url,
            status.as_u16(),
            start.elapsed().as_millis()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        Ok(response)
    }
}

/// Builds the configured HTTP client.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

/// Parses an error response and maps to the appropriate AppError.
async fn parse_error_response(response: reqwest::Response, status: StatusCode) -> AppError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::NotAuthenticated;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|b| match b.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound(detail.unwrap_or_else(|| "Resource not found".to_string()));
    }

    match detail {
        Some(detail) => AppError::ApiError(detail),
        None => AppError::ApiError(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
