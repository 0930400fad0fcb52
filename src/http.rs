//!
//! Authenticated HTTP adapter
//! --------------------------
//! Wraps outbound API calls for consumers that want bearer auth handled for
//! them. Injects the current token from the kernel snapshot, enforces a
//! per-request timeout through a cancellation signal, and implements the
//! one-shot unauthorized -> refresh -> retry protocol against the kernel.
//! Failures come back as structured results, never as raised errors, so
//! callers can render inline failure states.
//!

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::events::AuthEvent;
use crate::kernel::SessionKernel;

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub json: Option<Value>,
    /// Per-request override of the adapter's default timeout.
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { method: Method::GET, headers: HeaderMap::new(), json: None, timeout: None }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post_json(body: Value) -> Self {
        Self { method: Method::POST, json: Some(body), ..Self::default() }
    }
}

/// Structured request outcome. `status` 0 means the request never produced
/// an HTTP response (transport failure); 408 may be synthetic (local
/// timeout fired before the server answered).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub failure: Option<AuthError>,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn timed_out(url: &str) -> Self {
        let failure = AuthError::timeout(
            "request_timeout".to_string(),
            format!("request to {} timed out", url),
        );
        Self { status: failure.synthetic_status(), body: Value::Null, failure: Some(failure) }
    }

    fn network(url: &str, message: String) -> Self {
        let failure = AuthError::network(
            "network_error".to_string(),
            format!("request to {} failed: {}", url, message),
        );
        Self { status: failure.synthetic_status(), body: Value::Null, failure: Some(failure) }
    }
}

enum SendOutcome {
    Response(ApiResponse),
    TimedOut,
    Network(reqwest::Error),
}

#[derive(Clone)]
pub struct ApiClient {
    kernel: SessionKernel,
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ApiClient {
    pub fn new(kernel: SessionKernel) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthError::internal("http_client_init".to_string(), e.to_string()))?;
        Ok(Self::with_client(kernel, client))
    }

    pub fn with_client(kernel: SessionKernel, client: reqwest::Client) -> Self {
        let default_timeout = kernel.config().http_timeout;
        Self { kernel, client, default_timeout }
    }

    /// Issue one logical request. At most one retry, and only after a
    /// completed refresh attempt; a timeout returns a synthetic 408 with no
    /// retry; transport failures return status 0 and emit `network_error`.
    pub async fn request(&self, url: &str, opts: RequestOptions) -> ApiResponse {
        let mut tried_once = false;
        loop {
            match self.send_once(url, &opts).await {
                SendOutcome::Response(resp) if resp.status == 401 => {
                    if tried_once {
                        // Second 401 for this logical request: session is dead.
                        warn!(target: "sessium::http", url = url, "401 after retry; signing out");
                        let _ = self.kernel.sign_out().await;
                        return resp;
                    }
                    tried_once = true;
                    match self.kernel.refresh_auth().await {
                        Ok(()) => {
                            debug!(target: "sessium::http", url = url, "401; refreshed, retrying once");
                            continue;
                        }
                        Err(e) => {
                            warn!(target: "sessium::http", url = url, "401 and refresh failed ({}); signing out", e);
                            let _ = self.kernel.sign_out().await;
                            return resp;
                        }
                    }
                }
                SendOutcome::Response(resp) => return resp,
                SendOutcome::TimedOut => {
                    debug!(target: "sessium::http", url = url, "request timed out");
                    return ApiResponse::timed_out(url);
                }
                SendOutcome::Network(err) => {
                    warn!(target: "sessium::http", url = url, "network failure: {}", err);
                    self.kernel.events().publish(AuthEvent::NetworkError {
                        url: url.to_string(),
                        error: err.to_string(),
                    });
                    return ApiResponse::network(url, err.to_string());
                }
            }
        }
    }

    async fn send_once(&self, url: &str, opts: &RequestOptions) -> SendOutcome {
        let mut req = self
            .client
            .request(opts.method.clone(), url)
            .headers(opts.headers.clone());
        // Bearer from the current snapshot; absence sends unauthenticated.
        // Re-read per attempt so a retry picks up the refreshed token.
        if let Some(token) = self.kernel.snapshot().bearer_token() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &opts.json {
            req = req.json(body);
        }
        let limit = opts.timeout.unwrap_or(self.default_timeout);
        let exchange = async {
            let resp = req.send().await?;
            let status = resp.status().as_u16();
            let bytes = resp.bytes().await?;
            let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);
            Ok::<(u16, Value), reqwest::Error>((status, body))
        };
        match tokio::time::timeout(limit, exchange).await {
            Err(_) => SendOutcome::TimedOut,
            Ok(Err(e)) if e.is_timeout() => SendOutcome::TimedOut,
            Ok(Err(e)) => SendOutcome::Network(e),
            Ok(Ok((status, body))) => {
                SendOutcome::Response(ApiResponse { status, body, failure: None })
            }
        }
    }
}
