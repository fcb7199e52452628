//! Shared HTTP plumbing.
//!
//! Uses async reqwest internally, but presents a sync interface: the
//! whole pipeline is deliberately single-threaded (one global rate-limit
//! quota, one request in flight at a time), so callers block on a shared
//! tokio runtime instead of going async themselves.

use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout (headers + full body)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Error from a single HTTP exchange.
///
/// `RateLimited` and `Http` carry the server's verdict; `Transport` is a
/// connection-level failure before any status was received; `Decode`
/// means the body arrived but was not the JSON shape we require.
#[derive(Debug)]
pub enum ApiError {
    /// HTTP 429 — quota exhausted, recoverable by waiting.
    RateLimited { reset_seconds: Option<u64> },
    /// Any other non-2xx status.
    Http { status: u16, body: String },
    /// Connection failure, timeout, DNS, TLS.
    Transport { message: String },
    /// Response body rejected at the parse boundary.
    Decode { message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited {
                reset_seconds: Some(s),
            } => write!(f, "rate limited (resets in {s}s)"),
            Self::RateLimited {
                reset_seconds: None,
            } => write!(f, "rate limited"),
            Self::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Transport { message } => write!(f, "transport error: {message}"),
            Self::Decode { message } => write!(f, "malformed response: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Short stable tag used in run ledgers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Http { .. } => "http",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
        }
    }

    /// Connection-level reqwest error (no status line received).
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// One complete HTTP response, body fully read.
///
/// The status is NOT turned into an error here: callers own the policy
/// for 429 vs other non-2xx codes, and need the headers either way to
/// update their rate-limit state.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: String,
}

/// Blocking GET with query parameters and optional extra headers.
///
/// Returns `Err` only on transport failure; any status code that made it
/// back from the server is returned as `Ok(RawResponse)`.
pub fn blocking_get(
    url: &str,
    query: &[(String, String)],
    headers: &[(&'static str, String)],
) -> Result<RawResponse, ApiError> {
    SHARED_RUNTIME.handle().block_on(async {
        let mut req = SHARED_CLIENT.get(url).query(query);
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        let response = req.send().await.map_err(|e| ApiError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    })
}
