//! HTTP request primitive and raw-socket helpers
//!
//! Every network attempt funnels through `ProbeClient::execute`, which
//! returns an outcome instead of an error: probe code never has to unwind
//! because a target refused, timed out or blocked a request.

use crate::error::{ProbeError, ProbeResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, redirect};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default per-host connection capacity before any probe ratchets it up
const DEFAULT_PER_HOST_CAPACITY: usize = 32;

/// Total request timeout applied to every call
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Connect-phase timeout applied to every call
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a single HTTP attempt; never an `Err`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RequestOutcome {
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RequestOutcome {
    fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: None,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a raw TCP connect or UDP send attempt
#[derive(Debug, Clone)]
pub struct SocketOutcome {
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Request body variants probes can attach
#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Raw { content_type: String, data: String },
}

struct ClientShared {
    client: RwLock<reqwest::Client>,
    per_host_capacity: AtomicUsize,
    cookie_jar: bool,
}

/// Shared HTTP client wrapper with a one-way capacity ratchet
///
/// Burst-style probes call `ensure_capacity` before fanning out; the
/// underlying pool is widened to twice the requested concurrency and never
/// narrowed again for the remainder of the run.
#[derive(Clone)]
pub struct ProbeClient {
    shared: Arc<ClientShared>,
}

impl ProbeClient {
    /// Create a client with default capacity and no cookie jar
    pub fn new() -> ProbeResult<Self> {
        Self::build(false)
    }

    /// Create a client that persists cookies across requests, used by the
    /// cookie/JS-challenge probe
    pub fn with_cookie_jar() -> ProbeResult<Self> {
        Self::build(true)
    }

    fn build(cookie_jar: bool) -> ProbeResult<Self> {
        let client = build_inner_client(DEFAULT_PER_HOST_CAPACITY, cookie_jar)?;
        Ok(Self {
            shared: Arc::new(ClientShared {
                client: RwLock::new(client),
                per_host_capacity: AtomicUsize::new(DEFAULT_PER_HOST_CAPACITY),
                cookie_jar,
            }),
        })
    }

    /// Widen the connection pool to `max(current, concurrency * 2)`.
    ///
    /// The ratchet only ever grows: narrowing mid-run could starve a later
    /// probe that already sized itself against the wider pool.
    pub async fn ensure_capacity(&self, concurrency: usize) {
        let requested = concurrency.saturating_mul(2).max(1);
        let current = self.shared.per_host_capacity.load(Ordering::Acquire);
        if requested <= current {
            return;
        }
        match build_inner_client(requested, self.shared.cookie_jar) {
            Ok(client) => {
                *self.shared.client.write().await = client;
                self.shared
                    .per_host_capacity
                    .store(requested, Ordering::Release);
                debug!(capacity = requested, "Widened HTTP client capacity");
            }
            Err(e) => {
                warn!("Failed to widen HTTP client capacity, keeping current pool: {}", e);
            }
        }
    }

    /// Convenience GET without extra headers or body
    pub async fn get(&self, url: &str) -> RequestOutcome {
        self.execute("GET", url, &[], None).await
    }

    /// Issue a single request and capture the result
    ///
    /// Malformed methods or header pairs fail the attempt, not the probe.
    pub async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<RequestBody>,
    ) -> RequestOutcome {
        let method = match Method::from_bytes(method.as_bytes()) {
            Ok(m) => m,
            Err(_) => return RequestOutcome::failure(format!("Invalid HTTP method: {method}"), 0),
        };
        let header_map = match build_header_map(headers) {
            Ok(map) => map,
            Err(reason) => return RequestOutcome::failure(reason, 0),
        };

        let client = self.shared.client.read().await.clone();
        let mut request = client.request(method, url).headers(header_map);
        request = match body {
            Some(RequestBody::Form(pairs)) => request.form(&pairs),
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Raw { content_type, data }) => {
                match HeaderValue::from_str(&content_type) {
                    Ok(ct) => request.header(CONTENT_TYPE, ct).body(data),
                    Err(_) => {
                        return RequestOutcome::failure(
                            format!("Invalid content type: {content_type}"),
                            0,
                        )
                    }
                }
            }
            None => request,
        };

        let started = Instant::now();
        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so the connection returns to the pool.
                let _ = response.bytes().await;
                RequestOutcome {
                    status: Some(status),
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Err(e) => RequestOutcome::failure(
                describe_request_error(&e),
                started.elapsed().as_millis() as u64,
            ),
        }
    }
}

fn build_inner_client(per_host_capacity: usize, cookie_jar: bool) -> ProbeResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_CALL_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .redirect(redirect::Policy::limited(5))
        .pool_max_idle_per_host(per_host_capacity)
        .cookie_store(cookie_jar)
        .build()
        .map_err(|e| ProbeError::ClientBuild {
            reason: e.to_string(),
        })
}

fn build_header_map(headers: &[(String, String)]) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| format!("Invalid header name: {name}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("Invalid header value for {name}"))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {error}")
    } else {
        error.to_string()
    }
}

/// Attempt a TCP connect bounded by `timeout`; a clean connect-then-close
/// counts as success
pub async fn tcp_connect(host: &str, port: u16, timeout: Duration) -> SocketOutcome {
    let started = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            SocketOutcome {
                success: true,
                duration_ms: started.elapsed().as_millis() as u64,
                error: None,
            }
        }
        Ok(Err(e)) => SocketOutcome {
            success: false,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(e.to_string()),
        },
        Err(_) => SocketOutcome {
            success: false,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(format!("timed out after {}ms", timeout.as_millis())),
        },
    }
}

/// Fire a single UDP datagram; success means the send completed, since UDP
/// offers no delivery confirmation
pub async fn udp_send(host: &str, port: u16, payload: &[u8]) -> SocketOutcome {
    let started = Instant::now();
    let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(s) => s,
        Err(e) => {
            return SocketOutcome {
                success: false,
                duration_ms: started.elapsed().as_millis() as u64,
                error: Some(format!("socket bind failed: {e}")),
            }
        }
    };
    match socket.send_to(payload, (host, port)).await {
        Ok(_) => SocketOutcome {
            success: true,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
        },
        Err(e) => SocketOutcome {
            success: false,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_method_fails_the_attempt_only() {
        let client = ProbeClient::new().unwrap();
        let outcome = client
            .execute("NOT A METHOD", "http://127.0.0.1:1/", &[], None)
            .await;
        assert!(outcome.status.is_none());
        assert!(outcome.error.unwrap().contains("Invalid HTTP method"));
    }

    #[tokio::test]
    async fn test_invalid_header_fails_the_attempt_only() {
        let client = ProbeClient::new().unwrap();
        let headers = vec![("X-Probe".to_string(), "bad\nvalue".to_string())];
        let outcome = client
            .execute("GET", "http://127.0.0.1:1/", &headers, None)
            .await;
        assert!(outcome.status.is_none());
        assert!(outcome.error.unwrap().contains("Invalid header value"));
    }

    #[tokio::test]
    async fn test_capacity_ratchet_never_narrows() {
        let client = ProbeClient::new().unwrap();
        client.ensure_capacity(64).await;
        let widened = client.shared.per_host_capacity.load(Ordering::Acquire);
        assert_eq!(widened, 128);

        // A smaller request must not narrow the pool.
        client.ensure_capacity(4).await;
        assert_eq!(
            client.shared.per_host_capacity.load(Ordering::Acquire),
            widened
        );
    }

    #[tokio::test]
    async fn test_udp_send_to_localhost_completes() {
        let outcome = udp_send("127.0.0.1", 9, b"PING").await;
        // Send success only; no delivery is implied.
        assert!(outcome.success || outcome.error.is_some());
    }
}
