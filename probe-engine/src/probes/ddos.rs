//! DoS and network-protection probes

use crate::error::ProbeResult;
use crate::events::{EventSink, RequestLog};
use crate::http::{tcp_connect, udp_send, ProbeClient};
use crate::pacing::{
    burst_delay, clamp_concurrency, rate_interval, PermitGate, TimeWindow, MAX_BURST_CONCURRENCY,
    MAX_FLOOD_RATE, MAX_FLOOD_WORKERS,
};
use crate::types::TestSpec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Status codes a protection layer typically answers floods with
const FLOOD_BLOCK_CODES: &[u16] = &[403, 406, 429];

/// Pacing delay between sequential TCP connect attempts
const TCP_ATTEMPT_SPACING: Duration = Duration::from_millis(50);

struct BurstConfig {
    url: String,
    total: usize,
    interval_ms: u64,
    pattern: String,
    sustained_window_sec: u64,
}

impl BurstConfig {
    fn from_spec(spec: &TestSpec) -> ProbeResult<Self> {
        Ok(Self {
            url: spec.target.require_url()?.to_string(),
            total: spec.params.burst_requests.unwrap_or(10) as usize,
            interval_ms: spec.params.burst_interval_ms.unwrap_or(100),
            pattern: spec
                .params
                .burst_pattern
                .clone()
                .unwrap_or_else(|| "linear".to_string()),
            sustained_window_sec: spec.params.sustained_window_sec.unwrap_or(0),
        })
    }
}

/// Concurrent GET burst with per-index pacing and an optional sustained
/// window between launch and join
pub async fn http_flood(spec: &TestSpec, client: &ProbeClient, sink: &EventSink) -> ProbeResult<()> {
    let cfg = BurstConfig::from_spec(spec)?;
    let concurrency = clamp_concurrency(cfg.total, MAX_BURST_CONCURRENCY);
    client.ensure_capacity(concurrency).await;
    debug!(total = cfg.total, concurrency, pattern = %cfg.pattern, "Starting HTTP flood");

    let gate = PermitGate::new(concurrency);
    let started = Instant::now();
    let mut handles = Vec::with_capacity(cfg.total);
    for index in 0..cfg.total {
        let delay = burst_delay(index, cfg.interval_ms, &cfg.pattern);
        let gate = gate.clone();
        let client = client.clone();
        let sink = sink.clone();
        let url = cfg.url.clone();
        handles.push(tokio::spawn(async move {
            let Some(_permit) = gate.acquire().await else {
                return;
            };
            tokio::time::sleep(delay).await;
            let outcome = client.get(&url).await;
            sink.request(
                RequestLog::new("GET", &url)
                    .with_outcome(&outcome)
                    .blocked_when(FLOOD_BLOCK_CODES)
                    .with_meta("request_index", Some(index.to_string())),
            );
        }));
    }

    // Sustained load can outlive the burst launch: hold the run open for
    // the requested window before joining the in-flight tasks.
    if cfg.sustained_window_sec > 0 {
        tokio::time::sleep(Duration::from_secs(cfg.sustained_window_sec)).await;
    }
    for handle in handles {
        let _ = handle.await;
    }

    sink.summary(
        "HTTP flood finished",
        [
            ("total", cfg.total as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Single reachability GET; the engine cannot rotate its egress IP and
/// says so when rotation was requested
pub async fn ip_region_blocking(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    if spec.params.use_vpn.unwrap_or(false) {
        sink.info("VPN rotation requested but not applied; probing from the current egress IP");
    }

    let started = Instant::now();
    let outcome = client.get(&url).await;
    sink.request(
        RequestLog::new("GET", &url)
            .with_outcome(&outcome)
            .blocked_when(&[403, 451]),
    );
    sink.summary(
        "IP/region blocking check finished",
        [("total", 1), ("elapsedMs", started.elapsed().as_millis() as i64)],
    );
    Ok(())
}

/// Sequential TCP connect attempt per listed port, each bounded by a
/// timeout and separated by a fixed pacing delay
pub async fn tcp_port_reachability(
    spec: &TestSpec,
    _client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let host = spec.target.require_host()?.to_string();
    let ports = spec.target.require_ports()?.to_vec();
    let timeout = Duration::from_millis(spec.params.timeout_ms.unwrap_or(1000));

    let started = Instant::now();
    for (index, port) in ports.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(TCP_ATTEMPT_SPACING).await;
        }
        let outcome = tcp_connect(&host, *port, timeout).await;
        let mut log = RequestLog::new("TCP_CONNECT", &format!("tcp://{host}:{port}"))
            .with_meta("port", Some(port.to_string()))
            .with_meta("open", Some(outcome.success.to_string()));
        log.duration_ms = outcome.duration_ms;
        if !outcome.success {
            // Failures of every kind surface under one label; the real
            // reason rides along as metadata.
            log.error = Some("Connect timeout".to_string());
            log = log.with_meta("detail", outcome.error.clone());
        }
        sink.request(log);
    }

    sink.summary(
        "TCP port reachability finished",
        [
            ("total", ports.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Single UDP datagram; measures send success only since UDP gives no
/// delivery confirmation
pub async fn udp_reachability(
    spec: &TestSpec,
    _client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let host = spec.target.require_host()?.to_string();
    let port = spec.target.require_ports()?[0];
    let payload = spec
        .params
        .udp_payload
        .clone()
        .unwrap_or_else(|| "PING".to_string());

    let started = Instant::now();
    let outcome = udp_send(&host, port, payload.as_bytes()).await;
    sink.request(
        RequestLog::new("UDP_SEND", &format!("udp://{host}:{port}"))
            .with_socket_outcome(&outcome)
            .with_meta("payload_bytes", Some(payload.len().to_string()))
            .with_meta("send_completed", Some(outcome.success.to_string())),
    );
    sink.summary(
        "UDP reachability finished",
        [("total", 1), ("elapsedMs", started.elapsed().as_millis() as i64)],
    );
    Ok(())
}

struct FloodConfig {
    url: String,
    window_sec: u64,
    workers: usize,
    rate: u32,
}

impl FloodConfig {
    fn from_spec(spec: &TestSpec) -> ProbeResult<Self> {
        Ok(Self {
            url: spec.target.require_url()?.to_string(),
            window_sec: spec.params.window_sec.unwrap_or(10),
            workers: clamp_concurrency(
                spec.params.concurrency.unwrap_or(8) as usize,
                MAX_FLOOD_WORKERS,
            ),
            rate: spec.params.connect_rate.unwrap_or(10).clamp(1, MAX_FLOOD_RATE),
        })
    }
}

/// Time-boxed sustained loop: each worker repeatedly acquires a permit,
/// fires a GET, then sleeps its rate interval until the window elapses
pub async fn connection_flood(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let cfg = FloodConfig::from_spec(spec)?;
    client.ensure_capacity(cfg.workers).await;
    debug!(workers = cfg.workers, rate = cfg.rate, window_sec = cfg.window_sec, "Starting connection flood");

    let gate = PermitGate::new(cfg.workers);
    let window = TimeWindow::starting_now(Duration::from_secs(cfg.window_sec));
    let attempts = Arc::new(AtomicU64::new(0));
    let pause = rate_interval(cfg.rate);
    let started = Instant::now();

    let mut handles = Vec::with_capacity(cfg.workers);
    for worker in 0..cfg.workers {
        let gate = gate.clone();
        let client = client.clone();
        let sink = sink.clone();
        let url = cfg.url.clone();
        let attempts = attempts.clone();
        handles.push(tokio::spawn(async move {
            loop {
                if window.expired() {
                    break;
                }
                let Some(_permit) = gate.acquire().await else {
                    break;
                };
                let outcome = client.get(&url).await;
                attempts.fetch_add(1, Ordering::Relaxed);
                sink.request(
                    RequestLog::new("GET", &url)
                        .with_outcome(&outcome)
                        .blocked_when(FLOOD_BLOCK_CODES)
                        .with_meta("worker", Some(worker.to_string())),
                );
                drop(_permit);
                tokio::time::sleep(pause).await;
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    sink.summary(
        "Connection flood finished",
        [
            ("total", attempts.load(Ordering::Relaxed) as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}
