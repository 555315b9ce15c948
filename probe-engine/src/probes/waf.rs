//! Web-application-firewall probes

use crate::encoding::{append_query_params, build_oversized_json, encode_payload, EncodingMode};
use crate::error::{ProbeError, ProbeResult};
use crate::events::{EventSink, RequestLog};
use crate::http::{ProbeClient, RequestBody};
use crate::pacing::MAX_RATE_PROBE_REQUESTS;
use crate::types::{TestSpec, TestType};
use std::time::{Duration, Instant};
use tracing::debug;

/// Where an encoded payload is placed in the outgoing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InjectionPoint {
    Query,
    Body,
    Header,
    Path,
}

impl InjectionPoint {
    fn parse(name: &str) -> ProbeResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "query" => Ok(InjectionPoint::Query),
            "body" => Ok(InjectionPoint::Body),
            "header" => Ok(InjectionPoint::Header),
            "path" => Ok(InjectionPoint::Path),
            other => Err(ProbeError::invalid(
                "injection_point",
                &format!("unknown injection point '{other}'"),
            )),
        }
    }

    /// Per-placement blocked heuristic
    fn block_codes(&self) -> &'static [u16] {
        match self {
            InjectionPoint::Query | InjectionPoint::Header => &[403, 406],
            InjectionPoint::Body | InjectionPoint::Path => &[403],
        }
    }
}

#[derive(Debug)]
struct InjectionConfig {
    url: String,
    payloads: Vec<String>,
    mode: EncodingMode,
    point: InjectionPoint,
    target_params: Vec<String>,
    header_name: String,
    inter_payload_delay: Duration,
}

impl InjectionConfig {
    fn from_spec(spec: &TestSpec) -> ProbeResult<Self> {
        let (default_payloads, default_point, delay_ms) = injection_defaults(spec.test_type);
        let payloads = spec
            .params
            .payload_list
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| default_payloads.iter().map(|p| p.to_string()).collect());
        let point = match spec.params.injection_point.as_deref() {
            Some(name) => InjectionPoint::parse(name)?,
            None => default_point,
        };
        Ok(Self {
            url: spec.target.require_url()?.to_string(),
            payloads,
            mode: EncodingMode::parse(spec.params.encoding_mode.as_deref().unwrap_or("raw")),
            point,
            target_params: spec
                .params
                .target_params
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| vec!["q".to_string()]),
            header_name: spec
                .params
                .header_name
                .clone()
                .unwrap_or_else(|| "X-Payload".to_string()),
            inter_payload_delay: Duration::from_millis(delay_ms),
        })
    }
}

fn injection_defaults(test_type: TestType) -> (&'static [&'static str], InjectionPoint, u64) {
    match test_type {
        TestType::ReflectedXss => (
            &["<script>alert('xss')</script>", "\"><img src=x onerror=alert(1)>"],
            InjectionPoint::Query,
            100,
        ),
        TestType::PathTraversal => (
            &["../../etc/passwd", "..%2F..%2Fetc%2Fpasswd"],
            InjectionPoint::Path,
            80,
        ),
        // SQLi/XSS smoke and any other caller of the shared routine
        _ => (
            &["' OR 1=1--", "<script>alert(1)</script>"],
            InjectionPoint::Query,
            100,
        ),
    }
}

/// Shared routine behind the payload-injection family: encode each payload,
/// place it at the configured injection point, fire, and classify
pub async fn payload_injection(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let cfg = InjectionConfig::from_spec(spec)?;
    debug!(payloads = cfg.payloads.len(), point = ?cfg.point, "Starting payload injection");

    let started = Instant::now();
    for (index, payload) in cfg.payloads.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(cfg.inter_payload_delay).await;
        }
        let encoded = encode_payload(payload, cfg.mode);
        let (method, url, headers, body) = match cfg.point {
            InjectionPoint::Query => {
                let pairs: Vec<(String, String)> = cfg
                    .target_params
                    .iter()
                    .map(|p| (p.clone(), encoded.clone()))
                    .collect();
                ("GET", append_query_params(&cfg.url, &pairs), Vec::new(), None)
            }
            InjectionPoint::Body => {
                let fields: Vec<(String, String)> = cfg
                    .target_params
                    .iter()
                    .map(|p| (p.clone(), encoded.clone()))
                    .collect();
                ("POST", cfg.url.clone(), Vec::new(), Some(RequestBody::Form(fields)))
            }
            InjectionPoint::Header => (
                "GET",
                cfg.url.clone(),
                vec![(cfg.header_name.clone(), encoded.clone())],
                None,
            ),
            InjectionPoint::Path => {
                let url = if cfg.url.contains("{payload}") {
                    cfg.url.replace("{payload}", &encoded)
                } else {
                    format!("{}/{}", cfg.url.trim_end_matches('/'), encoded)
                };
                ("GET", url, Vec::new(), None)
            }
        };

        let outcome = client.execute(method, &url, &headers, body).await;
        sink.request(
            RequestLog::new(method, &url)
                .with_outcome(&outcome)
                .blocked_when(cfg.point.block_codes())
                .with_meta("payload", Some(payload.clone()))
                .with_meta("encoding", Some(format!("{:?}", cfg.mode)))
                .with_meta("injection_point", Some(format!("{:?}", cfg.point))),
        );
    }

    sink.summary(
        "Payload injection finished",
        [
            ("total", cfg.payloads.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// One configurable request with method and header overrides
pub async fn custom_rules(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let method = spec
        .params
        .custom_method
        .clone()
        .unwrap_or_else(|| "GET".to_string());
    let headers: Vec<(String, String)> = spec
        .params
        .custom_headers
        .clone()
        .unwrap_or_default()
        .into_iter()
        .collect();
    let body = spec.params.custom_body.clone().map(|data| RequestBody::Raw {
        content_type: spec
            .params
            .content_type
            .clone()
            .unwrap_or_else(|| "text/plain".to_string()),
        data,
    });

    let started = Instant::now();
    let outcome = client.execute(&method, &url, &headers, body).await;
    sink.request(
        RequestLog::new(&method, &url)
            .with_outcome(&outcome)
            .blocked_when(&[403])
            .with_meta("custom_headers", Some(headers.len().to_string())),
    );
    sink.summary(
        "Custom rules check finished",
        [("total", 1), ("elapsedMs", started.elapsed().as_millis() as i64)],
    );
    Ok(())
}

/// Immediate concurrent volley sized `rps_target * window_sec` to probe an
/// edge rate limiter; 429 counts as blocked
pub async fn edge_rate_limiting(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let rps = spec.params.rps_target.unwrap_or(20) as usize;
    let window = spec.params.window_sec.unwrap_or(5) as usize;
    let total = (rps * window).clamp(1, MAX_RATE_PROBE_REQUESTS);
    if rps * window > total {
        debug!(requested = rps * window, total, "Rate probe volume clamped to ceiling");
    }
    client.ensure_capacity(total).await;

    let started = Instant::now();
    let mut handles = Vec::with_capacity(total);
    for index in 0..total {
        let client = client.clone();
        let sink = sink.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            let outcome = client.get(&url).await;
            sink.request(
                RequestLog::new("GET", &url)
                    .with_outcome(&outcome)
                    .blocked_when(&[429])
                    .with_meta("request_index", Some(index.to_string())),
            );
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    sink.summary(
        "Edge rate limiting finished",
        [
            ("total", total as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Post a synthetic oversized JSON body; 413/403 count as blocked
pub async fn oversized_payload(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let body_size_kb = spec.params.body_size_kb.unwrap_or(256);
    let field_repeats = spec.params.field_repeats.unwrap_or(4);
    let body = build_oversized_json(body_size_kb, field_repeats);

    let started = Instant::now();
    let outcome = client
        .execute("POST", &url, &[], Some(RequestBody::Json(body)))
        .await;
    sink.request(
        RequestLog::new("POST", &url)
            .with_outcome(&outcome)
            .blocked_when(&[413, 403])
            .with_meta("body_size_kb", Some(body_size_kb.to_string()))
            .with_meta("field_repeats", Some(field_repeats.to_string())),
    );
    sink.summary(
        "Oversized payload finished",
        [("total", 1), ("elapsedMs", started.elapsed().as_millis() as i64)],
    );
    Ok(())
}
