//! API-protection probes

use crate::encoding::mask_secret;
use crate::error::{ProbeError, ProbeResult};
use crate::events::{EventSink, RequestLog};
use crate::http::{ProbeClient, RequestBody};
use crate::pacing::{clamp_concurrency, rate_interval, PermitGate};
use crate::types::TestSpec;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Worker ceiling for the context-aware rate-limit probe
const MAX_PARALLEL_USERS: usize = 32;

/// Concurrency ceiling for the brute-force spray
const MAX_BRUTE_FORCE_CONCURRENCY: usize = 16;

/// Largest id walk the enumeration probe will perform
const MAX_ENUMERATION_IDS: i64 = 1000;

/// Pacing delay between sequential enumeration requests
const ENUMERATION_SPACING: Duration = Duration::from_millis(80);

struct RateLimitConfig {
    endpoints: Vec<String>,
    users: usize,
    rounds: usize,
    tokens: Vec<String>,
    round_pause: Duration,
}

impl RateLimitConfig {
    fn from_spec(spec: &TestSpec) -> ProbeResult<Self> {
        let endpoints = spec
            .target
            .require_endpoints()?
            .iter()
            .map(|e| spec.target.resolve_endpoint(e))
            .collect::<ProbeResult<Vec<_>>>()?;
        let users = clamp_concurrency(
            spec.params.parallel_users.unwrap_or(3) as usize,
            MAX_PARALLEL_USERS,
        );
        let total = spec.params.total_requests.unwrap_or(30) as usize;
        Ok(Self {
            endpoints,
            users,
            rounds: (total / users).max(1),
            tokens: spec.params.token_list.clone().unwrap_or_default(),
            round_pause: rate_interval(spec.params.rps_target.unwrap_or(5)),
        })
    }
}

/// Parallel per-user rounds across every listed endpoint, each user tagged
/// with its own bearer token when one is provided
pub async fn context_rate_limit(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let cfg = RateLimitConfig::from_spec(spec)?;
    client.ensure_capacity(cfg.users).await;
    debug!(users = cfg.users, rounds = cfg.rounds, endpoints = cfg.endpoints.len(), "Starting context rate limit");

    let attempts = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    let mut handles = Vec::with_capacity(cfg.users);
    for user in 0..cfg.users {
        let client = client.clone();
        let sink = sink.clone();
        let endpoints = cfg.endpoints.clone();
        let token = cfg.tokens.get(user % cfg.tokens.len().max(1)).cloned();
        let attempts = attempts.clone();
        let rounds = cfg.rounds;
        let pause = cfg.round_pause;
        handles.push(tokio::spawn(async move {
            for round in 0..rounds {
                for url in &endpoints {
                    let headers = match &token {
                        Some(t) => vec![("Authorization".to_string(), format!("Bearer {t}"))],
                        None => Vec::new(),
                    };
                    let outcome = client.execute("GET", url, &headers, None).await;
                    attempts.fetch_add(1, Ordering::Relaxed);
                    sink.request(
                        RequestLog::new("GET", url)
                            .with_outcome(&outcome)
                            .blocked_when(&[429])
                            .with_meta("user", Some(user.to_string()))
                            .with_meta("round", Some(round.to_string())),
                    );
                }
                tokio::time::sleep(pause).await;
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    sink.summary(
        "Context rate limit finished",
        [
            ("total", attempts.load(Ordering::Relaxed) as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Token presentation cases for the authentication matrix
const TOKEN_CASES: &[&str] = &["valid", "expired", "malformed", "missing"];

fn credential_for_case(case: &str, token: &str) -> Option<String> {
    match case {
        "valid" => Some(token.to_string()),
        "expired" => Some(format!("{token}-expired")),
        "malformed" => Some("not.a.valid.token".to_string()),
        _ => None,
    }
}

fn auth_headers(mode: &str, credential: &Option<String>) -> Vec<(String, String)> {
    let Some(credential) = credential else {
        return Vec::new();
    };
    let mut headers = Vec::new();
    if mode == "header" || mode == "both" {
        headers.push(("Authorization".to_string(), format!("Bearer {credential}")));
    }
    if mode == "cookie" || mode == "both" {
        headers.push(("Cookie".to_string(), format!("session={credential}")));
    }
    headers
}

/// Full matrix of endpoints x token cases, credential placed per the
/// configured auth header mode
pub async fn authentication_test(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let endpoints = spec
        .target
        .require_endpoints()?
        .iter()
        .map(|e| spec.target.resolve_endpoint(e))
        .collect::<ProbeResult<Vec<_>>>()?;
    let token = spec
        .params
        .auth_token
        .clone()
        .or_else(|| spec.params.token_list.as_ref().and_then(|t| t.first().cloned()))
        .unwrap_or_else(|| "test-token".to_string());
    let mode = spec
        .params
        .auth_header_mode
        .clone()
        .unwrap_or_else(|| "header".to_string());

    let started = Instant::now();
    let mut total = 0i64;
    for url in &endpoints {
        for case in TOKEN_CASES {
            if total > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let credential = credential_for_case(case, &token);
            let headers = auth_headers(&mode, &credential);
            let outcome = client.execute("GET", url, &headers, None).await;
            total += 1;
            sink.request(
                RequestLog::new("GET", url)
                    .with_outcome(&outcome)
                    .blocked_when(&[401, 403])
                    .with_meta("token_case", Some(case.to_string()))
                    .with_meta("auth_mode", Some(mode.clone())),
            );
        }
    }

    sink.summary(
        "Authentication test finished",
        [
            ("total", total),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

struct BruteForceConfig {
    url: String,
    username: String,
    passwords: Vec<String>,
    concurrency: usize,
    attempt_pause: Duration,
}

impl BruteForceConfig {
    fn from_spec(spec: &TestSpec) -> ProbeResult<Self> {
        let url = match spec.target.target_url.as_deref() {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => {
                let endpoints = spec.target.require_endpoints()?;
                spec.target.resolve_endpoint(&endpoints[0])?
            }
        };
        let apm = u64::from(spec.params.attempts_per_minute.unwrap_or(60).max(1));
        Ok(Self {
            url,
            username: spec
                .params
                .username
                .clone()
                .unwrap_or_else(|| "admin".to_string()),
            passwords: spec.params.password_list.clone().unwrap_or_else(|| {
                ["admin", "password", "123456", "letmein"]
                    .iter()
                    .map(|p| p.to_string())
                    .collect()
            }),
            concurrency: clamp_concurrency(
                spec.params.concurrency.unwrap_or(4) as usize,
                MAX_BRUTE_FORCE_CONCURRENCY,
            ),
            attempt_pause: Duration::from_millis((60_000 / apm).max(50)),
        })
    }
}

/// Password spray with bounded concurrency and a pacing floor; credentials
/// never reach the event stream in full
pub async fn brute_force(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let cfg = BruteForceConfig::from_spec(spec)?;
    client.ensure_capacity(cfg.concurrency).await;
    debug!(attempts = cfg.passwords.len(), pause_ms = cfg.attempt_pause.as_millis() as u64, "Starting brute force spray");

    let gate = PermitGate::new(cfg.concurrency);
    let started = Instant::now();
    let mut handles = Vec::with_capacity(cfg.passwords.len());
    for (index, password) in cfg.passwords.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(cfg.attempt_pause).await;
        }
        let Some(permit) = gate.acquire().await else {
            break;
        };
        let client = client.clone();
        let sink = sink.clone();
        let url = cfg.url.clone();
        let username = cfg.username.clone();
        let password = password.clone();
        handles.push(tokio::spawn(async move {
            let form = vec![
                ("username".to_string(), username.clone()),
                ("password".to_string(), password.clone()),
            ];
            let outcome = client
                .execute("POST", &url, &[], Some(RequestBody::Form(form)))
                .await;
            sink.request(
                RequestLog::new("POST", &url)
                    .with_outcome(&outcome)
                    .blocked_when(&[403, 429])
                    .with_meta("username", Some(username))
                    .with_meta("password", Some(mask_secret(&password)))
                    .with_meta("attempt", Some(index.to_string())),
            );
            drop(permit);
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    sink.summary(
        "Brute force finished",
        [
            ("total", cfg.passwords.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

struct EnumerationConfig {
    template: String,
    start: i64,
    end: i64,
    step: i64,
}

impl EnumerationConfig {
    fn from_spec(spec: &TestSpec) -> ProbeResult<Self> {
        let template = match spec.params.enum_template.as_deref() {
            Some(t) if !t.is_empty() => spec.target.resolve_endpoint(t)?,
            _ => {
                let url = spec.target.require_url()?;
                if !url.contains("{id}") {
                    return Err(ProbeError::missing(
                        "enum_template",
                        "probe requires a template containing {id}",
                    ));
                }
                url.to_string()
            }
        };
        if !template.contains("{id}") {
            return Err(ProbeError::invalid(
                "enum_template",
                "template must contain an {id} placeholder",
            ));
        }
        let (start, end) = spec.params.require_id_range()?;
        let step = spec.params.step_size.unwrap_or(1);
        if step <= 0 {
            return Err(ProbeError::invalid("step_size", "must be positive"));
        }
        let count = (end - start) / step + 1;
        if count > MAX_ENUMERATION_IDS {
            return Err(ProbeError::invalid(
                "id_range",
                &format!("walk of {count} ids exceeds the {MAX_ENUMERATION_IDS} ceiling"),
            ));
        }
        Ok(Self {
            template,
            start,
            end,
            step,
        })
    }
}

/// Sequential walk over an inclusive id range, substituting `{id}` into the
/// template path
pub async fn enumeration_idor(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let cfg = EnumerationConfig::from_spec(spec)?;

    let started = Instant::now();
    let mut total = 0i64;
    let mut id = cfg.start;
    while id <= cfg.end {
        if total > 0 {
            tokio::time::sleep(ENUMERATION_SPACING).await;
        }
        let url = cfg.template.replace("{id}", &id.to_string());
        let outcome = client.get(&url).await;
        total += 1;
        sink.request(
            RequestLog::new("GET", &url)
                .with_outcome(&outcome)
                .blocked_when(&[403])
                .with_meta("id", Some(id.to_string())),
        );
        id += cfg.step;
    }

    sink.summary(
        "Enumeration finished",
        [
            ("total", total),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Structurally invalid bodies used when the spec supplies no fuzz cases
fn default_fuzz_cases() -> Vec<serde_json::Value> {
    vec![
        serde_json::Value::Null,
        json!(12345),
        json!({ "padding": "A".repeat(16 * 1024) }),
    ]
}

/// Post structurally invalid bodies against one content type
pub async fn schema_fuzz(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let content_type = spec
        .params
        .content_type
        .clone()
        .unwrap_or_else(|| "application/json".to_string());
    let cases = spec
        .params
        .fuzz_cases
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(default_fuzz_cases);

    let started = Instant::now();
    for (index, case) in cases.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let body = RequestBody::Raw {
            content_type: content_type.clone(),
            data: case.to_string(),
        };
        let outcome = client.execute("POST", &url, &[], Some(body)).await;
        sink.request(
            RequestLog::new("POST", &url)
                .with_outcome(&outcome)
                .blocked_when(&[403, 406])
                .with_meta("case_index", Some(index.to_string()))
                .with_meta("content_type", Some(content_type.clone())),
        );
    }

    sink.summary(
        "Schema fuzz finished",
        [
            ("total", cases.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Replay an ordered workflow `replay_count` times with a configurable
/// inter-step delay; the only probe issuing a declared non-GET sequence
pub async fn business_logic_abuse(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let steps = spec.params.require_workflow()?.to_vec();
    let replay_count = spec.params.replay_count.unwrap_or(1).max(1);
    let step_pause = Duration::from_millis(spec.params.request_delay_ms.unwrap_or(200));

    let started = Instant::now();
    let mut total = 0i64;
    for replay in 0..replay_count {
        for (step_index, step) in steps.iter().enumerate() {
            if total > 0 {
                tokio::time::sleep(step_pause).await;
            }
            let url = spec.target.resolve_endpoint(&step.endpoint)?;
            let headers: Vec<(String, String)> = step
                .headers
                .clone()
                .unwrap_or_default()
                .into_iter()
                .collect();
            let body = step.body_template.clone().map(|data| RequestBody::Raw {
                content_type: "application/json".to_string(),
                data,
            });
            let outcome = client.execute(&step.method, &url, &headers, body).await;
            total += 1;
            sink.request(
                RequestLog::new(&step.method, &url)
                    .with_outcome(&outcome)
                    .blocked_when(&[403, 429])
                    .with_meta("replay", Some(replay.to_string()))
                    .with_meta("step", Some(step_index.to_string())),
            );
        }
    }

    sink.summary(
        "Business logic abuse finished",
        [
            ("total", total),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Params, Target, TestCategory, TestType};

    fn api_spec(target: Target, params: Params) -> TestSpec {
        TestSpec {
            category: TestCategory::ApiProtection,
            test_type: TestType::EnumerationIdor,
            target,
            params,
            enabled: true,
        }
    }

    fn url_target(url: &str) -> Target {
        Target {
            target_url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_credential_cases() {
        assert_eq!(
            credential_for_case("valid", "tok").as_deref(),
            Some("tok")
        );
        assert_eq!(
            credential_for_case("expired", "tok").as_deref(),
            Some("tok-expired")
        );
        assert_eq!(
            credential_for_case("malformed", "tok").as_deref(),
            Some("not.a.valid.token")
        );
        assert!(credential_for_case("missing", "tok").is_none());
    }

    #[test]
    fn test_auth_header_placement() {
        let credential = Some("tok".to_string());
        let header_only = auth_headers("header", &credential);
        assert_eq!(header_only.len(), 1);
        assert_eq!(header_only[0].1, "Bearer tok");

        let cookie_only = auth_headers("cookie", &credential);
        assert_eq!(cookie_only[0].1, "session=tok");

        assert_eq!(auth_headers("both", &credential).len(), 2);
        assert!(auth_headers("header", &None).is_empty());
    }

    #[test]
    fn test_enumeration_config_validation() {
        let spec = api_spec(
            url_target("http://example.test"),
            Params {
                enum_template: Some("/api/object/{id}".to_string()),
                id_range: Some(vec![1, 5]),
                step_size: Some(1),
                ..Default::default()
            },
        );
        let cfg = EnumerationConfig::from_spec(&spec).unwrap();
        assert_eq!(cfg.template, "http://example.test/api/object/{id}");
        assert_eq!((cfg.start, cfg.end, cfg.step), (1, 5, 1));

        // Zero and negative steps are spec errors, not infinite loops.
        let spec = api_spec(
            url_target("http://example.test"),
            Params {
                enum_template: Some("/api/object/{id}".to_string()),
                id_range: Some(vec![1, 5]),
                step_size: Some(0),
                ..Default::default()
            },
        );
        assert!(EnumerationConfig::from_spec(&spec).is_err());

        // Templates without a placeholder are rejected up front.
        let spec = api_spec(
            url_target("http://example.test"),
            Params {
                enum_template: Some("/api/object".to_string()),
                id_range: Some(vec![1, 5]),
                ..Default::default()
            },
        );
        assert!(EnumerationConfig::from_spec(&spec).is_err());

        // Oversized walks hit the ceiling.
        let spec = api_spec(
            url_target("http://example.test"),
            Params {
                enum_template: Some("/api/object/{id}".to_string()),
                id_range: Some(vec![1, 100_000]),
                ..Default::default()
            },
        );
        assert!(EnumerationConfig::from_spec(&spec).is_err());
    }

    #[test]
    fn test_brute_force_pacing_floor() {
        let spec = api_spec(
            url_target("http://example.test/login"),
            Params {
                attempts_per_minute: Some(6000),
                ..Default::default()
            },
        );
        let cfg = BruteForceConfig::from_spec(&spec).unwrap();
        // 60000/6000 = 10ms, floored at 50ms.
        assert_eq!(cfg.attempt_pause, Duration::from_millis(50));

        let spec = api_spec(
            url_target("http://example.test/login"),
            Params {
                attempts_per_minute: Some(30),
                ..Default::default()
            },
        );
        let cfg = BruteForceConfig::from_spec(&spec).unwrap();
        assert_eq!(cfg.attempt_pause, Duration::from_millis(2000));
    }

    #[test]
    fn test_default_fuzz_cases_are_structurally_invalid() {
        let cases = default_fuzz_cases();
        assert_eq!(cases.len(), 3);
        assert!(cases[0].is_null());
        assert!(cases[1].is_number());
        assert!(cases[2]["padding"].as_str().unwrap().len() >= 16 * 1024);
    }

    #[test]
    fn test_rate_limit_config_rounds() {
        let spec = api_spec(
            Target {
                target_url: Some("http://example.test".to_string()),
                endpoint_list: Some(vec!["/api/a".to_string()]),
                ..Default::default()
            },
            Params {
                parallel_users: Some(2),
                total_requests: Some(10),
                ..Default::default()
            },
        );
        let cfg = RateLimitConfig::from_spec(&spec).unwrap();
        assert_eq!(cfg.users, 2);
        assert_eq!(cfg.rounds, 5);
        assert_eq!(cfg.endpoints, vec!["http://example.test/api/a"]);
    }
}
