//! Bot-management probes

use crate::error::ProbeResult;
use crate::events::{EventSink, RequestLog};
use crate::frontier::CrawlFrontier;
use crate::http::ProbeClient;
use crate::types::TestSpec;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

/// User agents that anomaly detection commonly flags
const DEFAULT_UA_PROFILES: &[&str] = &[
    "curl/8.5.0",
    "python-requests/2.31.0",
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
];

/// Region rotation order for the reputation probe
const DEFAULT_REGIONS: &[&str] = &["SG", "US", "EU"];

fn ua_profiles(spec: &TestSpec) -> Vec<String> {
    spec.params
        .ua_profiles
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_UA_PROFILES.iter().map(|u| u.to_string()).collect())
}

/// One GET per user-agent string, optionally with a humanized random delay
pub async fn user_agent_anomaly(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let profiles = ua_profiles(spec);
    let humanized = spec.params.humanized_delay.unwrap_or(false);

    let started = Instant::now();
    for (index, ua) in profiles.iter().enumerate() {
        if index > 0 {
            let delay_ms = if humanized {
                rand::thread_rng().gen_range(100..=400)
            } else {
                100
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let headers = vec![("User-Agent".to_string(), ua.clone())];
        let outcome = client.execute("GET", &url, &headers, None).await;
        sink.request(
            RequestLog::new("GET", &url)
                .with_outcome(&outcome)
                .blocked_when(&[403, 429])
                .with_meta("user_agent", Some(ua.clone())),
        );
    }

    sink.summary(
        "User-agent anomaly finished",
        [
            ("total", profiles.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Iterate user agents against a challenge-protected page, with a
/// cookie-jar-backed client when the spec enables cookie handling
pub async fn cookie_js_challenge(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let profiles = ua_profiles(spec);
    let cookie_policy = spec
        .params
        .cookie_policy
        .clone()
        .unwrap_or_else(|| "disabled".to_string());
    // A jar-backed client lets a challenge cookie issued on the first
    // response ride along on the following attempts.
    let effective_client = if cookie_policy == "enabled" {
        ProbeClient::with_cookie_jar()?
    } else {
        client.clone()
    };

    let started = Instant::now();
    for (index, ua) in profiles.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let headers = vec![("User-Agent".to_string(), ua.clone())];
        let outcome = effective_client.execute("GET", &url, &headers, None).await;
        sink.request(
            RequestLog::new("GET", &url)
                .with_outcome(&outcome)
                .blocked_when(&[403, 401])
                .with_meta("user_agent", Some(ua.clone()))
                .with_meta("cookie_policy", Some(cookie_policy.clone())),
        );
    }

    sink.summary(
        "Cookie/JS challenge finished",
        [
            ("total", profiles.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Breadth-first crawl simulation over the seed URL and any configured
/// page list
///
/// Structural stub: the frontier never grows from response content - no
/// HTML parsing or link extraction happens here. Depth stays hard-capped
/// at 2 regardless of the requested `crawl_depth`.
pub async fn web_crawler_simulation(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let seed = spec.target.require_url()?.to_string();
    let mut frontier = CrawlFrontier::new(spec.params.crawl_depth.unwrap_or(1));
    frontier.push(&seed, 0);
    for page in spec.params.page_list.clone().unwrap_or_default() {
        match url::Url::parse(&seed).and_then(|base| base.join(&page)) {
            Ok(joined) => {
                frontier.push(joined.as_str(), 0);
            }
            Err(e) => debug!(page = %page, "Skipping unjoinable crawl seed: {}", e),
        }
    }

    let started = Instant::now();
    let mut fetched = 0i64;
    while let Some((url, depth)) = frontier.pop() {
        if fetched > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let outcome = client.get(&url).await;
        fetched += 1;
        sink.request(
            RequestLog::new("GET", &url)
                .with_outcome(&outcome)
                .blocked_when(&[403, 429])
                .with_meta("depth", Some(depth.to_string())),
        );
    }

    sink.summary(
        "Web crawler simulation finished",
        [
            ("total", fetched),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

/// Spoofed-origin prefix for a region; unknown regions fall back to a
/// documentation range
fn region_prefix(region: &str) -> &'static str {
    match region {
        "SG" => "203.117",
        "US" => "34.201",
        "EU" => "185.60",
        _ => "198.51",
    }
}

/// Rotate through regions, spoofing `X-Forwarded-For` from a
/// region-associated prefix with randomized host octets
pub async fn client_reputation(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    let url = spec.target.require_url()?.to_string();
    let regions = spec
        .params
        .regions
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect());
    let rotation_delay = Duration::from_millis(spec.params.rotation_delay_ms.unwrap_or(1000));

    let started = Instant::now();
    for (index, region) in regions.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(rotation_delay).await;
        }
        let spoofed_ip = {
            let mut rng = rand::thread_rng();
            format!(
                "{}.{}.{}",
                region_prefix(region),
                rng.gen_range(1..=254),
                rng.gen_range(1..=254)
            )
        };
        let headers = vec![("X-Forwarded-For".to_string(), spoofed_ip.clone())];
        let outcome = client.execute("GET", &url, &headers, None).await;
        sink.request(
            RequestLog::new("GET", &url)
                .with_outcome(&outcome)
                .blocked_when(&[403, 429])
                .with_meta("region", Some(region.clone()))
                .with_meta("spoofed_ip", Some(spoofed_ip)),
        );
    }

    sink.summary(
        "Client reputation finished",
        [
            ("total", regions.len() as i64),
            ("elapsedMs", started.elapsed().as_millis() as i64),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ua_profiles_cover_known_bots() {
        assert!(DEFAULT_UA_PROFILES.iter().any(|u| u.starts_with("curl")));
        assert!(DEFAULT_UA_PROFILES
            .iter()
            .any(|u| u.contains("python-requests")));
        assert!(DEFAULT_UA_PROFILES.iter().any(|u| u.contains("Googlebot")));
    }

    #[test]
    fn test_region_prefixes() {
        assert_eq!(region_prefix("SG"), "203.117");
        assert_eq!(region_prefix("US"), "34.201");
        assert_eq!(region_prefix("EU"), "185.60");
        // Unknown regions land in a documentation prefix, never a real one.
        assert_eq!(region_prefix("MARS"), "198.51");
    }

    #[test]
    fn test_spoofed_ip_shape() {
        let mut rng = rand::thread_rng();
        let ip = format!(
            "{}.{}.{}",
            region_prefix("SG"),
            rng.gen_range(1..=254),
            rng.gen_range(1..=254)
        );
        assert_eq!(ip.split('.').count(), 4);
        assert!(ip.starts_with("203.117."));
    }
}
