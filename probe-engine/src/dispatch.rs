//! Category dispatcher: routes a spec to its probe routine
//!
//! Unknown `(category, type)` combinations are not errors; they produce an
//! `Info` event and return without side effects.

use crate::error::ProbeResult;
use crate::events::EventSink;
use crate::http::ProbeClient;
use crate::probes::{api, bot, ddos, waf};
use crate::types::{TestCategory, TestSpec, TestType};
use tracing::debug;

/// Execute the probe selected by `(category, type)`
pub async fn dispatch(
    spec: &TestSpec,
    client: &ProbeClient,
    sink: &EventSink,
) -> ProbeResult<()> {
    use TestCategory::*;
    use TestType::*;

    debug!(category = %spec.category, test_type = %spec.test_type, "Dispatching probe");
    match (spec.category, spec.test_type) {
        (DdosProtection, HttpFlood) => ddos::http_flood(spec, client, sink).await,
        (DdosProtection, IpRegionBlocking) => ddos::ip_region_blocking(spec, client, sink).await,
        (DdosProtection, TcpPortReachability) => {
            ddos::tcp_port_reachability(spec, client, sink).await
        }
        (DdosProtection, UdpReachability) => ddos::udp_reachability(spec, client, sink).await,
        (DdosProtection, ConnectionFlood) => ddos::connection_flood(spec, client, sink).await,

        (WebProtection, SqliXssSmoke | ReflectedXss | PathTraversal) => {
            waf::payload_injection(spec, client, sink).await
        }
        (WebProtection, CustomRules) => waf::custom_rules(spec, client, sink).await,
        (WebProtection, EdgeRateLimiting) => waf::edge_rate_limiting(spec, client, sink).await,
        (WebProtection, OversizedPayload) => waf::oversized_payload(spec, client, sink).await,

        (BotManagement, UserAgentAnomaly) => bot::user_agent_anomaly(spec, client, sink).await,
        (BotManagement, CookieJsChallenge) => bot::cookie_js_challenge(spec, client, sink).await,
        (BotManagement, WebCrawlerSimulation) => {
            bot::web_crawler_simulation(spec, client, sink).await
        }
        (BotManagement, ClientReputation) => bot::client_reputation(spec, client, sink).await,

        (ApiProtection, ContextRateLimit) => api::context_rate_limit(spec, client, sink).await,
        (ApiProtection, AuthenticationTest) => api::authentication_test(spec, client, sink).await,
        (ApiProtection, BruteForce) => api::brute_force(spec, client, sink).await,
        (ApiProtection, EnumerationIdor) => api::enumeration_idor(spec, client, sink).await,
        (ApiProtection, SchemaFuzz) => api::schema_fuzz(spec, client, sink).await,
        (ApiProtection, BusinessLogicAbuse) => {
            api::business_logic_abuse(spec, client, sink).await
        }

        (category, test_type) => {
            sink.info(format!(
                "Unsupported {} type: {}",
                category.family_label(),
                test_type
            ));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogEvent;
    use crate::types::{Params, Target};

    #[tokio::test]
    async fn test_unsupported_combination_emits_info() {
        let client = ProbeClient::new().unwrap();
        let (sink, mut rx) = EventSink::channel();
        let spec = TestSpec {
            category: TestCategory::DdosProtection,
            test_type: TestType::BruteForce,
            target: Target::default(),
            params: Params::default(),
            enabled: true,
        };

        dispatch(&spec, &client, &sink).await.unwrap();
        drop(sink);

        let event = rx.recv().await.unwrap();
        match event {
            LogEvent::Info { message } => {
                assert_eq!(message, "Unsupported DDoS protection type: BRUTE_FORCE");
            }
            other => panic!("expected Info event, got {other:?}"),
        }
        assert!(rx.recv().await.is_none(), "no further events expected");
    }

    #[tokio::test]
    async fn test_supported_combination_with_missing_target_errors() {
        let client = ProbeClient::new().unwrap();
        let (sink, _rx) = EventSink::channel();
        let spec = TestSpec {
            category: TestCategory::DdosProtection,
            test_type: TestType::HttpFlood,
            target: Target::default(),
            params: Params::default(),
            enabled: true,
        };

        let err = dispatch(&spec, &client, &sink).await.unwrap_err();
        assert!(err.is_spec_error());
    }
}
