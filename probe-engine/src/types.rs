//! Core data types for the probe engine

use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A declarative test plan: an ordered set of probe specifications executed
/// in a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

impl TestPlan {
    /// Decode a plan from JSON. Unknown fields are ignored so that newer
    /// plan documents still load on older engines.
    pub fn from_json(raw: &str) -> ProbeResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The specs that will actually be dispatched, in declared order
    pub fn enabled_tests(&self) -> Vec<&TestSpec> {
        self.tests.iter().filter(|t| t.enabled).collect()
    }
}

/// One probe specification; `(category, test_type)` selects the routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub category: TestCategory,
    #[serde(rename = "type")]
    pub test_type: TestType,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub params: Params,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Probe families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestCategory {
    DdosProtection,
    WebProtection,
    BotManagement,
    ApiProtection,
}

impl TestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::DdosProtection => "DDOS_PROTECTION",
            TestCategory::WebProtection => "WEB_PROTECTION",
            TestCategory::BotManagement => "BOT_MANAGEMENT",
            TestCategory::ApiProtection => "API_PROTECTION",
        }
    }

    /// Human-readable family label used in unsupported-combination events
    pub fn family_label(&self) -> &'static str {
        match self {
            TestCategory::DdosProtection => "DDoS protection",
            TestCategory::WebProtection => "web protection",
            TestCategory::BotManagement => "bot management",
            TestCategory::ApiProtection => "API protection",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe types, one variant per executable routine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    // DDoS / network protection
    HttpFlood,
    IpRegionBlocking,
    TcpPortReachability,
    UdpReachability,
    ConnectionFlood,
    // WAF
    SqliXssSmoke,
    ReflectedXss,
    PathTraversal,
    CustomRules,
    EdgeRateLimiting,
    OversizedPayload,
    // Bot management
    UserAgentAnomaly,
    CookieJsChallenge,
    WebCrawlerSimulation,
    ClientReputation,
    // API protection
    ContextRateLimit,
    AuthenticationTest,
    BruteForce,
    EnumerationIdor,
    SchemaFuzz,
    BusinessLogicAbuse,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::HttpFlood => "HTTP_FLOOD",
            TestType::IpRegionBlocking => "IP_REGION_BLOCKING",
            TestType::TcpPortReachability => "TCP_PORT_REACHABILITY",
            TestType::UdpReachability => "UDP_REACHABILITY",
            TestType::ConnectionFlood => "CONNECTION_FLOOD",
            TestType::SqliXssSmoke => "SQLI_XSS_SMOKE",
            TestType::ReflectedXss => "REFLECTED_XSS",
            TestType::PathTraversal => "PATH_TRAVERSAL",
            TestType::CustomRules => "CUSTOM_RULES",
            TestType::EdgeRateLimiting => "EDGE_RATE_LIMITING",
            TestType::OversizedPayload => "OVERSIZED_PAYLOAD",
            TestType::UserAgentAnomaly => "USER_AGENT_ANOMALY",
            TestType::CookieJsChallenge => "COOKIE_JS_CHALLENGE",
            TestType::WebCrawlerSimulation => "WEB_CRAWLER_SIMULATION",
            TestType::ClientReputation => "CLIENT_REPUTATION",
            TestType::ContextRateLimit => "CONTEXT_RATE_LIMIT",
            TestType::AuthenticationTest => "AUTHENTICATION_TEST",
            TestType::BruteForce => "BRUTE_FORCE",
            TestType::EnumerationIdor => "ENUMERATION_IDOR",
            TestType::SchemaFuzz => "SCHEMA_FUZZ",
            TestType::BusinessLogicAbuse => "BUSINESS_LOGIC_ABUSE",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loose addressing bag; each probe validates the subset it needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port_list: Option<Vec<u16>>,
    #[serde(default)]
    pub endpoint_list: Option<Vec<String>>,
}

impl Target {
    pub fn require_url(&self) -> ProbeResult<&str> {
        self.target_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProbeError::missing("target_url", "probe requires a target URL"))
    }

    pub fn require_host(&self) -> ProbeResult<&str> {
        self.host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProbeError::missing("host", "probe requires a target host"))
    }

    pub fn require_ports(&self) -> ProbeResult<&[u16]> {
        self.port_list
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProbeError::missing("port_list", "probe requires at least one port"))
    }

    pub fn require_endpoints(&self) -> ProbeResult<&[String]> {
        self.endpoint_list
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ProbeError::missing("endpoint_list", "probe requires at least one endpoint")
            })
    }

    /// Resolve an endpoint against the target URL. Absolute endpoints pass
    /// through; relative ones require `target_url` as a base.
    pub fn resolve_endpoint(&self, endpoint: &str) -> ProbeResult<String> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(endpoint.to_string());
        }
        let base = self.require_url()?;
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        ))
    }
}

/// One step of a recorded workflow replayed by the business-logic probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body_template: Option<String>,
}

/// The optional-field parameter bag shared by all probes
///
/// Every field is optional with a probe-local default; probes convert the
/// subset they need into a typed config struct in one validation step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Params {
    // Pacing and volume
    #[serde(default)]
    pub burst_requests: Option<u32>,
    #[serde(default)]
    pub burst_interval_ms: Option<u64>,
    #[serde(default)]
    pub burst_pattern: Option<String>,
    #[serde(default)]
    pub sustained_window_sec: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<u32>,
    #[serde(default)]
    pub connect_rate: Option<u32>,
    #[serde(default)]
    pub rps_target: Option<u32>,
    #[serde(default)]
    pub window_sec: Option<u64>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub attempts_per_minute: Option<u32>,
    #[serde(default)]
    pub total_requests: Option<u32>,
    #[serde(default)]
    pub parallel_users: Option<u32>,

    // Payload shaping
    #[serde(default)]
    pub payload_list: Option<Vec<String>>,
    #[serde(default)]
    pub encoding_mode: Option<String>,
    #[serde(default)]
    pub injection_point: Option<String>,
    #[serde(default)]
    pub target_params: Option<Vec<String>>,
    #[serde(default)]
    pub header_name: Option<String>,
    #[serde(default)]
    pub body_size_kb: Option<u32>,
    #[serde(default)]
    pub field_repeats: Option<u32>,
    #[serde(default)]
    pub udp_payload: Option<String>,
    #[serde(default)]
    pub fuzz_cases: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub custom_method: Option<String>,
    #[serde(default)]
    pub custom_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub custom_body: Option<String>,

    // Identity rotation
    #[serde(default)]
    pub ua_profiles: Option<Vec<String>>,
    #[serde(default)]
    pub humanized_delay: Option<bool>,
    #[serde(default)]
    pub cookie_policy: Option<String>,
    #[serde(default)]
    pub token_list: Option<Vec<String>>,
    #[serde(default)]
    pub tokens: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub auth_header_mode: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password_list: Option<Vec<String>>,
    #[serde(default)]
    pub use_vpn: Option<bool>,
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    #[serde(default)]
    pub rotation_delay_ms: Option<u64>,

    // Workflow replay
    #[serde(default)]
    pub workflow_steps: Option<Vec<WorkflowStep>>,
    #[serde(default)]
    pub replay_count: Option<u32>,

    // Iteration
    #[serde(default)]
    pub enum_template: Option<String>,
    #[serde(default)]
    pub id_range: Option<Vec<i64>>,
    #[serde(default)]
    pub step_size: Option<i64>,
    #[serde(default)]
    pub crawl_depth: Option<u32>,
    #[serde(default)]
    pub page_list: Option<Vec<String>>,
}

impl Params {
    pub fn require_workflow(&self) -> ProbeResult<&[WorkflowStep]> {
        self.workflow_steps
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProbeError::missing("workflow_steps", "probe requires at least one workflow step")
            })
    }

    /// The inclusive `[start, end]` id range for enumeration probes
    pub fn require_id_range(&self) -> ProbeResult<(i64, i64)> {
        let range = self
            .id_range
            .as_deref()
            .ok_or_else(|| ProbeError::missing("id_range", "probe requires an id range"))?;
        match range {
            [start, end] if start <= end => Ok((*start, *end)),
            [_, _] => Err(ProbeError::invalid("id_range", "start must not exceed end")),
            _ => Err(ProbeError::invalid("id_range", "expected exactly [start, end]")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_decodes_and_ignores_unknown_fields() {
        let raw = r#"{
            "name": "smoke",
            "description": "quick pass",
            "future_field": {"nested": true},
            "tests": [
                {
                    "category": "DDOS_PROTECTION",
                    "type": "HTTP_FLOOD",
                    "target": {"target_url": "http://example.test", "extra": 1},
                    "params": {"burst_requests": 5, "unknown_knob": "x"}
                }
            ]
        }"#;
        let plan = TestPlan::from_json(raw).unwrap();
        assert_eq!(plan.name, "smoke");
        assert_eq!(plan.tests.len(), 1);
        let spec = &plan.tests[0];
        assert_eq!(spec.category, TestCategory::DdosProtection);
        assert_eq!(spec.test_type, TestType::HttpFlood);
        assert_eq!(spec.params.burst_requests, Some(5));
        assert!(spec.enabled, "enabled defaults to true");
    }

    #[test]
    fn test_disabled_spec_decodes() {
        let raw = r#"{
            "name": "p",
            "tests": [
                {"category": "API_PROTECTION", "type": "BRUTE_FORCE", "enabled": false}
            ]
        }"#;
        let plan = TestPlan::from_json(raw).unwrap();
        assert!(!plan.tests[0].enabled);
        assert!(plan.enabled_tests().is_empty());
    }

    #[test]
    fn test_category_and_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TestCategory::BotManagement).unwrap(),
            "\"BOT_MANAGEMENT\""
        );
        assert_eq!(
            serde_json::to_string(&TestType::SqliXssSmoke).unwrap(),
            "\"SQLI_XSS_SMOKE\""
        );
        assert_eq!(TestType::EdgeRateLimiting.to_string(), "EDGE_RATE_LIMITING");
    }

    #[test]
    fn test_target_required_fields() {
        let target = Target::default();
        assert!(target.require_url().is_err());
        assert!(target.require_host().is_err());
        assert!(target.require_ports().is_err());

        let target = Target {
            target_url: Some("http://example.test/".to_string()),
            ..Default::default()
        };
        assert_eq!(target.require_url().unwrap(), "http://example.test/");
        assert_eq!(
            target.resolve_endpoint("/login").unwrap(),
            "http://example.test/login"
        );
        assert_eq!(
            target.resolve_endpoint("https://other.test/x").unwrap(),
            "https://other.test/x"
        );
    }

    #[test]
    fn test_id_range_validation() {
        let params = Params {
            id_range: Some(vec![1, 5]),
            ..Default::default()
        };
        assert_eq!(params.require_id_range().unwrap(), (1, 5));

        let params = Params {
            id_range: Some(vec![5, 1]),
            ..Default::default()
        };
        assert!(params.require_id_range().is_err());

        let params = Params {
            id_range: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        assert!(params.require_id_range().is_err());

        assert!(Params::default().require_id_range().is_err());
    }
}
