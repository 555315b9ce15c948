//! Plan-runner behavior: spec filtering, failure isolation, progress labels

use probe_engine::{LogEvent, Params, Target, TestCategory, TestPlan, TestType};
use workspace_tests::{
    plan_summary, request_logs, run_plan_and_collect, spawn_target_server, spec, url_target,
};

#[tokio::test]
async fn test_disabled_specs_are_never_dispatched() {
    let base = spawn_target_server().await;

    let mut disabled = spec(
        TestCategory::DdosProtection,
        TestType::HttpFlood,
        url_target(&format!("{base}/")),
        Params {
            burst_requests: Some(3),
            burst_interval_ms: Some(1),
            ..Default::default()
        },
    );
    disabled.enabled = false;

    let enabled = spec(
        TestCategory::BotManagement,
        TestType::UserAgentAnomaly,
        url_target(&format!("{base}/")),
        Params {
            ua_profiles: Some(vec!["curl/8.5.0".to_string()]),
            ..Default::default()
        },
    );

    let plan = TestPlan {
        name: "filtering".to_string(),
        description: None,
        tests: vec![disabled, enabled],
    };
    let events = run_plan_and_collect(&plan).await;

    // Only the enabled spec produced traffic.
    let logs = request_logs(&events);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].metadata.get("user_agent").unwrap().as_deref(), Some("curl/8.5.0"));

    // testsExecuted counts enabled specs only.
    match plan_summary(&events).unwrap() {
        LogEvent::Summary { totals, .. } => {
            assert_eq!(totals.get("testsExecuted"), Some(&1));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_progress_labels_use_the_filtered_list_on_both_sides() {
    let base = spawn_target_server().await;

    let mut tests = Vec::new();
    for _ in 0..2 {
        let mut disabled = spec(
            TestCategory::DdosProtection,
            TestType::HttpFlood,
            url_target(&format!("{base}/")),
            Params::default(),
        );
        disabled.enabled = false;
        tests.push(disabled);
    }
    tests.push(spec(
        TestCategory::BotManagement,
        TestType::UserAgentAnomaly,
        url_target(&format!("{base}/")),
        Params {
            ua_profiles: Some(vec!["curl/8.5.0".to_string()]),
            ..Default::default()
        },
    ));

    let plan = TestPlan {
        name: "progress".to_string(),
        description: None,
        tests,
    };
    let events = run_plan_and_collect(&plan).await;

    // Index and denominator are both computed over the enabled-only list:
    // one enabled spec out of three total reads [1/1], never [1/3].
    let progress: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            LogEvent::Info { message } if message.starts_with('[') => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec!["[1/1] BOT_MANAGEMENT - USER_AGENT_ANOMALY"]
    );
}

#[tokio::test]
async fn test_spec_failure_is_isolated_and_run_reaches_summary() {
    let base = spawn_target_server().await;

    // First spec is missing its target URL; second is valid.
    let broken = spec(
        TestCategory::DdosProtection,
        TestType::HttpFlood,
        Target::default(),
        Params::default(),
    );
    let healthy = spec(
        TestCategory::ApiProtection,
        TestType::EnumerationIdor,
        url_target(&base),
        Params {
            enum_template: Some("/api/items/{id}".to_string()),
            id_range: Some(vec![1, 2]),
            step_size: Some(1),
            ..Default::default()
        },
    );

    let plan = TestPlan {
        name: "isolation".to_string(),
        description: None,
        tests: vec![broken, healthy],
    };
    let events = run_plan_and_collect(&plan).await;

    let errors: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            LogEvent::Error { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1, "exactly one Error event for the broken spec");
    assert!(errors[0].contains("target_url"));

    // The healthy spec still ran, and the run reached its terminal summary.
    assert_eq!(request_logs(&events).len(), 2);
    match plan_summary(&events).unwrap() {
        LogEvent::Summary { totals, .. } => {
            assert_eq!(totals.get("testsExecuted"), Some(&2));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_unsupported_combination_is_informational() {
    let base = spawn_target_server().await;

    let mismatched = spec(
        TestCategory::WebProtection,
        TestType::BruteForce,
        url_target(&base),
        Params::default(),
    );
    let plan = TestPlan {
        name: "unsupported".to_string(),
        description: None,
        tests: vec![mismatched],
    };
    let events = run_plan_and_collect(&plan).await;

    assert!(events.iter().any(|event| matches!(
        event,
        LogEvent::Info { message } if message == "Unsupported web protection type: BRUTE_FORCE"
    )));
    // No traffic, no errors; still a clean terminal summary.
    assert!(request_logs(&events).is_empty());
    assert!(!events.iter().any(|e| matches!(e, LogEvent::Error { .. })));
    assert!(plan_summary(&events).is_some());
}

#[tokio::test]
async fn test_plan_json_decodes_with_unknown_fields_and_runs() {
    let base = spawn_target_server().await;
    let raw = format!(
        r#"{{
            "name": "forward-compat",
            "new_top_level_field": true,
            "tests": [
                {{
                    "category": "BOT_MANAGEMENT",
                    "type": "USER_AGENT_ANOMALY",
                    "target": {{"target_url": "{base}/", "new_target_field": 1}},
                    "params": {{"ua_profiles": ["curl/8.5.0"], "future_knob": "x"}}
                }}
            ]
        }}"#
    );
    let plan = TestPlan::from_json(&raw).unwrap();
    let events = run_plan_and_collect(&plan).await;
    assert_eq!(request_logs(&events).len(), 1);
}
