//! Plan runner: executes every enabled spec in declared order
//!
//! Per-spec failures become `Error` events and the run continues; the only
//! terminal event is the plan-level `Summary`.

use crate::dispatch::dispatch;
use crate::events::EventSink;
use crate::http::ProbeClient;
use crate::types::TestPlan;
use tracing::{info, warn};
use uuid::Uuid;

/// Drives one `TestPlan` to completion against a shared client
pub struct PlanRunner {
    client: ProbeClient,
}

impl PlanRunner {
    /// Create a runner over the given client
    pub fn new(client: ProbeClient) -> Self {
        Self { client }
    }

    /// Execute the plan, pushing events into `sink` as the run progresses.
    ///
    /// Progress lines index over the enabled-only list: `[idx/total]` uses
    /// the same filtered denominator on both sides.
    pub async fn run(&self, plan: &TestPlan, sink: &EventSink) {
        let run_id = Uuid::new_v4();
        let enabled = plan.enabled_tests();
        let total = enabled.len();
        info!(run_id = %run_id, plan = %plan.name, enabled = total, "Starting plan run");

        for (index, spec) in enabled.iter().enumerate() {
            sink.info(format!(
                "[{}/{}] {} - {}",
                index + 1,
                total,
                spec.category,
                spec.test_type
            ));
            if let Err(e) = dispatch(spec, &self.client, sink).await {
                warn!(run_id = %run_id, category = %spec.category, test_type = %spec.test_type, "Probe failed: {}", e);
                sink.error(e.to_string());
            }
        }

        info!(run_id = %run_id, plan = %plan.name, "Plan run finished");
        sink.summary("Plan finished", [("testsExecuted", total as i64)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogEvent;

    #[tokio::test]
    async fn test_empty_plan_still_reaches_terminal_summary() {
        let runner = PlanRunner::new(ProbeClient::new().unwrap());
        let (sink, mut rx) = EventSink::channel();
        let plan = TestPlan {
            name: "empty".to_string(),
            description: None,
            tests: Vec::new(),
        };

        runner.run(&plan, &sink).await;
        drop(sink);

        let event = rx.recv().await.unwrap();
        match event {
            LogEvent::Summary { message, totals } => {
                assert_eq!(message, "Plan finished");
                assert_eq!(totals.get("testsExecuted"), Some(&0));
            }
            other => panic!("expected Summary, got {other:?}"),
        }
    }
}
