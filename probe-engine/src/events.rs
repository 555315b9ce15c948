//! Event model and the channel-backed sink probes emit into
//!
//! The engine pushes events as the run progresses and retains nothing;
//! consumers read the receiving half of the channel at their own pace.

use crate::http::{RequestOutcome, SocketOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// One log entry per attempted network operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub method: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    pub blocked: bool,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, Option<String>>,
}

impl RequestLog {
    /// Create a new request log entry
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            status_code: None,
            duration_ms: 0,
            blocked: false,
            error: None,
            executed_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Copy status, timing and error from an HTTP outcome
    pub fn with_outcome(mut self, outcome: &RequestOutcome) -> Self {
        self.status_code = outcome.status;
        self.duration_ms = outcome.duration_ms;
        self.error = outcome.error.clone();
        self
    }

    /// Copy timing and error from a raw-socket outcome
    pub fn with_socket_outcome(mut self, outcome: &SocketOutcome) -> Self {
        self.duration_ms = outcome.duration_ms;
        self.error = outcome.error.clone();
        self
    }

    /// Mark the request blocked when the status code matches the probe's
    /// heuristic set. `blocked` is an inference, not a protocol fact.
    pub fn blocked_when(mut self, codes: &[u16]) -> Self {
        if let Some(status) = self.status_code {
            if codes.contains(&status) {
                self.blocked = true;
            }
        }
        self
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: &str, value: Option<String>) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Tagged log event pushed to the caller while a run progresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    Info { message: String },
    Error { message: String },
    Request { log: RequestLog },
    Summary { message: String, totals: BTreeMap<String, i64> },
}

/// Sending half of the event stream
///
/// Backed by an unbounded channel so a slow consumer can never stall probe
/// progress; delivery stops silently once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl EventSink {
    /// Create a sink together with its receiving half
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogEvent::Info {
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogEvent::Error {
            message: message.into(),
        });
    }

    pub fn request(&self, log: RequestLog) {
        self.emit(LogEvent::Request { log });
    }

    pub fn summary<'a, I>(&self, message: impl Into<String>, totals: I)
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        self.emit(LogEvent::Summary {
            message: message.into(),
            totals: totals
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        });
    }

    fn emit(&self, event: LogEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_delivers_events_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.info("first");
        sink.request(RequestLog::new("GET", "http://example.test/"));
        sink.summary("done", [("total", 1)]);
        drop(sink);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                LogEvent::Info { .. } => "info",
                LogEvent::Error { .. } => "error",
                LogEvent::Request { .. } => "request",
                LogEvent::Summary { .. } => "summary",
            });
        }
        assert_eq!(kinds, vec!["info", "request", "summary"]);
    }

    #[tokio::test]
    async fn test_sink_survives_dropped_receiver() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        // Must not panic or error; events are simply discarded.
        sink.info("nobody listening");
        sink.error("still nobody");
    }

    #[test]
    fn test_blocked_heuristic() {
        let outcome = RequestOutcome {
            status: Some(403),
            duration_ms: 12,
            error: None,
        };
        let log = RequestLog::new("GET", "http://example.test/")
            .with_outcome(&outcome)
            .blocked_when(&[403, 406]);
        assert!(log.blocked);

        let outcome = RequestOutcome {
            status: Some(200),
            duration_ms: 8,
            error: None,
        };
        let log = RequestLog::new("GET", "http://example.test/")
            .with_outcome(&outcome)
            .blocked_when(&[403, 406]);
        assert!(!log.blocked);

        // No status at all (network error) never counts as blocked.
        let outcome = RequestOutcome {
            status: None,
            duration_ms: 30,
            error: Some("Connection failed".to_string()),
        };
        let log = RequestLog::new("GET", "http://example.test/")
            .with_outcome(&outcome)
            .blocked_when(&[403]);
        assert!(!log.blocked);
    }

    #[test]
    fn test_summary_serialization() {
        let (sink, mut rx) = EventSink::channel();
        sink.summary("Plan finished", [("testsExecuted", 3)]);
        drop(sink);
        let event = rx.try_recv().unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"summary\""));
        assert!(json.contains("\"testsExecuted\":3"));
    }
}
