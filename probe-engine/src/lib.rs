//! Probe Engine - Core infrastructure for configuration-driven security probes
//!
//! This crate executes declarative test plans against network targets,
//! emitting a structured event stream while the run progresses.

pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod events;
pub mod frontier;
pub mod http;
pub mod pacing;
pub mod probes;
pub mod runner;
pub mod types;

pub use types::{
    Params, Target, TestCategory, TestPlan, TestSpec, TestType, WorkflowStep,
};

pub use events::{EventSink, LogEvent, RequestLog};

pub use error::{ProbeError, ProbeResult};

pub use http::{ProbeClient, RequestBody, RequestOutcome, SocketOutcome};

pub use encoding::EncodingMode;

pub use runner::PlanRunner;
