//! Concurrency and pacing primitives shared across probes
//!
//! Every probe's requested concurrency and rate pass through the fixed
//! safety ceilings here before any traffic is generated.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Concurrency ceiling for burst-style HTTP probes
pub const MAX_BURST_CONCURRENCY: usize = 64;

/// Worker ceiling for the connection-flood probe
pub const MAX_FLOOD_WORKERS: usize = 128;

/// Per-worker rate ceiling (requests per second) for the connection flood
pub const MAX_FLOOD_RATE: u32 = 128;

/// Total-request ceiling for the edge rate-limit probe
pub const MAX_RATE_PROBE_REQUESTS: usize = 512;

/// Delay before firing request `index` within a burst
///
/// The `exponential` pattern grows as `interval * 1.05^index` capped at
/// 2000 ms; every other pattern name is a constant delay.
pub fn burst_delay(index: usize, interval_ms: u64, pattern: &str) -> Duration {
    match pattern {
        "exponential" => {
            let scaled = interval_ms as f64 * 1.05f64.powi(index as i32);
            Duration::from_millis((scaled as u64).min(2000))
        }
        _ => Duration::from_millis(interval_ms),
    }
}

/// Clamp a requested fan-out into `[1, cap]`
pub fn clamp_concurrency(requested: usize, cap: usize) -> usize {
    requested.clamp(1, cap)
}

/// Interval between requests for a target rate, floored at 1 ms
pub fn rate_interval(rate_per_sec: u32) -> Duration {
    Duration::from_millis((1000 / u64::from(rate_per_sec.max(1))).max(1))
}

/// Bounded-permit gate limiting simultaneously in-flight operations
#[derive(Clone)]
pub struct PermitGate {
    semaphore: Arc<Semaphore>,
}

impl PermitGate {
    /// Create a gate with the given number of permits
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Acquire a permit, suspending until one frees up. Returns `None`
    /// only if the gate was closed, which the engine never does itself.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }
}

/// Wall-clock time box for sustained-loop probes
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    deadline: Instant,
}

impl TimeWindow {
    /// Open a window of the given length starting now
    pub fn starting_now(length: Duration) -> Self {
        Self {
            deadline: Instant::now() + length,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
