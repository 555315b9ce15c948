//! Probe implementations, one module per family
//!
//! Each routine consumes a `TestSpec` and an `EventSink`, converts the
//! loose parameter bag into a typed config in one validation step, emits a
//! `Request` event per network attempt, and finishes with a `Summary`.

pub mod api;
pub mod bot;
pub mod ddos;
pub mod waf;
