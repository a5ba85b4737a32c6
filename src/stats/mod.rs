//! Statistics and metrics
//!
//! Lock-free per-stream counters readable from client handles.

pub mod metrics;

pub use metrics::{StreamInfo, StreamStats};
