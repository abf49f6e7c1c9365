//! Envelope delivery
//!
//! Delivery is at-most-once and fire-and-forget: [`Transport::send`] never
//! blocks, never fails, and reports nothing back to the caller. Envelopes are
//! not retried, queued on disk, or deduplicated.
//!
//! ## Backends
//!
//! - [`HttpTransport`]: JSON POST to the collector endpoint via `reqwest`
//! - [`MemoryTransport`]: keeps envelopes in memory for inspection

mod http;
mod memory;

pub use http::{HttpTransport, TransportStats};
pub use memory::MemoryTransport;

use crate::types::Envelope;

/// Best-effort envelope sink.
pub trait Transport: Send + Sync {
    /// Hand an envelope off for delivery. Must not block on the network.
    fn send(&self, envelope: &Envelope);

    /// Toggle verbose reporting of delivery failures
    fn set_debug(&self, _enabled: bool) {}

    /// Stop accepting envelopes and give in-flight deliveries a bounded
    /// amount of time to finish.
    fn shutdown(&self) {}
}
