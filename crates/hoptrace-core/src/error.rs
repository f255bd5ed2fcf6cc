//! Errors produced by the engine itself.
//!
//! Per spec, most adverse conditions (protocol anomalies, timeouts,
//! duplicate responses) are not errors at all — they are recorded in the
//! returned [`crate::engine::Outcome`] and surfaced only through `tracing`
//! events. `EngineError` covers only the conditions spec §7 calls fatal
//! from the engine's own point of view.

use thiserror::Error;

/// Fatal conditions raised while running the engine.
#[derive(Debug, Error)]
pub enum EngineError<T> {
    /// The probe table's fixed capacity (`MAX_PROBES`) was exhausted.
    #[error("probe table exhausted after {sent} probes")]
    Exhausted { sent: u32 },

    /// The [`crate::transport::PacketTransport`] capability failed.
    #[error("packet transport error")]
    Transport(#[source] T),
}
