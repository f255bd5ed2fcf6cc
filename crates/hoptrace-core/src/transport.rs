//! Capability traits that decouple the engine from real sockets and the
//! system clock (spec §1, §9 Design Note "Process-wide state").
//!
//! `hoptrace-core` never touches a socket, a DNS resolver, or
//! `Instant::now()` directly. It is driven by an implementation of
//! [`PacketTransport`] (the raw-socket implementation lives in
//! `hoptrace-cli`) and [`Clock`] (almost always [`SystemClock`], but tests
//! substitute a scripted fake).

use std::time::{Duration, Instant};

/// Sends and receives raw IP packets.
///
/// Implementations are expected to hand back already-addressed IPv4
/// datagrams on `recv` (the engine only looks at ICMP content via
/// `hoptrace_packet::parse_response`, so any framing the platform adds
/// ahead of the IP header must already be stripped).
pub trait PacketTransport {
    /// Error type returned by this transport. Left abstract so
    /// `hoptrace-core` never names a concrete I/O error type.
    type Error: std::error::Error + 'static;

    /// Send a fully-formed IPv4+ICMP datagram.
    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for a datagram to arrive. Returns `Ok(None)`
    /// on timeout. A `timeout` of [`Duration::ZERO`] polls without
    /// blocking, used to drain the socket once the first packet of a
    /// batch has arrived (spec §4.7 step 2).
    fn poll_recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error>;
}

/// Supplies the current time.
///
/// Kept as a trait (rather than calling `Instant::now()` inline) so
/// property tests can drive the engine with a simulated clock that
/// advances only when the test tells it to.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by the real system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
