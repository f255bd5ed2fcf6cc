//! Engine configuration.

use crate::types::Hops;
use std::time::Duration;

/// TTL-selection strategy (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlAlgorithm {
    Sequential,
    ReverseSequential,
    Random,
    #[default]
    BinarySearch,
}

/// Policy applied when an interval update would invert `minHops`/`maxHops`
/// (spec §9, Open Question 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InversionPolicy {
    /// Clamp the offending bound to the other one, as the source does.
    #[default]
    ClampToMin,
    /// Discard the response entirely; the interval is left untouched.
    Reject,
}

/// Engine configuration (spec §4, §6).
///
/// Built directly; there is no separate builder type since every field has
/// a sensible default and the CLI's own `Args` → `Config` conversion
/// (`hoptrace-cli`) is the only other producer.
#[derive(Debug, Clone)]
pub struct Config {
    /// First TTL used by the `sequential` algorithm.
    pub first_ttl: Hops,
    /// Upper bound of the TTL search range.
    pub max_ttl: Hops,
    /// Hard cap on the number of probes ever sent (spec §7 "Probe table
    /// exhaustion" is distinct: this is a policy limit, not the table's
    /// physical capacity).
    pub max_probes: u32,
    /// Maximum number of tries (original probe plus retransmissions) per
    /// TTL before giving up on it.
    pub max_tries: u32,
    /// Token bucket capacity: maximum number of probes in flight.
    pub parallel: u8,
    /// Extra idle-poll duration used to pace new probes apart (spec §5).
    /// Zero disables pacing (the idle poll uses `poll_sleep` instead).
    pub probe_pacing: Duration,
    /// Number of ICMP payload bytes to fill with the repeating pattern.
    pub icmp_data_length: usize,
    /// TTL-selection algorithm.
    pub algorithm: TtlAlgorithm,
    /// Bias the first few binary-search probes toward the typical Internet
    /// hop-count range instead of the full interval.
    pub likely_candidates: bool,
    /// Use the probability-weighted partitioning for the binary search
    /// picker rather than plain index-based partitioning.
    pub probabilistic_distribution: bool,
    /// When a probe's timer expires, prefer retransmitting it over
    /// spending the token on a fresh TTL.
    pub prefer_retransmission: bool,
    /// Whether `sequential`/`reversesequential` snap back into the
    /// learned `[minHops, maxHops]` interval when they step outside it.
    pub readjust: bool,
    /// Adjustment (in hops) applied to a received IP TTL before it feeds
    /// the Kivinen bound. Default `0`; set to `-1` to reproduce the
    /// off-by-one the original implementation observed on its development
    /// platform (spec §9, Open Question 1). Never baked in unconditionally.
    pub kivinen_adjustment: i16,
    /// Policy applied when an interval update would invert the bounds.
    pub on_inversion: InversionPolicy,
    /// Idle poll timeout used before any pacing is applied (spec §4.7
    /// step 2, `hopping.c`'s `HOPPING_POLL_FREQUENCY`).
    pub poll_sleep: Duration,
    /// Seed for the engine's pseudo-random generator (used by the
    /// `random` algorithm and the probabilistic selector's tie-breaking).
    /// `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_ttl: Hops(1),
            max_ttl: Hops(64),
            max_probes: 256,
            max_tries: 3,
            parallel: 4,
            probe_pacing: Duration::ZERO,
            icmp_data_length: 56,
            algorithm: TtlAlgorithm::BinarySearch,
            likely_candidates: true,
            probabilistic_distribution: true,
            prefer_retransmission: true,
            readjust: true,
            kivinen_adjustment: 0,
            on_inversion: InversionPolicy::ClampToMin,
            poll_sleep: Duration::from_millis(10),
            rng_seed: None,
        }
    }
}
