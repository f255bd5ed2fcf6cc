//! TTL selector (spec §4.4): four algorithms for picking the next TTL to
//! probe, including the default probabilistic binary search.

use crate::config::TtlAlgorithm;
use crate::interval::Interval;
use crate::types::Hops;
use arrayvec::ArrayVec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A likely number of hops value used to bias the very first probe
/// (spec §4.4: "a small constant — the engine biases the first probe to
/// where most real Internet paths sit").
pub const TYPICAL_INTERNET_HOP_COUNT: u8 = 5;
/// Lower bound of the range explored while no response has arrived yet.
pub const TYPICAL_INTERNET_MIN_HOP_COUNT: u8 = 3;
/// Upper bound of the range explored while no response has arrived yet.
pub const TYPICAL_INTERNET_MAX_HOP_COUNT: u8 = 22;
/// How many probes get the biased treatment before falling back to the
/// general binary search picker.
pub const N_TYPICAL_HOP_COUNT_TRIES: u32 = 4;

/// A-priori likelihood (in percent, summing to ~100) that a real Internet
/// path has exactly `ttl` hops. Index 0 is unused (TTL 0 never occurs).
/// Carried verbatim from the source implementation's hand-tuned table: a
/// plateau of highest likelihood at 5-8 hops, tapering through several
/// "semi-likely" bands out to 34, flat and very small beyond that.
#[rustfmt::skip]
const PRIOR_PERCENT: [f64; 256] = [
    0.050000, 1.000000, 1.000000, 3.000000, 5.000000, 9.910000, 9.910000, 9.910000,
    9.910000, 5.000000, 5.000000, 5.000000, 3.000000, 3.000000, 3.000000, 1.000000,
    1.000000, 1.000000, 1.000000, 1.000000, 1.000000, 1.000000, 1.000000, 0.650000,
    0.650000, 0.650000, 0.650000, 0.650000, 0.650000, 0.650000, 0.650000, 0.650000,
    0.650000, 0.650000, 0.109308, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
    0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000, 0.050000,
];

/// A predicate telling the picker which TTLs are still valid candidates
/// (no probe has been sent with that TTL yet). Kept as a capability object
/// so the picker needs no knowledge of the probe table's internals
/// (spec §9, Design Note "Callback for candidate filtering").
pub trait CandidateFilter {
    fn includes(&self, ttl: u8) -> bool;
}

impl<F: Fn(u8) -> bool> CandidateFilter for F {
    fn includes(&self, ttl: u8) -> bool {
        self(ttl)
    }
}

/// Stateful TTL picker implementing the four algorithms of spec §4.4.
pub struct Selector {
    algorithm: TtlAlgorithm,
    likely_candidates: bool,
    probabilistic_distribution: bool,
    readjust: bool,
    first_ttl: Hops,
    max_ttl: Hops,
    sequential_next: Option<Hops>,
    reverse_next: Option<Hops>,
    rng: StdRng,
}

impl Selector {
    #[must_use]
    pub fn new(
        algorithm: TtlAlgorithm,
        likely_candidates: bool,
        probabilistic_distribution: bool,
        readjust: bool,
        first_ttl: Hops,
        max_ttl: Hops,
        rng_seed: Option<u64>,
    ) -> Self {
        let rng = rng_seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            algorithm,
            likely_candidates,
            probabilistic_distribution,
            readjust,
            first_ttl,
            max_ttl,
            sequential_next: None,
            reverse_next: None,
            rng,
        }
    }

    /// Pick the next TTL to probe.
    ///
    /// `tokens` is the number of bucket tokens currently available (used
    /// by the binary search picker to decide how finely to partition the
    /// remaining candidates). `probes_sent` and `responses_received` are
    /// whole-run counters.
    pub fn pick(
        &mut self,
        interval: Interval,
        tokens: u8,
        probes_sent: u32,
        responses_received: u32,
        filter: &dyn CandidateFilter,
    ) -> Option<Hops> {
        match self.algorithm {
            TtlAlgorithm::Sequential => Some(self.pick_sequential(interval)),
            TtlAlgorithm::ReverseSequential => Some(self.pick_reverse_sequential(interval)),
            TtlAlgorithm::Random => Some(self.pick_random(interval, filter)),
            TtlAlgorithm::BinarySearch => {
                self.pick_binary_search(interval, tokens, probes_sent, responses_received, filter)
            }
        }
    }

    fn pick_sequential(&mut self, interval: Interval) -> Hops {
        let candidate = match self.sequential_next {
            None => self.first_ttl,
            Some(previous) if previous.0 < 255 => Hops(previous.0 + 1),
            Some(previous) => previous,
        };
        let candidate = if !interval.contains(candidate) && self.readjust {
            interval.min()
        } else {
            candidate
        };
        self.sequential_next = Some(candidate);
        candidate
    }

    fn pick_reverse_sequential(&mut self, interval: Interval) -> Hops {
        let candidate = match self.reverse_next {
            None => self.max_ttl,
            Some(previous) if previous.0 > 1 => Hops(previous.0 - 1),
            Some(previous) => previous,
        };
        let candidate = if !interval.contains(candidate) && self.readjust {
            interval.max()
        } else {
            candidate
        };
        self.reverse_next = Some(candidate);
        candidate
    }

    fn pick_random(&mut self, interval: Interval, filter: &dyn CandidateFilter) -> Hops {
        let (min, max) = (interval.min().0, interval.max().0);
        let span = u32::from(max - min) + 1;
        let any_untested = (min..=max).any(|ttl| filter.includes(ttl));
        loop {
            let offset = self.rng.gen_range(0..span);
            let candidate = min + offset as u8;
            if !any_untested || filter.includes(candidate) {
                return Hops(candidate);
            }
        }
    }

    fn pick_binary_search(
        &mut self,
        interval: Interval,
        tokens: u8,
        probes_sent: u32,
        responses_received: u32,
        filter: &dyn CandidateFilter,
    ) -> Option<Hops> {
        if self.likely_candidates && probes_sent == 0 {
            let guess = Hops(TYPICAL_INTERNET_HOP_COUNT + 1).clamp(interval.min(), interval.max());
            return Some(guess);
        }
        if self.likely_candidates
            && responses_received == 0
            && probes_sent < N_TYPICAL_HOP_COUNT_TRIES
        {
            let from = interval.min().max(Hops(TYPICAL_INTERNET_MIN_HOP_COUNT));
            let to = interval.max().min(Hops(TYPICAL_INTERNET_MAX_HOP_COUNT));
            if from <= to {
                let number_of_tests = u32::from(tokens).max(1);
                if let Some(value) = self.best_binary_search_value(from, to, filter, number_of_tests) {
                    return Some(value);
                }
            }
        }
        let number_of_tests = u32::from(tokens).max(1);
        self.best_binary_search_value(interval.min(), interval.max(), filter, number_of_tests)
    }

    /// Given the candidates in `from..=to` accepted by `filter`, partition
    /// them into `number_of_tests + 1` equal-probability regions and
    /// return the first boundary (spec §4.4, "Binary search picker").
    fn best_binary_search_value(
        &self,
        from: Hops,
        to: Hops,
        filter: &dyn CandidateFilter,
        number_of_tests: u32,
    ) -> Option<Hops> {
        let mut available: ArrayVec<u8, { crate::types::MAX_PROBES }> = ArrayVec::new();
        for ttl in from.0..=to.0 {
            if filter.includes(ttl) {
                // The range is at most 255 wide, well within capacity.
                let _ = available.try_push(ttl);
            }
        }
        if available.is_empty() {
            return None;
        }

        let candidate = if self.probabilistic_distribution {
            let position = 1.0 / (f64::from(number_of_tests) + 1.0);
            select_from_distribution(position, &available)
        } else {
            let index = (available.len() / (number_of_tests as usize + 1)).min(available.len() - 1);
            available[index]
        };
        Some(Hops(candidate))
    }
}

/// Walk `choices` in order, accumulating normalized probability mass,
/// returning the first choice whose cumulative share reaches
/// `probability_position` (or the last choice, as a fallback).
fn select_from_distribution(probability_position: f64, choices: &[u8]) -> u8 {
    let sum: f64 = choices.iter().map(|&ttl| PRIOR_PERCENT[usize::from(ttl)]).sum();
    let normalization = 1.0 / sum;
    let mut cumulative = 0.0;
    for (i, &ttl) in choices.iter().enumerate() {
        cumulative += normalization * PRIOR_PERCENT[usize::from(ttl)];
        if cumulative >= probability_position || i == choices.len() - 1 {
            return ttl;
        }
    }
    unreachable!("choices is non-empty, so the loop above always returns")
}
