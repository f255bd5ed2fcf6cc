//! The `[minHops, maxHops]` interval tracker (spec §4.2).

use crate::config::InversionPolicy;
use crate::types::Hops;

/// Outcome of applying an update to the interval: whether the two bounds
/// would have inverted had the configured policy not intervened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub anomaly: bool,
}

/// `[minHops, maxHops]`, monotonically tightening: `minHops` only
/// increases, `maxHops` only decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    min: Hops,
    max: Hops,
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            min: Hops::MIN,
            max: Hops::MAX,
        }
    }
}

impl Interval {
    #[must_use]
    pub fn min(self) -> Hops {
        self.min
    }

    #[must_use]
    pub fn max(self) -> Hops {
        self.max
    }

    #[must_use]
    pub fn is_converged(self) -> bool {
        self.min == self.max
    }

    #[must_use]
    pub fn contains(self, ttl: Hops) -> bool {
        self.min <= ttl && ttl <= self.max
    }

    /// Apply the Echo Reply update rule: `maxHops` is bounded both by the
    /// TTL the probe was sent with and by the Kivinen inference from the
    /// reply's received TTL.
    pub fn apply_echo_reply(
        &mut self,
        ttl_sent: Hops,
        ttl_recv: u8,
        kivinen_adjustment: i16,
        policy: InversionPolicy,
    ) -> UpdateOutcome {
        let adjusted = i32::from(ttl_recv) + i32::from(kivinen_adjustment);
        let adjusted = adjusted.clamp(0, 255);
        let kivinen_bound = (256 - adjusted).clamp(1, 255) as u8;
        let candidate = self.max.0.min(ttl_sent.0).min(kivinen_bound);

        if candidate < self.min.0 {
            match policy {
                InversionPolicy::ClampToMin => self.max = self.min,
                InversionPolicy::Reject => {}
            }
            UpdateOutcome { anomaly: true }
        } else {
            self.max = Hops(candidate);
            UpdateOutcome { anomaly: false }
        }
    }

    /// Apply the Time Exceeded update rule: the path is strictly longer
    /// than `ttl`, so `minHops <- max(minHops, ttl + 1)`.
    pub fn apply_time_exceeded(&mut self, ttl: Hops, policy: InversionPolicy) -> UpdateOutcome {
        if ttl.0 == 255 {
            // Cannot be exceeded beyond the maximum representable TTL.
            return UpdateOutcome { anomaly: false };
        }
        let candidate = self.min.0.max(ttl.0 + 1);

        if candidate > self.max.0 {
            match policy {
                InversionPolicy::ClampToMin => self.min = self.max,
                InversionPolicy::Reject => {}
            }
            UpdateOutcome { anomaly: true }
        } else {
            self.min = Hops(candidate);
            UpdateOutcome { anomaly: false }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(64, 0, 64; "received ttl matches sent ttl")]
    #[test_case(200, 0, 56; "kivinen bound tighter than sent ttl")]
    #[test_case(250, -1, 7; "kivinen adjustment shifts the bound down")]
    fn echo_reply_bound_table(received_ttl: u8, adjustment: i16, expected_max: u8) {
        let mut interval = Interval::default();
        interval.apply_echo_reply(Hops(64), received_ttl, adjustment, InversionPolicy::ClampToMin);
        assert_eq!(Hops(expected_max), interval.max());
    }

    #[test]
    fn starts_at_full_range() {
        let interval = Interval::default();
        assert_eq!(Hops(1), interval.min());
        assert_eq!(Hops(255), interval.max());
        assert!(!interval.is_converged());
    }

    #[test]
    fn echo_reply_tightens_max_from_sent_ttl() {
        let mut interval = Interval::default();
        let outcome = interval.apply_echo_reply(Hops(12), 64, 0, InversionPolicy::ClampToMin);
        assert!(!outcome.anomaly);
        assert_eq!(Hops(12), interval.max());
    }

    #[test]
    fn echo_reply_applies_kivinen_bound() {
        let mut interval = Interval::default();
        // received ttl 250 => bound is 256-250 = 6, tighter than sent ttl.
        let outcome = interval.apply_echo_reply(Hops(64), 250, 0, InversionPolicy::ClampToMin);
        assert!(!outcome.anomaly);
        assert_eq!(Hops(6), interval.max());
    }

    #[test]
    fn time_exceeded_tightens_min() {
        let mut interval = Interval::default();
        let outcome = interval.apply_time_exceeded(Hops(6), InversionPolicy::ClampToMin);
        assert!(!outcome.anomaly);
        assert_eq!(Hops(7), interval.min());
    }

    #[test]
    fn time_exceeded_at_ttl_255_is_a_noop() {
        let mut interval = Interval::default();
        let outcome = interval.apply_time_exceeded(Hops(255), InversionPolicy::ClampToMin);
        assert!(!outcome.anomaly);
        assert_eq!(Hops(1), interval.min());
    }

    #[test]
    fn inversion_clamps_to_min_by_default() {
        let mut interval = Interval::default();
        interval.apply_time_exceeded(Hops(99), InversionPolicy::ClampToMin);
        // A reply claiming the path is at most 5 hops contradicts the
        // min=100 we just established.
        let outcome = interval.apply_echo_reply(Hops(5), 64, 0, InversionPolicy::ClampToMin);
        assert!(outcome.anomaly);
        assert_eq!(interval.min(), interval.max());
    }

    #[test]
    fn inversion_with_reject_policy_leaves_interval_untouched() {
        let mut interval = Interval::default();
        interval.apply_time_exceeded(Hops(99), InversionPolicy::ClampToMin);
        let before = interval;
        let outcome = interval.apply_echo_reply(Hops(5), 64, 0, InversionPolicy::Reject);
        assert!(outcome.anomaly);
        assert_eq!(before, interval);
    }

    #[test]
    fn kivinen_adjustment_shifts_the_bound() {
        let mut interval = Interval::default();
        let outcome = interval.apply_echo_reply(Hops(64), 250, -1, InversionPolicy::ClampToMin);
        assert!(!outcome.anomaly);
        // adjusted received ttl = 249, bound = 256-249 = 7.
        assert_eq!(Hops(7), interval.max());
    }
}
