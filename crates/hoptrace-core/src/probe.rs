//! Probe table & lifecycle (spec §3, §4.1).

use crate::transport::Clock;
use crate::types::{Hops, ProbeId, MAX_PROBES};
use std::time::{Duration, Instant};

const INITIAL_RETRANSMISSION_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_RETRANSMISSION_TIMEOUT: Duration = Duration::from_secs(20);
const RETRANSMISSION_BACKOFF_FACTOR: u32 = 2;

/// What, if anything, a probe has been answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    StillWaiting,
    EchoResponse,
    DestinationUnreachable,
    TimeExceeded,
    RetransmissionConsidered,
    NoResponse,
}

/// A single outstanding or completed probe.
///
/// `previousTransmission` / `nextRetransmission` / `newProbeSentInsteadOfRetransmission`
/// are relations into the owning [`ProbeTable`], represented as
/// [`ProbeId`] indices rather than ownership handles (spec §9, Design Note
/// "Relations, not ownership").
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub id: ProbeId,
    pub hops: Hops,
    pub probe_length: usize,
    pub sent_time: Instant,
    pub initial_timeout: Instant,
    pub previous_transmission: Option<ProbeId>,
    pub next_retransmission: Option<ProbeId>,
    pub new_probe_instead_of_retransmission: Option<ProbeId>,
    pub responded: bool,
    pub response_type: ResponseType,
    pub response_length: Option<usize>,
    pub response_time: Option<Instant>,
    pub delay: Option<Duration>,
    pub duplicate_responses: u32,
}

/// Raised when the table's fixed capacity ([`MAX_PROBES`]) is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted;

/// Fixed-capacity preallocated registry of probes keyed by id.
///
/// A slot is either free (`None`) or holds a probe permanently: the table
/// is never shrunk, and the same id is never reused within one engine run.
#[derive(Clone, Copy)]
pub struct ProbeTable {
    slots: [Option<Probe>; MAX_PROBES],
    cursor: u16,
    sent: u32,
}

impl Default for ProbeTable {
    fn default() -> Self {
        Self {
            slots: [None; MAX_PROBES],
            cursor: 0,
            sent: 0,
        }
    }
}

impl ProbeTable {
    #[must_use]
    pub fn sent(&self) -> u32 {
        self.sent
    }

    #[must_use]
    pub fn get(&self, id: ProbeId) -> Option<&Probe> {
        self.slots[id.as_index()].as_ref()
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ProbeId) -> Option<&mut Probe> {
        self.slots[id.as_index()].as_mut()
    }

    /// Iterate over every allocated (used) probe id, in table order.
    pub fn allocated_ids(&self) -> impl Iterator<Item = ProbeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_some().then(|| ProbeId(i as u16)))
    }

    /// Is there a probe (of any status) already sent with this TTL?
    #[must_use]
    pub fn has_probe_for_ttl(&self, ttl: Hops) -> bool {
        self.slots.iter().flatten().any(|p| p.hops == ttl)
    }

    /// How many tries (original probe plus retransmissions) has the chain
    /// ending at `id` made so far?
    #[must_use]
    pub fn retries(&self, id: ProbeId) -> u32 {
        let mut count = 0;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            count += 1;
            cursor = self.get(current).and_then(|p| p.previous_transmission);
        }
        count
    }

    /// Mark a probe and every predecessor in its retry chain as having
    /// received no response.
    pub fn mark_chain_no_response(&mut self, id: ProbeId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(probe) = self.get_mut(current) else {
                break;
            };
            probe.response_type = ResponseType::NoResponse;
            cursor = probe.previous_transmission;
        }
    }

    /// Allocate a new probe at `hops`, linking it as a retransmission of
    /// `retry_of` when given.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] if every slot in the table is already in use.
    pub fn allocate(
        &mut self,
        hops: Hops,
        probe_length: usize,
        clock: &dyn Clock,
        retry_of: Option<ProbeId>,
    ) -> Result<ProbeId, Exhausted> {
        let mut attempts = 0;
        let index = loop {
            if attempts >= MAX_PROBES {
                return Err(Exhausted);
            }
            let candidate = usize::from(self.cursor) % MAX_PROBES;
            self.cursor = self.cursor.wrapping_add(1);
            attempts += 1;
            if self.slots[candidate].is_none() {
                break candidate;
            }
        };

        let sent_time = clock.now();
        let timeout = match retry_of.and_then(|prev_id| self.get(prev_id)) {
            None => INITIAL_RETRANSMISSION_TIMEOUT,
            Some(prev) => {
                let prev_timeout = prev.initial_timeout.duration_since(prev.sent_time);
                (prev_timeout * RETRANSMISSION_BACKOFF_FACTOR).min(MAX_RETRANSMISSION_TIMEOUT)
            }
        };

        let id = ProbeId(index as u16);
        self.slots[index] = Some(Probe {
            id,
            hops,
            probe_length,
            sent_time,
            initial_timeout: sent_time + timeout,
            previous_transmission: retry_of,
            next_retransmission: None,
            new_probe_instead_of_retransmission: None,
            responded: false,
            response_type: ResponseType::StillWaiting,
            response_length: None,
            response_time: None,
            delay: None,
            duplicate_responses: 0,
        });
        if let Some(prev_id) = retry_of {
            if let Some(prev) = self.get_mut(prev_id) {
                prev.next_retransmission = Some(id);
            }
        }
        self.sent += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct FixedClock(Instant);
    impl Clock for FixedClock {
        fn now(&self) -> Instant {
            self.0
        }
    }

    #[test]
    fn first_allocation_uses_initial_timeout() {
        let mut table = ProbeTable::default();
        let clock = FixedClock(Instant::now());
        let id = table.allocate(Hops(10), 64, &clock, None).unwrap();
        let probe = table.get(id).unwrap();
        assert_eq!(
            INITIAL_RETRANSMISSION_TIMEOUT,
            probe.initial_timeout.duration_since(probe.sent_time)
        );
        assert_eq!(1, table.retries(id));
        assert_eq!(1, table.sent());
    }

    #[test]
    fn retransmission_doubles_timeout_and_links_chain() {
        let mut table = ProbeTable::default();
        let clock = FixedClock(Instant::now());
        let first = table.allocate(Hops(10), 64, &clock, None).unwrap();
        let second = table.allocate(Hops(10), 64, &clock, Some(first)).unwrap();

        assert_eq!(Some(second), table.get(first).unwrap().next_retransmission);
        assert_eq!(Some(first), table.get(second).unwrap().previous_transmission);
        let probe = table.get(second).unwrap();
        assert_eq!(
            INITIAL_RETRANSMISSION_TIMEOUT * 2,
            probe.initial_timeout.duration_since(probe.sent_time)
        );
        assert_eq!(2, table.retries(second));
    }

    #[test]
    fn retransmission_timeout_caps_at_twenty_seconds() {
        let mut table = ProbeTable::default();
        let clock = FixedClock(Instant::now());
        let mut previous = table.allocate(Hops(10), 64, &clock, None).unwrap();
        for _ in 0..10 {
            previous = table
                .allocate(Hops(10), 64, &clock, Some(previous))
                .unwrap();
        }
        let probe = table.get(previous).unwrap();
        assert_eq!(
            MAX_RETRANSMISSION_TIMEOUT,
            probe.initial_timeout.duration_since(probe.sent_time)
        );
    }

    #[test]
    fn mark_chain_no_response_walks_every_predecessor() {
        let mut table = ProbeTable::default();
        let clock = FixedClock(Instant::now());
        let first = table.allocate(Hops(10), 64, &clock, None).unwrap();
        let second = table.allocate(Hops(10), 64, &clock, Some(first)).unwrap();

        table.mark_chain_no_response(second);

        assert_eq!(ResponseType::NoResponse, table.get(first).unwrap().response_type);
        assert_eq!(ResponseType::NoResponse, table.get(second).unwrap().response_type);
    }

    #[test]
    fn exhausts_after_max_probes_allocations() {
        let mut table = ProbeTable::default();
        let clock = FixedClock(Instant::now());
        for _ in 0..MAX_PROBES {
            table.allocate(Hops(1), 64, &clock, None).unwrap();
        }
        assert_eq!(Err(Exhausted), table.allocate(Hops(1), 64, &clock, None));
    }
}
