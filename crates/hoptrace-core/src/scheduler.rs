//! Scheduler and token bucket (spec §4.3): arbitration between sending new
//! probes and retransmitting or abandoning stalled ones.

use crate::bucket::Bucket;
use crate::config::Config;
use crate::interval::Interval;
use crate::probe::{Exhausted, ProbeTable};
use crate::selector::Selector;
use crate::transport::Clock;
use crate::types::{Hops, ProbeId};

/// Result of one scheduler pass: probe ids that need a packet sent on the
/// wire, and probe chains that gave up without ever hearing back.
#[derive(Debug, Default)]
pub struct SchedulerOutcome {
    pub to_send: Vec<ProbeId>,
    pub gave_up: Vec<ProbeId>,
}

fn untested_ttl_exists(interval: Interval, table: &ProbeTable) -> bool {
    (interval.min().0..=interval.max().0).any(|ttl| !table.has_probe_for_ttl(Hops(ttl)))
}

/// `shouldContinueSending` (spec §4.3).
#[must_use]
pub fn should_continue_sending(
    interrupted: bool,
    max_probes: u32,
    interval: Interval,
    table: &ProbeTable,
) -> bool {
    if interrupted || table.sent() >= max_probes || interval.is_converged() {
        return false;
    }
    untested_ttl_exists(interval, table)
}

/// `shouldContinueSendingOrWaiting` (spec §4.3).
#[must_use]
pub fn should_continue_sending_or_waiting(
    interrupted: bool,
    max_probes: u32,
    interval: Interval,
    table: &ProbeTable,
) -> bool {
    if interrupted || interval.is_converged() {
        return false;
    }
    waiting_for_responses(table) > 0 || should_continue_sending(interrupted, max_probes, interval, table)
}

/// Number of probes sent but neither answered nor yet given up on.
#[must_use]
pub fn waiting_for_responses(table: &ProbeTable) -> u32 {
    table
        .allocated_ids()
        .filter(|&id| {
            let probe = table.get(id).expect("id came from allocated_ids");
            !probe.responded && probe.response_type != crate::probe::ResponseType::NoResponse
        })
        .count() as u32
}

/// Send as many new probes as the bucket and the TTL selector allow
/// (spec §4.3 step (a)).
pub fn fill_bucket(
    table: &mut ProbeTable,
    interval: Interval,
    bucket: &mut Bucket,
    selector: &mut Selector,
    config: &Config,
    interrupted: bool,
    clock: &dyn Clock,
) -> Vec<ProbeId> {
    let mut to_send = Vec::new();
    while should_continue_sending(interrupted, config.max_probes, interval, table) && bucket.can_take() {
        let responded = table.allocated_ids().filter(|&id| table.get(id).unwrap().responded).count() as u32;
        let filter = |ttl: u8| !table.has_probe_for_ttl(Hops(ttl));
        let Some(ttl) = selector.pick(interval, bucket.available(), table.sent(), responded, &filter) else {
            break;
        };
        match table.allocate(ttl, config.icmp_data_length, clock, None) {
            Ok(id) => {
                bucket.take();
                to_send.push(id);
            }
            Err(Exhausted) => break,
        }
    }
    to_send
}

/// Service probes whose retransmission timer has expired
/// (spec §4.3 step (b)).
pub fn service_timeouts(
    table: &mut ProbeTable,
    interval: Interval,
    bucket: &mut Bucket,
    selector: &mut Selector,
    config: &Config,
    interrupted: bool,
    clock: &dyn Clock,
) -> SchedulerOutcome {
    let now = clock.now();
    let expired: Vec<ProbeId> = table
        .allocated_ids()
        .filter(|&id| {
            let probe = table.get(id).expect("id came from allocated_ids");
            !probe.responded
                && probe.next_retransmission.is_none()
                && probe.response_type != crate::probe::ResponseType::NoResponse
                && probe.initial_timeout <= now
        })
        .collect();

    let mut outcome = SchedulerOutcome::default();

    for id in expired {
        let probe = table.get(id).expect("id came from allocated_ids");
        let hops = probe.hops;
        let already_sent_new_probe = probe.new_probe_instead_of_retransmission.is_some();
        let tries_so_far = table.retries(id);

        let untested_remains = untested_ttl_exists(interval, table);
        let prefer_new_probe = !already_sent_new_probe
            && !config.prefer_retransmission
            && untested_remains
            && should_continue_sending(interrupted, config.max_probes, interval, table);

        if prefer_new_probe {
            let responded = table.allocated_ids().filter(|&i| table.get(i).unwrap().responded).count() as u32;
            let filter = |ttl: u8| !table.has_probe_for_ttl(Hops(ttl));
            if let Some(ttl) = selector.pick(interval, bucket.available(), table.sent(), responded, &filter) {
                if let Ok(new_id) = table.allocate(ttl, config.icmp_data_length, clock, None) {
                    bucket.take();
                    outcome.to_send.push(new_id);
                    let probe = table.get_mut(id).expect("id still valid");
                    probe.new_probe_instead_of_retransmission = Some(new_id);
                    probe.response_type = crate::probe::ResponseType::RetransmissionConsidered;
                    extend_timeout(probe);
                    continue;
                }
            }
        }

        if tries_so_far >= config.max_tries {
            table.mark_chain_no_response(id);
            bucket.release();
            outcome.gave_up.push(id);
        } else if let Ok(new_id) = table.allocate(hops, config.icmp_data_length, clock, Some(id)) {
            outcome.to_send.push(new_id);
        }
    }

    outcome
}

const MAX_RETRANSMISSION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

/// Push a stalled probe's own deadline out by the same exponential-backoff
/// rule used for retransmissions, without creating a new probe entry —
/// used when the scheduler spends the token on a fresh TTL instead of
/// resending this one.
fn extend_timeout(probe: &mut crate::probe::Probe) {
    let previous = probe.initial_timeout.duration_since(probe.sent_time);
    let next = (previous * 2).min(MAX_RETRANSMISSION_TIMEOUT);
    probe.initial_timeout = probe.sent_time + next;
}
