//! Response interpreter (spec §4.6): maps a validated response and its
//! associated probe to an interval update.

use crate::bucket::Bucket;
use crate::config::InversionPolicy;
use crate::interval::Interval;
use crate::probe::{ProbeTable, ResponseType};
use crate::transport::Clock;
use crate::types::ProbeId;
use hoptrace_packet::IcmpResponse;

/// Result of interpreting one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interpretation {
    /// This was a repeat response to an already-answered probe; the
    /// interval was not touched.
    pub duplicate: bool,
    /// The interval update would have inverted `minHops`/`maxHops`; the
    /// configured [`InversionPolicy`] decided what happened instead.
    pub anomaly: bool,
}

/// Interpret `response`, updating `table`, `interval` and `bucket` in
/// place. Returns `None` if the response's id does not match any probe in
/// the table (an unsolicited or stale packet, discarded by the caller).
pub fn interpret(
    response: &IcmpResponse,
    response_length: usize,
    table: &mut ProbeTable,
    interval: &mut Interval,
    bucket: &mut Bucket,
    clock: &dyn Clock,
    kivinen_adjustment: i16,
    on_inversion: InversionPolicy,
) -> Option<Interpretation> {
    let id = ProbeId(response.id());
    let probe = table.get_mut(id)?;

    if probe.responded {
        probe.duplicate_responses += 1;
        return Some(Interpretation {
            duplicate: true,
            anomaly: false,
        });
    }

    let hops = probe.hops;
    let sent_time = probe.sent_time;
    let now = clock.now();

    probe.responded = true;
    probe.response_time = Some(now);
    probe.delay = Some(now.duration_since(sent_time));
    probe.response_length = Some(response_length);
    probe.response_type = match response {
        IcmpResponse::EchoReply { .. } => ResponseType::EchoResponse,
        IcmpResponse::TimeExceeded { .. } => ResponseType::TimeExceeded,
        IcmpResponse::DestinationUnreachable { .. } => ResponseType::DestinationUnreachable,
    };

    let outcome = match response {
        IcmpResponse::EchoReply { received_ttl, .. } => {
            interval.apply_echo_reply(hops, *received_ttl, kivinen_adjustment, on_inversion)
        }
        IcmpResponse::TimeExceeded { .. } => interval.apply_time_exceeded(hops, on_inversion),
        IcmpResponse::DestinationUnreachable { .. } => crate::interval::UpdateOutcome {
            anomaly: false,
        },
    };

    bucket.release();

    Some(Interpretation {
        duplicate: false,
        anomaly: outcome.anomaly,
    })
}
