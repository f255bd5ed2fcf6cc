//! Presentation (spec §6, "Output"): machine-readable and human-narrative
//! rendering of an [`Outcome`], the optional statistics trailer, and
//! per-probe progress lines fed by the engine's publish callback
//! (SPEC_FULL §8).

use hoptrace_core::engine::{Outcome, Reachability};
use hoptrace_core::{Probe, ResponseType};
use std::fmt::Write as _;

/// Render one line of `-progress` / `-detailed-progress` output for a
/// probe whose state just changed, or `None` if this probe has nothing
/// worth printing yet (plain `-progress` skips a bare "sent" line; only
/// `-detailed-progress` shows it).
#[must_use]
pub fn progress_line(probe: &Probe, detailed: bool) -> Option<String> {
    let ttl = probe.hops.0;
    if !probe.responded && probe.response_type == ResponseType::StillWaiting {
        return detailed.then(|| format!("ttl {ttl}: probe {} sent", probe.id.0));
    }
    let verdict = match probe.response_type {
        ResponseType::EchoResponse => "reply from destination",
        ResponseType::DestinationUnreachable => "destination unreachable",
        ResponseType::TimeExceeded => "time exceeded",
        ResponseType::NoResponse => "no response, gave up",
        ResponseType::StillWaiting | ResponseType::RetransmissionConsidered => return None,
    };
    if !detailed {
        return Some(format!("ttl {ttl}: {verdict}"));
    }
    let mut line = format!("ttl {ttl}: {verdict}");
    if let Some(delay) = probe.delay {
        let _ = write!(line, " ({})", humantime::format_duration(delay));
    }
    if probe.duplicate_responses > 0 {
        let _ = write!(line, " [{} duplicate(s)]", probe.duplicate_responses);
    }
    Some(line)
}

fn reachability_label(reachability: Reachability) -> &'static str {
    match reachability {
        Reachability::Reachable => "reachable",
        Reachability::Mixed => "mixed",
        Reachability::Unknown => "unknown",
    }
}

/// Render `minHops-maxHops:reachability`, or a single number when the
/// interval has converged (spec §6).
#[must_use]
pub fn machine_readable(outcome: &Outcome) -> String {
    if outcome.converged() {
        format!("{}", outcome.min_hops.0)
    } else {
        format!(
            "{}-{}:{}",
            outcome.min_hops.0,
            outcome.max_hops.0,
            reachability_label(outcome.reachability)
        )
    }
}

/// Render a narrative summary for a human reader.
#[must_use]
pub fn human_readable(destination: &str, outcome: &Outcome) -> String {
    let mut out = String::new();
    if outcome.converged() {
        let _ = write!(out, "{destination} is {} hops away", outcome.min_hops.0);
    } else {
        let _ = write!(
            out,
            "{destination} is between {} and {} hops away",
            outcome.min_hops.0, outcome.max_hops.0
        );
    }
    let _ = write!(out, " ({})", reachability_label(outcome.reachability));
    if outcome.interrupted {
        out.push_str(", interrupted");
    }
    out
}

/// Render the `-statistics` trailer: probe counts, nothing per-probe.
#[must_use]
pub fn summary_statistics(outcome: &Outcome) -> String {
    format!(
        "probes sent: {}, probes given up on: {}",
        outcome.probes_sent, outcome.probes_given_up
    )
}

/// Render the `-full-statistics` trailer: one line per probe, in id
/// order, covering every probe the publish callback ever saw.
#[must_use]
pub fn full_statistics<'a>(probes: impl Iterator<Item = &'a Probe>) -> String {
    let mut out = String::new();
    for probe in probes {
        let verdict = match probe.response_type {
            ResponseType::EchoResponse => "reply from destination".to_string(),
            ResponseType::DestinationUnreachable => "destination unreachable".to_string(),
            ResponseType::TimeExceeded => "time exceeded".to_string(),
            ResponseType::NoResponse => "no response".to_string(),
            ResponseType::StillWaiting | ResponseType::RetransmissionConsidered => {
                "still waiting".to_string()
            }
        };
        let _ = writeln!(
            out,
            "probe {} ttl {}: {verdict}, {} duplicate(s)",
            probe.id.0, probe.hops.0, probe.duplicate_responses
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptrace_core::{Hops, ProbeId};
    use std::time::{Duration, Instant};

    fn probe(hops: u8, response_type: ResponseType) -> Probe {
        let now = Instant::now();
        Probe {
            id: ProbeId(1),
            hops: Hops(hops),
            probe_length: 84,
            sent_time: now,
            initial_timeout: now + Duration::from_millis(500),
            previous_transmission: None,
            next_retransmission: None,
            new_probe_instead_of_retransmission: None,
            responded: response_type != ResponseType::StillWaiting
                && response_type != ResponseType::NoResponse,
            response_type,
            response_length: None,
            response_time: None,
            delay: (response_type == ResponseType::EchoResponse).then_some(Duration::from_millis(23)),
            duplicate_responses: 0,
        }
    }

    #[test]
    fn progress_skips_sent_probes_unless_detailed() {
        let p = probe(12, ResponseType::StillWaiting);
        assert!(progress_line(&p, false).is_none());
        assert!(progress_line(&p, true).unwrap().contains("sent"));
    }

    #[test]
    fn progress_reports_echo_reply_with_delay_when_detailed() {
        let p = probe(12, ResponseType::EchoResponse);
        assert_eq!(Some("ttl 12: reply from destination".to_string()), progress_line(&p, false));
        let detailed = progress_line(&p, true).unwrap();
        assert!(detailed.contains("reply from destination"));
        assert!(detailed.contains("23"));
    }

    #[test]
    fn progress_reports_no_response_as_gave_up() {
        let p = probe(12, ResponseType::NoResponse);
        assert!(progress_line(&p, false).unwrap().contains("gave up"));
    }

    #[test]
    fn full_statistics_lists_one_line_per_probe() {
        let probes = vec![probe(6, ResponseType::TimeExceeded), probe(12, ResponseType::EchoResponse)];
        let rendered = full_statistics(probes.iter());
        assert_eq!(2, rendered.lines().count());
        assert!(rendered.contains("ttl 6: time exceeded"));
        assert!(rendered.contains("ttl 12: reply from destination"));
    }

    fn converged(hops: u8) -> Outcome {
        Outcome {
            min_hops: Hops(hops),
            max_hops: Hops(hops),
            reachability: Reachability::Reachable,
            probes_sent: 4,
            probes_given_up: 0,
            interrupted: false,
        }
    }

    fn unconverged() -> Outcome {
        Outcome {
            min_hops: Hops(1),
            max_hops: Hops(255),
            reachability: Reachability::Unknown,
            probes_sent: 256,
            probes_given_up: 256,
            interrupted: false,
        }
    }

    #[test]
    fn machine_readable_converged_is_a_single_number() {
        assert_eq!("12", machine_readable(&converged(12)));
    }

    #[test]
    fn machine_readable_unconverged_is_a_range_with_reachability() {
        assert_eq!("1-255:unknown", machine_readable(&unconverged()));
    }

    #[test]
    fn human_readable_mentions_the_destination() {
        let text = human_readable("203.0.113.1", &converged(12));
        assert!(text.contains("203.0.113.1"));
        assert!(text.contains("12 hops"));
    }

    #[test]
    fn human_readable_notes_interruption() {
        let mut outcome = converged(12);
        outcome.interrupted = true;
        assert!(human_readable("dest", &outcome).contains("interrupted"));
    }
}
