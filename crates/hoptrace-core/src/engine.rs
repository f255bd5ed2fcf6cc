//! Main loop (spec §4.7): owns the probe table, interval, bucket and
//! selector for the lifetime of one run and drives them to completion.

use crate::bucket::Bucket;
use crate::config::Config;
use crate::error::EngineError;
use crate::interpreter;
use crate::interval::Interval;
use crate::probe::{ProbeTable, ResponseType};
use crate::scheduler;
use crate::selector::Selector;
use crate::transport::{Clock, PacketTransport};
use crate::types::{Hops, ProbeId, MAX_PROBES};
use hoptrace_packet::{build_echo_request, parse_response, IcmpResponse};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

/// How the destination's reachability is summarized at the end of a run
/// (spec §6, "Output").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// At least one probe drew an Echo Reply from the destination itself.
    Reachable,
    /// Some signal arrived (Time Exceeded or Destination Unreachable) but
    /// no Echo Reply ever did.
    Mixed,
    /// No probe drew any response at all.
    Unknown,
}

/// Result of one [`Engine::run`].
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub min_hops: Hops,
    pub max_hops: Hops,
    pub reachability: Reachability,
    pub probes_sent: u32,
    pub probes_given_up: u32,
    pub interrupted: bool,
}

impl Outcome {
    #[must_use]
    pub fn converged(self) -> bool {
        self.min_hops == self.max_hops
    }
}

/// Owns everything a single run needs (spec §9, Design Note "Process-wide
/// state"): the probe table, interval, token bucket and TTL selector.
/// Constructed fresh per run by [`Engine::new`]; nothing survives past
/// [`Engine::run`] returning.
pub struct Engine {
    config: Config,
    table: ProbeTable,
    interval: Interval,
    bucket: Bucket,
    selector: Selector,
    given_up: u32,
}

impl Engine {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let bucket = Bucket::new(config.parallel);
        let selector = Selector::new(
            config.algorithm,
            config.likely_candidates,
            config.probabilistic_distribution,
            config.readjust,
            config.first_ttl,
            config.max_ttl,
            config.rng_seed,
        );
        Self {
            config,
            table: ProbeTable::default(),
            interval: Interval::default(),
            bucket,
            selector,
            given_up: 0,
        }
    }

    /// Run the adaptive hop search to completion (spec §4.7).
    ///
    /// `is_interrupted` is polled once per loop iteration; once it returns
    /// `true` the loop exits at the next opportunity rather than sending
    /// further probes (spec §5, "Cancellation"; spec §6, "Signals").
    ///
    /// `publish` is called with a snapshot of each probe as its state
    /// changes (sent, responded, given up), mirroring the teacher's
    /// `IcmpTracer<F: Fn(&Probe)>` callback (SPEC_FULL §8); a caller that
    /// has no use for per-probe progress can pass `|_| {}`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] if the transport fails, or
    /// [`EngineError::Exhausted`] if the probe table's fixed physical
    /// capacity is reached while the scheduler still has work to do
    /// (spec §7, "Probe table exhaustion").
    pub fn run<T: PacketTransport>(
        &mut self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        transport: &mut T,
        clock: &dyn Clock,
        mut is_interrupted: impl FnMut() -> bool,
        mut publish: impl FnMut(&crate::probe::Probe),
    ) -> Result<Outcome, EngineError<T::Error>> {
        loop {
            let interrupted = is_interrupted();
            if !scheduler::should_continue_sending_or_waiting(
                interrupted,
                self.config.max_probes,
                self.interval,
                &self.table,
            ) {
                break;
            }

            let to_send = scheduler::fill_bucket(
                &mut self.table,
                self.interval,
                &mut self.bucket,
                &mut self.selector,
                &self.config,
                interrupted,
                clock,
            );
            for id in &to_send {
                self.send_probe(*id, source, destination, transport)?;
                publish(self.table.get(*id).expect("id was just sent"));
            }

            // The first `poll_recv` of every outer iteration blocks up to
            // this long when idle (spec §5: the poll is the loop's one
            // suspension point); once a packet arrives, draining the rest
            // of the batch switches to a non-blocking poll (`Duration::ZERO`)
            // until the socket is empty.
            let idle_timeout = if self.config.probe_pacing > Duration::ZERO {
                self.config.probe_pacing
            } else {
                self.config.poll_sleep
            };

            let mut timeout = idle_timeout;
            loop {
                let received = transport.poll_recv(timeout).map_err(EngineError::Transport)?;
                let Some(datagram) = received else {
                    break;
                };
                timeout = Duration::ZERO;
                if let Some(id) = self.handle_datagram(&datagram, source, destination, clock) {
                    publish(self.table.get(id).expect("id came from an interpreted response"));
                }
            }

            let serviced = scheduler::service_timeouts(
                &mut self.table,
                self.interval,
                &mut self.bucket,
                &mut self.selector,
                &self.config,
                interrupted,
                clock,
            );
            self.given_up += serviced.gave_up.len() as u32;
            for id in &serviced.gave_up {
                publish(self.table.get(*id).expect("id came from gave_up"));
            }
            for id in &serviced.to_send {
                self.send_probe(*id, source, destination, transport)?;
                publish(self.table.get(*id).expect("id was just sent"));
            }

            let wants_more = scheduler::should_continue_sending(
                interrupted,
                self.config.max_probes,
                self.interval,
                &self.table,
            );
            if wants_more && self.table.sent() as usize >= MAX_PROBES {
                return Err(EngineError::Exhausted {
                    sent: self.table.sent(),
                });
            }
        }

        Ok(self.outcome(is_interrupted()))
    }

    fn send_probe<T: PacketTransport>(
        &self,
        id: ProbeId,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        transport: &mut T,
    ) -> Result<(), EngineError<T::Error>> {
        let probe = self
            .table
            .get(id)
            .expect("scheduler only returns ids it just allocated");
        let packet = build_echo_request(
            source,
            destination,
            probe.hops.0,
            probe.id.0,
            probe.id.0,
            probe.probe_length,
        );
        debug!(ttl = probe.hops.0, id = probe.id.0, "sending probe");
        transport.send(&packet).map_err(EngineError::Transport)
    }

    /// Validate and interpret one received datagram, returning the id of
    /// the probe it was matched to (if any) so the caller can publish its
    /// updated state.
    fn handle_datagram(
        &mut self,
        datagram: &[u8],
        source: Ipv4Addr,
        destination: Ipv4Addr,
        clock: &dyn Clock,
    ) -> Option<ProbeId> {
        let response = match parse_response(datagram) {
            Ok(Some(response)) => response,
            Ok(None) => return None,
            Err(error) => {
                debug!(%error, "discarding malformed or uninteresting packet");
                return None;
            }
        };

        if !response.is_addressed_to(source, destination) {
            debug!(responder = %response.responder(), "discarding packet not addressed to us");
            return None;
        }

        let Some(interpretation) = interpreter::interpret(
            &response,
            datagram.len(),
            &mut self.table,
            &mut self.interval,
            &mut self.bucket,
            clock,
            self.config.kivinen_adjustment,
            self.config.on_inversion,
        ) else {
            debug!(id = response.id(), "discarding response for unknown probe id");
            return None;
        };

        if interpretation.duplicate {
            debug!(id = response.id(), "duplicate response");
        }
        if interpretation.anomaly {
            warn!(id = response.id(), "interval update rejected as an anomaly");
        }
        Some(ProbeId(response.id()))
    }

    fn outcome(&self, interrupted: bool) -> Outcome {
        Outcome {
            min_hops: self.interval.min(),
            max_hops: self.interval.max(),
            reachability: self.classify_reachability(),
            probes_sent: self.table.sent(),
            probes_given_up: self.given_up,
            interrupted,
        }
    }

    fn classify_reachability(&self) -> Reachability {
        let mut saw_echo = false;
        let mut saw_any = false;
        for id in self.table.allocated_ids() {
            let probe = self.table.get(id).expect("id came from allocated_ids");
            match probe.response_type {
                ResponseType::EchoResponse => {
                    saw_echo = true;
                    saw_any = true;
                }
                ResponseType::TimeExceeded | ResponseType::DestinationUnreachable => saw_any = true,
                _ => {}
            }
        }
        if saw_echo {
            Reachability::Reachable
        } else if saw_any {
            Reachability::Mixed
        } else {
            Reachability::Unknown
        }
    }
}
