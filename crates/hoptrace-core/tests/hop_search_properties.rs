//! Property tests against a simulated network (spec §8).
//!
//! These drive the public `Engine` API exactly as `hoptrace-cli` does,
//! substituting a scripted `PacketTransport`/`Clock` pair for the real
//! raw socket so the properties hold independent of any live network.

use hoptrace_core::{Clock, Config, Engine, Hops, InversionPolicy, Interval, PacketTransport, TtlAlgorithm};
use hoptrace_packet::checksum::checksum;
use hoptrace_packet::{build_echo_request, Ipv4Header, IPV4_HEADER_LEN};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

const SOURCE: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const DESTINATION: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);

struct SteppingClock(Cell<Instant>);

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let current = self.0.get();
        self.0.set(current + Duration::from_millis(50));
        current
    }
}

fn echo_reply(id: u16, sequence: u16, ttl: u8) -> Vec<u8> {
    let mut icmp = vec![0u8, 0, 0, 0];
    icmp.extend_from_slice(&id.to_be_bytes());
    icmp.extend_from_slice(&sequence.to_be_bytes());
    let sum = checksum(&icmp);
    icmp[2..4].copy_from_slice(&sum.to_be_bytes());
    let header = Ipv4Header {
        total_len: (IPV4_HEADER_LEN + icmp.len()) as u16,
        identification: id,
        flags_fragment_offset: 0,
        ttl,
        protocol: hoptrace_packet::ipv4::PROTO_ICMP,
        source: DESTINATION,
        destination: SOURCE,
    };
    let mut packet = header.to_bytes().to_vec();
    packet.extend_from_slice(&icmp);
    packet
}

fn time_exceeded(quoted_ttl: u8, quoted_id: u16, quoted_seq: u16) -> Vec<u8> {
    let quoted = build_echo_request(SOURCE, DESTINATION, quoted_ttl, quoted_id, quoted_seq, 4);
    let mut icmp = vec![11u8, 0, 0, 0, 0, 0, 0, 0];
    icmp.extend_from_slice(&quoted[..IPV4_HEADER_LEN + 8]);
    let sum = checksum(&icmp);
    icmp[2..4].copy_from_slice(&sum.to_be_bytes());
    let header = Ipv4Header {
        total_len: (IPV4_HEADER_LEN + icmp.len()) as u16,
        identification: 1,
        flags_fragment_offset: 0,
        ttl: 250,
        protocol: hoptrace_packet::ipv4::PROTO_ICMP,
        source: DESTINATION,
        destination: SOURCE,
    };
    let mut packet = header.to_bytes().to_vec();
    packet.extend_from_slice(&icmp);
    packet
}

fn probe_id_and_seq(packet: &[u8]) -> (u16, u16) {
    let (_, rest) = Ipv4Header::parse(packet).unwrap();
    (
        u16::from_be_bytes([rest[4], rest[5]]),
        u16::from_be_bytes([rest[6], rest[7]]),
    )
}

/// Replies Time Exceeded below `hidden_hops` and Echo Reply at or above
/// it, mirroring the hidden-hop-count simulator of spec §8 property 1.
struct ReliableNetwork {
    hidden_hops: u8,
    inbox: RefCell<VecDeque<Vec<u8>>>,
}

impl PacketTransport for ReliableNetwork {
    type Error = Infallible;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        let (ip, _) = Ipv4Header::parse(packet).unwrap();
        let (id, seq) = probe_id_and_seq(packet);
        let reply = if ip.ttl >= self.hidden_hops {
            echo_reply(id, seq, 64 - self.hidden_hops)
        } else {
            time_exceeded(ip.ttl, id, seq)
        };
        self.inbox.borrow_mut().push_back(reply);
        Ok(())
    }

    fn poll_recv(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.inbox.borrow_mut().pop_front())
    }
}

fn converges_for(hidden_hops: u8) {
    let config = Config {
        parallel: 1,
        max_tries: 3,
        algorithm: TtlAlgorithm::BinarySearch,
        rng_seed: Some(7),
        ..Config::default()
    };
    let mut engine = Engine::new(config);
    let mut network = ReliableNetwork {
        hidden_hops,
        inbox: RefCell::new(VecDeque::new()),
    };
    let clock = SteppingClock(Cell::new(Instant::now()));

    let outcome = engine
        .run(SOURCE, DESTINATION, &mut network, &clock, || false, |_| {})
        .unwrap();

    assert!(outcome.converged(), "did not converge for h={hidden_hops}");
    assert_eq!(Hops(hidden_hops), outcome.min_hops);
    // ceil(log2(200)) + 4 == 12, generously rounded up for the biased
    // first few probes the binary search algorithm spends regardless of h.
    assert!(
        outcome.probes_sent <= 20,
        "h={hidden_hops} took {} probes",
        outcome.probes_sent
    );
}

#[test]
fn converges_under_reliable_network_for_a_spread_of_hop_counts() {
    for hidden_hops in [1, 2, 5, 8, 12, 20, 30, 64, 100, 150, 200] {
        converges_for(hidden_hops);
    }
}

/// property 2: feeding the same Echo Reply twice yields the same interval
/// as feeding it once, and `duplicate_responses` is incremented by
/// exactly one (checked indirectly: the run still converges to the same
/// single value and sends no more probes than the non-duplicated case).
#[test]
fn duplicate_responses_do_not_change_the_converged_interval() {
    struct DuplicatingNetwork {
        hidden_hops: u8,
        inbox: RefCell<VecDeque<Vec<u8>>>,
    }

    impl PacketTransport for DuplicatingNetwork {
        type Error = Infallible;

        fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
            let (ip, _) = Ipv4Header::parse(packet).unwrap();
            let (id, seq) = probe_id_and_seq(packet);
            let reply = if ip.ttl >= self.hidden_hops {
                echo_reply(id, seq, 64 - self.hidden_hops)
            } else {
                time_exceeded(ip.ttl, id, seq)
            };
            // Enqueue every reply twice: the second copy is always a
            // duplicate of an already-responded probe.
            self.inbox.borrow_mut().push_back(reply.clone());
            self.inbox.borrow_mut().push_back(reply);
            Ok(())
        }

        fn poll_recv(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(self.inbox.borrow_mut().pop_front())
        }
    }

    let config = Config {
        parallel: 1,
        max_tries: 3,
        algorithm: TtlAlgorithm::BinarySearch,
        rng_seed: Some(3),
        ..Config::default()
    };
    let mut engine = Engine::new(config);
    let mut network = DuplicatingNetwork {
        hidden_hops: 12,
        inbox: RefCell::new(VecDeque::new()),
    };
    let clock = SteppingClock(Cell::new(Instant::now()));

    let mut duplicates_seen = 0;
    let outcome = engine
        .run(SOURCE, DESTINATION, &mut network, &clock, || false, |probe| {
            if probe.duplicate_responses > 0 {
                duplicates_seen += 1;
            }
        })
        .unwrap();

    assert!(outcome.converged());
    assert_eq!(Hops(12), outcome.min_hops);
    assert!(duplicates_seen > 0, "expected at least one duplicate to be observed");
}

/// property 3: a network that drops the first `k` packets at one TTL
/// then replies produces a chain of exactly `min(k, maxTries)` extra
/// retransmissions (the original probe plus `k` retries, capped).
#[test]
fn retransmission_chain_matches_the_configured_drop_count() {
    struct DropFirstK {
        drops_remaining: Cell<u32>,
        sends_seen: Cell<u32>,
        inbox: RefCell<VecDeque<Vec<u8>>>,
    }

    impl PacketTransport for DropFirstK {
        type Error = Infallible;

        fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
            self.sends_seen.set(self.sends_seen.get() + 1);
            let (id, seq) = probe_id_and_seq(packet);
            if self.drops_remaining.get() > 0 {
                self.drops_remaining.set(self.drops_remaining.get() - 1);
                return Ok(());
            }
            self.inbox.borrow_mut().push_back(echo_reply(id, seq, 63));
            Ok(())
        }

        fn poll_recv(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(self.inbox.borrow_mut().pop_front())
        }
    }

    let k = 2;
    let config = Config {
        parallel: 1,
        max_tries: 5,
        first_ttl: Hops(1),
        max_ttl: Hops(1),
        algorithm: TtlAlgorithm::Sequential,
        likely_candidates: false,
        ..Config::default()
    };
    let mut engine = Engine::new(config);
    let mut network = DropFirstK {
        drops_remaining: Cell::new(k),
        sends_seen: Cell::new(0),
        inbox: RefCell::new(VecDeque::new()),
    };
    // Each retransmission backs off geometrically from 500ms; stepping by
    // a full second per clock read guarantees every expired timer is
    // serviced well before the next scheduler pass needs it.
    struct FastClock(Cell<Instant>);
    impl Clock for FastClock {
        fn now(&self) -> Instant {
            let current = self.0.get();
            self.0.set(current + Duration::from_secs(1));
            current
        }
    }
    let clock = FastClock(Cell::new(Instant::now()));

    let outcome = engine
        .run(SOURCE, DESTINATION, &mut network, &clock, || false, |_| {})
        .unwrap();

    assert!(outcome.converged());
    assert_eq!(Hops(1), outcome.min_hops);
    assert_eq!(k + 1, network.sends_seen.get());
}

/// property 4: a reply with inner (received) TTL `r` always bounds
/// `maxHops <= 256 - r`, even when the probe was sent with a far larger
/// TTL, and regardless of delivery order against other updates.
#[test]
fn kivinen_bound_holds_across_received_ttls() {
    for received_ttl in [1u8, 10, 64, 128, 200, 250, 255] {
        let mut interval = Interval::default();
        interval.apply_echo_reply(Hops(250), received_ttl, 0, InversionPolicy::ClampToMin);
        let bound = 256u16 - u16::from(received_ttl);
        assert!(
            u16::from(interval.max().0) <= bound,
            "received_ttl={received_ttl} gave max={}, expected <= {bound}",
            interval.max().0
        );
    }
}

/// property 5: delivering the same multiset of interval updates in any
/// order yields the same final interval, since both update rules are
/// monotone (min only grows, max only shrinks).
#[test]
fn interval_updates_are_order_independent() {
    let apply_in_order = |order: &[usize]| {
        let updates: Vec<Box<dyn Fn(&mut Interval)>> = vec![
            Box::new(|i: &mut Interval| {
                i.apply_time_exceeded(Hops(5), InversionPolicy::ClampToMin);
            }),
            Box::new(|i: &mut Interval| {
                i.apply_time_exceeded(Hops(9), InversionPolicy::ClampToMin);
            }),
            Box::new(|i: &mut Interval| {
                i.apply_echo_reply(Hops(20), 64, 0, InversionPolicy::ClampToMin);
            }),
            Box::new(|i: &mut Interval| {
                i.apply_echo_reply(Hops(30), 240, 0, InversionPolicy::ClampToMin);
            }),
        ];
        let mut interval = Interval::default();
        for &index in order {
            updates[index](&mut interval);
        }
        interval
    };

    let forward = apply_in_order(&[0, 1, 2, 3]);
    let reversed = apply_in_order(&[3, 2, 1, 0]);
    let shuffled = apply_in_order(&[2, 0, 3, 1]);

    assert_eq!(forward, reversed);
    assert_eq!(forward, shuffled);
    assert_eq!(Hops(10), forward.min());
    assert_eq!(Hops(16), forward.max());
}
