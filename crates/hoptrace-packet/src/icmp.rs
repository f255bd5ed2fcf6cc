//! ICMPv4 echo request construction and response parsing.

use crate::checksum::checksum;
use crate::error::PacketError;
use crate::ipv4::{Ipv4Header, IPV4_HEADER_LEN, PROTO_ICMP};
use std::net::Ipv4Addr;

pub const ICMP_HEADER_LEN: usize = 8;

const TYPE_ECHO_REPLY: u8 = 0;
const TYPE_DEST_UNREACHABLE: u8 = 3;
const TYPE_ECHO_REQUEST: u8 = 8;
const TYPE_TIME_EXCEEDED: u8 = 11;

/// The repeating payload pattern used to pad an Echo Request out to the
/// configured size.
pub const DEFAULT_PAYLOAD_PATTERN: &[u8] = b"archtester";

/// Builds a complete IPv4 + ICMPv4 Echo Request datagram.
///
/// `payload_len` is the number of bytes of payload to follow the 8-byte
/// ICMP header; the payload is `DEFAULT_PAYLOAD_PATTERN` repeated and
/// truncated to fit.
#[must_use]
pub fn build_echo_request(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    ttl: u8,
    id: u16,
    sequence: u16,
    payload_len: usize,
) -> Vec<u8> {
    let mut icmp = Vec::with_capacity(ICMP_HEADER_LEN + payload_len);
    icmp.push(TYPE_ECHO_REQUEST);
    icmp.push(0); // code
    icmp.extend_from_slice(&[0, 0]); // checksum placeholder
    icmp.extend_from_slice(&id.to_be_bytes());
    icmp.extend_from_slice(&sequence.to_be_bytes());
    icmp.extend(
        DEFAULT_PAYLOAD_PATTERN
            .iter()
            .cycle()
            .take(payload_len)
            .copied(),
    );
    let icmp_sum = checksum(&icmp);
    icmp[2..4].copy_from_slice(&icmp_sum.to_be_bytes());

    let ip_header = Ipv4Header {
        total_len: (IPV4_HEADER_LEN + icmp.len()) as u16,
        identification: id,
        flags_fragment_offset: 0,
        ttl,
        protocol: PROTO_ICMP,
        source,
        destination,
    };
    let mut packet = Vec::with_capacity(IPV4_HEADER_LEN + icmp.len());
    packet.extend_from_slice(&ip_header.to_bytes());
    packet.extend_from_slice(&icmp);
    packet
}

/// Addresses quoted inside an ICMP error's embedded offending packet,
/// needed for the "our-packet test" (spec §4.5): the quoted source must
/// have been us, and the quoted destination must have been the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotedAddresses {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// A validated ICMP response relevant to hop-count probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpResponse {
    /// The target itself replied to our Echo Request.
    EchoReply {
        responder: Ipv4Addr,
        /// The outer IP header's destination, i.e. who the reply was
        /// addressed to.
        destination: Ipv4Addr,
        /// The TTL field of the IP header carrying the reply, as received.
        received_ttl: u8,
        id: u16,
        sequence: u16,
    },
    /// A router along the path reported that the TTL expired.
    ///
    /// `id`/`sequence` are taken from the *quoted* inner Echo Request.
    TimeExceeded {
        responder: Ipv4Addr,
        destination: Ipv4Addr,
        quoted: QuotedAddresses,
        id: u16,
        sequence: u16,
    },
    /// The target or a router reported the destination was unreachable.
    DestinationUnreachable {
        responder: Ipv4Addr,
        destination: Ipv4Addr,
        quoted: QuotedAddresses,
        id: u16,
        sequence: u16,
    },
}

impl IcmpResponse {
    #[must_use]
    pub const fn id(&self) -> u16 {
        match self {
            Self::EchoReply { id, .. }
            | Self::TimeExceeded { id, .. }
            | Self::DestinationUnreachable { id, .. } => *id,
        }
    }

    #[must_use]
    pub const fn responder(&self) -> Ipv4Addr {
        match self {
            Self::EchoReply { responder, .. }
            | Self::TimeExceeded { responder, .. }
            | Self::DestinationUnreachable { responder, .. } => *responder,
        }
    }

    /// The "our-packet test" (spec §4.5): the outer IP destination must be
    /// our own source address, and for ICMP errors the quoted inner packet
    /// must show us as its source and `target` as its destination.
    #[must_use]
    pub fn is_addressed_to(&self, our_source: Ipv4Addr, target: Ipv4Addr) -> bool {
        match self {
            Self::EchoReply { destination, .. } => *destination == our_source,
            Self::TimeExceeded { destination, quoted, .. }
            | Self::DestinationUnreachable { destination, quoted, .. } => {
                *destination == our_source && quoted.source == our_source && quoted.destination == target
            }
        }
    }
}

/// Validates and interprets a raw datagram read from the ICMP raw socket.
///
/// Implements the ordered validation steps from the probe transceiver
/// design: length and IP version, claimed-vs-actual length, fragment
/// offset, protocol, ICMP header presence, and (for error types) that the
/// quoted inner packet is itself an ICMP Echo Request.
///
/// Returns `Ok(None)` for any well-formed ICMP message we simply do not
/// act on (anything other than Echo Reply, Time Exceeded or Destination
/// Unreachable): not an error, just not interesting to the caller.
pub fn parse_response(data: &[u8]) -> Result<Option<IcmpResponse>, PacketError> {
    let (ip_header, rest) = Ipv4Header::parse(data)?;
    if rest.len() < ICMP_HEADER_LEN {
        return Err(PacketError::TooShort {
            need: ICMP_HEADER_LEN,
            got: rest.len(),
        });
    }
    let icmp_type = rest[0];
    let icmp_code = rest[1];

    match icmp_type {
        TYPE_ECHO_REPLY => {
            let id = u16::from_be_bytes([rest[4], rest[5]]);
            let sequence = u16::from_be_bytes([rest[6], rest[7]]);
            Ok(Some(IcmpResponse::EchoReply {
                responder: ip_header.source,
                destination: ip_header.destination,
                received_ttl: ip_header.ttl,
                id,
                sequence,
            }))
        }
        TYPE_TIME_EXCEEDED => {
            if icmp_code != 0 {
                return Err(PacketError::UnexpectedIcmpType {
                    icmp_type,
                    code: icmp_code,
                });
            }
            let (id, sequence, quoted) = parse_quoted_echo(&rest[ICMP_HEADER_LEN..])?;
            Ok(Some(IcmpResponse::TimeExceeded {
                responder: ip_header.source,
                destination: ip_header.destination,
                quoted,
                id,
                sequence,
            }))
        }
        TYPE_DEST_UNREACHABLE => {
            let (id, sequence, quoted) = parse_quoted_echo(&rest[ICMP_HEADER_LEN..])?;
            Ok(Some(IcmpResponse::DestinationUnreachable {
                responder: ip_header.source,
                destination: ip_header.destination,
                quoted,
                id,
                sequence,
            }))
        }
        _ => Ok(None),
    }
}

/// Extracts the `(id, sequence)` of the quoted inner Echo Request embedded
/// in a Time Exceeded or Destination Unreachable message, along with the
/// quoted packet's own source/destination (spec §4.5, "our-packet test").
fn parse_quoted_echo(quoted: &[u8]) -> Result<(u16, u16, QuotedAddresses), PacketError> {
    if quoted.len() < IPV4_HEADER_LEN + ICMP_HEADER_LEN {
        return Err(PacketError::TruncatedQuotedPacket);
    }
    let (inner_ip, inner_rest) =
        Ipv4Header::parse_quoted(quoted).map_err(|_| PacketError::TruncatedQuotedPacket)?;
    if inner_ip.protocol != PROTO_ICMP || inner_rest.len() < ICMP_HEADER_LEN {
        return Err(PacketError::QuotedPacketNotEcho);
    }
    if inner_rest[0] != TYPE_ECHO_REQUEST {
        return Err(PacketError::QuotedPacketNotEcho);
    }
    let id = u16::from_be_bytes([inner_rest[4], inner_rest[5]]);
    let sequence = u16::from_be_bytes([inner_rest[6], inner_rest[7]]);
    let addresses = QuotedAddresses {
        source: inner_ip.source,
        destination: inner_ip.destination,
    };
    Ok((id, sequence, addresses))
}
