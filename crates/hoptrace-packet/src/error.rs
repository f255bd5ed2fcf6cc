//! Errors produced while building or parsing packets.

use thiserror::Error;

/// An error encountered while parsing a received datagram.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("unsupported IP version {0}")]
    UnsupportedIpVersion(u8),
    #[error("IP total length {claimed} exceeds received length {actual}")]
    TruncatedPacket { claimed: usize, actual: usize },
    #[error("packet is a non-zero-offset IP fragment")]
    Fragmented,
    #[error("IP protocol {0} is not ICMP")]
    NotIcmp(u8),
    #[error("unexpected ICMP type {icmp_type} code {code}")]
    UnexpectedIcmpType { icmp_type: u8, code: u8 },
    #[error("ICMP error does not quote enough of the original packet")]
    TruncatedQuotedPacket,
    #[error("ICMP error quotes a non-ICMP-echo packet")]
    QuotedPacketNotEcho,
}
