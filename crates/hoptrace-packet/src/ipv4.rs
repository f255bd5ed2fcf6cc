//! Minimal IPv4 header construction and parsing.
//!
//! Only the fields the probe transceiver needs are modeled: there are no
//! options, no fragmentation is ever produced, and the header length is
//! always 5 (20 bytes).

use crate::checksum::checksum;
use crate::error::PacketError;
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: usize = 20;

pub const PROTO_ICMP: u8 = 1;

/// A parsed (or about-to-be-built) IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub total_len: u16,
    pub identification: u16,
    /// Raw 16-bit flags+fragment-offset field, as received (host order).
    pub flags_fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Serialize this header to its 20-byte wire form, with the checksum
    /// computed over the header itself.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut buf = [0u8; IPV4_HEADER_LEN];
        buf[0] = 0x45; // version 4, IHL 5 (no options)
        buf[1] = 0; // TOS
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.identification.to_be_bytes());
        buf[6..8].copy_from_slice(&self.flags_fragment_offset.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&[0, 0]); // checksum placeholder
        buf[12..16].copy_from_slice(&self.source.octets());
        buf[16..20].copy_from_slice(&self.destination.octets());
        let sum = checksum(&buf);
        buf[10..12].copy_from_slice(&sum.to_be_bytes());
        buf
    }

    /// Parse a header from the front of `data`, returning the header and
    /// the remainder of the slice (which may be shorter than the header's
    /// own claimed length minus 20 bytes if the caller has more data than
    /// the IP layer claims).
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        Self::parse_fields(data, true)
    }

    /// Parse the IP header embedded in a quoted (RFC 792) ICMP error.
    ///
    /// The quote is deliberately truncated to IP header + 8 bytes, but its
    /// `total_len` field still describes the *original*, longer datagram —
    /// checking it against the (short) number of bytes actually present
    /// would reject every such quote. The original implementation this was
    /// ported from never re-validates `ip_len` here either; it just reads
    /// the fixed-offset fields (`hopping.c`'s embedded-packet extraction).
    pub(crate) fn parse_quoted(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        Self::parse_fields(data, false)
    }

    fn parse_fields(data: &[u8], check_total_len: bool) -> Result<(Self, &[u8]), PacketError> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(PacketError::TooShort {
                need: IPV4_HEADER_LEN,
                got: data.len(),
            });
        }
        let version = data[0] >> 4;
        if version != 4 {
            return Err(PacketError::UnsupportedIpVersion(version));
        }
        let total_len = u16::from_be_bytes([data[2], data[3]]);
        if check_total_len && usize::from(total_len) > data.len() {
            return Err(PacketError::TruncatedPacket {
                claimed: usize::from(total_len),
                actual: data.len(),
            });
        }
        let flags_fragment_offset = u16::from_be_bytes([data[6], data[7]]);
        // Mask off the Don't-Fragment bit (0x4000); any remaining bits
        // indicate a non-zero fragment offset or the More-Fragments flag.
        if flags_fragment_offset & !0x4000 != 0 {
            return Err(PacketError::Fragmented);
        }
        let ttl = data[8];
        let protocol = data[9];
        if protocol != PROTO_ICMP {
            return Err(PacketError::NotIcmp(protocol));
        }
        let source = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let destination = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let header = Self {
            total_len,
            identification: u16::from_be_bytes([data[4], data[5]]),
            flags_fragment_offset,
            ttl,
            protocol,
            source,
            destination,
        };
        Ok((header, &data[IPV4_HEADER_LEN..]))
    }
}
