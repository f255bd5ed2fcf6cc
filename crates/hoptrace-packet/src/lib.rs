//! ICMPv4 echo request construction and ICMPv4 response parsing.
//!
//! This crate knows nothing about probe scheduling or hop-count search; it
//! only builds the bytes that go on the wire and turns bytes coming off the
//! wire into a small, already-validated [`icmp::IcmpResponse`] enum.

pub mod checksum;
pub mod error;
pub mod icmp;
pub mod ipv4;

pub use error::PacketError;
pub use icmp::{build_echo_request, parse_response, IcmpResponse, QuotedAddresses, ICMP_HEADER_LEN};
pub use ipv4::{Ipv4Header, IPV4_HEADER_LEN};
