//! Raw ICMPv4 socket transport (spec §1 "Out of scope": raw-socket
//! send/receive syscalls, interface discovery, DNS resolution — all live
//! here at the edge, behind the [`hoptrace_core::PacketTransport`] and
//! [`hoptrace_core::Clock`] capabilities the engine actually consumes).

use hoptrace_core::transport::PacketTransport;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// Largest datagram the transceiver will ever read (spec §4.5, `IP_MAXPACKET`).
const IP_MAXPACKET: usize = 65_535;

/// Resolve a hostname or dotted-quad string to an IPv4 address.
///
/// # Errors
///
/// Returns an error if resolution fails or yields no IPv4 address at all
/// (spec §7, "Fatal configuration": "unresolvable destination").
pub fn resolve_destination(host: &str) -> io::Result<Ipv4Addr> {
    (host, 0_u16)
        .to_socket_addrs()?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no IPv4 address for {host}")))
}

/// Discover the source IPv4 address the kernel would use to reach
/// `destination`, by connecting a throwaway UDP socket and reading back
/// its local address — the standard trick for this, since Rust's
/// standard library has no direct "which interface routes to X" query.
///
/// # Errors
///
/// Returns an error if no route to `destination` exists.
pub fn discover_source_address(destination: Ipv4Addr) -> io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((destination, 9))?;
    match socket.local_addr()? {
        SocketAddr::V4(v4) => Ok(*v4.ip()),
        SocketAddr::V6(_) => Err(io::Error::new(io::ErrorKind::Other, "connected UDP socket is IPv6")),
    }
}

/// Raw ICMPv4 socket, writing its own IP header (spec §4.5, "the process
/// writes the IP header itself and asks the kernel not to provide one")
/// and reading back whatever ICMP traffic the kernel delivers.
pub struct RawIcmpTransport {
    socket: Socket,
}

impl RawIcmpTransport {
    /// Open the raw socket, optionally bound to a named outgoing
    /// interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw socket cannot be created (typically
    /// insufficient privilege) or the named interface does not exist
    /// (spec §7, "Fatal system").
    pub fn new(interface: Option<&str>) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        socket.set_header_included_v4(true)?;
        if let Some(name) = interface {
            bind_to_interface(&socket, name)?;
        }
        Ok(Self { socket })
    }
}

#[cfg(target_os = "linux")]
fn bind_to_interface(socket: &Socket, name: &str) -> io::Result<()> {
    socket.bind_device(Some(name.as_bytes()))
}

#[cfg(not(target_os = "linux"))]
fn bind_to_interface(_socket: &Socket, name: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("binding to a named interface ({name}) is only supported on Linux"),
    ))
}

impl PacketTransport for RawIcmpTransport {
    type Error = io::Error;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        let destination = destination_of(packet)?;
        let address = SockAddr::from(SocketAddrV4::new(destination, 0));
        self.socket.send_to(packet, &address)?;
        Ok(())
    }

    fn poll_recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Self::Error> {
        // A zero timeout means "poll without blocking" (spec §4.7 step 2,
        // draining the socket); `set_read_timeout(None)` would instead
        // mean "block forever", so map it to the smallest representable
        // nonzero timeout instead.
        let effective = if timeout.is_zero() { Duration::from_nanos(1) } else { timeout };
        self.socket.set_read_timeout(Some(effective))?;

        let mut buf = [0_u8; IP_MAXPACKET];
        match self.socket.read(&mut buf) {
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(error) if matches!(error.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// Extract the destination address from a packet's own IP header, so
/// [`RawIcmpTransport::send`] does not need it passed separately — the
/// engine already addressed the packet correctly.
fn destination_of(packet: &[u8]) -> io::Result<Ipv4Addr> {
    let (header, _) = hoptrace_packet::Ipv4Header::parse(packet)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;
    debug!(destination = %header.destination, "sending probe datagram");
    Ok(header.destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_destination_accepts_a_dotted_quad() {
        let addr = resolve_destination("203.0.113.1").unwrap();
        assert_eq!(Ipv4Addr::new(203, 0, 113, 1), addr);
    }

    #[test]
    fn discover_source_address_finds_some_local_route() {
        // Loopback always has a route, even in a sandboxed test runner.
        let source = discover_source_address(Ipv4Addr::LOCALHOST).unwrap();
        assert!(source.is_loopback());
    }

    #[test]
    fn destination_of_reads_the_ip_header() {
        let packet = hoptrace_packet::build_echo_request(
            Ipv4Addr::new(192, 0, 2, 1),
            Ipv4Addr::new(203, 0, 113, 1),
            12,
            7,
            1,
            8,
        );
        assert_eq!(Ipv4Addr::new(203, 0, 113, 1), destination_of(&packet).unwrap());
    }
}
