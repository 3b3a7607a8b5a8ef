//! Wake-on-LAN plumbing for powering the unit on while its control socket
//! is down.

use std::net::Ipv4Addr;

use tokio::net::UdpSocket;

use super::{ProtocolError, Result};

/// UDP port conventionally listened on for wake packets.
const WAKE_PORT: u16 = 9;

/// Parse a hardware address in `aa:bb:cc:dd:ee:ff`, dashed or dotted form
/// into its six raw bytes.
pub fn parse_hardware_address(mac: &str) -> Result<[u8; 6]> {
    let cleaned: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    let bytes = hex::decode(&cleaned)
        .map_err(|_| ProtocolError::InvalidHardwareAddress(mac.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ProtocolError::InvalidHardwareAddress(mac.to_string()))
}

/// Build the standard 102-byte magic packet: six `0xFF` bytes followed by
/// sixteen repetitions of the hardware address.
pub fn magic_packet(address: &[u8; 6]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(102);
    packet.extend_from_slice(&[0xFF; 6]);
    for _ in 0..16 {
        packet.extend_from_slice(address);
    }
    packet
}

/// Directed broadcast address for the host, assuming a /24 subnet (the
/// overwhelmingly common home-network case). Hostnames and IPv6 yield
/// `None` and the caller falls back to the universal broadcast only.
pub fn directed_broadcast(host: &str) -> Option<Ipv4Addr> {
    let addr: Ipv4Addr = host.parse().ok()?;
    let [a, b, c, _] = addr.octets();
    Some(Ipv4Addr::new(a, b, c, 255))
}

/// Broadcast a wake packet for `mac`, once to the universal broadcast
/// address and once to the subnet-directed broadcast derived from `host`.
pub async fn send_wake(mac: &str, host: &str) -> Result<()> {
    let address = parse_hardware_address(mac)?;
    let packet = magic_packet(&address);

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(&packet, (Ipv4Addr::BROADCAST, WAKE_PORT)).await?;

    if let Some(directed) = directed_broadcast(host) {
        if directed != Ipv4Addr::BROADCAST {
            socket.send_to(&packet, (directed, WAKE_PORT)).await?;
        }
    } else {
        log::debug!("No IPv4 host for directed broadcast, sent universal only");
    }

    Ok(())
}
