//! Passive listener for collector announcements.
//!
//! Collectors broadcast `"<token> <host>:<port>"` on a well-known UDP port.
//! The node never sends on this socket; it only adopts the most recent
//! endpoint it hears about.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tagpost_protocol::Announcement;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::DiscoveryError;

/// Receive buffer size; larger than any valid announcement so oversized
/// datagrams are rejected instead of truncated.
const RECV_BUFFER_LEN: usize = 512;

/// Listener bound to the discovery port.
#[derive(Debug)]
pub struct DiscoveryListener {
    socket: UdpSocket,
    last: Option<Announcement>,
    malformed: u64,
}

impl DiscoveryListener {
    /// Bind to `0.0.0.0:<port>`.
    ///
    /// # Errors
    /// Returns `DiscoveryError::Io` if the port cannot be bound.
    pub async fn bind(port: u16) -> Result<Self, DiscoveryError> {
        Self::bind_addr(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into()).await
    }

    /// # Errors
    /// Returns `DiscoveryError::Io` if the address cannot be bound.
    pub async fn bind_addr(addr: SocketAddr) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        info!(addr = %socket.local_addr()?, "Discovery listener started");

        Ok(Self {
            socket,
            last: None,
            malformed: 0,
        })
    }

    /// # Errors
    /// Returns `DiscoveryError::Io` if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }

    /// Most recent valid announcement.
    pub fn last(&self) -> Option<&Announcement> {
        self.last.as_ref()
    }

    /// Number of datagrams dropped as malformed.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Wait for one datagram and parse it.
    ///
    /// Returns `Ok(None)` for a malformed datagram, which is logged and
    /// counted. Cancel safe: dropping the future loses no datagram.
    ///
    /// # Errors
    /// Returns `DiscoveryError::Io` if the socket read fails.
    pub async fn recv_announcement(&mut self) -> Result<Option<Announcement>, DiscoveryError> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        Ok(self.handle_datagram(&buf[..len], from))
    }

    /// Parse a received datagram, recording it as the latest announcement.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Option<Announcement> {
        match Announcement::parse(datagram) {
            Ok(announcement) => {
                debug!(
                    from = %from,
                    token = %announcement.token,
                    endpoint = %announcement.endpoint,
                    "Collector announcement"
                );
                self.last = Some(announcement.clone());
                Some(announcement)
            }
            Err(e) => {
                self.malformed += 1;
                let error = DiscoveryError::Malformed(e.to_string());
                warn!(from = %from, error = %error, "Ignoring discovery datagram");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn peer() -> SocketAddr {
        "10.0.0.1:40000".parse().unwrap()
    }

    async fn listener() -> DiscoveryListener {
        DiscoveryListener::bind_addr("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handle_valid_datagram() {
        let mut listener = listener().await;
        let announcement = listener.handle_datagram(b"HELLO 10.0.0.5:9000", peer()).unwrap();

        assert_eq!(announcement.endpoint.host, "10.0.0.5");
        assert_eq!(announcement.endpoint.port, 9000);
        assert_eq!(listener.last(), Some(&announcement));
    }

    #[rstest]
    #[case::empty(b"".as_slice())]
    #[case::token_only(b"HELLO".as_slice())]
    #[case::no_port(b"HELLO 10.0.0.5".as_slice())]
    #[case::bad_port(b"HELLO 10.0.0.5:http".as_slice())]
    #[case::not_utf8(b"HELLO \xff\xfe:9000".as_slice())]
    #[tokio::test]
    async fn test_malformed_datagrams_ignored(#[case] datagram: &[u8]) {
        let mut listener = listener().await;
        assert!(listener.handle_datagram(datagram, peer()).is_none());
        assert_eq!(listener.malformed(), 1);
        assert!(listener.last().is_none());
    }

    #[tokio::test]
    async fn test_newer_announcement_wins() {
        let mut listener = listener().await;
        listener.handle_datagram(b"HELLO 10.0.0.5:9000", peer());
        listener.handle_datagram(b"HELLO 10.0.0.9:9100", peer());
        listener.handle_datagram(b"garbage", peer());

        assert_eq!(listener.last().unwrap().endpoint.host, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_oversized_datagram_rejected() {
        let mut listener = listener().await;
        let mut datagram = b"HELLO 10.0.0.5:9000 ".to_vec();
        datagram.resize(200, b'x');
        assert!(listener.handle_datagram(&datagram, peer()).is_none());
    }
}
