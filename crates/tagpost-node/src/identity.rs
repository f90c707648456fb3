//! Network identity: the node's current address and location.
//!
//! Both come from outside the node. The address is whatever the routing
//! table picks for outbound traffic; the location is configured, optionally
//! through a file that an operator (or provisioning tool) can rewrite while
//! the node runs.

use std::fs;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::PathBuf;

use tagpost_core::NetworkIdentity;
use tracing::{debug, warn};

/// Destination used to ask the routing table for the outbound address.
///
/// Connecting a UDP socket sends nothing on the wire.
const ROUTE_TARGET: &str = "10.255.255.255:1";

pub trait IdentitySource {
    /// Current identity; never fails, unknown parts are left empty.
    fn refresh(&mut self) -> NetworkIdentity;
}

/// Identity of the host the node runs on.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    location: String,
    location_file: Option<PathBuf>,
}

impl LocalIdentity {
    pub fn new(location: impl Into<String>, location_file: Option<PathBuf>) -> Self {
        Self {
            location: location.into(),
            location_file,
        }
    }

    fn location(&self) -> String {
        let Some(path) = &self.location_file else {
            return self.location.clone();
        };
        match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| self.location.clone()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read location file");
                self.location.clone()
            }
        }
    }
}

/// Outbound address, or `None` without a usable route.
pub fn outbound_address() -> Option<IpAddr> {
    let target: SocketAddr = ROUTE_TARGET.parse().ok()?;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(target).ok()?;
    let address = socket.local_addr().ok()?.ip();
    (!address.is_unspecified()).then_some(address)
}

impl IdentitySource for LocalIdentity {
    fn refresh(&mut self) -> NetworkIdentity {
        let identity = NetworkIdentity::new(outbound_address(), self.location());
        debug!(
            address = %identity.address_label(),
            location = %identity.location,
            "Identity refreshed"
        );
        identity
    }
}

/// Fixed identity, for tests and hosts without a network.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub NetworkIdentity);

impl IdentitySource for StaticIdentity {
    fn refresh(&mut self) -> NetworkIdentity {
        self.0.clone()
    }
}

/// Short badge derived from the location: initials of up to three words,
/// or the first three letters of a single word.
pub fn location_badge(location: &str) -> String {
    let words: Vec<&str> = location
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    let badge: String = match words.as_slice() {
        [] => return location.chars().take(3).collect(),
        [word] => word.chars().take(3).collect(),
        words => words
            .iter()
            .take(3)
            .filter_map(|word| word.chars().next())
            .collect(),
    };
    badge.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("lobby", "LOB")]
    #[case("north gate", "NG")]
    #[case("loading-dock-east-2", "LDE")]
    #[case("???", "???")]
    #[case("", "")]
    fn test_location_badge(#[case] location: &str, #[case] badge: &str) {
        assert_eq!(location_badge(location), badge);
    }

    #[test]
    fn test_static_identity() {
        let identity = NetworkIdentity::new(Some("10.0.0.2".parse().unwrap()), "lobby");
        let mut source = StaticIdentity(identity.clone());
        assert_eq!(source.refresh(), identity);
    }

    #[test]
    fn test_location_file_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("location");
        fs::write(&path, "warehouse\n").unwrap();

        let mut source = LocalIdentity::new("lobby", Some(path.clone()));
        assert_eq!(source.refresh().location, "warehouse");

        fs::write(&path, "garage\n").unwrap();
        assert_eq!(source.refresh().location, "garage");
    }

    #[test]
    fn test_missing_location_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let mut source = LocalIdentity::new("lobby", Some(dir.path().join("absent")));
        assert_eq!(source.refresh().location, "lobby");
    }

    #[rstest]
    #[case::blank("\n", "lobby")]
    #[case::whitespace_only("  \n\t\n", "lobby")]
    #[case::leading_blank_lines("\nwarehouse\n", "warehouse")]
    #[case::indented("\n   dock 4  \nignored\n", "dock 4")]
    fn test_location_file_first_non_empty_line(#[case] content: &str, #[case] expected: &str) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("location");
        fs::write(&path, content).unwrap();
        let mut source = LocalIdentity::new("lobby", Some(path));
        assert_eq!(source.refresh().location, expected);
    }
}
