//! Collector discovery announcements.
//!
//! Collectors broadcast a short text datagram on the discovery port:
//!
//! ```text
//! <token> <host>:<port>
//! ```
//!
//! The token identifies the sender kind and is not interpreted by the node.
//! Anything after the endpoint is ignored.
//!
//! # Example
//!
//! ```
//! use tagpost_protocol::Announcement;
//!
//! let announcement = Announcement::parse(b"HELLO 10.0.0.5:9000").unwrap();
//! assert_eq!(announcement.endpoint.host, "10.0.0.5");
//! assert_eq!(announcement.endpoint.port, 9000);
//! ```

use tagpost_core::{CollectorEndpoint, Error, Result, constants::MAX_ANNOUNCEMENT_LEN};

/// A parsed discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub token: String,
    pub endpoint: CollectorEndpoint,
}

impl Announcement {
    /// # Errors
    /// Returns `Error::InvalidAnnouncement` if the datagram is too long, not
    /// UTF-8, lacks an endpoint, or the endpoint does not parse.
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        if datagram.len() > MAX_ANNOUNCEMENT_LEN {
            return Err(Error::InvalidAnnouncement(format!(
                "{} bytes exceeds {MAX_ANNOUNCEMENT_LEN}",
                datagram.len()
            )));
        }
        let text = std::str::from_utf8(datagram)
            .map_err(|e| Error::InvalidAnnouncement(format!("not UTF-8: {e}")))?;

        let mut parts = text.split_whitespace();
        let token = parts
            .next()
            .ok_or_else(|| Error::InvalidAnnouncement("empty datagram".to_string()))?;
        let endpoint = parts
            .next()
            .ok_or_else(|| Error::InvalidAnnouncement(format!("missing endpoint in {text:?}")))?;

        let endpoint: CollectorEndpoint = endpoint
            .parse()
            .map_err(|e| Error::InvalidAnnouncement(format!("{e} in {text:?}")))?;

        Ok(Self {
            token: token.to_string(),
            endpoint,
        })
    }

    /// Render in wire form.
    pub fn encode(&self) -> String {
        format!("{} {}", self.token, self.endpoint)
    }
}
