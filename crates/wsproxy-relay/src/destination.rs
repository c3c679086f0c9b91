//! Destination descriptor (`host:port`) naming the ultimate tunnel target

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    #[error("empty destination")]
    Empty,

    #[error("destination {0:?} is missing a port")]
    MissingPort(String),

    #[error("destination {0:?} has an invalid port")]
    InvalidPort(String),
}

/// A `host:port` string naming where the tunnel ultimately leads.
///
/// The descriptor travels out-of-band: as the `dest` query parameter of the
/// WebSocket upgrade URL, or as the target of a `CONNECT` request. It is
/// never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    authority: String,
    port: u16,
}

impl Destination {
    pub fn parse(input: &str) -> Result<Self, DestinationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DestinationError::Empty);
        }

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| DestinationError::MissingPort(input.to_string()))?;
        if host.is_empty() {
            return Err(DestinationError::Empty);
        }
        if port.is_empty() {
            return Err(DestinationError::MissingPort(input.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| DestinationError::InvalidPort(input.to_string()))?;

        Ok(Self {
            authority: input.to_string(),
            port,
        })
    }

    /// Build a descriptor from separate host and port parts
    pub fn from_parts(host: &str, port: &str) -> Result<Self, DestinationError> {
        Self::parse(&format!("{}:{}", host, port))
    }

    pub fn as_str(&self) -> &str {
        &self.authority
    }

    /// Host part, still bracketed for IPv6 literals
    pub fn host(&self) -> &str {
        self.authority
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.authority)
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let dest = Destination::parse("example.com:443").unwrap();
        assert_eq!(dest.as_str(), "example.com:443");
        assert_eq!(dest.host(), "example.com");
        assert_eq!(dest.port(), 443);
    }

    #[test]
    fn test_parse_ipv6_literal() {
        let dest = Destination::parse("[::1]:22").unwrap();
        assert_eq!(dest.host(), "[::1]");
        assert_eq!(dest.port(), 22);
    }

    #[test]
    fn test_empty_destination_rejected() {
        assert_eq!(Destination::parse(""), Err(DestinationError::Empty));
        assert_eq!(Destination::parse("   "), Err(DestinationError::Empty));
        assert_eq!(Destination::parse(":80"), Err(DestinationError::Empty));
    }

    #[test]
    fn test_port_required() {
        assert!(matches!(
            Destination::parse("example.com"),
            Err(DestinationError::MissingPort(_))
        ));
        assert!(matches!(
            Destination::parse("example.com:"),
            Err(DestinationError::MissingPort(_))
        ));
        assert!(matches!(
            Destination::parse("example.com:99999"),
            Err(DestinationError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_from_parts() {
        let dest = Destination::from_parts("localhost", "2222").unwrap();
        assert_eq!(dest.to_string(), "localhost:2222");
    }
}
