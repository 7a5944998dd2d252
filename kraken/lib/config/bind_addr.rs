use std::{fmt, str::FromStr};

use crate::KrakenError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The address a server is asked to bind to.
///
/// ## Format
/// `host:port`, where:
/// - `host` may be empty to listen on all interfaces (e.g. ":8080"),
/// - `host` may be an IPv6 address in brackets (e.g. "[::1]:8080"),
/// - `port` may be `0` to let the operating system pick one.
///
/// ## Examples
///
/// ```
/// use kraken::config::BindAddr;
///
/// let addr = "localhost:0".parse::<BindAddr>().unwrap();
/// assert_eq!(addr.get_host(), "localhost");
/// assert_eq!(addr.get_port(), 0);
///
/// let all = BindAddr::new("", 8080);
/// assert_eq!(all.to_string(), "0.0.0.0:8080");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindAddr {
    host: String,
    port: u16,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BindAddr {
    /// Creates a new `BindAddr`. Brackets around an IPv6 host are optional.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);

        Self { host, port }
    }

    /// Returns the host, empty for all interfaces.
    pub fn get_host(&self) -> &str {
        &self.host
    }

    /// Returns the port, `0` if the operating system picks it.
    pub fn get_port(&self) -> u16 {
        self.port
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for BindAddr {
    type Err = KrakenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| KrakenError::InvalidAddress(format!("{s}: missing port")))?;

        let bracketed = host.starts_with('[') && host.ends_with(']');
        if host.contains(':') && !bracketed {
            return Err(KrakenError::InvalidAddress(format!(
                "{s}: IPv6 hosts must be enclosed in brackets"
            )));
        }

        let port = port
            .parse()
            .map_err(|_| KrakenError::InvalidAddress(format!("{s}: invalid port {port:?}")))?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for BindAddr {
    /// Formats the address so it can be bound: an empty host becomes `0.0.0.0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.as_str() {
            "" => write!(f, "0.0.0.0:{}", self.port),
            host if host.contains(':') => write!(f, "[{}]:{}", host, self.port),
            host => write!(f, "{}:{}", host, self.port),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
