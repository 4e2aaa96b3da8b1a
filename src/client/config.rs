//! Client configuration
//!
//! An immutable description of how to reach one storage cluster: endpoint,
//! credentials, TLS verification and the mount/unmount polling policy.

use crate::error::{Error, Result};
use reqwest::header::HeaderName;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Endpoint
// =============================================================================

/// Versioned REST endpoint, parsed from `http[s]://<address>:<port>/v<version>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub protocol: String,
    pub address: String,
    pub port: u16,
    pub version: u32,
}

impl ApiEndpoint {
    /// Base URI every resource path is appended to
    pub fn base_uri(&self) -> String {
        format!(
            "{}://{}:{}/v{}/storage/",
            self.protocol, self.address, self.port, self.version
        )
    }
}

impl FromStr for ApiEndpoint {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self> {
        let malformed = || {
            Error::Configuration(format!(
                "api_url '{}' is not of the correct format - http[s]://<address>:<port>/v<api-version>",
                url
            ))
        };

        let (protocol, rest) = url.split_once("://").ok_or_else(malformed)?;
        if protocol != "http" && protocol != "https" {
            return Err(malformed());
        }

        let (address, rest) = rest.split_once(':').ok_or_else(malformed)?;
        let address_ok = !address.is_empty()
            && address
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !address_ok {
            return Err(malformed());
        }

        let (port, rest) = rest.split_once("/v").ok_or_else(malformed)?;
        let port = port.parse::<u16>().map_err(|_| malformed())?;

        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let version = digits.parse::<u32>().map_err(|_| malformed())?;

        Ok(Self {
            protocol: protocol.to_string(),
            address: address.to_string(),
            port,
            version,
        })
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}/v{}",
            self.protocol, self.address, self.port, self.version
        )
    }
}

// =============================================================================
// Credentials
// =============================================================================

pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
pub const USER_HEADER: HeaderName = HeaderName::from_static("x-subsystem-user");
pub const PASSWORD_HEADER: HeaderName = HeaderName::from_static("x-subsystem-password");

/// Authentication material sent with every request
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `X-Api-Key` header
    ApiKey(String),
    /// `X-Subsystem-User` / `X-Subsystem-Password` headers
    UserPassword { username: String, password: String },
}

impl Credentials {
    /// Pick credentials from optional inputs; an API key wins over a user/password pair
    pub fn from_parts(
        api_key: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        if let Some(key) = api_key {
            return Ok(Credentials::ApiKey(key));
        }
        match (username, password) {
            (Some(username), Some(password)) => Ok(Credentials::UserPassword { username, password }),
            (Some(_), None) => Err(Error::missing("api_password")),
            _ => Err(Error::Configuration(
                "Missing 'api_key' or 'api_username'/'api_password' parameters".into(),
            )),
        }
    }

    /// Header name/value pairs for these credentials
    pub fn headers(&self) -> Vec<(HeaderName, &str)> {
        match self {
            Credentials::ApiKey(key) => vec![(API_KEY_HEADER, key.as_str())],
            Credentials::UserPassword { username, password } => vec![
                (USER_HEADER, username.as_str()),
                (PASSWORD_HEADER, password.as_str()),
            ],
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Bounded wait used after asynchronous mount/unmount calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each status fetch
    pub interval: Duration,
    /// Number of fetches before giving up
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Everything needed to talk to one storage cluster
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: ApiEndpoint,
    pub credentials: Credentials,
    /// Verify the server's TLS certificate
    pub verify_tls: bool,
    pub poll: PollPolicy,
}

impl ClientConfig {
    /// Parse the endpoint and bundle it with credentials
    pub fn new(api_url: &str, credentials: Credentials, verify_tls: bool) -> Result<Self> {
        Ok(Self {
            endpoint: api_url.parse()?,
            credentials,
            verify_tls,
            poll: PollPolicy::default(),
        })
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }
}
