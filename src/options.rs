//! Transport, decoder and environment configuration.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::client::StreamError;

/// A secret string type for the bearer credential.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// HTTP transport configuration applied to the underlying `reqwest::Client`.
///
/// # Example
/// ```rust
/// use neuroviz::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::default()
///     .with_timeout(Duration::from_secs(30))
///     .with_header("X-Client".to_string(), "neuroviz".to_string());
/// assert_eq!(options.timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Overall request deadline. `None` means the decoder imposes no timeout.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl TransportOptions {
    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

/// Tuning for the frame decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// How many chunk reads a requeued, unparsable `data:` line may wait for
    /// before it is dropped.
    pub max_frame_retries: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_frame_retries: 3,
        }
    }
}

impl DecoderOptions {
    pub fn with_max_frame_retries(mut self, retries: usize) -> Self {
        self.max_frame_retries = retries;
        self
    }
}

pub const ENDPOINT_VAR: &str = "NEUROVIZ_ENDPOINT";
pub const API_KEY_VAR: &str = "NEUROVIZ_API_KEY";
pub const TIMEOUT_VAR: &str = "NEUROVIZ_TIMEOUT_SECS";

/// Endpoint and credential for the completion service.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Url,
    pub api_key: SecretString,
    pub transport: TransportOptions,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, StreamError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StreamError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENDPOINT_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| StreamError::Config(format!("{ENDPOINT_VAR} is required")))?;
        let endpoint = Url::parse(endpoint.trim())
            .map_err(|e| StreamError::Config(format!("{ENDPOINT_VAR} is not a valid URL: {e}")))?;

        let api_key = lookup(API_KEY_VAR)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StreamError::Config(format!("{API_KEY_VAR} is required")))?;

        let mut transport = TransportOptions::default();
        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                StreamError::Config(format!("{TIMEOUT_VAR} must be a whole number of seconds"))
            })?;
            transport = transport.with_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            endpoint,
            api_key: SecretString::new(api_key),
            transport,
        })
    }
}
