//! Client configuration: API key, shard selection and vendor identification.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Shard used when the API key carries no shard suffix.
pub const DEFAULT_SHARD: &str = "au1";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing API key, set CLINIKO_API_KEY")]
    MissingApiKey,

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Everything needed to talk to one Cliniko account.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub vendor: String,
    pub vendor_email: String,
    pub timeout: Duration,
    /// Sent with every API request, after the standard headers.
    pub extra_headers: Vec<(String, String)>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("vendor", &self.vendor)
            .field("vendor_email", &self.vendor_email)
            .field("timeout", &self.timeout)
            .field("extra_headers", &self.extra_headers)
            .finish()
    }
}

impl ClientConfig {
    /// Config for the shard encoded in `api_key`.
    pub fn new(api_key: &str, vendor: &str, vendor_email: &str) -> Self {
        Self {
            base_url: shard_base_url(shard_from_api_key(api_key)),
            api_key: api_key.to_string(),
            vendor: vendor.to_string(),
            vendor_email: vendor_email.to_string(),
            timeout: DEFAULT_TIMEOUT,
            extra_headers: Vec::new(),
        }
    }

    /// Read `CLINIKO_API_KEY`, `CLINIKO_VENDOR`, `CLINIKO_VENDOR_EMAIL`,
    /// `CLINIKO_BASE_URL` and `CLINIKO_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("CLINIKO_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let vendor = lookup("CLINIKO_VENDOR").unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let vendor_email = lookup("CLINIKO_VENDOR_EMAIL").unwrap_or_default();

        let mut config = Self::new(&api_key, &vendor, &vendor_email);
        if let Some(base_url) = lookup("CLINIKO_BASE_URL") {
            config = config.with_base_url(&base_url);
        }
        if let Some(raw) = lookup("CLINIKO_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "CLINIKO_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Point at an arbitrary server instead of the key's shard.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers.push((name.to_string(), value.to_string()));
        self
    }

    /// `Authorization` value: the key as the basic-auth user, empty password.
    pub fn authorization(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:", self.api_key)))
    }

    pub fn user_agent(&self) -> String {
        format!("{} ({})", self.vendor, self.vendor_email)
    }
}

/// Shard suffix of an API key (`...-uk2` -> `uk2`).
pub fn shard_from_api_key(api_key: &str) -> &str {
    match api_key.rsplit_once('-') {
        Some((_, shard)) if !shard.is_empty() => shard,
        _ => DEFAULT_SHARD,
    }
}

pub fn shard_base_url(shard: &str) -> String {
    format!("https://api.{shard}.cliniko.com/v1")
}
