//! Run configuration.
//!
//! [`FetchConfig`] can be built in code through its builder or loaded from a
//! TOML file; every field has a default, so a config file only needs the
//! values it wants to change:
//!
//! ```toml
//! pool_size = 8
//! max_requests_per_sec = 5.0
//! timeout = "10s"
//! retry_wait_time = "250ms"
//!
//! [identity]
//! referer = "https://dashboard.example.org/"
//! ```
#![allow(clippy::module_name_repetitions)]

use std::{collections::HashMap, path::Path, time::Duration};

use http::{HeaderMap, HeaderName, HeaderValue, header};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{ErrorKind, Result};

/// Default number of workers, and therefore of parallel connections, 20.
pub const DEFAULT_POOL_SIZE: usize = 20;
/// Default global request ceiling across all workers, 20 per second.
pub const DEFAULT_MAX_REQUESTS_PER_SEC: f64 = 20.0;
/// Default timeout before a request is deemed as failed, 30 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default timeout for establishing a connection, 10 seconds.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of retries before a request is deemed as failed, 3.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay before the first retry, doubled for every further one.
pub const DEFAULT_RETRY_WAIT_TIME: Duration = Duration::from_millis(500);
/// Default user agent, a current desktop browser.
///
/// Some upstream APIs refuse clients that do not look like a browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
/// Default `Accept` header.
pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";
/// Default `Accept-Language` header.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Configuration of a fetch run.
///
/// See [`FetchConfig::builder`] for building one in code and
/// [`FetchConfig::load_from_file`] for reading one from TOML.
#[derive(TypedBuilder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(field_defaults(setter(into)))]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Number of workers, each with its own persistent connection.
    ///
    /// A run never uses more workers than it has targets.
    #[builder(default = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Global ceiling on requests per second, shared by all workers.
    ///
    /// Values at or above [`UNLIMITED_RATE`](crate::UNLIMITED_RATE) disable
    /// rate limiting entirely.
    #[builder(default = DEFAULT_MAX_REQUESTS_PER_SEC)]
    pub max_requests_per_sec: f64,

    /// Response timeout per request.
    #[builder(default = DEFAULT_TIMEOUT)]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// A timeout for only the connect phase of a request.
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Maximum number of retries per target after the first attempt.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Delay before the first retry. Doubles with every further retry.
    #[builder(default = DEFAULT_RETRY_WAIT_TIME)]
    #[serde(with = "humantime_serde")]
    pub retry_wait_time: Duration,

    /// Only speak HTTP/1.1, never negotiate HTTP/2.
    #[builder(default)]
    pub http1_only: bool,

    /// Print a status line to stderr while fetching.
    #[builder(default = true)]
    pub show_progress: bool,

    /// PEM bundle of trusted root certificates.
    ///
    /// `~` and environment variables are expanded. When unset, the bundle
    /// named by `SSL_CERT_FILE` or a well-known system location is used.
    #[builder(default)]
    pub trust_store: Option<String>,

    /// Headers identifying us to the upstream server.
    #[builder(default)]
    pub identity: Identity,
}

impl Default for FetchConfig {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FetchConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| (path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ErrorKind::ConfigFile(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] for a zero pool size, a
    /// non-positive request rate or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(ErrorKind::InvalidConfig(
                "pool size must be at least 1".into(),
            ));
        }
        if self.max_requests_per_sec.is_nan() || self.max_requests_per_sec <= 0.0 {
            return Err(ErrorKind::InvalidConfig(format!(
                "request rate must be positive, got {}",
                self.max_requests_per_sec
            )));
        }
        if self.timeout.is_zero() {
            return Err(ErrorKind::InvalidConfig("timeout must not be zero".into()));
        }
        Ok(())
    }
}

/// The identity presented to the upstream server.
///
/// Rate-limited APIs tend to be far less aggressive towards clients that send
/// the same headers as a browser. The identity is fixed for a whole run.
#[derive(TypedBuilder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(default, deny_unknown_fields)]
pub struct Identity {
    /// `User-Agent` header.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    pub user_agent: String,

    /// `Accept` header.
    #[builder(default_code = "String::from(DEFAULT_ACCEPT)")]
    pub accept: String,

    /// `Accept-Language` header.
    #[builder(default_code = "String::from(DEFAULT_ACCEPT_LANGUAGE)")]
    pub accept_language: String,

    /// `Referer` header, usually the page that would normally issue the request.
    pub referer: Option<String>,

    /// Any further headers, e.g. `Origin`.
    pub headers: HashMap<String, String>,
}

impl Default for Identity {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Identity {
    /// Converts the identity into default headers for a client.
    ///
    /// # Errors
    ///
    /// Returns an error if any header name or value is invalid.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&self.user_agent)?);
        headers.insert(header::ACCEPT, HeaderValue::from_str(&self.accept)?);
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.accept_language)?,
        );
        if let Some(referer) = &self.referer {
            headers.insert(header::REFERER, HeaderValue::from_str(referer)?);
        }
        for (name, value) in &self.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(headers)
    }
}
