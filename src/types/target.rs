use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

/// Schemes a [`Target`] may use.
const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// A single fully-formed request URL.
///
/// Targets are immutable once created and have no identity beyond their
/// URL: duplicates are allowed and fetched independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    url: Url,
}

/// Why a string was rejected as a [`Target`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTarget {
    /// The input was empty or whitespace only
    #[error("empty URL")]
    Empty,
    /// The input is not an absolute URL
    #[error("cannot parse `{0}` as URL: {1}")]
    Unparsable(String, url::ParseError),
    /// The URL uses a scheme we cannot fetch
    #[error("unsupported scheme `{scheme}` in `{url}`")]
    UnsupportedScheme {
        /// The offending URL
        url: String,
        /// Its scheme
        scheme: String,
    },
}

impl Target {
    /// Returns the URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the parsed URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the host name of this target, if any.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }
}

impl FromStr for Target {
    type Err = InvalidTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidTarget::Empty);
        }
        let url = Url::parse(s).map_err(|e| InvalidTarget::Unparsable(s.to_string(), e))?;
        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(InvalidTarget::UnsupportedScheme {
                url: s.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        Ok(Self { url })
    }
}

impl TryFrom<String> for Target {
    type Error = InvalidTarget;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Target {
    type Error = InvalidTarget;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.url.into()
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
