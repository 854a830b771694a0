//! URI Construction Utilities for Channel Requests
//!
//! Builds the forward-channel, back-channel and probe URIs used during
//! negotiation:
//! - Relative paths resolve against the endpoint's base URL
//! - A host prefix routes the request to `prefix.host` to get around
//!   per-host connection limits
//! - Absolute paths are used verbatim

use url::Url;

/// Query parameter carrying the cache-busting token
pub const UNIQUE_PARAM: &str = "zx";

#[derive(Debug, thiserror::Error)]
pub enum UriError {
    #[error("Invalid URL format: {0}")]
    ParseError(#[from] url::ParseError),
    #[error("Missing host in URL")]
    MissingHost,
    #[error("Invalid host prefix: {0}")]
    InvalidHostPrefix(String),
}

/// Server endpoint the channel negotiates with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    base: Url,
}

impl ChannelEndpoint {
    /// Create an endpoint from a base URL such as `https://chat.example.com`
    ///
    /// # Errors
    /// * `UriError::ParseError` - `base_url` is not a valid URL
    /// * `UriError::MissingHost` - `base_url` has no host (e.g. `data:` URLs)
    pub fn new(base_url: &str) -> Result<Self, UriError> {
        let base = Url::parse(base_url)?;
        if base.host_str().is_none() {
            return Err(UriError::MissingHost);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Build a data URI for `path`, optionally on a prefixed host
    ///
    /// # Examples
    /// - base `https://chat.example.com`, prefix `None`, path `/channel/test`
    ///   → `https://chat.example.com/channel/test`
    /// - base `https://chat.example.com:8443`, prefix `Some("b1")`
    ///   → `https://b1.chat.example.com:8443/channel/test`
    /// - path `https://other.example.com/x` → used verbatim, prefix ignored
    pub fn create_data_uri(&self, host_prefix: Option<&str>, path: &str) -> Result<Url, UriError> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }

        let mut uri = self.base.join(path)?;

        if let Some(prefix) = host_prefix.filter(|p| !p.is_empty()) {
            let host = uri.host_str().ok_or(UriError::MissingHost)?.to_string();
            uri.set_host(Some(&format!("{}.{}", prefix, host)))
                .map_err(|_| UriError::InvalidHostPrefix(prefix.to_string()))?;
        }

        Ok(uri)
    }

    /// URI for forward-channel requests (never prefixed)
    pub fn forward_channel_uri(&self, path: &str) -> Result<Url, UriError> {
        self.create_data_uri(None, path)
    }

    /// URI for back-channel requests
    ///
    /// The host prefix is only applied when secondary domains are in use.
    pub fn back_channel_uri(
        &self,
        host_prefix: Option<&str>,
        path: &str,
        use_secondary_domains: bool,
    ) -> Result<Url, UriError> {
        let prefix = if use_secondary_domains { host_prefix } else { None };
        self.create_data_uri(prefix, path)
    }
}

/// Set a query parameter, replacing any existing values for `key`
pub fn set_parameter(uri: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = uri
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    uri.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(key, value);
}

/// Append a fresh cache-busting token to `uri`
pub fn make_unique(uri: &mut Url) {
    let token = uuid::Uuid::new_v4().simple().to_string();
    set_parameter(uri, UNIQUE_PARAM, &token[..12]);
}
