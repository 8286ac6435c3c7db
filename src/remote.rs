use tracing::{debug, warn};

use crate::error::Error;

pub const DEFAULT_SALT_URL: &str = "https://api.wordpress.org/secret-key/1.1/salt/";

/// Environment variable overriding [`DEFAULT_SALT_URL`].
pub const SALT_URL_ENV: &str = "WPCONFIG_SALT_URL";

/// Something that hands out a block of `define(...)` salt statements.
pub trait SaltSource {
    fn fetch_salts(&self, insecure: bool) -> Result<String, Error>;
}

/// Blocking client for the public secret-key service.
#[derive(Debug, Clone)]
pub struct RemoteSaltService {
    url: String,
}

impl RemoteSaltService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Use [`SALT_URL_ENV`] when it is set.
    pub fn from_env() -> Self {
        match std::env::var(SALT_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::with_url(url),
            _ => Self::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn get(&self, accept_invalid_certs: bool) -> Result<String, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("wpconfig/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        client.get(&self.url).send()?.error_for_status()?.text()
    }
}

impl Default for RemoteSaltService {
    fn default() -> Self {
        Self::with_url(DEFAULT_SALT_URL)
    }
}

impl SaltSource for RemoteSaltService {
    fn fetch_salts(&self, insecure: bool) -> Result<String, Error> {
        debug!(url = %self.url, "fetching salts");
        match self.get(false) {
            Ok(body) => Ok(body),
            Err(err) if insecure && (err.is_connect() || err.is_request()) => {
                warn!(
                    url = %self.url,
                    error = %err,
                    "retrying without certificate verification"
                );
                self.get(true).map_err(Error::remote)
            }
            Err(err) => Err(Error::remote(err)),
        }
    }
}
