//! Endpoint address parsing
//!
//! Accepted forms:
//! - `grpcs://host[:port]`, `https://host[:port]`: TLS, default port 443
//! - `grpc://host[:port]`, `http://host[:port]`: plaintext, default port 80
//! - `host[:port]`: TLS when enabled in configuration (443), plaintext otherwise (80)

use std::fmt;

use url::Url;

use crate::error::BwsError;

const TLS_PORT: u16 = 443;
const PLAINTEXT_PORT: u16 = 80;

/// A parsed, normalized BWS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    canonical: String,
    host: String,
    port: u16,
    tls: bool,
}

impl EndpointAddress {
    /// Parses an endpoint address.
    ///
    /// `tls_default` decides the transport for addresses without a scheme.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for empty addresses, unknown schemes, or
    /// addresses without a host.
    pub fn parse(raw: &str, tls_default: bool) -> Result<Self, BwsError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(BwsError::invalid_config("endpoint address cannot be empty"));
        }

        let (tls, url) = if let Some((scheme, _)) = raw.split_once("://") {
            let tls = match scheme.to_ascii_lowercase().as_str() {
                "grpcs" | "https" => true,
                "grpc" | "http" => false,
                other => {
                    return Err(BwsError::invalid_config(format!(
                        "unsupported endpoint scheme '{other}' in {raw}"
                    )));
                }
            };
            (tls, parse_url(raw)?)
        } else {
            let scheme = if tls_default { "https" } else { "http" };
            (tls_default, parse_url(&format!("{scheme}://{raw}"))?)
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BwsError::invalid_config(format!("endpoint {raw} has no host")))?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if tls { TLS_PORT } else { PLAINTEXT_PORT });

        let scheme = if tls { "grpcs" } else { "grpc" };
        Ok(Self {
            canonical: format!("{scheme}://{host}:{port}"),
            host,
            port,
            tls,
        })
    }

    /// Normalized `grpcs://host:port` / `grpc://host:port` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// URI understood by the HTTP/2 transport.
    #[must_use]
    pub fn transport_uri(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Host name
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the endpoint uses TLS
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn parse_url(raw: &str) -> Result<Url, BwsError> {
    Url::parse(raw).map_err(|e| BwsError::invalid_config(format!("invalid endpoint {raw}: {e}")))
}
