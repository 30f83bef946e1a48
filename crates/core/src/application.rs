//! Registered client applications and the origin they are matched by.

use url::Url;

use crate::{ApplicationId, DomainError, DomainResult};

/// A site origin: `scheme://host[:port]`.
///
/// Paths, queries and fragments are dropped. Default ports are elided, and hosts
/// of http(s) URLs are lowercased, so two spellings of the same site compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    /// Derive the origin of a URL string.
    ///
    /// Fails when the string is not an absolute URL or carries no host.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| DomainError::invalid_url(format!("{raw}: {e}")))?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> DomainResult<Self> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DomainError::invalid_url(format!("{url}: missing host")))?;

        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        Ok(Self(origin))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Origin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret credential an application backend presents when redeeming tickets.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AppKey(String);

impl AppKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for AppKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AppKey(<redacted>)")
    }
}

/// A client application registered with the authority.
///
/// Read-only to the handoff flow; written only by administrative operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredApplication {
    pub id: ApplicationId,
    pub name: String,
    pub app_key: AppKey,
    /// Origin the application is reached from (unique across applications).
    pub site: Origin,
    /// Where the browser is sent with the exchange ticket.
    pub redirect: String,
}

/// Validate a redirect target: it must be an absolute URL with a host.
pub fn parse_redirect_target(raw: &str) -> DomainResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| DomainError::invalid_url(format!("{raw}: {e}")))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(DomainError::invalid_url(format!("{raw}: missing host")));
    }
    Ok(url)
}
