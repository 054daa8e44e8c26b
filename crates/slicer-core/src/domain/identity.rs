//! Client identity - the string rate-limit state is keyed by.
//!
//! Header extraction is transport-specific; this module only decides which
//! of the candidate values wins.

use std::fmt;
use std::net::IpAddr;

/// Stable identity for a caller. Always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub const UNKNOWN: &'static str = "unknown";

    /// Resolve an identity from the `X-Forwarded-For` value and the peer address.
    ///
    /// The leftmost forwarded entry is the original client as asserted by the
    /// nearest proxy. It is trusted verbatim, so deployments must sit behind a
    /// proxy that overwrites the header.
    pub fn resolve(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> Self {
        let forwarded = forwarded_for
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());

        if let Some(first) = forwarded {
            return Self(first.to_string());
        }

        match peer {
            Some(ip) => Self(ip.to_string()),
            None => Self(Self::UNKNOWN.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity made safe for use inside a colon-delimited storage key.
    pub fn storage_key(&self) -> String {
        sanitize_key_component(&self.0)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::resolve(Some(value), None)
    }
}

/// Replace `:` and `.` with `-`. Lossy: distinct inputs may collide.
pub fn sanitize_key_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect()
}
