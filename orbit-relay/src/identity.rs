//! Account resolution for inbound connections.

use crate::config::AuthConfig;
use axum::http::{HeaderMap, HeaderName};
use orbit_types::AccountId;

/// Maps an inbound upgrade request to the account it is authenticated as.
pub trait IdentityProvider: Send + Sync {
    /// Return the account, or `None` for an unauthenticated connection.
    fn resolve_account(&self, headers: &HeaderMap) -> Option<AccountId>;
}

/// Trusts an account header set by the authenticating proxy in front of the relay.
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    header: HeaderName,
    anonymous: Option<AccountId>,
}

impl HeaderIdentity {
    /// Build from the `[auth]` section.
    ///
    /// An unparsable header name falls back to the default `x-orbit-account`.
    pub fn new(config: &AuthConfig) -> Self {
        let header = HeaderName::try_from(config.account_header.as_str()).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid account header {:?} ({}), using x-orbit-account",
                config.account_header,
                e
            );
            HeaderName::from_static("x-orbit-account")
        });

        Self {
            header,
            anonymous: config.anonymous_account.as_deref().map(AccountId::new),
        }
    }
}

impl IdentityProvider for HeaderIdentity {
    fn resolve_account(&self, headers: &HeaderMap) -> Option<AccountId> {
        let from_header = headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(AccountId::new);

        from_header.or_else(|| self.anonymous.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-orbit-account", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn reads_account_header() {
        let identity = HeaderIdentity::new(&AuthConfig::default());
        assert_eq!(
            identity.resolve_account(&headers("alice")),
            Some(AccountId::new("alice"))
        );
    }

    #[test]
    fn missing_or_blank_header_is_unauthenticated() {
        let identity = HeaderIdentity::new(&AuthConfig::default());
        assert_eq!(identity.resolve_account(&HeaderMap::new()), None);
        assert_eq!(identity.resolve_account(&headers("  ")), None);
    }

    #[test]
    fn anonymous_account_fallback() {
        let config = AuthConfig {
            anonymous_account: Some("admin@anydrop.com".to_string()),
            ..AuthConfig::default()
        };
        let identity = HeaderIdentity::new(&config);
        assert_eq!(
            identity.resolve_account(&HeaderMap::new()),
            Some(AccountId::new("admin@anydrop.com"))
        );
        assert_eq!(
            identity.resolve_account(&headers("bob")),
            Some(AccountId::new("bob"))
        );
    }

    #[test]
    fn invalid_header_name_falls_back() {
        let config = AuthConfig {
            account_header: "not a header".to_string(),
            anonymous_account: None,
        };
        let identity = HeaderIdentity::new(&config);
        assert_eq!(
            identity.resolve_account(&headers("carol")),
            Some(AccountId::new("carol"))
        );
    }
}
