//! Buyer Authentication
//!
//! Sessions are issued by the upstream auth layer; this server only learns
//! who the caller is.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName};
use beats_catalog::UserId;
use std::convert::Infallible;

use crate::config::ConfigError;
use crate::state::AppState;

/// Resolves the calling buyer from request headers
pub trait BuyerAuthenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Option<UserId>;
}

/// Trusts a header set by the session layer in front of this server
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    pub fn new(header: &str) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(header.as_bytes()).map_err(|_| ConfigError::Invalid {
            var: "AUTH_HEADER",
            value: header.to_string(),
        })?;
        Ok(Self { header })
    }
}

impl BuyerAuthenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<UserId> {
        let id: i64 = headers.get(&self.header)?.to_str().ok()?.trim().parse().ok()?;
        (id > 0).then_some(UserId(id))
    }
}

/// The signed-in buyer, if any. Handlers decide whether one is required.
pub struct CurrentBuyer(pub Option<UserId>);

impl FromRequestParts<AppState> for CurrentBuyer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(state.auth.authenticate(&parts.headers)))
    }
}
