//! Authentication scheme enumeration and per-scheme handlers.

use async_trait::async_trait;
use http::request::Parts;

use crate::models::AuthenticateResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationScheme {
    name: String,
    handles_requests: bool,
}

impl AuthenticationScheme {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles_requests: false,
        }
    }

    /// Marks the scheme as able to handle a request directly
    /// (e.g. it owns a callback endpoint).
    #[must_use]
    pub const fn handling_requests(mut self) -> Self {
        self.handles_requests = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn handles_requests(&self) -> bool {
        self.handles_requests
    }
}

/// Enumerates the authentication schemes known to the host.
#[async_trait]
pub trait AuthenticationSchemeProvider: Send + Sync {
    async fn all_schemes(&self) -> Vec<AuthenticationScheme>;

    /// Schemes that can handle a request directly.
    async fn request_handler_schemes(&self) -> Vec<AuthenticationScheme>;

    async fn default_authenticate_scheme(&self) -> Option<AuthenticationScheme>;
}

/// Establishes the caller's identity for one scheme.
#[async_trait]
pub trait AuthenticationHandler: Send + Sync {
    async fn authenticate(&self, scheme: &str, request: &Parts) -> AuthenticateResult;
}
