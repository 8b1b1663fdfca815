//! Policy evaluation against a single request.

use async_trait::async_trait;
use http::request::Parts;

use crate::models::{AuthenticateResult, AuthorizeOutcome};
use crate::policy::AuthorizationPolicy;

/// Authenticates and authorizes a request for a resolved policy.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Runs every authentication scheme of `policy` against `request`.
    async fn authenticate(&self, policy: &AuthorizationPolicy, request: &Parts)
    -> AuthenticateResult;

    /// Checks the policy requirements against the authentication result.
    async fn authorize(
        &self,
        policy: &AuthorizationPolicy,
        authentication: &AuthenticateResult,
        request: &Parts,
    ) -> AuthorizeOutcome;
}
