use std::sync::Arc;

use async_trait::async_trait;
use function_authz_sdk::{
    AuthenticateResult, AuthorizationPolicy, AuthorizeOutcome, PolicyEvaluator, Principal,
};
use http::request::Parts;

use super::schemes::SchemeRegistry;

/// [`PolicyEvaluator`] that authenticates with the handlers of a [`SchemeRegistry`].
///
/// Every scheme of the policy is tried (the registry default when the policy
/// lists none) and successful identities are merged. Authorization succeeds
/// when every policy requirement holds for the merged principal.
#[derive(Debug, Clone)]
pub struct SchemePolicyEvaluator {
    schemes: Arc<SchemeRegistry>,
}

impl SchemePolicyEvaluator {
    #[must_use]
    pub const fn new(schemes: Arc<SchemeRegistry>) -> Self {
        Self { schemes }
    }

    fn schemes_for<'a>(&'a self, policy: &'a AuthorizationPolicy) -> Vec<&'a str> {
        if policy.authentication_schemes().is_empty() {
            return self.schemes.default_scheme_name().into_iter().collect();
        }
        policy
            .authentication_schemes()
            .iter()
            .map(String::as_str)
            .collect()
    }
}

#[async_trait]
impl PolicyEvaluator for SchemePolicyEvaluator {
    async fn authenticate(
        &self,
        policy: &AuthorizationPolicy,
        request: &Parts,
    ) -> AuthenticateResult {
        let mut principal: Option<Principal> = None;
        let mut failure: Option<String> = None;

        for scheme in self.schemes_for(policy) {
            let Some(handler) = self.schemes.handler(scheme) else {
                tracing::warn!(scheme, "no handler registered for authentication scheme");
                continue;
            };

            match handler.authenticate(scheme, request).await {
                AuthenticateResult::Success(identity) => {
                    if let Some(merged) = principal.as_mut() {
                        merged.merge(identity);
                    } else {
                        principal = Some(identity);
                    }
                }
                AuthenticateResult::Failure(reason) => {
                    tracing::debug!(scheme, %reason, "authentication failed");
                    if failure.is_none() {
                        failure = Some(reason);
                    }
                }
                AuthenticateResult::NoResult => {}
            }
        }

        match (principal, failure) {
            (Some(principal), _) => AuthenticateResult::Success(principal),
            (None, Some(reason)) => AuthenticateResult::Failure(reason),
            (None, None) => AuthenticateResult::NoResult,
        }
    }

    async fn authorize(
        &self,
        policy: &AuthorizationPolicy,
        authentication: &AuthenticateResult,
        _request: &Parts,
    ) -> AuthorizeOutcome {
        let principal = authentication.principal();
        if policy
            .requirements()
            .iter()
            .all(|requirement| requirement.is_satisfied_by(principal))
        {
            AuthorizeOutcome::Succeeded
        } else if authentication.succeeded() {
            AuthorizeOutcome::Forbidden
        } else {
            AuthorizeOutcome::Challenged
        }
    }
}
