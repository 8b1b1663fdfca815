use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use function_authz_sdk::{
    AuthorizationFlow, AuthorizationTransport, AuthorizeOutcome, FunctionAuthorizationContext,
};
use http::StatusCode;

use crate::config::FunctionAuthzConfig;

/// Turns an authorization outcome into challenges, forbids and an optional
/// status body on the host transport.
#[derive(Debug, Clone)]
pub struct FunctionsAuthorizationResultHandler {
    config: Arc<ArcSwap<FunctionAuthzConfig>>,
}

impl FunctionsAuthorizationResultHandler {
    #[must_use]
    pub const fn new(config: Arc<ArcSwap<FunctionAuthzConfig>>) -> Self {
        Self { config }
    }

    pub async fn apply<C>(
        &self,
        context: &FunctionAuthorizationContext<C>,
        transport: &mut dyn AuthorizationTransport,
    ) -> AuthorizationFlow
    where
        C: Sync,
    {
        let status = match context.outcome() {
            AuthorizeOutcome::Succeeded => return AuthorizationFlow::Continue,
            AuthorizeOutcome::Challenged => StatusCode::UNAUTHORIZED,
            AuthorizeOutcome::Forbidden => StatusCode::FORBIDDEN,
        };

        let schemes = context.policy().authentication_schemes();
        if schemes.is_empty() {
            reject(transport, status, None).await;
        } else {
            for scheme in schemes {
                reject(transport, status, Some(scheme.as_str())).await;
            }
        }

        tracing::debug!(
            function = context.function_name(),
            status = status.as_u16(),
            "function authorization failed"
        );

        if self.config.load().write_http_status_to_response && !transport.has_started() {
            let body = status.canonical_reason().unwrap_or_default();
            transport.write_status(status, body).await;
        }

        AuthorizationFlow::Terminate(status)
    }

    /// Like [`apply`](Self::apply), then runs `on_success` with the host
    /// context when authorization succeeded.
    pub async fn apply_with<C, F, Fut>(
        &self,
        context: FunctionAuthorizationContext<C>,
        transport: &mut dyn AuthorizationTransport,
        on_success: F,
    ) -> AuthorizationFlow
    where
        C: Sync,
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = ()>,
    {
        let flow = self.apply(&context, transport).await;
        if flow.is_continue() {
            on_success(context.into_underlying()).await;
        }
        flow
    }
}

async fn reject(transport: &mut dyn AuthorizationTransport, status: StatusCode, scheme: Option<&str>) {
    if status == StatusCode::FORBIDDEN {
        transport.forbid(scheme).await;
    } else {
        transport.challenge(scheme).await;
    }
}
