//! Per-invocation authorization state machine.

use std::sync::Arc;

use arc_swap::ArcSwap;
use function_authz_sdk::{
    AuthenticateResult, AuthorizationFlow, AuthorizationShortCircuit, AuthorizationTransport,
    FunctionAuthorizationContext, FunctionAuthorizationProvider, FunctionAuthzError, HostModel,
    MetadataScanner, PolicyEvaluator, PolicyProvider,
};
use http::request::Parts;
use tracing::{debug, warn};

use super::discovery::MetadataRegistrar;
use super::result_handler::FunctionsAuthorizationResultHandler;
use crate::config::FunctionAuthzConfig;

/// Authorizes one function invocation end to end.
///
/// `disabled? -> resolve -> no policy? -> authenticate -> anonymous? ->
/// authorize -> result handler`. The authenticated principal, if any, is
/// attached to the request extensions.
pub struct FunctionAuthorizationExecutor {
    provider: Arc<dyn FunctionAuthorizationProvider>,
    policy_provider: Arc<dyn PolicyProvider>,
    evaluator: Arc<dyn PolicyEvaluator>,
    result_handler: FunctionsAuthorizationResultHandler,
    config: Arc<ArcSwap<FunctionAuthzConfig>>,
    host_model: HostModel,
    discovery: Option<(MetadataRegistrar, Arc<dyn MetadataScanner>)>,
}

impl FunctionAuthorizationExecutor {
    #[must_use]
    pub fn new(
        provider: Arc<dyn FunctionAuthorizationProvider>,
        policy_provider: Arc<dyn PolicyProvider>,
        evaluator: Arc<dyn PolicyEvaluator>,
        result_handler: FunctionsAuthorizationResultHandler,
        config: Arc<ArcSwap<FunctionAuthzConfig>>,
        host_model: HostModel,
    ) -> Self {
        Self {
            provider,
            policy_provider,
            evaluator,
            result_handler,
            config,
            host_model,
            discovery: None,
        }
    }

    /// Registers functions from `scanner` on their first invocation.
    #[must_use]
    pub fn with_discovery(
        mut self,
        registrar: MetadataRegistrar,
        scanner: Arc<dyn MetadataScanner>,
    ) -> Self {
        self.discovery = Some((registrar, scanner));
        self
    }

    #[must_use]
    pub const fn host_model(&self) -> HostModel {
        self.host_model
    }

    /// Authorizes an invocation of `function_name` for `request`.
    ///
    /// With [`HostModel::Middleware`] a failure is returned as
    /// [`AuthorizationFlow::Terminate`]; with [`HostModel::InvocationFilter`]
    /// it is returned as [`FunctionAuthzError::ShortCircuit`]. In both cases
    /// `transport` already holds the complete failure response.
    ///
    /// # Errors
    ///
    /// - resolution errors (`Configuration`, `PolicyNotFound`, `InvalidArgument`)
    /// - `ShortCircuit` on failure for invocation-filter hosts
    #[tracing::instrument(skip_all, fields(function = %function_name))]
    pub async fn authorize(
        &self,
        function_name: &str,
        request: &mut Parts,
        transport: &mut dyn AuthorizationTransport,
    ) -> Result<AuthorizationFlow, FunctionAuthzError> {
        if self.config.load().authorization_disabled {
            warn!(
                uri = %request.uri,
                "function authorization is disabled; request to {} is served without authorization",
                request.uri
            );
            return Ok(AuthorizationFlow::Continue);
        }

        if let Some((registrar, scanner)) = &self.discovery {
            registrar
                .ensure_registered(function_name, scanner.as_ref())
                .await?;
        }

        let filter = self
            .provider
            .resolve(function_name, self.policy_provider.as_ref())
            .await?;
        let Some(policy) = filter.policy() else {
            return Ok(AuthorizationFlow::Continue);
        };

        let authentication = self.evaluator.authenticate(policy, request).await;
        if let Some(principal) = authentication.principal() {
            request.extensions.insert(principal.clone());
        }

        if filter.allow_anonymous() {
            debug!("anonymous access allowed");
            return Ok(AuthorizationFlow::Continue);
        }

        if let AuthenticateResult::Failure(reason) = &authentication {
            debug!(%reason, "authentication failed");
        }

        let outcome = self
            .evaluator
            .authorize(policy, &authentication, request)
            .await;
        let context =
            FunctionAuthorizationContext::new(function_name, &*request, Arc::clone(policy), outcome);
        let flow = self.result_handler.apply(&context, transport).await;

        match (self.host_model, flow) {
            (HostModel::InvocationFilter, AuthorizationFlow::Terminate(status)) => {
                debug!(
                    status = status.as_u16(),
                    "short-circuiting function invocation"
                );
                Err(AuthorizationShortCircuit::try_from(status)?.into())
            }
            (_, flow) => Ok(flow),
        }
    }
}
