//! Public API trait for function authorization resolution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FunctionAuthzError;
use crate::models::AuthorizationFilter;
use crate::policy::PolicyProvider;

/// Resolves the authorization filter of a function.
///
/// ```ignore
/// let filter = provider.resolve("GetOrders", policies.as_ref()).await?;
/// ```
#[async_trait]
pub trait FunctionAuthorizationProvider: Send + Sync {
    /// Returns the filter for `function_name`, computing it at most once per
    /// function unless `policy_provider` forbids caching.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `function_name` is blank
    /// - `Configuration` if the empty-scheme strategy cannot be satisfied
    /// - `PolicyNotFound` if a requirement names an unknown policy
    async fn resolve(
        &self,
        function_name: &str,
        policy_provider: &dyn PolicyProvider,
    ) -> Result<Arc<AuthorizationFilter>, FunctionAuthzError>;
}
