use std::collections::HashMap;

use async_trait::async_trait;
use function_authz_sdk::{AuthorizationPolicy, FunctionAuthzError, PolicyProvider};

/// In-memory [`PolicyProvider`] backed by a fixed table of named policies.
///
/// The default policy requires an authenticated user unless replaced.
#[derive(Debug, Clone)]
#[must_use]
pub struct StaticPolicyProvider {
    policies: HashMap<String, AuthorizationPolicy>,
    default_policy: AuthorizationPolicy,
    allows_caching: bool,
}

impl Default for StaticPolicyProvider {
    fn default() -> Self {
        Self {
            policies: HashMap::new(),
            default_policy: AuthorizationPolicy::builder()
                .require_authenticated_user()
                .build(),
            allows_caching: true,
        }
    }
}

impl StaticPolicyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, name: impl Into<String>, policy: AuthorizationPolicy) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    pub fn with_default_policy(mut self, policy: AuthorizationPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Disables caching of resolved filters, e.g. while policies are edited.
    pub const fn without_caching(mut self) -> Self {
        self.allows_caching = false;
        self
    }
}

#[async_trait]
impl PolicyProvider for StaticPolicyProvider {
    async fn policy(&self, name: &str) -> Result<Option<AuthorizationPolicy>, FunctionAuthzError> {
        Ok(self.policies.get(name).cloned())
    }

    async fn default_policy(&self) -> Result<AuthorizationPolicy, FunctionAuthzError> {
        Ok(self.default_policy.clone())
    }

    fn allows_caching_policies(&self) -> bool {
        self.allows_caching
    }
}
