//! Authorization policies and the source they are looked up from.

use async_trait::async_trait;

use crate::error::FunctionAuthzError;
use crate::models::{AuthorizeRequirement, Principal};

/// A single condition a caller must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRequirement {
    /// Any authenticated caller.
    AuthenticatedUser,
    /// Caller must hold at least one of the listed roles.
    RolesAny(Vec<String>),
}

impl PolicyRequirement {
    #[must_use]
    pub fn is_satisfied_by(&self, principal: Option<&Principal>) -> bool {
        match (self, principal) {
            (_, None) => false,
            (Self::AuthenticatedUser, Some(_)) => true,
            (Self::RolesAny(roles), Some(principal)) => {
                roles.iter().any(|role| principal.is_in_role(role))
            }
        }
    }
}

/// Requirements plus the authentication schemes that establish the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    requirements: Vec<PolicyRequirement>,
    authentication_schemes: Vec<String>,
}

impl AuthorizationPolicy {
    #[must_use]
    pub fn builder() -> AuthorizationPolicyBuilder {
        AuthorizationPolicyBuilder::default()
    }

    #[must_use]
    pub fn requirements(&self) -> &[PolicyRequirement] {
        &self.requirements
    }

    #[must_use]
    pub fn authentication_schemes(&self) -> &[String] {
        &self.authentication_schemes
    }

    /// Combines a function's requirement list into one policy.
    ///
    /// - a named policy is fetched from `provider` and merged in;
    /// - roles add a [`PolicyRequirement::RolesAny`];
    /// - a requirement naming neither a policy nor roles pulls in the
    ///   provider's default policy;
    /// - schemes are accumulated in order without duplicates.
    ///
    /// Returns `None` when `requirements` is empty.
    ///
    /// # Errors
    ///
    /// - `PolicyNotFound` when a named policy is unknown to `provider`
    /// - whatever `provider` returns when a lookup fails
    pub async fn combine(
        provider: &dyn PolicyProvider,
        requirements: &[AuthorizeRequirement],
    ) -> Result<Option<Self>, FunctionAuthzError> {
        if requirements.is_empty() {
            return Ok(None);
        }

        let mut builder = Self::builder();
        let mut use_default_policy = false;

        for requirement in requirements {
            if let Some(name) = requirement.policy_name() {
                let policy = provider
                    .policy(name)
                    .await?
                    .ok_or_else(|| FunctionAuthzError::PolicyNotFound(name.to_owned()))?;
                builder = builder.combine(&policy);
            }

            let roles = requirement.role_list();
            if !roles.is_empty() {
                builder = builder.require_any_role(roles);
            }

            if requirement.policy_name().is_none() && requirement.role_list().is_empty() {
                use_default_policy = true;
            }

            builder = builder.add_authentication_schemes(requirement.scheme_list());
        }

        if use_default_policy {
            let default_policy = provider.default_policy().await?;
            builder = builder.combine(&default_policy);
        }

        Ok(Some(builder.build()))
    }
}

#[derive(Debug, Clone, Default)]
#[must_use]
pub struct AuthorizationPolicyBuilder {
    requirements: Vec<PolicyRequirement>,
    authentication_schemes: Vec<String>,
}

impl AuthorizationPolicyBuilder {
    pub fn require_authenticated_user(mut self) -> Self {
        self.push_requirement(PolicyRequirement::AuthenticatedUser);
        self
    }

    pub fn require_any_role<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        if !roles.is_empty() {
            self.push_requirement(PolicyRequirement::RolesAny(roles));
        }
        self
    }

    pub fn add_authentication_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for scheme in schemes {
            let scheme = scheme.into();
            if !self.authentication_schemes.contains(&scheme) {
                self.authentication_schemes.push(scheme);
            }
        }
        self
    }

    pub fn combine(mut self, policy: &AuthorizationPolicy) -> Self {
        for requirement in &policy.requirements {
            self.push_requirement(requirement.clone());
        }
        self.add_authentication_schemes(policy.authentication_schemes.iter().cloned())
    }

    #[must_use]
    pub fn build(self) -> AuthorizationPolicy {
        AuthorizationPolicy {
            requirements: self.requirements,
            authentication_schemes: self.authentication_schemes,
        }
    }

    fn push_requirement(&mut self, requirement: PolicyRequirement) {
        if !self.requirements.contains(&requirement) {
            self.requirements.push(requirement);
        }
    }
}

/// Source of named and default policies.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// Looks up a named policy. `Ok(None)` when the name is unknown.
    ///
    /// # Errors
    ///
    /// Implementation-specific lookup failures.
    async fn policy(&self, name: &str) -> Result<Option<AuthorizationPolicy>, FunctionAuthzError>;

    /// Policy applied to requirements that name neither a policy nor roles.
    ///
    /// # Errors
    ///
    /// Implementation-specific lookup failures.
    async fn default_policy(&self) -> Result<AuthorizationPolicy, FunctionAuthzError>;

    /// Whether resolved filters may be cached for the process lifetime.
    fn allows_caching_policies(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct MapPolicyProvider {
        policies: HashMap<String, AuthorizationPolicy>,
    }

    impl MapPolicyProvider {
        fn new() -> Self {
            let mut policies = HashMap::new();
            policies.insert(
                "admins".to_owned(),
                AuthorizationPolicy::builder()
                    .require_any_role(["admin"])
                    .add_authentication_schemes(["Cookie"])
                    .build(),
            );
            Self { policies }
        }
    }

    #[async_trait]
    impl PolicyProvider for MapPolicyProvider {
        async fn policy(
            &self,
            name: &str,
        ) -> Result<Option<AuthorizationPolicy>, FunctionAuthzError> {
            Ok(self.policies.get(name).cloned())
        }

        async fn default_policy(&self) -> Result<AuthorizationPolicy, FunctionAuthzError> {
            Ok(AuthorizationPolicy::builder().require_authenticated_user().build())
        }
    }

    #[tokio::test]
    async fn combine_empty_requirements_yields_no_policy() {
        let policy = AuthorizationPolicy::combine(&MapPolicyProvider::new(), &[])
            .await
            .unwrap();
        assert!(policy.is_none());
    }

    #[tokio::test]
    async fn combine_roles_and_schemes() {
        let reqs = [AuthorizeRequirement::new()
            .with_roles("admin")
            .with_schemes("Bearer,Cookie")];

        let policy = AuthorizationPolicy::combine(&MapPolicyProvider::new(), &reqs)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            policy.requirements(),
            [PolicyRequirement::RolesAny(vec!["admin".to_owned()])]
        );
        assert_eq!(policy.authentication_schemes(), ["Bearer", "Cookie"]);
    }

    #[tokio::test]
    async fn combine_named_policy_merges_schemes_without_duplicates() {
        let reqs = [
            AuthorizeRequirement::new().with_schemes("Cookie,Bearer"),
            AuthorizeRequirement::new().with_policy("admins"),
        ];

        let policy = AuthorizationPolicy::combine(&MapPolicyProvider::new(), &reqs)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(policy.authentication_schemes(), ["Cookie", "Bearer"]);
        assert_eq!(
            policy.requirements(),
            [
                PolicyRequirement::RolesAny(vec!["admin".to_owned()]),
                PolicyRequirement::AuthenticatedUser,
            ]
        );
    }

    #[tokio::test]
    async fn combine_unknown_policy_fails() {
        let reqs = [AuthorizeRequirement::new().with_policy("missing")];
        let err = AuthorizationPolicy::combine(&MapPolicyProvider::new(), &reqs)
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionAuthzError::PolicyNotFound(name) if name == "missing"));
    }

    #[test]
    fn requirements_check_principal() {
        let admin = Principal::new("a").with_role("admin");
        assert!(PolicyRequirement::AuthenticatedUser.is_satisfied_by(Some(&admin)));
        assert!(!PolicyRequirement::AuthenticatedUser.is_satisfied_by(None));
        assert!(
            PolicyRequirement::RolesAny(vec!["ops".to_owned(), "admin".to_owned()])
                .is_satisfied_by(Some(&admin))
        );
        assert!(
            !PolicyRequirement::RolesAny(vec!["ops".to_owned()]).is_satisfied_by(Some(&admin))
        );
    }
}
