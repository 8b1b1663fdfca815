//! Resolution of per-function authorization filters.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use function_authz_sdk::{
    AuthenticationScheme, AuthenticationSchemeProvider, AuthorizationFilter, AuthorizationPolicy,
    AuthorizeRequirement, FunctionAuthorizationProvider, FunctionAuthzError, FunctionId,
    PolicyProvider,
};
use tracing::{debug, error, warn};

use super::filter_cache::FilterCache;
use super::metadata::MetadataStore;
use crate::config::{EmptySchemeStrategy, FunctionAuthzConfig};
use crate::sync::KeyedLock;

/// Schemes the hosting platform registers for its own bootstrap traffic.
/// They never take part in function authorization.
pub const PLATFORM_BOOTSTRAP_SCHEMES: &[&str] = &["WebJobsAuthLevel", "ArmToken"];

/// Resolves, and caches for the process lifetime, the authorization filter of
/// each function.
///
/// Concurrent first requests for one function compute the filter once: the
/// first caller to win the per-function lock populates the cache before any
/// waiter re-checks it.
pub struct FunctionsAuthorizationProvider {
    store: Arc<MetadataStore>,
    cache: Arc<dyn FilterCache<FunctionId>>,
    schemes: Arc<dyn AuthenticationSchemeProvider>,
    locks: Arc<KeyedLock<String>>,
    config: Arc<ArcSwap<FunctionAuthzConfig>>,
}

impl FunctionsAuthorizationProvider {
    #[must_use]
    pub fn new(
        store: Arc<MetadataStore>,
        cache: Arc<dyn FilterCache<FunctionId>>,
        schemes: Arc<dyn AuthenticationSchemeProvider>,
        locks: Arc<KeyedLock<String>>,
        config: Arc<ArcSwap<FunctionAuthzConfig>>,
    ) -> Self {
        Self {
            store,
            cache,
            schemes,
            locks,
            config,
        }
    }

    async fn build_filter(
        &self,
        function_name: &str,
        policy_provider: &dyn PolicyProvider,
    ) -> Result<AuthorizationFilter, FunctionAuthzError> {
        let metadata = self.store.get_merged_metadata(function_name);
        if metadata.is_empty() {
            warn!(
                function = function_name,
                "no authorization metadata registered for function '{function_name}'; it will run without authorization"
            );
            return Ok(AuthorizationFilter::unrestricted());
        }

        let requirements = self.assign_schemes(metadata.requirements()).await?;
        let policy = AuthorizationPolicy::combine(policy_provider, &requirements).await?;

        Ok(AuthorizationFilter::new(
            policy,
            metadata.allows_anonymous_access(),
        ))
    }

    /// Gives the first requirement a scheme list when not every requirement
    /// names one. Works on the caller's copy; stored metadata is untouched.
    async fn assign_schemes(
        &self,
        mut requirements: Vec<AuthorizeRequirement>,
    ) -> Result<Vec<AuthorizeRequirement>, FunctionAuthzError> {
        if requirements.iter().all(AuthorizeRequirement::has_schemes) {
            return Ok(requirements);
        }

        let strategy = self.config.load().empty_scheme_strategy;
        let schemes = match strategy {
            EmptySchemeStrategy::UseDefaultScheme => {
                let Some(scheme) = self.schemes.default_authenticate_scheme().await else {
                    error!(
                        "empty scheme strategy 'use_default_scheme' requires a default authentication scheme"
                    );
                    return Err(FunctionAuthzError::Configuration(
                        "a default authentication scheme is required when empty_scheme_strategy is use_default_scheme".to_owned(),
                    ));
                };
                scheme.name().to_owned()
            }
            EmptySchemeStrategy::UseAllSchemes => {
                let usable = self.usable_schemes().await;
                if usable.is_empty() {
                    warn!(
                        "no authentication schemes are usable for function authorization; requirements keep no schemes"
                    );
                    return Ok(requirements);
                }
                usable.join(",")
            }
        };

        if let Some(first) = requirements.first_mut() {
            debug!(schemes = %schemes, "assigning authentication schemes to first requirement");
            first.schemes = Some(schemes);
        }
        Ok(requirements)
    }

    /// Request-handler schemes, or all schemes when there are none, minus
    /// the platform bootstrap schemes.
    async fn usable_schemes(&self) -> Vec<String> {
        let handlers = without_bootstrap(&self.schemes.request_handler_schemes().await);
        if !handlers.is_empty() {
            return handlers;
        }
        without_bootstrap(&self.schemes.all_schemes().await)
    }
}

fn without_bootstrap(schemes: &[AuthenticationScheme]) -> Vec<String> {
    schemes
        .iter()
        .map(AuthenticationScheme::name)
        .filter(|name| !PLATFORM_BOOTSTRAP_SCHEMES.contains(name))
        .map(str::to_owned)
        .collect()
}

#[async_trait]
impl FunctionAuthorizationProvider for FunctionsAuthorizationProvider {
    #[tracing::instrument(skip_all, fields(function = %function_name))]
    async fn resolve(
        &self,
        function_name: &str,
        policy_provider: &dyn PolicyProvider,
    ) -> Result<Arc<AuthorizationFilter>, FunctionAuthzError> {
        if function_name.trim().is_empty() {
            return Err(FunctionAuthzError::InvalidArgument(
                "function name must not be blank".to_owned(),
            ));
        }

        let key = self.store.function_id(function_name);
        if let Some(filter) = self.cache.try_get(&key) {
            return Ok(filter);
        }

        // same identity as the cache key: registration changes both together
        let _guard = self.locks.enter(format!("resolve:{key}"), true).await;

        if let Some(filter) = self.cache.try_get(&key) {
            debug!("authorization filter resolved by a concurrent request");
            return Ok(filter);
        }

        let filter = Arc::new(self.build_filter(function_name, policy_provider).await?);

        if !policy_provider.allows_caching_policies() {
            debug!("policy provider disallows caching; filter not cached");
            return Ok(filter);
        }

        if self.cache.set(key, Arc::clone(&filter)) {
            return Ok(filter);
        }
        debug!("authorization filter already cached");
        Ok(self.cache.try_get(&key).unwrap_or(filter))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use function_authz_sdk::{FunctionDescriptor, PolicyRequirement, TypeDescriptor};
    use tracing_test::traced_test;

    use super::*;
    use crate::domain::filter_cache::AuthorizationFilterCache;
    use crate::domain::policies::StaticPolicyProvider;

    struct MockSchemes {
        all: Vec<AuthenticationScheme>,
        default_scheme: Option<AuthenticationScheme>,
    }

    #[async_trait]
    impl AuthenticationSchemeProvider for MockSchemes {
        async fn all_schemes(&self) -> Vec<AuthenticationScheme> {
            self.all.clone()
        }

        async fn request_handler_schemes(&self) -> Vec<AuthenticationScheme> {
            self.all
                .iter()
                .filter(|s| s.handles_requests())
                .cloned()
                .collect()
        }

        async fn default_authenticate_scheme(&self) -> Option<AuthenticationScheme> {
            self.default_scheme.clone()
        }
    }

    /// Counts default-policy lookups, i.e. policy combinations for
    /// requirements without a named policy or roles.
    struct CountingPolicies {
        defaults: AtomicUsize,
        caching: bool,
        delay: Duration,
    }

    impl CountingPolicies {
        fn new(caching: bool) -> Self {
            Self {
                defaults: AtomicUsize::new(0),
                caching,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl PolicyProvider for CountingPolicies {
        async fn policy(
            &self,
            _name: &str,
        ) -> Result<Option<AuthorizationPolicy>, FunctionAuthzError> {
            Ok(None)
        }

        async fn default_policy(&self) -> Result<AuthorizationPolicy, FunctionAuthzError> {
            self.defaults.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(AuthorizationPolicy::builder().require_authenticated_user().build())
        }

        fn allows_caching_policies(&self) -> bool {
            self.caching
        }
    }

    fn schemes(names: &[&str]) -> MockSchemes {
        MockSchemes {
            all: names.iter().map(|n| AuthenticationScheme::new(*n)).collect(),
            default_scheme: None,
        }
    }

    fn provider_with(
        schemes: MockSchemes,
        config: FunctionAuthzConfig,
    ) -> (FunctionsAuthorizationProvider, Arc<MetadataStore>) {
        let store = Arc::new(MetadataStore::new());
        let provider = FunctionsAuthorizationProvider::new(
            Arc::clone(&store),
            Arc::new(AuthorizationFilterCache::new()),
            Arc::new(schemes),
            Arc::new(KeyedLock::new()),
            Arc::new(ArcSwap::from_pointee(config)),
        );
        (provider, store)
    }

    fn admin_function(store: &MetadataStore) {
        store
            .register(
                &FunctionDescriptor::new("GetOrders", TypeDescriptor::new("App.Orders"))
                    .with_requirement(AuthorizeRequirement::new().with_roles("admin")),
            )
            .unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn unregistered_function_resolves_without_policy_and_warns_once() {
        let (provider, _) = provider_with(schemes(&["Bearer"]), FunctionAuthzConfig::default());
        let policies = StaticPolicyProvider::new();

        let first = provider.resolve("Foo", &policies).await.unwrap();
        let second = provider.resolve("Foo", &policies).await.unwrap();

        assert!(first.policy().is_none());
        assert!(!first.allow_anonymous());
        assert!(Arc::ptr_eq(&first, &second));

        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| line.contains("WARN") && line.contains("'Foo'"))
                .count();
            if warnings == 1 {
                Ok(())
            } else {
                Err(format!("expected one warning naming Foo, got {warnings}"))
            }
        });
    }

    #[tokio::test]
    async fn all_schemes_strategy_skips_bootstrap_schemes() {
        let (provider, store) = provider_with(
            schemes(&["Bearer", "WebJobsAuthLevel", "Cookie", "ArmToken"]),
            FunctionAuthzConfig::default(),
        );
        admin_function(&store);

        let filter = provider
            .resolve("GetOrders", &StaticPolicyProvider::new())
            .await
            .unwrap();
        let policy = filter.policy().unwrap();

        assert_eq!(
            policy.requirements(),
            [PolicyRequirement::RolesAny(vec!["admin".to_owned()])]
        );
        assert_eq!(policy.authentication_schemes(), ["Bearer", "Cookie"]);
        // stored metadata keeps its original (scheme-less) requirement
        assert_eq!(
            store.get_merged_metadata("GetOrders").requirements(),
            vec![AuthorizeRequirement::new().with_roles("admin")]
        );
    }

    #[tokio::test]
    async fn all_schemes_strategy_prefers_request_handlers() {
        let mixed = MockSchemes {
            all: vec![
                AuthenticationScheme::new("Bearer"),
                AuthenticationScheme::new("OpenIdConnect").handling_requests(),
                AuthenticationScheme::new("ArmToken").handling_requests(),
            ],
            default_scheme: None,
        };
        let (provider, store) = provider_with(mixed, FunctionAuthzConfig::default());
        admin_function(&store);

        let filter = provider
            .resolve("GetOrders", &StaticPolicyProvider::new())
            .await
            .unwrap();
        assert_eq!(
            filter.policy().unwrap().authentication_schemes(),
            ["OpenIdConnect"]
        );
    }

    #[tokio::test]
    async fn all_schemes_strategy_falls_back_when_request_handlers_are_bootstrap_only() {
        let bootstrap_handlers = MockSchemes {
            all: vec![
                AuthenticationScheme::new("Bearer"),
                AuthenticationScheme::new("ArmToken").handling_requests(),
                AuthenticationScheme::new("WebJobsAuthLevel").handling_requests(),
            ],
            default_scheme: None,
        };
        let (provider, store) = provider_with(bootstrap_handlers, FunctionAuthzConfig::default());
        admin_function(&store);

        let filter = provider
            .resolve("GetOrders", &StaticPolicyProvider::new())
            .await
            .unwrap();
        assert_eq!(filter.policy().unwrap().authentication_schemes(), ["Bearer"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn all_schemes_strategy_without_usable_schemes_leaves_requirement_unassigned() {
        let (provider, store) = provider_with(
            schemes(&["WebJobsAuthLevel", "ArmToken"]),
            FunctionAuthzConfig::default(),
        );
        admin_function(&store);

        let filter = provider
            .resolve("GetOrders", &StaticPolicyProvider::new())
            .await
            .unwrap();
        let policy = filter.policy().unwrap();
        assert!(policy.authentication_schemes().is_empty());
        assert_eq!(
            policy.requirements(),
            [PolicyRequirement::RolesAny(vec!["admin".to_owned()])]
        );
        assert!(logs_contain("no authentication schemes are usable"));
    }

    #[tokio::test]
    async fn explicit_schemes_are_kept() {
        let (provider, store) =
            provider_with(schemes(&["Bearer", "Cookie"]), FunctionAuthzConfig::default());
        store
            .register(
                &FunctionDescriptor::new("Export", TypeDescriptor::new("App.Reports"))
                    .with_requirement(AuthorizeRequirement::new().with_schemes("Cookie")),
            )
            .unwrap();

        let filter = provider
            .resolve("Export", &StaticPolicyProvider::new())
            .await
            .unwrap();
        let policy = filter.policy().unwrap();
        assert_eq!(policy.authentication_schemes(), ["Cookie"]);
        assert_eq!(policy.requirements(), [PolicyRequirement::AuthenticatedUser]);
    }

    #[tokio::test]
    async fn default_scheme_strategy_requires_default_scheme() {
        let config = FunctionAuthzConfig {
            empty_scheme_strategy: EmptySchemeStrategy::UseDefaultScheme,
            ..FunctionAuthzConfig::default()
        };
        let (provider, store) = provider_with(schemes(&["Bearer", "Cookie"]), config);
        admin_function(&store);

        let err = provider
            .resolve("GetOrders", &StaticPolicyProvider::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionAuthzError::Configuration(_)));
    }

    #[tokio::test]
    async fn default_scheme_strategy_assigns_default_to_first_requirement_only() {
        let config = FunctionAuthzConfig {
            empty_scheme_strategy: EmptySchemeStrategy::UseDefaultScheme,
            ..FunctionAuthzConfig::default()
        };
        let with_default = MockSchemes {
            default_scheme: Some(AuthenticationScheme::new("Cookie")),
            ..schemes(&["Bearer", "Cookie"])
        };
        let (provider, store) = provider_with(with_default, config);
        store
            .register(
                &FunctionDescriptor::new("GetOrders", TypeDescriptor::new("App.Orders"))
                    .with_requirement(AuthorizeRequirement::new().with_roles("reader"))
                    .with_requirement(
                        AuthorizeRequirement::new()
                            .with_roles("admin")
                            .with_schemes("Bearer"),
                    ),
            )
            .unwrap();

        let filter = provider
            .resolve("GetOrders", &StaticPolicyProvider::new())
            .await
            .unwrap();
        assert_eq!(
            filter.policy().unwrap().authentication_schemes(),
            ["Cookie", "Bearer"]
        );
    }

    #[tokio::test]
    async fn unknown_policy_name_is_reported() {
        let (provider, store) = provider_with(schemes(&["Bearer"]), FunctionAuthzConfig::default());
        store
            .register(
                &FunctionDescriptor::new("Audit", TypeDescriptor::new("App.Audit"))
                    .with_requirement(AuthorizeRequirement::new().with_policy("auditors")),
            )
            .unwrap();

        let err = provider
            .resolve("Audit", &StaticPolicyProvider::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionAuthzError::PolicyNotFound(name) if name == "auditors"));
    }

    #[tokio::test]
    async fn blank_function_name_is_rejected() {
        let (provider, _) = provider_with(schemes(&[]), FunctionAuthzConfig::default());
        let err = provider
            .resolve(" ", &StaticPolicyProvider::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionAuthzError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn caching_can_be_disallowed_by_policy_provider() {
        let (provider, store) = provider_with(schemes(&["Bearer"]), FunctionAuthzConfig::default());
        store
            .register(
                &FunctionDescriptor::new("Ping", TypeDescriptor::new("App.Health"))
                    .with_requirement(AuthorizeRequirement::new()),
            )
            .unwrap();

        let policies = CountingPolicies::new(false);
        let first = provider.resolve("Ping", &policies).await.unwrap();
        let second = provider.resolve("Ping", &policies).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(policies.defaults.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_compute_once() {
        let (provider, store) = provider_with(schemes(&["Bearer"]), FunctionAuthzConfig::default());
        store
            .register(
                &FunctionDescriptor::new("Ping", TypeDescriptor::new("App.Health"))
                    .with_requirement(AuthorizeRequirement::new()),
            )
            .unwrap();

        let provider = Arc::new(provider);
        let policies = Arc::new(CountingPolicies::new(true));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let provider = Arc::clone(&provider);
                let policies = Arc::clone(&policies);
                tokio::spawn(async move { provider.resolve("ping", policies.as_ref()).await })
            })
            .collect();

        let mut filters = Vec::new();
        for task in tasks {
            filters.push(task.await.unwrap().unwrap());
        }

        assert_eq!(policies.defaults.load(Ordering::SeqCst), 1);
        assert!(filters.iter().all(|f| Arc::ptr_eq(f, &filters[0])));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn registration_after_first_resolve_keeps_single_flight() {
        let (provider, store) = provider_with(schemes(&["Bearer"]), FunctionAuthzConfig::default());
        let provider = Arc::new(provider);
        let policies = Arc::new(CountingPolicies {
            delay: Duration::from_millis(20),
            ..CountingPolicies::new(true)
        });

        let early = provider.resolve("Ping", policies.as_ref()).await.unwrap();
        assert!(early.policy().is_none());

        store
            .register(
                &FunctionDescriptor::new("Ping", TypeDescriptor::new("App.Health"))
                    .with_requirement(AuthorizeRequirement::new()),
            )
            .unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let provider = Arc::clone(&provider);
                let policies = Arc::clone(&policies);
                tokio::spawn(async move { provider.resolve("Ping", policies.as_ref()).await })
            })
            .collect();

        let mut filters = Vec::new();
        for task in tasks {
            filters.push(task.await.unwrap().unwrap());
        }

        assert_eq!(policies.defaults.load(Ordering::SeqCst), 1);
        assert!(filters[0].policy().is_some());
        assert!(filters.iter().all(|f| Arc::ptr_eq(f, &filters[0])));
    }
}
