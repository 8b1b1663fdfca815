//! Composition root of the function authorization engine.

use std::sync::Arc;

use arc_swap::ArcSwap;
use function_authz_sdk::{
    AuthenticationSchemeProvider, FunctionAuthorizationProvider, FunctionAuthzError, FunctionId,
    HostModel, MetadataScanner, PolicyEvaluator, PolicyProvider,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::FunctionAuthzConfig;
use crate::domain::{
    AuthorizationFilterCache, FilterCache, FunctionAuthorizationExecutor,
    FunctionsAuthorizationProvider, FunctionsAuthorizationResultHandler, MetadataRegistrar,
    MetadataStore, SchemePolicyEvaluator, SchemeRegistry, StaticPolicyProvider,
};
use crate::sync::KeyedLock;

/// Owns the metadata store, filter cache, lock registry, configuration and
/// the lock sweeper task. Build one per process in the application's
/// composition root and share it behind an `Arc`.
pub struct FunctionAuthorizationRuntime {
    config: Arc<ArcSwap<FunctionAuthzConfig>>,
    store: Arc<MetadataStore>,
    locks: Arc<KeyedLock<String>>,
    registrar: MetadataRegistrar,
    provider: Arc<FunctionsAuthorizationProvider>,
    result_handler: FunctionsAuthorizationResultHandler,
    executor: Arc<FunctionAuthorizationExecutor>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FunctionAuthorizationRuntime {
    pub fn builder() -> FunctionAuthorizationRuntimeBuilder {
        FunctionAuthorizationRuntimeBuilder::default()
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<FunctionAuthzConfig> {
        self.config.load_full()
    }

    /// Replaces the configuration; takes effect for the next request.
    pub fn update_config(&self, config: FunctionAuthzConfig) {
        info!(
            authorization_disabled = config.authorization_disabled,
            write_http_status_to_response = config.write_http_status_to_response,
            empty_scheme_strategy = ?config.empty_scheme_strategy,
            "function authorization configuration updated"
        );
        self.config.store(Arc::new(config));
    }

    #[must_use]
    pub const fn metadata(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    #[must_use]
    pub const fn provider(&self) -> &Arc<FunctionsAuthorizationProvider> {
        &self.provider
    }

    #[must_use]
    pub const fn result_handler(&self) -> &FunctionsAuthorizationResultHandler {
        &self.result_handler
    }

    #[must_use]
    pub const fn executor(&self) -> &Arc<FunctionAuthorizationExecutor> {
        &self.executor
    }

    #[must_use]
    pub const fn locks(&self) -> &Arc<KeyedLock<String>> {
        &self.locks
    }

    /// See [`MetadataRegistrar::ensure_registered`].
    ///
    /// # Errors
    ///
    /// Propagates registration failures.
    pub async fn ensure_registered(
        &self,
        function_name: &str,
        scanner: &dyn MetadataScanner,
    ) -> Result<bool, FunctionAuthzError> {
        self.registrar
            .ensure_registered(function_name, scanner)
            .await
    }

    /// See [`MetadataRegistrar::register_all`].
    ///
    /// # Errors
    ///
    /// Propagates registration failures.
    pub fn register_all(&self, scanner: &dyn MetadataScanner) -> Result<usize, FunctionAuthzError> {
        self.registrar.register_all(scanner)
    }

    /// Starts the keyed lock sweeper. Must run inside a tokio runtime;
    /// calling it again is a no-op.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }
        let period = self.config.load().lock_sweep_interval();
        *sweeper = Some(self.locks.spawn_sweeper(period, self.cancel.child_token()));
        info!(period_secs = period.as_secs(), "function authorization runtime started");
    }

    /// Stops the sweeper and waits for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "keyed lock sweeper ended abnormally");
        }
        info!("function authorization runtime stopped");
    }
}

impl Drop for FunctionAuthorizationRuntime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for FunctionAuthorizationRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionAuthorizationRuntime")
            .field("config", &self.config.load_full())
            .field("metadata_records", &self.store.len())
            .field("locks", &self.locks.len())
            .field("host_model", &self.executor.host_model())
            .finish_non_exhaustive()
    }
}

/// Builder for [`FunctionAuthorizationRuntime`].
///
/// Defaults: empty [`SchemeRegistry`], [`SchemePolicyEvaluator`] over it,
/// [`StaticPolicyProvider`] with no named policies, in-process filter cache,
/// [`HostModel::Middleware`], no scanner.
#[derive(Default)]
#[must_use]
pub struct FunctionAuthorizationRuntimeBuilder {
    config: FunctionAuthzConfig,
    host_model: HostModel,
    schemes: Option<Arc<SchemeRegistry>>,
    scheme_provider: Option<Arc<dyn AuthenticationSchemeProvider>>,
    evaluator: Option<Arc<dyn PolicyEvaluator>>,
    policy_provider: Option<Arc<dyn PolicyProvider>>,
    scanner: Option<Arc<dyn MetadataScanner>>,
    cache: Option<Arc<dyn FilterCache<FunctionId>>>,
}

impl FunctionAuthorizationRuntimeBuilder {
    pub fn config(mut self, config: FunctionAuthzConfig) -> Self {
        self.config = config;
        self
    }

    pub const fn host_model(mut self, host_model: HostModel) -> Self {
        self.host_model = host_model;
        self
    }

    /// Uses `schemes` for scheme enumeration and, unless an evaluator is
    /// set, for authentication.
    pub fn schemes(mut self, schemes: SchemeRegistry) -> Self {
        self.schemes = Some(Arc::new(schemes));
        self
    }

    /// Overrides scheme enumeration only.
    pub fn scheme_provider(mut self, provider: Arc<dyn AuthenticationSchemeProvider>) -> Self {
        self.scheme_provider = Some(provider);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn policy_provider(mut self, provider: Arc<dyn PolicyProvider>) -> Self {
        self.policy_provider = Some(provider);
        self
    }

    /// Enables first-contact registration from `scanner`.
    pub fn scanner(mut self, scanner: Arc<dyn MetadataScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn filter_cache(mut self, cache: Arc<dyn FilterCache<FunctionId>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # Errors
    ///
    /// `Configuration` when a custom scheme provider is set without an
    /// evaluator: the default evaluator authenticates through a
    /// [`SchemeRegistry`] only.
    pub fn build(self) -> Result<FunctionAuthorizationRuntime, FunctionAuthzError> {
        if self.scheme_provider.is_some() && self.schemes.is_none() && self.evaluator.is_none() {
            return Err(FunctionAuthzError::Configuration(
                "a policy evaluator is required when a custom scheme provider is used".to_owned(),
            ));
        }

        let registry = self.schemes.unwrap_or_default();
        let scheme_provider = self
            .scheme_provider
            .unwrap_or_else(|| Arc::clone(&registry) as Arc<dyn AuthenticationSchemeProvider>);
        let evaluator = self.evaluator.unwrap_or_else(|| {
            Arc::new(SchemePolicyEvaluator::new(Arc::clone(&registry))) as Arc<dyn PolicyEvaluator>
        });
        let policy_provider = self
            .policy_provider
            .unwrap_or_else(|| Arc::new(StaticPolicyProvider::new()) as Arc<dyn PolicyProvider>);
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(AuthorizationFilterCache::new()) as Arc<dyn FilterCache<FunctionId>>);

        let config = Arc::new(ArcSwap::from_pointee(self.config));
        let store = Arc::new(MetadataStore::new());
        let locks = Arc::new(KeyedLock::new());
        let registrar = MetadataRegistrar::new(Arc::clone(&store), Arc::clone(&locks));

        let provider = Arc::new(FunctionsAuthorizationProvider::new(
            Arc::clone(&store),
            cache,
            scheme_provider,
            Arc::clone(&locks),
            Arc::clone(&config),
        ));
        let result_handler = FunctionsAuthorizationResultHandler::new(Arc::clone(&config));

        let mut executor = FunctionAuthorizationExecutor::new(
            Arc::clone(&provider) as Arc<dyn FunctionAuthorizationProvider>,
            policy_provider,
            evaluator,
            result_handler.clone(),
            Arc::clone(&config),
            self.host_model,
        );
        if let Some(scanner) = self.scanner {
            executor = executor.with_discovery(registrar.clone(), scanner);
        }

        Ok(FunctionAuthorizationRuntime {
            config,
            store,
            locks,
            registrar,
            provider,
            result_handler,
            executor: Arc::new(executor),
            cancel: CancellationToken::new(),
            sweeper: Mutex::new(None),
        })
    }
}
