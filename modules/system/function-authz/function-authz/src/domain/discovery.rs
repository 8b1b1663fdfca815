use std::sync::Arc;

use function_authz_sdk::{FunctionAuthzError, MetadataScanner};
use tracing::{debug, info};

use super::metadata::MetadataStore;
use crate::sync::KeyedLock;

/// Feeds scanner output into the [`MetadataStore`], either all at once on
/// cold start or one function at a time on first contact.
#[derive(Debug, Clone)]
pub struct MetadataRegistrar {
    store: Arc<MetadataStore>,
    locks: Arc<KeyedLock<String>>,
}

impl MetadataRegistrar {
    #[must_use]
    pub const fn new(store: Arc<MetadataStore>, locks: Arc<KeyedLock<String>>) -> Self {
        Self { store, locks }
    }

    /// Registers `function_name` from `scanner` unless it is already known.
    /// Returns whether the function is registered afterwards.
    ///
    /// # Errors
    ///
    /// Propagates [`MetadataStore::register`] failures.
    #[tracing::instrument(skip_all, fields(function = %function_name))]
    pub async fn ensure_registered(
        &self,
        function_name: &str,
        scanner: &dyn MetadataScanner,
    ) -> Result<bool, FunctionAuthzError> {
        if self.store.is_registered(function_name) {
            return Ok(true);
        }

        let _guard = self
            .locks
            .enter(format!("register:{}", function_name.to_lowercase()), true)
            .await;

        if self.store.is_registered(function_name) {
            return Ok(true);
        }

        let Some(descriptor) = scanner.describe(function_name) else {
            debug!("function is unknown to the metadata scanner");
            return Ok(false);
        };

        self.store.register(&descriptor)?;
        Ok(true)
    }

    /// Registers every function `scanner` reports; returns how many were new.
    ///
    /// # Errors
    ///
    /// Propagates [`MetadataStore::register`] failures.
    pub fn register_all(&self, scanner: &dyn MetadataScanner) -> Result<usize, FunctionAuthzError> {
        let mut registered = 0;
        for descriptor in scanner.functions() {
            if self.store.is_registered(&descriptor.name) {
                continue;
            }
            self.store.register(&descriptor)?;
            registered += 1;
        }
        info!(registered, total = self.store.len(), "function authorization metadata registered");
        Ok(registered)
    }
}
