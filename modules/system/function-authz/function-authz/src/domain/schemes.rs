use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use function_authz_sdk::{AuthenticationHandler, AuthenticationScheme, AuthenticationSchemeProvider};

struct RegisteredScheme {
    scheme: AuthenticationScheme,
    handler: Arc<dyn AuthenticationHandler>,
}

/// Authentication schemes of the host, in registration order, each with the
/// handler that authenticates requests for it.
#[derive(Default)]
#[must_use]
pub struct SchemeRegistry {
    schemes: Vec<RegisteredScheme>,
    default_scheme: Option<String>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `scheme`. A later registration of the same name replaces the
    /// handler but keeps the original position.
    pub fn with_scheme(
        mut self,
        scheme: AuthenticationScheme,
        handler: Arc<dyn AuthenticationHandler>,
    ) -> Self {
        if let Some(existing) = self
            .schemes
            .iter_mut()
            .find(|registered| registered.scheme.name() == scheme.name())
        {
            existing.scheme = scheme;
            existing.handler = handler;
        } else {
            self.schemes.push(RegisteredScheme { scheme, handler });
        }
        self
    }

    pub fn with_default_scheme(mut self, name: impl Into<String>) -> Self {
        self.default_scheme = Some(name.into());
        self
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<Arc<dyn AuthenticationHandler>> {
        self.find(name)
            .map(|registered| Arc::clone(&registered.handler))
    }

    #[must_use]
    pub fn default_scheme_name(&self) -> Option<&str> {
        self.default_scheme
            .as_deref()
            .filter(|name| self.find(name).is_some())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    fn find(&self, name: &str) -> Option<&RegisteredScheme> {
        self.schemes
            .iter()
            .find(|registered| registered.scheme.name() == name)
    }
}

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeRegistry")
            .field(
                "schemes",
                &self
                    .schemes
                    .iter()
                    .map(|registered| registered.scheme.name())
                    .collect::<Vec<_>>(),
            )
            .field("default_scheme", &self.default_scheme)
            .finish()
    }
}

#[async_trait]
impl AuthenticationSchemeProvider for SchemeRegistry {
    async fn all_schemes(&self) -> Vec<AuthenticationScheme> {
        self.schemes
            .iter()
            .map(|registered| registered.scheme.clone())
            .collect()
    }

    async fn request_handler_schemes(&self) -> Vec<AuthenticationScheme> {
        self.schemes
            .iter()
            .filter(|registered| registered.scheme.handles_requests())
            .map(|registered| registered.scheme.clone())
            .collect()
    }

    async fn default_authenticate_scheme(&self) -> Option<AuthenticationScheme> {
        let name = self.default_scheme_name()?;
        self.find(name).map(|registered| registered.scheme.clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use function_authz_sdk::AuthenticateResult;
    use http::request::Parts;

    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl AuthenticationHandler for NoopHandler {
        async fn authenticate(&self, _scheme: &str, _request: &Parts) -> AuthenticateResult {
            AuthenticateResult::NoResult
        }
    }

    fn registry() -> SchemeRegistry {
        SchemeRegistry::new()
            .with_scheme(AuthenticationScheme::new("Bearer"), Arc::new(NoopHandler))
            .with_scheme(
                AuthenticationScheme::new("OpenIdConnect").handling_requests(),
                Arc::new(NoopHandler),
            )
            .with_scheme(AuthenticationScheme::new("Cookie"), Arc::new(NoopHandler))
    }

    #[tokio::test]
    async fn enumerates_in_registration_order() {
        let registry = registry();
        let names: Vec<String> = registry
            .all_schemes()
            .await
            .iter()
            .map(|s| s.name().to_owned())
            .collect();
        assert_eq!(names, ["Bearer", "OpenIdConnect", "Cookie"]);

        let handlers = registry.request_handler_schemes().await;
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].name(), "OpenIdConnect");
    }

    #[tokio::test]
    async fn default_scheme_must_be_registered() {
        assert!(registry().default_authenticate_scheme().await.is_none());
        assert!(
            registry()
                .with_default_scheme("Missing")
                .default_authenticate_scheme()
                .await
                .is_none()
        );

        let default = registry()
            .with_default_scheme("Cookie")
            .default_authenticate_scheme()
            .await
            .unwrap();
        assert_eq!(default.name(), "Cookie");
    }

    #[test]
    fn re_registration_keeps_position() {
        let registry = registry().with_scheme(
            AuthenticationScheme::new("Bearer").handling_requests(),
            Arc::new(NoopHandler),
        );
        assert_eq!(registry.len(), 3);
        assert!(registry.handler("Bearer").is_some());
        assert!(registry.handler("bearer").is_none());
    }
}
