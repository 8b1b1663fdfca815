#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use function_authz::domain::{SchemeRegistry, StaticMetadataScanner};
use function_authz_sdk::{
    AuthenticateResult, AuthenticationHandler, AuthenticationScheme, AuthorizationPolicy,
    AuthorizationTransport, AuthorizeRequirement, FunctionAuthzError, FunctionDescriptor,
    PolicyProvider, Principal, TypeDescriptor,
};
use http::StatusCode;
use http::request::Parts;

pub const USER_HEADER: &str = "x-test-user";

/// Reads `x-test-user: <subject>[;role,role]`; the value `invalid` is rejected.
pub struct HeaderAuthHandler;

#[async_trait]
impl AuthenticationHandler for HeaderAuthHandler {
    async fn authenticate(&self, scheme: &str, request: &Parts) -> AuthenticateResult {
        let Some(value) = request
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return AuthenticateResult::NoResult;
        };
        if value == "invalid" {
            return AuthenticateResult::Failure("invalid test credentials".to_owned());
        }
        let (subject, roles) = value.split_once(';').unwrap_or((value, ""));
        AuthenticateResult::Success(
            Principal::new(subject)
                .with_roles(roles.split(',').filter(|r| !r.is_empty()))
                .authenticated_by(scheme),
        )
    }
}

pub fn bearer_and_cookie() -> SchemeRegistry {
    SchemeRegistry::new()
        .with_scheme(AuthenticationScheme::new("Bearer"), Arc::new(HeaderAuthHandler))
        .with_scheme(AuthenticationScheme::new("Cookie"), Arc::new(HeaderAuthHandler))
        .with_scheme(
            AuthenticationScheme::new("WebJobsAuthLevel"),
            Arc::new(HeaderAuthHandler),
        )
}

/// `App.Orders` requires Bearer; `GetOrder` additionally requires `admin`.
/// `App.Health` allows anonymous access.
pub fn orders_scanner() -> StaticMetadataScanner {
    let orders = TypeDescriptor::new("App.Orders")
        .with_requirement(AuthorizeRequirement::new().with_schemes("Bearer"));
    let health = TypeDescriptor::new("App.Health").allowing_anonymous();

    StaticMetadataScanner::new()
        .with_function(
            FunctionDescriptor::new("GetOrder", orders.clone())
                .with_requirement(AuthorizeRequirement::new().with_roles("admin").with_schemes("Bearer")),
        )
        .with_function(FunctionDescriptor::new("ListOrders", orders))
        .with_function(
            FunctionDescriptor::new("Health", health)
                .with_requirement(AuthorizeRequirement::new().with_schemes("Bearer")),
        )
}

/// Policy provider that counts default-policy lookups.
#[derive(Default)]
pub struct CountingPolicies {
    pub default_lookups: AtomicUsize,
}

impl CountingPolicies {
    pub fn lookups(&self) -> usize {
        self.default_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyProvider for CountingPolicies {
    async fn policy(&self, _name: &str) -> Result<Option<AuthorizationPolicy>, FunctionAuthzError> {
        Ok(None)
    }

    async fn default_policy(&self) -> Result<AuthorizationPolicy, FunctionAuthzError> {
        self.default_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(AuthorizationPolicy::builder().require_authenticated_user().build())
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub challenges: Vec<Option<String>>,
    pub forbids: Vec<Option<String>>,
    pub written: Option<(StatusCode, String)>,
}

#[async_trait]
impl AuthorizationTransport for RecordingTransport {
    async fn challenge(&mut self, scheme: Option<&str>) {
        self.challenges.push(scheme.map(str::to_owned));
    }

    async fn forbid(&mut self, scheme: Option<&str>) {
        self.forbids.push(scheme.map(str::to_owned));
    }

    fn has_started(&self) -> bool {
        self.written.is_some()
    }

    async fn write_status(&mut self, status: StatusCode, body: &str) {
        self.written = Some((status, body.to_owned()));
    }
}

pub fn request(user: Option<&str>) -> Parts {
    let mut builder = http::Request::builder().uri("https://functions.local/api/orders/7");
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    builder.body(()).unwrap().into_parts().0
}
