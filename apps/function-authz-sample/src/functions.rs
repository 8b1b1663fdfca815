//! The sample's function table: authorization declarations, routes and handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::Path;
use axum::http::Method;
use axum::routing::get;
use function_authz::axum_ext::{AuthenticatedPrincipal, FunctionRoutes};
use function_authz::domain::{SchemeRegistry, StaticMetadataScanner};
use function_authz_sdk::{
    AuthenticateResult, AuthenticationHandler, AuthenticationScheme, AuthorizeRequirement,
    FunctionAuthzError, FunctionDescriptor, Principal, TypeDescriptor,
};
use http::header::AUTHORIZATION;
use http::request::Parts;

/// Demo bearer handler: `Authorization: Bearer <subject>[:role,role]`.
/// Not a real token format; it only makes the sample runnable with curl.
struct DemoBearerHandler;

#[async_trait]
impl AuthenticationHandler for DemoBearerHandler {
    async fn authenticate(&self, scheme: &str, request: &Parts) -> AuthenticateResult {
        let Some(header) = request.headers.get(AUTHORIZATION) else {
            return AuthenticateResult::NoResult;
        };
        let Some(token) = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
        else {
            return AuthenticateResult::Failure("malformed bearer token".to_owned());
        };

        let (subject, roles) = token.split_once(':').unwrap_or((token, ""));
        AuthenticateResult::Success(
            Principal::new(subject)
                .with_roles(roles.split(',').map(str::trim).filter(|r| !r.is_empty()))
                .authenticated_by(scheme),
        )
    }
}

pub fn schemes() -> SchemeRegistry {
    SchemeRegistry::new()
        .with_scheme(AuthenticationScheme::new("Bearer"), Arc::new(DemoBearerHandler))
        .with_default_scheme("Bearer")
}

pub fn scanner() -> StaticMetadataScanner {
    let orders = TypeDescriptor::new("sample.Orders")
        .with_requirement(AuthorizeRequirement::new().with_roles("reader,admin"));
    let system = TypeDescriptor::new("sample.System").allowing_anonymous();

    StaticMetadataScanner::new()
        .with_function(FunctionDescriptor::new("ListOrders", orders.clone()))
        .with_function(FunctionDescriptor::new("GetOrder", orders.clone()))
        .with_function(
            FunctionDescriptor::new("DeleteOrder", orders)
                .with_requirement(AuthorizeRequirement::new().with_roles("admin")),
        )
        .with_function(
            FunctionDescriptor::new("Health", system).with_requirement(AuthorizeRequirement::new()),
        )
}

pub fn routes() -> Result<FunctionRoutes, FunctionAuthzError> {
    FunctionRoutes::new()
        .route(Method::GET, "/api/orders", "ListOrders")?
        .route(Method::GET, "/api/orders/{id}", "GetOrder")?
        .route(Method::DELETE, "/api/orders/{id}", "DeleteOrder")?
        .route(Method::GET, "/health", "Health")
}

pub fn router() -> Router {
    Router::new()
        .route("/api/orders", get(list_orders))
        .route("/api/orders/{id}", get(get_order).delete(delete_order))
        .route("/health", get(health))
}

async fn list_orders(AuthenticatedPrincipal(principal): AuthenticatedPrincipal) -> String {
    format!("orders visible to {}", principal.subject())
}

async fn get_order(
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<u64>,
) -> String {
    format!("order {id} for {}", principal.subject())
}

async fn delete_order(
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<u64>,
) -> String {
    tracing::info!(order = id, subject = principal.subject(), "order deleted");
    format!("order {id} deleted")
}

async fn health() -> &'static str {
    "ok"
}
