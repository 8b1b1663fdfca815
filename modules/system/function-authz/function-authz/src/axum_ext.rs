//! Axum host adapter: a tower layer that authorizes requests routed to
//! functions, and an extractor for the authenticated principal.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, Request};
use axum::http::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use function_authz_sdk::{
    AuthorizationFlow, AuthorizationShortCircuit, AuthorizationTransport, FunctionAuthzError,
    Principal,
};
use futures::future::BoxFuture;
use tower::{Layer, Service};

use crate::domain::FunctionAuthorizationExecutor;

/// Maps `(method, path)` to the function that serves it.
#[derive(Clone, Default)]
pub struct FunctionRoutes {
    routes: HashMap<Method, matchit::Router<String>>,
}

impl FunctionRoutes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route in matchit syntax (`/orders/{id}`).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the path is malformed or conflicts with an
    /// existing route of the same method.
    pub fn route(
        mut self,
        method: Method,
        path: &str,
        function_name: impl Into<String>,
    ) -> Result<Self, FunctionAuthzError> {
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path, function_name.into())
            .map_err(|err| {
                FunctionAuthzError::InvalidArgument(format!("route {method} {path}: {err}"))
            })?;
        Ok(self)
    }

    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&str> {
        self.routes
            .get(method)
            .and_then(|router| router.at(path).ok())
            .map(|matched| matched.value.as_str())
    }
}

/// [`AuthorizationTransport`] that accumulates an HTTP response.
///
/// A challenge adds a `WWW-Authenticate` header for its scheme and sets 401;
/// a forbid sets 403.
#[derive(Debug, Default)]
pub struct HttpResponseTransport {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<String>,
}

impl HttpResponseTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait]
impl AuthorizationTransport for HttpResponseTransport {
    async fn challenge(&mut self, scheme: Option<&str>) {
        self.status = Some(StatusCode::UNAUTHORIZED);
        if let Some(scheme) = scheme {
            match HeaderValue::from_str(scheme) {
                Ok(value) => {
                    self.headers.append(WWW_AUTHENTICATE, value);
                }
                Err(_) => tracing::warn!(scheme, "scheme name is not a valid header value"),
            }
        }
    }

    async fn forbid(&mut self, _scheme: Option<&str>) {
        self.status = Some(StatusCode::FORBIDDEN);
    }

    fn has_started(&self) -> bool {
        self.body.is_some()
    }

    async fn write_status(&mut self, status: StatusCode, body: &str) {
        self.status = Some(status);
        self.body = Some(body.to_owned());
    }
}

impl IntoResponse for HttpResponseTransport {
    fn into_response(self) -> Response {
        let status = self.status.unwrap_or(StatusCode::UNAUTHORIZED);
        let mut response = match self.body {
            Some(body) => {
                let mut response = Response::new(Body::from(body));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
                response
            }
            None => Response::new(Body::empty()),
        };
        *response.status_mut() = status;
        response.headers_mut().extend(self.headers);
        response
    }
}

/// Principal established by [`FunctionAuthorizationLayer`].
///
/// Rejects with 401 when the layer did not authenticate the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedPrincipal)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

struct LayerState {
    executor: Arc<FunctionAuthorizationExecutor>,
    routes: FunctionRoutes,
}

/// Tower layer that authorizes every request routed to a known function.
/// Requests to other paths pass through untouched.
#[derive(Clone)]
pub struct FunctionAuthorizationLayer {
    state: Arc<LayerState>,
}

impl FunctionAuthorizationLayer {
    #[must_use]
    pub fn new(executor: Arc<FunctionAuthorizationExecutor>, routes: FunctionRoutes) -> Self {
        Self {
            state: Arc::new(LayerState { executor, routes }),
        }
    }
}

impl<S> Layer<S> for FunctionAuthorizationLayer {
    type Service = FunctionAuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FunctionAuthorizationService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Clone)]
pub struct FunctionAuthorizationService<S> {
    inner: S,
    state: Arc<LayerState>,
}

impl<S> Service<Request<Body>> for FunctionAuthorizationService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = Arc::clone(&self.state);
        let not_ready_inner = self.inner.clone();
        let mut ready_inner = std::mem::replace(&mut self.inner, not_ready_inner);

        Box::pin(async move {
            let Some(function_name) = state
                .routes
                .resolve(request.method(), request.uri().path())
                .map(str::to_owned)
            else {
                return ready_inner.call(request).await;
            };

            let (mut parts, body) = request.into_parts();
            let mut transport = HttpResponseTransport::new();

            match state
                .executor
                .authorize(&function_name, &mut parts, &mut transport)
                .await
            {
                Ok(AuthorizationFlow::Continue) => {
                    ready_inner.call(Request::from_parts(parts, body)).await
                }
                Ok(AuthorizationFlow::Terminate(_)) => Ok(transport.into_response()),
                Err(err) => match AuthorizationShortCircuit::recover(err) {
                    Ok(status) => {
                        tracing::debug!(
                            function = %function_name,
                            status = status.as_u16(),
                            "function invocation short-circuited by authorization"
                        );
                        Ok(transport.into_response())
                    }
                    Err(err) => {
                        tracing::error!(
                            function = %function_name,
                            error = %err,
                            "function authorization failed"
                        );
                        Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                    }
                },
            }
        })
    }
}
