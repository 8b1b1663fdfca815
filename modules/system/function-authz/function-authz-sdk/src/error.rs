//! Error types for the function authorization module.

use http::StatusCode;
use thiserror::Error;

/// Errors that can occur while resolving or enforcing function authorization.
///
/// Access denial is expressed via [`AuthorizationFlow::Terminate`](crate::AuthorizationFlow),
/// not as an error variant, except for hosts that cannot abort an invocation
/// (see [`AuthorizationShortCircuit`]).
#[derive(Debug, Error)]
pub enum FunctionAuthzError {
    /// The module is misconfigured; the request cannot be authorized.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A requirement names a policy the policy provider does not know.
    #[error("authorization policy '{0}' was not found")]
    PolicyNotFound(String),

    /// Caller supplied an invalid value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Authorization failed and the response has already been written.
    #[error(transparent)]
    ShortCircuit(#[from] AuthorizationShortCircuit),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Control-flow signal raised after an authorization failure in hosts that
/// cannot abort the function pipeline.
///
/// The response (status, challenge headers, optional body) is complete by the
/// time this is raised. The host boundary intercepts it and returns that
/// response instead of running the function. Only `401` and `403` are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{} authorization failure; the response has already been sent to the caller", .status.as_u16())]
pub struct AuthorizationShortCircuit {
    status: StatusCode,
}

impl AuthorizationShortCircuit {
    #[must_use]
    pub const fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
        }
    }

    #[must_use]
    pub const fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
        }
    }

    #[must_use]
    pub const fn status(self) -> StatusCode {
        self.status
    }

    /// Host boundary helper: turns a short-circuit back into the status that
    /// was already written, and passes every other error through.
    ///
    /// # Errors
    ///
    /// Returns `err` unchanged when it is not a [`FunctionAuthzError::ShortCircuit`].
    pub fn recover(err: FunctionAuthzError) -> Result<StatusCode, FunctionAuthzError> {
        match err {
            FunctionAuthzError::ShortCircuit(signal) => Ok(signal.status),
            other => Err(other),
        }
    }
}

impl TryFrom<StatusCode> for AuthorizationShortCircuit {
    type Error = FunctionAuthzError;

    fn try_from(status: StatusCode) -> Result<Self, Self::Error> {
        match status {
            StatusCode::UNAUTHORIZED => Ok(Self::unauthorized()),
            StatusCode::FORBIDDEN => Ok(Self::forbidden()),
            other => Err(FunctionAuthzError::InvalidArgument(format!(
                "authorization short-circuit only supports 401 and 403, got {}",
                other.as_u16()
            ))),
        }
    }
}
