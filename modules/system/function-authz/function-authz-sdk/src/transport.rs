//! Host side of an authorization failure.

use async_trait::async_trait;
use http::StatusCode;

/// Response surface the result handler writes challenges and failures to.
#[async_trait]
pub trait AuthorizationTransport: Send {
    /// Challenges the caller for `scheme`, or for the host default when `None`.
    async fn challenge(&mut self, scheme: Option<&str>);

    /// Rejects an authenticated caller for `scheme`, or the host default when `None`.
    async fn forbid(&mut self, scheme: Option<&str>);

    /// Whether the response body has already started.
    fn has_started(&self) -> bool;

    async fn write_status(&mut self, status: StatusCode, body: &str);
}
