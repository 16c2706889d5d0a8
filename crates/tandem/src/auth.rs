//! Authentication for new connections.
//!
//! Tandem does not issue credentials. A client opens with
//! `Hello { token }` and the gateway asks an [`Authenticator`] who that
//! token belongs to. Plug in JWT validation, an auth-service call, or a
//! test double without touching the gateway.

use std::future::Future;

use tandem_protocol::CallerId;

use crate::TandemError;

/// Resolves a `Hello` token into the caller's identity.
///
/// Implementations may write `async fn authenticate` directly; the
/// returned future must be `Send` because each connection runs on its own
/// task.
///
/// # Example
///
/// ```rust
/// use tandem::{Authenticator, CallerId, TandemError};
///
/// /// Accepts tokens of the form `user:<name>`.
/// struct PrefixAuth;
///
/// impl Authenticator for PrefixAuth {
///     async fn authenticate(&self, token: &str) -> Result<CallerId, TandemError> {
///         let name = token
///             .strip_prefix("user:")
///             .ok_or_else(|| TandemError::AuthFailed("missing user: prefix".into()))?;
///         CallerId::new(name).map_err(|e| TandemError::AuthFailed(e.to_string()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the caller identified by `token`, or
    /// [`TandemError::AuthFailed`].
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<CallerId, TandemError>> + Send;
}

/// Uses the token itself as the caller id.
///
/// For trusted networks and development only: any client can claim any
/// identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedToken;

impl Authenticator for TrustedToken {
    async fn authenticate(&self, token: &str) -> Result<CallerId, TandemError> {
        CallerId::new(token).map_err(|e| TandemError::AuthFailed(e.to_string()))
    }
}
