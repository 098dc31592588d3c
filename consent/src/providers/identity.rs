//! Upstream identity provider sessions.

use crate::error::Result;

/// Ends sessions held at an upstream identity provider.
///
/// A login session records the identity provider's own session id when the
/// login UI supplied one. Ending the login session ends that one too.
pub trait IdentityProviderSessions: Send + Sync {
    /// Disable one identity provider session of `subject`.
    ///
    /// # Errors
    ///
    /// Returns error if the identity provider cannot be reached or refuses.
    fn disable_session(
        &self,
        subject: &str,
        identity_provider_session_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// No upstream identity provider; nothing to disable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentityProvider;

impl IdentityProviderSessions for NoIdentityProvider {
    async fn disable_session(
        &self,
        _subject: &str,
        _identity_provider_session_id: &str,
    ) -> Result<()> {
        Ok(())
    }
}
