//! Flow and session storage trait.
//!
//! # Single Redemption
//!
//! Every challenge and verifier may be redeemed at most once. The
//! `verify_and_invalidate_*` operations must check and flip the state in one
//! atomic step; a second concurrent call must see [`FlowError::AlreadyUsed`].
//!
//! # Implementation Notes
//!
//! **Production** (SQL):
//! ```ignore
//! // Redeem: conditional update, succeed only if the row was still unused
//! UPDATE flows SET state = 'login_used' WHERE id = $1 AND state IN ('login_unused', 'login_error');
//! ```
//!
//! **Testing**: [`MockFlowStore`](crate::mocks::MockFlowStore) keeps
//! everything in a `HashMap` behind a `Mutex`.
//!
//! [`FlowError::AlreadyUsed`]: crate::error::FlowError::AlreadyUsed

use crate::client::Client;
use crate::error::Result;
use crate::flow::Flow;
use crate::state::{ForcedObfuscatedLoginSession, LoginSession, LogoutRequest};

/// Persistence for flows, login sessions and logout requests.
///
/// Lookups of unknown records fail with [`FlowError::NotFound`].
///
/// [`FlowError::NotFound`]: crate::error::FlowError::NotFound
pub trait FlowStore: Send + Sync {
    // ═══════════════════════════════════════════════════════════
    // Login stage
    // ═══════════════════════════════════════════════════════════

    /// Record a new flow in `LoginInitialized`.
    ///
    /// # Errors
    ///
    /// Returns error if a flow with the same id exists or storage fails.
    fn create_login_request(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load a flow by login challenge id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such flow exists.
    fn get_login_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<Flow>> + Send;

    /// Store the login UI outcome.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the stored flow's login verifier was already
    /// redeemed, `NotFound` if the flow does not exist.
    fn handle_login_request(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Atomically redeem the login verifier of a flow.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyUsed` on the second call, `NotFound` if the flow does
    /// not exist or was never handled.
    fn verify_and_invalidate_login_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<Flow>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Consent stage
    // ═══════════════════════════════════════════════════════════

    /// Store the consent stage of a flow whose login was redeemed.
    ///
    /// # Errors
    ///
    /// Returns error if the flow does not exist or its login was not redeemed.
    fn create_consent_request(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load a flow by consent challenge id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such flow exists.
    fn get_consent_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<Flow>> + Send;

    /// Store the consent UI outcome.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the consent verifier was already redeemed.
    fn handle_consent_request(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Atomically redeem the consent verifier of a flow.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyUsed` on the second call, `NotFound` if the flow does
    /// not exist or was never handled.
    fn verify_and_invalidate_consent_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<Flow>> + Send;

    /// Redeemed, remembered, non-denied grants of `subject` to `client_id`.
    ///
    /// Expiry (`remember_for`) is checked by the caller. May return an empty
    /// list or `NotFound` when there are none.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_granted_and_remembered_consent_requests(
        &self,
        client_id: &str,
        subject: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Flow>>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Login sessions
    // ═══════════════════════════════════════════════════════════

    /// Create a login session.
    ///
    /// # Errors
    ///
    /// Returns error if the id is taken or storage fails.
    fn create_login_session(
        &self,
        session: &LoginSession,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load a session the subject asked to be remembered in.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session does not exist or is not remembered.
    fn get_remembered_login_session(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<LoginSession>> + Send;

    /// Load a session whether or not it is remembered.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session does not exist.
    fn get_login_session(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<LoginSession>> + Send;

    /// Update an existing session after a fresh authentication.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session does not exist.
    fn confirm_login_session(
        &self,
        session: &LoginSession,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a session, returning it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session does not exist.
    fn delete_login_session(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<LoginSession>> + Send;

    /// Delete every session of a subject.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the subject has no sessions.
    fn revoke_subject_login_session(
        &self,
        subject: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Logout requests
    // ═══════════════════════════════════════════════════════════

    /// Store a new logout request.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn create_logout_request(
        &self,
        request: &LogoutRequest,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load a logout request by challenge.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    fn get_logout_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<LogoutRequest>> + Send;

    /// Mark a logout request accepted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist, `AlreadyUsed` if it was
    /// redeemed.
    fn accept_logout_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<LogoutRequest>> + Send;

    /// Reject (discard) a logout request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    fn reject_logout_request(
        &self,
        challenge: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Atomically redeem an accepted logout request by verifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no accepted request carries the verifier,
    /// `AlreadyUsed` on the second call.
    fn verify_and_invalidate_logout_request(
        &self,
        verifier: &str,
    ) -> impl std::future::Future<Output = Result<LogoutRequest>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Obfuscated subjects and logout propagation
    // ═══════════════════════════════════════════════════════════

    /// Pin an obfuscated subject for a client.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn create_forced_obfuscated_login_session(
        &self,
        session: &ForcedObfuscatedLoginSession,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Look up a pinned obfuscated subject.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is pinned.
    fn get_forced_obfuscated_login_session(
        &self,
        client_id: &str,
        subject_obfuscated: &str,
    ) -> impl std::future::Future<Output = Result<ForcedObfuscatedLoginSession>> + Send;

    /// Clients with a front-channel logout URI the subject authorized in `sid`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn list_clients_with_front_channel_logout(
        &self,
        subject: &str,
        sid: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Client>>> + Send;

    /// Clients with a back-channel logout URI the subject authorized in `sid`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn list_clients_with_back_channel_logout(
        &self,
        subject: &str,
        sid: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Client>>> + Send;
}
