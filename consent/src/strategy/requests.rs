//! Request API for the login, consent and logout UIs.
//!
//! The UIs receive a challenge, fetch the request it stands for, and accept or
//! reject it. Accepting or rejecting returns the URL the UI must send the user
//! agent to next, which carries the matching verifier.

use super::DefaultStrategy;
use crate::client::Client;
use crate::codec::Purpose;
use crate::constants::params;
use crate::error::{FlowError, RequestDeniedError, Result};
use crate::flow::{
    ConsentSessionData, Flow, FlowState, HandledConsentRequest, HandledLoginRequest, LoginRequest,
    OpenIdConnectContext,
};
use crate::providers::{
    ClientRepository, Clock, FlowStore, IdTokenStrategy, IdentityProviderSessions,
};
use crate::state::{LogoutRequest, RedirectTo};
use crate::utils::{checked_after, parse_with_query, with_query};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Login UI's acceptance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AcceptLoginRequest {
    /// Authenticated subject.
    pub subject: String,
    /// Remember the authentication in the browser.
    pub remember: bool,
    /// Seconds to remember; `0` for the browser session.
    pub remember_for: i64,
    /// Authentication context class reference.
    pub acr: String,
    /// Authentication methods references.
    pub amr: Vec<String>,
    /// Opaque context handed to the consent UI.
    pub context: Value,
    /// Obfuscated subject to pin for a pairwise client.
    pub force_subject_identifier: String,
    /// Session id at the upstream identity provider.
    pub identity_provider_session_id: String,
}

/// Consent UI's acceptance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AcceptConsentRequest {
    /// Granted scope.
    pub grant_scope: Vec<String>,
    /// Granted access token audience.
    pub grant_access_token_audience: Vec<String>,
    /// Token session data.
    pub session: ConsentSessionData,
    /// Remember the grant.
    pub remember: bool,
    /// Seconds to remember; `0` forever.
    pub remember_for: i64,
}

/// Consent request as presented to the consent UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentRequest {
    /// Consent challenge.
    pub challenge: String,
    /// A remembered grant covers the request.
    pub skip: bool,
    /// Authenticated subject.
    pub subject: String,
    /// Client that started the flow.
    pub client: Client,
    /// Requested scope.
    pub requested_scope: Vec<String>,
    /// Requested access token audience.
    pub requested_audience: Vec<String>,
    /// Original authorization request URL.
    pub request_url: String,
    /// OpenID Connect parameters.
    pub oidc_context: OpenIdConnectContext,
    /// Flow id.
    pub login_challenge: String,
    /// Authentication session id.
    pub login_session_id: String,
    /// Authentication context class reference.
    pub acr: String,
    /// Authentication methods references.
    pub amr: Vec<String>,
    /// Opaque login context.
    pub context: Value,
}

/// The authorization request URL with the verifier appended.
fn redirect_with_verifier(request_url: &str, name: &str, verifier: &str) -> Result<RedirectTo> {
    let redirect_to = parse_with_query(request_url, &[(name, verifier)]).ok_or_else(|| {
        FlowError::server_error(format!("Unable to parse request URL: {request_url}"))
    })?;
    Ok(RedirectTo {
        redirect_to: redirect_to.to_string(),
    })
}

/// `remember_for` must be non-negative and land on a representable instant.
fn validate_remember_for(remember_for: i64, now: DateTime<Utc>) -> Result<()> {
    if remember_for < 0 || checked_after(now, remember_for).is_none() {
        return Err(FlowError::invalid_request(
            "Field 'remember_for' must be zero or a positive number of seconds within the supported date range.",
        ));
    }
    Ok(())
}

impl<S, C, J, K, I> DefaultStrategy<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    // ═══════════════════════════════════════════════════════════
    // Login
    // ═══════════════════════════════════════════════════════════

    /// Stored flow behind a login challenge.
    async fn login_flow(&self, challenge: &str) -> Result<Flow> {
        let token = Flow::from_token(&self.cipher, challenge, Purpose::LoginChallenge)
            .map_err(|_| FlowError::NotFound)?;
        let flow = self.env.store.get_login_request(&token.id).await?;
        if flow.state.login_redeemed() {
            return Err(FlowError::AlreadyUsed);
        }
        Ok(flow)
    }

    /// The login request behind a challenge.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if the challenge is unknown or invalid
    /// - [`FlowError::AlreadyUsed`] if its verifier was redeemed
    pub async fn get_login_request(&self, challenge: &str) -> Result<LoginRequest> {
        self.login_flow(challenge).await.map(|flow| flow.login)
    }

    /// Accept a login request.
    ///
    /// # Errors
    ///
    /// - [`FlowError::InvalidRequest`] for an empty subject, a negative or
    ///   out of range `remember_for`, or a subject that differs from the
    ///   remembered session's when the login was skipped
    /// - [`FlowError::NotFound`] / [`FlowError::AlreadyUsed`] as for
    ///   [`get_login_request`](Self::get_login_request)
    pub async fn accept_login_request(
        &self,
        challenge: &str,
        accept: AcceptLoginRequest,
    ) -> Result<RedirectTo> {
        if accept.subject.is_empty() {
            return Err(FlowError::invalid_request("Field 'subject' must not be empty."));
        }
        validate_remember_for(accept.remember_for, self.env.clock.now())?;

        let flow = self.login_flow(challenge).await?;
        let (remember, authenticated_at) = if flow.login.skip {
            if accept.subject != flow.login.subject {
                return Err(FlowError::invalid_request(
                    "Field 'subject' does not match subject from previous authentication.",
                ));
            }
            // Skipped logins are always remembered.
            (true, flow.login.authenticated_at)
        } else {
            (accept.remember, Some(self.env.clock.now()))
        };

        self.handle_login(
            flow,
            HandledLoginRequest {
                subject: accept.subject,
                remember,
                remember_for: accept.remember_for,
                acr: accept.acr,
                amr: accept.amr,
                context: accept.context,
                force_subject_identifier: accept.force_subject_identifier,
                identity_provider_session_id: accept.identity_provider_session_id,
                authenticated_at,
                error: None,
            },
        )
        .await
    }

    /// Reject a login request.
    ///
    /// # Errors
    ///
    /// [`FlowError::NotFound`] / [`FlowError::AlreadyUsed`] as for
    /// [`get_login_request`](Self::get_login_request).
    pub async fn reject_login_request(
        &self,
        challenge: &str,
        denied: RequestDeniedError,
    ) -> Result<RedirectTo> {
        let flow = self.login_flow(challenge).await?;
        self.handle_login(
            flow,
            HandledLoginRequest {
                error: Some(denied.normalized()),
                ..HandledLoginRequest::default()
            },
        )
        .await
    }

    async fn handle_login(&self, mut flow: Flow, handled: HandledLoginRequest) -> Result<RedirectTo> {
        flow.handle_login_request(handled)?;
        self.env.store.handle_login_request(&flow).await?;

        let verifier = flow.to_token(&self.cipher, Purpose::LoginVerifier)?;
        redirect_with_verifier(&flow.login.request_url, params::LOGIN_VERIFIER, &verifier)
    }

    // ═══════════════════════════════════════════════════════════
    // Consent
    // ═══════════════════════════════════════════════════════════

    /// Stored flow behind a consent challenge.
    async fn consent_flow(&self, challenge: &str) -> Result<Flow> {
        let token = Flow::from_token(&self.cipher, challenge, Purpose::ConsentChallenge)
            .map_err(|_| FlowError::NotFound)?;
        let consent_challenge = token.consent_challenge().ok_or(FlowError::NotFound)?;
        let flow = self.env.store.get_consent_request(consent_challenge).await?;
        if flow.state == FlowState::ConsentUsed {
            return Err(FlowError::AlreadyUsed);
        }
        Ok(flow)
    }

    /// The consent request behind a challenge.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if the challenge is unknown or invalid
    /// - [`FlowError::AlreadyUsed`] if its verifier was redeemed
    pub async fn get_consent_request(&self, challenge: &str) -> Result<ConsentRequest> {
        let flow = self.consent_flow(challenge).await?;
        let login = flow.handled_login()?.clone();
        let skip = flow.consent.as_ref().is_some_and(|stage| stage.skip);

        Ok(ConsentRequest {
            challenge: challenge.to_string(),
            skip,
            subject: login.subject,
            client: flow.login.client,
            requested_scope: flow.login.requested_scope,
            requested_audience: flow.login.requested_audience,
            request_url: flow.login.request_url,
            oidc_context: flow.login.oidc_context,
            login_challenge: flow.id,
            login_session_id: flow.login.session_id,
            acr: login.acr,
            amr: login.amr,
            context: login.context,
        })
    }

    /// Accept a consent request.
    ///
    /// # Errors
    ///
    /// - [`FlowError::InvalidRequest`] for a negative or out of range `remember_for`
    /// - [`FlowError::NotFound`] / [`FlowError::AlreadyUsed`] as for
    ///   [`get_consent_request`](Self::get_consent_request)
    pub async fn accept_consent_request(
        &self,
        challenge: &str,
        accept: AcceptConsentRequest,
    ) -> Result<RedirectTo> {
        validate_remember_for(accept.remember_for, self.env.clock.now())?;
        let flow = self.consent_flow(challenge).await?;
        self.handle_consent(
            flow,
            HandledConsentRequest {
                granted_scope: accept.grant_scope,
                granted_audience: accept.grant_access_token_audience,
                session: accept.session,
                remember: accept.remember,
                remember_for: accept.remember_for,
                handled_at: Some(self.env.clock.now()),
                error: None,
            },
        )
        .await
    }

    /// Reject a consent request.
    ///
    /// # Errors
    ///
    /// [`FlowError::NotFound`] / [`FlowError::AlreadyUsed`] as for
    /// [`get_consent_request`](Self::get_consent_request).
    pub async fn reject_consent_request(
        &self,
        challenge: &str,
        denied: RequestDeniedError,
    ) -> Result<RedirectTo> {
        let flow = self.consent_flow(challenge).await?;
        self.handle_consent(
            flow,
            HandledConsentRequest {
                handled_at: Some(self.env.clock.now()),
                error: Some(denied.normalized()),
                ..HandledConsentRequest::default()
            },
        )
        .await
    }

    async fn handle_consent(
        &self,
        mut flow: Flow,
        handled: HandledConsentRequest,
    ) -> Result<RedirectTo> {
        flow.handle_consent_request(handled)?;
        self.env.store.handle_consent_request(&flow).await?;

        let verifier = flow.to_token(&self.cipher, Purpose::ConsentVerifier)?;
        redirect_with_verifier(&flow.login.request_url, params::CONSENT_VERIFIER, &verifier)
    }

    // ═══════════════════════════════════════════════════════════
    // Logout
    // ═══════════════════════════════════════════════════════════

    /// The logout request behind a challenge.
    ///
    /// # Errors
    ///
    /// - [`FlowError::NotFound`] if the challenge is unknown
    /// - [`FlowError::AlreadyUsed`] if the logout completed
    pub async fn get_logout_request(&self, challenge: &str) -> Result<LogoutRequest> {
        let request = self.env.store.get_logout_request(challenge).await?;
        if request.used {
            return Err(FlowError::AlreadyUsed);
        }
        Ok(request)
    }

    /// Accept a logout request.
    ///
    /// Returns the end-session URL carrying the `logout_verifier`.
    ///
    /// # Errors
    ///
    /// As for [`get_logout_request`](Self::get_logout_request).
    pub async fn accept_logout_request(&self, challenge: &str) -> Result<RedirectTo> {
        let request = self.env.store.accept_logout_request(challenge).await?;
        let redirect_to = with_query(
            &self.config.end_session_url(),
            &[(params::LOGOUT_VERIFIER, &request.verifier)],
        );
        Ok(RedirectTo {
            redirect_to: redirect_to.to_string(),
        })
    }

    /// Reject a logout request. The session stays untouched.
    ///
    /// # Errors
    ///
    /// [`FlowError::NotFound`] if the challenge is unknown.
    pub async fn reject_logout_request(&self, challenge: &str) -> Result<()> {
        self.env.store.reject_logout_request(challenge).await?;
        tracing::debug!("Logout request rejected by the logout UI");
        Ok(())
    }
}
