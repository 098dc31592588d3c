//! Logout orchestrator.
//!
//! Logout is OP-initiated when the end-session request carries no
//! `id_token_hint` (the authentication cookie identifies the session) and
//! RP-initiated otherwise (the hint's `sid` identifies it). Both paths confirm
//! with the logout UI before anything is revoked.

use super::backchannel::LogoutDelivery;
use super::login::subject_claim;
use super::DefaultStrategy;
use crate::client::Client;
use crate::constants::{params, BACKCHANNEL_LOGOUT_EVENT};
use crate::error::{FlowError, Result};
use crate::metrics::FlowMetric;
use crate::providers::{
    Claims, ClientRepository, Clock, FlowStore, IdTokenStrategy, IdentityProviderSessions,
};
use crate::request::LogoutParams;
use crate::state::{LoginSession, LogoutRequest, LogoutResult, Outcome};
use crate::utils::{parse_with_query, random_secret, with_query};
use chrono::{DateTime, Utc};
use cookie::CookieJar;
use serde_json::{json, Value};

const LOGOUT_VERIFIER_INVALID: &str =
    "The logout verifier has already been used, has not been granted, or is invalid.";
const LOGOUT_VERIFIER_USED: &str = "The logout verifier has already been used.";

/// `aud` may be a single string or an array.
fn audiences(claims: &Claims) -> Vec<String> {
    match claims.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn string_claim<'a>(claims: &'a Claims, name: &str) -> &'a str {
    claims.get(name).and_then(Value::as_str).unwrap_or_default()
}

impl<S, C, J, K, I> DefaultStrategy<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    /// Start a logout and return where to send the user agent.
    ///
    /// That is the logout UI with a `logout_challenge`, or the post-logout
    /// redirect when there is no session left to end.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for RP parameters without an `id_token_hint`,
    /// an unacceptable hint, or a post-logout redirect URI the client did not
    /// register.
    pub async fn issue_logout(
        &self,
        jar: &CookieJar,
        params: &LogoutParams,
        request_url: &str,
    ) -> Result<String> {
        if params.id_token_hint.is_empty() {
            return self.issue_op_initiated_logout(jar, params, request_url).await;
        }

        let claims = self.env.jwt.decode_id_token_hint(&params.id_token_hint)?;
        let client = self.validate_logout_hint(&claims).await?;
        let sid = string_claim(&claims, "sid");

        let mut redirect = self.config.post_logout_redirect_url.to_string();
        if !params.post_logout_redirect_uri.is_empty() {
            if !client.allows_post_logout_redirect(&params.post_logout_redirect_uri) {
                return Err(FlowError::invalid_request(
                    "Logout failed because query parameter post_logout_redirect_uri is not whitelisted as a post_logout_redirect_uri for the client.",
                ));
            }
            let mut query = Vec::new();
            if !params.state.is_empty() {
                query.push((params::STATE, params.state.as_str()));
            }
            redirect = parse_with_query(&params.post_logout_redirect_uri, &query)
                .ok_or_else(|| {
                    FlowError::server_error(format!(
                        "Unable to parse post_logout_redirect_uri: {}",
                        params.post_logout_redirect_uri
                    ))
                })?
                .to_string();
        }

        let session = match self.env.store.get_remembered_login_session(sid).await {
            Ok(session) => session,
            Err(FlowError::NotFound) => {
                tracing::debug!(
                    client_id = %client.client_id,
                    session_id = %sid,
                    "Session from id_token_hint is already gone"
                );
                return Ok(redirect);
            }
            Err(e) => return Err(e),
        };

        self.create_logout_request_and_redirect(LogoutRequest {
            challenge: random_secret(),
            verifier: random_secret(),
            subject: session.subject,
            session_id: sid.to_string(),
            request_url: request_url.to_string(),
            rp_initiated: true,
            client: Some(client),
            post_logout_redirect_uri: redirect,
            accepted: false,
            rejected: false,
            used: false,
        })
        .await
    }

    async fn issue_op_initiated_logout(
        &self,
        jar: &CookieJar,
        params: &LogoutParams,
        request_url: &str,
    ) -> Result<String> {
        if !params.state.is_empty() {
            return Err(FlowError::invalid_request(
                "Logout failed because query parameter state is set but id_token_hint is missing.",
            ));
        }
        if !params.post_logout_redirect_uri.is_empty() {
            return Err(FlowError::invalid_request(
                "Logout failed because query parameter post_logout_redirect_uri is set but id_token_hint is missing.",
            ));
        }

        let redirect = self.config.post_logout_redirect_url.to_string();
        let Some(session) = self.authentication_session(jar).await? else {
            // Nobody to log out.
            return Ok(redirect);
        };

        self.create_logout_request_and_redirect(LogoutRequest {
            challenge: random_secret(),
            verifier: random_secret(),
            subject: session.subject,
            session_id: session.id,
            request_url: request_url.to_string(),
            rp_initiated: false,
            client: None,
            post_logout_redirect_uri: redirect,
            accepted: false,
            rejected: false,
            used: false,
        })
        .await
    }

    /// Check issuer, issue time and required claims, and resolve the client
    /// from the audience.
    async fn validate_logout_hint(&self, claims: &Claims) -> Result<Client> {
        let issuer = string_claim(claims, "iss");
        if issuer != self.config.issuer_id() {
            return Err(FlowError::invalid_request(format!(
                "Logout failed because issuer claim value \"{issuer}\" from query parameter id_token_hint does not match with issuer value from configuration \"{}\"",
                self.config.issuer_id()
            )));
        }

        let now = self.env.clock.now().timestamp();
        #[allow(clippy::cast_precision_loss)] // Second precision timestamps
        let issued_in_past = claims
            .get("iat")
            .and_then(Value::as_f64)
            .is_some_and(|iat| iat <= now as f64);
        if !issued_in_past {
            let iat = claims.get("iat").map(ToString::to_string).unwrap_or_default();
            return Err(FlowError::invalid_request(format!(
                "Logout failed because iat claim value \"{iat}\" from query parameter id_token_hint is missing or in the future (now is \"{now}\")."
            )));
        }

        if string_claim(claims, "sid").is_empty() {
            return Err(FlowError::invalid_request(
                "Logout failed because query parameter id_token_hint is missing sid claim.",
            ));
        }
        // The subject may be obfuscated; only its presence matters here.
        subject_claim(claims).map_err(|_| {
            FlowError::invalid_request(
                "Logout failed because query parameter id_token_hint is missing sub claim.",
            )
        })?;

        for audience in audiences(claims) {
            match self.env.clients.get_client(&audience).await {
                Ok(client) => return Ok(client),
                Err(FlowError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }

        Err(FlowError::invalid_request(
            "Logout failed because none of the listed audiences is a registered OAuth 2.0 Client.",
        ))
    }

    async fn create_logout_request_and_redirect(&self, request: LogoutRequest) -> Result<String> {
        self.env.store.create_logout_request(&request).await?;
        self.env.metrics.increment(FlowMetric::LogoutInitiated);
        tracing::info!(
            session_id = %request.session_id,
            rp_initiated = request.rp_initiated,
            "Logout requested"
        );

        Ok(with_query(
            &self.config.logout_url,
            &[(params::LOGOUT_CHALLENGE, &request.challenge)],
        )
        .to_string())
    }

    /// Finish a logout the logout UI accepted.
    ///
    /// Returns [`Outcome::Redirect`] without side effects when the browser's
    /// session changed since an OP-initiated logout was requested.
    ///
    /// # Errors
    ///
    /// Returns `access_denied` for an invalid or already redeemed verifier.
    pub async fn complete_logout(
        &self,
        jar: &mut CookieJar,
        verifier: &str,
    ) -> Result<Outcome<LogoutResult>> {
        let request = match self
            .env
            .store
            .verify_and_invalidate_logout_request(verifier)
            .await
        {
            Ok(request) => request,
            Err(FlowError::AlreadyUsed) => {
                return Err(FlowError::access_denied(LOGOUT_VERIFIER_USED));
            }
            Err(FlowError::NotFound) => {
                return Err(FlowError::access_denied(LOGOUT_VERIFIER_INVALID));
            }
            Err(e) => return Err(e),
        };

        if !request.rp_initiated {
            let current = self.authentication_session(jar).await?;
            if current.is_none_or(|session| session.subject != request.subject) {
                tracing::info!(
                    session_id = %request.session_id,
                    "Authentication session changed since logout was requested, skipping revocation"
                );
                return Ok(Outcome::Redirect(request.post_logout_redirect_uri));
            }
        }

        if self.auth_cookie.revoke(jar).is_none() {
            tracing::debug!(session_id = %request.session_id, "No authentication cookie to clear");
        }

        let session = self.find_login_session(&request.session_id).await?;
        let front_channel_logout_urls = self
            .front_channel_logout_urls(&request.subject, &request.session_id)
            .await?;

        self.execute_back_channel_logout(&request.subject, &request.session_id)
            .await?;

        match self.env.store.delete_login_session(&request.session_id).await {
            Ok(_) | Err(FlowError::NotFound) => {}
            Err(e) => return Err(e),
        }
        if let Some(session) = session {
            self.disable_identity_provider_session(&session).await;
        }

        self.env.metrics.increment(FlowMetric::LogoutCompleted);
        tracing::info!(session_id = %request.session_id, "Logout completed");

        Ok(Outcome::Continue(LogoutResult {
            redirect_to: request.post_logout_redirect_uri,
            front_channel_logout_urls,
        }))
    }

    async fn front_channel_logout_urls(&self, subject: &str, sid: &str) -> Result<Vec<String>> {
        let clients = self
            .env
            .store
            .list_clients_with_front_channel_logout(subject, sid)
            .await?;

        let query = [(params::ISSUER, self.config.issuer_id()), (params::SESSION_ID, sid)];
        Ok(clients
            .iter()
            .filter_map(|client| {
                let uri = client.frontchannel_logout_uri.as_deref()?;
                let url = parse_with_query(uri, &query);
                if url.is_none() {
                    tracing::warn!(
                        client_id = %client.client_id,
                        uri = %uri,
                        "Skipping unparseable front-channel logout URI"
                    );
                }
                url.map(String::from)
            })
            .collect())
    }

    /// Sign and deliver logout tokens to every client in the session that
    /// registered a back-channel logout URI.
    ///
    /// # Errors
    ///
    /// Returns error only if the client listing fails; delivery failures are
    /// logged.
    pub async fn execute_back_channel_logout(&self, subject: &str, sid: &str) -> Result<()> {
        let clients = self
            .env
            .store
            .list_clients_with_back_channel_logout(subject, sid)
            .await?;

        let now = self.env.clock.now();
        let mut deliveries = Vec::with_capacity(clients.len());
        for client in clients {
            let Some(url) = client.backchannel_logout_uri.clone() else {
                continue;
            };
            match self.logout_token(&client.client_id, sid, now) {
                Ok(token) => deliveries.push(LogoutDelivery {
                    client_id: client.client_id,
                    url,
                    token,
                }),
                Err(e) => {
                    self.env.metrics.increment(FlowMetric::BackChannelFailed);
                    tracing::warn!(
                        client_id = %client.client_id,
                        error = %e,
                        "Unable to sign logout token"
                    );
                }
            }
        }

        self.backchannel.deliver(deliveries).await;
        Ok(())
    }

    fn logout_token(&self, client_id: &str, sid: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = json!({
            "iss": self.config.issuer_id(),
            "aud": [client_id],
            "iat": now.timestamp(),
            "jti": uuid::Uuid::new_v4().to_string(),
            "events": { BACKCHANNEL_LOGOUT_EVENT: {} },
            "sid": sid,
        });
        match claims {
            Value::Object(claims) => self.env.jwt.sign(&claims),
            _ => Err(FlowError::server_error("logout token claims are not an object")),
        }
    }

    /// End a session without a logout UI round-trip.
    ///
    /// Notifies back-channel clients while the session still exists, then
    /// deletes it. A session that is already gone counts as logged out.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn logout_session(&self, sid: &str) -> Result<()> {
        let Some(session) = self.find_login_session(sid).await? else {
            tracing::debug!(session_id = %sid, "Session already logged out");
            return Ok(());
        };

        self.execute_back_channel_logout(&session.subject, sid).await?;
        match self.env.store.delete_login_session(sid).await {
            Ok(_) | Err(FlowError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.disable_identity_provider_session(&session).await;

        self.env.metrics.increment(FlowMetric::LogoutCompleted);
        tracing::info!(session_id = %sid, "Session logged out");
        Ok(())
    }

    async fn find_login_session(&self, sid: &str) -> Result<Option<LoginSession>> {
        match self.env.store.get_login_session(sid).await {
            Ok(session) => Ok(Some(session)),
            Err(FlowError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// End the upstream session the login session was created from, if any.
    ///
    /// Failures are logged; the login session is already gone.
    async fn disable_identity_provider_session(&self, session: &LoginSession) {
        if session.identity_provider_session_id.is_empty() {
            return;
        }

        match self
            .env
            .identity
            .disable_session(&session.subject, &session.identity_provider_session_id)
            .await
        {
            Ok(()) => tracing::debug!(
                session_id = %session.id,
                identity_provider_session_id = %session.identity_provider_session_id,
                "Identity provider session disabled"
            ),
            Err(e) => tracing::warn!(
                session_id = %session.id,
                identity_provider_session_id = %session.identity_provider_session_id,
                error = %e,
                "Failed to disable identity provider session"
            ),
        }
    }

    /// Delete every login session of a subject.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::NotFound`] if the subject has no sessions.
    pub async fn revoke_subject_login_sessions(&self, subject: &str) -> Result<()> {
        self.env.store.revoke_subject_login_session(subject).await?;
        tracing::info!(subject = %subject, "Revoked all login sessions of subject");
        Ok(())
    }
}
