//! Authentication controller.

use super::DefaultStrategy;
use crate::client::Client;
use crate::codec::Purpose;
use crate::constants::params;
use crate::csrf::CsrfGuard;
use crate::error::{FlowError, Result};
use crate::flow::{Flow, LoginRequest, OpenIdConnectContext};
use crate::metrics::FlowMetric;
use crate::providers::{
    Claims, ClientRepository, Clock, FlowStore, IdTokenStrategy, IdentityProviderSessions,
};
use crate::request::AuthorizeRequest;
use crate::state::{ForcedObfuscatedLoginSession, LoginSession};
use crate::utils::{checked_after, random_id, with_query};
use cookie::CookieJar;

const LOGIN_VERIFIER_INVALID: &str =
    "The login verifier has already been used, has not been granted, or is invalid.";
const LOGIN_VERIFIER_USED: &str = "The login verifier has already been used.";

/// Space separated parameter to list.
fn split_space(value: &str) -> Vec<String> {
    value.split_whitespace().map(ToString::to_string).collect()
}

/// The `sub` claim of an ID token hint.
pub(super) fn subject_claim(claims: &Claims) -> Result<String> {
    claims
        .get("sub")
        .and_then(serde_json::Value::as_str)
        .filter(|sub| !sub.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| FlowError::invalid_request("The id_token_hint is missing the sub claim."))
}

impl<S, C, J, K, I> DefaultStrategy<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    /// The browser's remembered login session, if any.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn authentication_session(&self, jar: &CookieJar) -> Result<Option<LoginSession>> {
        let Some(session_id) = self.auth_cookie.session_id(jar) else {
            return Ok(None);
        };

        match self.env.store.get_remembered_login_session(&session_id).await {
            Ok(session) => Ok(Some(session)),
            Err(FlowError::NotFound) => {
                tracing::debug!(
                    session_id = %session_id,
                    "Authentication cookie references an unknown or forgotten session"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Decide whether the user must authenticate and send them to the login UI.
    ///
    /// Always ends in a redirect to the login UI; `skip` tells the UI whether
    /// an authenticated session already covers the request.
    ///
    /// # Errors
    ///
    /// - `login_required` for `prompt=none` without a usable session
    /// - `login_required` when the `id_token_hint` subject differs from the session
    /// - `invalid_request` for a malformed `max_age` or `id_token_hint`
    pub async fn request_authentication(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
    ) -> Result<String> {
        let hint_claims = if request.params.id_token_hint.is_empty() {
            None
        } else {
            Some(self.env.jwt.decode_id_token_hint(&request.params.id_token_hint)?)
        };

        if request.has_prompt("login") {
            return self
                .forward_authentication_request(jar, request, None, hint_claims)
                .await;
        }

        let Some(session) = self.authentication_session(jar).await? else {
            return self
                .forward_authentication_request(jar, request, None, hint_claims)
                .await;
        };

        if let Some(max_age) = request.max_age()?.filter(|age| *age > 0) {
            let exceeded = checked_after(session.authenticated_at, max_age)
                .is_some_and(|deadline| deadline < self.env.clock.now());
            if exceeded {
                if request.has_prompt("none") {
                    return Err(FlowError::LoginRequired {
                        hint: "Request failed because prompt is set to \"none\" and the authentication time exceeds max_age.".to_string(),
                    });
                }
                return self
                    .forward_authentication_request(jar, request, None, hint_claims)
                    .await;
            }
        }

        if let Some(claims) = &hint_claims {
            let hint_subject = subject_claim(claims)?;
            self.matches_value_from_session(&request.client, &hint_subject, &session.subject)
                .await?;
        }

        self.forward_authentication_request(jar, request, Some(&session), hint_claims)
            .await
    }

    /// Check that the subject of an `id_token_hint` is the session subject.
    ///
    /// The hint may carry the subject as the client saw it: the real subject,
    /// the obfuscated one, or one pinned by the login UI.
    async fn matches_value_from_session(
        &self,
        client: &Client,
        hint_subject: &str,
        session_subject: &str,
    ) -> Result<()> {
        if hint_subject == session_subject {
            return Ok(());
        }

        if self.obfuscator.obfuscate(client, session_subject, "")? == hint_subject {
            return Ok(());
        }

        match self
            .env
            .store
            .get_forced_obfuscated_login_session(&client.client_id, hint_subject)
            .await
        {
            Ok(forced) if forced.subject == session_subject => return Ok(()),
            Ok(_) | Err(FlowError::NotFound) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(
            client_id = %client.client_id,
            "id_token_hint subject does not match the authenticated session"
        );
        Err(FlowError::HintSubjectMismatch)
    }

    async fn forward_authentication_request(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
        session: Option<&LoginSession>,
        hint_claims: Option<Claims>,
    ) -> Result<String> {
        let skip = session.is_some();
        if !skip && request.has_prompt("none") {
            return Err(FlowError::LoginRequired {
                hint: "Prompt \"none\" was requested, but no existing login session was found."
                    .to_string(),
            });
        }

        let params = &request.params;
        let flow = Flow::new(LoginRequest {
            client: request.client.clone(),
            requested_scope: request.requested_scope.clone(),
            requested_audience: request.requested_audience.clone(),
            skip,
            subject: session.map(|s| s.subject.clone()).unwrap_or_default(),
            oidc_context: OpenIdConnectContext {
                acr_values: split_space(&params.acr_values),
                ui_locales: split_space(&params.ui_locales),
                display: params.display.clone(),
                id_token_hint_claims: hint_claims,
                login_hint: params.login_hint.clone(),
            },
            request_url: request.request_url.clone(),
            session_id: session.map_or_else(random_id, |s| s.id.clone()),
            csrf: random_id(),
            requested_at: self.env.clock.now(),
            authenticated_at: session.map(|s| s.authenticated_at),
        });

        self.env.store.create_login_request(&flow).await?;
        let challenge = flow.to_token(&self.cipher, Purpose::LoginChallenge)?;

        let cookie_name = CsrfGuard::cookie_name(&self.config.cookies.login_csrf_name, &request.client);
        self.csrf.issue(
            jar,
            &cookie_name,
            &flow.login.csrf,
            self.config.consent_request_max_age,
        );

        self.env.metrics.increment(FlowMetric::LoginForwarded);
        if skip {
            self.env.metrics.increment(FlowMetric::LoginSkipped);
        }
        tracing::debug!(
            client_id = %request.client.client_id,
            flow_id = %flow.id,
            skip,
            "Forwarding authentication request to the login UI"
        );

        Ok(with_query(&self.config.login_url, &[(params::LOGIN_CHALLENGE, &challenge)]).to_string())
    }

    /// Redeem a login verifier.
    ///
    /// On success the flow is in `LoginUsed`, the login session is stored and
    /// the authentication cookie reflects the user's remember choice.
    ///
    /// # Errors
    ///
    /// - `access_denied` for an invalid or already redeemed verifier
    /// - the login UI's denial if it rejected the request
    /// - `request_unauthorized` if the request is too old
    /// - `request_forbidden` if the CSRF cookie does not match
    /// - `server_error` if a skipped login was altered
    pub async fn verify_authentication(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
        verifier: &str,
    ) -> Result<Flow> {
        self.verify_authentication_inner(jar, request, verifier)
            .await
            .inspect(|flow| {
                self.env.metrics.increment(FlowMetric::LoginVerified);
                tracing::debug!(flow_id = %flow.id, "Login verifier redeemed");
            })
            .inspect_err(|e| {
                self.env.metrics.increment(FlowMetric::LoginRejected);
                tracing::info!(
                    client_id = %request.client.client_id,
                    error = %e.error_code(),
                    "Login verification failed"
                );
            })
    }

    async fn verify_authentication_inner(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
        verifier: &str,
    ) -> Result<Flow> {
        let mut flow = Flow::from_token(&self.cipher, verifier, Purpose::LoginVerifier)
            .map_err(|_| FlowError::access_denied(LOGIN_VERIFIER_INVALID))?;
        if flow.client_id() != request.client.client_id {
            return Err(FlowError::access_denied(LOGIN_VERIFIER_INVALID));
        }

        match self.env.store.verify_and_invalidate_login_request(&flow.id).await {
            Ok(_) => {}
            Err(FlowError::AlreadyUsed) => {
                return Err(FlowError::access_denied(LOGIN_VERIFIER_USED));
            }
            Err(FlowError::NotFound) => {
                return Err(FlowError::access_denied(LOGIN_VERIFIER_INVALID));
            }
            Err(e) => return Err(e),
        }
        flow.invalidate_login_request()
            .map_err(|_| FlowError::access_denied(LOGIN_VERIFIER_INVALID))?;

        let handled = flow.handled_login()?.clone();
        if let Some(denied) = handled.error {
            return Err(FlowError::Denied(denied.normalized()));
        }

        if flow.login_expired(self.env.clock.now(), self.config.consent_request_max_age) {
            return Err(FlowError::RequestUnauthorized {
                hint: "The login request has expired, please try again.".to_string(),
            });
        }

        let cookie_name = CsrfGuard::cookie_name(&self.config.cookies.login_csrf_name, &request.client);
        self.csrf
            .validate(jar, &cookie_name, &flow.login.csrf)
            .inspect_err(|_| self.env.metrics.increment(FlowMetric::CsrfRejected))?;

        let skip = flow.login.skip;
        if skip && !handled.remember {
            return Err(FlowError::server_error(
                "The login request was previously remembered and can only be forgotten using the reject feature.",
            ));
        }

        if skip && handled.subject != flow.login.subject {
            // The browser's session belongs to someone else now.
            self.revoke_authentication_session(jar).await?;
            return Err(FlowError::server_error(
                "The login request is marked as remember, but the subject from the login confirmation does not match the original subject from the cookie.",
            ));
        }

        let authenticated_at = handled
            .authenticated_at
            .ok_or_else(|| FlowError::server_error("The authenticatedAt value was not set."))?;

        // Only the check matters here; consent derives the identifier again.
        let _checked_identifier = self.obfuscator.obfuscate(
            &request.client,
            &handled.subject,
            &handled.force_subject_identifier,
        )?;

        if !handled.force_subject_identifier.is_empty() {
            self.env
                .store
                .create_forced_obfuscated_login_session(&ForcedObfuscatedLoginSession {
                    client_id: request.client.client_id.clone(),
                    subject: handled.subject.clone(),
                    subject_obfuscated: handled.force_subject_identifier.clone(),
                })
                .await?;
        }

        if skip {
            return Ok(flow);
        }

        let session = LoginSession {
            id: flow.login.session_id.clone(),
            subject: handled.subject.clone(),
            authenticated_at,
            remember: handled.remember,
            identity_provider_session_id: handled.identity_provider_session_id.clone(),
        };
        match self.env.store.confirm_login_session(&session).await {
            Ok(()) => {}
            Err(FlowError::NotFound) => self.env.store.create_login_session(&session).await?,
            Err(e) => return Err(e),
        }

        if handled.remember {
            self.auth_cookie
                .set(jar, &session.id, handled.remember_for);
        } else {
            // Not remembered: forget whatever session this browser had before.
            self.revoke_authentication_session(jar).await?;
        }

        Ok(flow)
    }

    /// Clear the authentication cookie and delete the session it referenced.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails. A missing session is not an error.
    pub async fn revoke_authentication_session(&self, jar: &mut CookieJar) -> Result<()> {
        let Some(session_id) = self.auth_cookie.revoke(jar) else {
            return Ok(());
        };

        match self.env.store.delete_login_session(&session_id).await {
            Ok(_) | Err(FlowError::NotFound) => {
                tracing::debug!(session_id = %session_id, "Authentication session revoked");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
