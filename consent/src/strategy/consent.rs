//! Consent controller.

use super::DefaultStrategy;
use crate::codec::Purpose;
use crate::config::GrantTieBreak;
use crate::constants::params;
use crate::csrf::CsrfGuard;
use crate::error::{FlowError, Result};
use crate::flow::Flow;
use crate::metrics::FlowMetric;
use crate::providers::{
    ClientRepository, Clock, FlowStore, IdTokenStrategy, IdentityProviderSessions,
};
use crate::request::AuthorizeRequest;
use crate::state::ConsentResult;
use crate::utils::{is_localhost, with_query};
use cookie::CookieJar;

const CONSENT_VERIFIER_INVALID: &str =
    "The consent verifier has already been used, has not been granted, or is invalid.";
const CONSENT_VERIFIER_USED: &str = "The consent verifier has already been used.";

impl<S, C, J, K, I> DefaultStrategy<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    /// Start the consent stage of a flow whose login was just verified.
    ///
    /// Looks for a remembered grant covering the requested scope; if one
    /// exists the consent UI is told to skip the prompt.
    ///
    /// # Errors
    ///
    /// - `consent_required` for `prompt=none` without a remembered grant
    /// - storage errors
    pub async fn request_consent(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
        flow: Flow,
    ) -> Result<String> {
        if request.has_prompt("consent") {
            return self.forward_consent_request(jar, request, flow, None).await;
        }

        // A public client on an untrusted redirect may be impersonated, so
        // remembered grants do not apply.
        let redirect = &request.redirect_uri;
        if request.client.public
            && redirect.scheme() != "https"
            && !(redirect.scheme() == "http" && is_localhost(redirect))
        {
            tracing::debug!(
                client_id = %request.client.client_id,
                "Public client with untrusted redirect URI, ignoring remembered consent"
            );
            return self.forward_consent_request(jar, request, flow, None).await;
        }

        let subject = flow.handled_login()?.subject.clone();
        let previous = match self
            .env
            .store
            .find_granted_and_remembered_consent_requests(&request.client.client_id, &subject)
            .await
        {
            Ok(previous) => previous,
            Err(FlowError::NotFound) => Vec::new(),
            Err(e) => return Err(e),
        };

        let now = self.env.clock.now();
        let candidates = previous.iter().filter(|candidate| {
            candidate.handled_consent.as_ref().is_some_and(|grant| {
                grant.remembered_at(now) && grant.covers(&request.requested_scope)
            })
        });

        let chosen = match self.config.grant_tie_break {
            GrantTieBreak::MostRecent => candidates.max_by_key(|candidate| {
                candidate
                    .handled_consent
                    .as_ref()
                    .and_then(|grant| grant.handled_at)
            }),
            GrantTieBreak::Lexicographic => {
                candidates.min_by(|a, b| a.consent_challenge().cmp(&b.consent_challenge()))
            }
        };

        self.forward_consent_request(jar, request, flow, chosen).await
    }

    async fn forward_consent_request(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
        mut flow: Flow,
        previous: Option<&Flow>,
    ) -> Result<String> {
        let skip = previous.is_some();
        if !skip && request.has_prompt("none") {
            return Err(FlowError::ConsentRequired {
                hint: "Prompt \"none\" was requested, but no previous consent was found."
                    .to_string(),
            });
        }

        let csrf = flow.begin_consent(skip, self.env.clock.now())?.csrf.clone();
        self.env.store.create_consent_request(&flow).await?;
        let challenge = flow.to_token(&self.cipher, Purpose::ConsentChallenge)?;

        let cookie_name =
            CsrfGuard::cookie_name(&self.config.cookies.consent_csrf_name, &request.client);
        self.csrf
            .issue(jar, &cookie_name, &csrf, self.config.consent_request_max_age);

        self.env.metrics.increment(FlowMetric::ConsentForwarded);
        if skip {
            self.env.metrics.increment(FlowMetric::ConsentSkipped);
        }
        tracing::debug!(
            client_id = %request.client.client_id,
            flow_id = %flow.id,
            skip,
            "Forwarding consent request to the consent UI"
        );

        Ok(with_query(
            &self.config.consent_url,
            &[(params::CONSENT_CHALLENGE, &challenge)],
        )
        .to_string())
    }

    /// Redeem a consent verifier and assemble the token issuance input.
    ///
    /// # Errors
    ///
    /// - `access_denied` for an invalid or already redeemed verifier
    /// - the consent UI's denial if it rejected the request
    /// - `request_unauthorized` if the consent request is too old
    /// - `request_forbidden` if the CSRF cookie does not match
    pub async fn verify_consent(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
        verifier: &str,
    ) -> Result<ConsentResult> {
        self.verify_consent_inner(jar, request, verifier)
            .await
            .inspect(|result| {
                self.env.metrics.increment(FlowMetric::ConsentVerified);
                tracing::debug!(flow_id = %result.flow_id, "Consent verifier redeemed");
            })
            .inspect_err(|e| {
                self.env.metrics.increment(FlowMetric::ConsentRejected);
                tracing::info!(
                    client_id = %request.client.client_id,
                    error = %e.error_code(),
                    "Consent verification failed"
                );
            })
    }

    async fn verify_consent_inner(
        &self,
        jar: &CookieJar,
        request: &AuthorizeRequest,
        verifier: &str,
    ) -> Result<ConsentResult> {
        let mut flow = Flow::from_token(&self.cipher, verifier, Purpose::ConsentVerifier)
            .map_err(|_| FlowError::access_denied(CONSENT_VERIFIER_INVALID))?;
        if flow.client_id() != request.client.client_id {
            return Err(FlowError::access_denied(CONSENT_VERIFIER_INVALID));
        }
        let challenge = flow
            .consent_challenge()
            .ok_or_else(|| FlowError::access_denied(CONSENT_VERIFIER_INVALID))?
            .to_string();

        match self
            .env
            .store
            .verify_and_invalidate_consent_request(&challenge)
            .await
        {
            Ok(_) => {}
            Err(FlowError::AlreadyUsed) => {
                return Err(FlowError::access_denied(CONSENT_VERIFIER_USED));
            }
            Err(FlowError::NotFound) => {
                return Err(FlowError::access_denied(CONSENT_VERIFIER_INVALID));
            }
            Err(e) => return Err(e),
        }
        flow.invalidate_consent_request()
            .map_err(|_| FlowError::access_denied(CONSENT_VERIFIER_INVALID))?;

        let granted = flow
            .handled_consent
            .clone()
            .ok_or_else(|| FlowError::access_denied(CONSENT_VERIFIER_INVALID))?;
        if let Some(denied) = granted.error {
            return Err(FlowError::Denied(denied.normalized()));
        }

        if flow.consent_expired(self.env.clock.now(), self.config.consent_request_max_age) {
            return Err(FlowError::RequestUnauthorized {
                hint: "The consent request has expired, please try again.".to_string(),
            });
        }

        let cookie_name =
            CsrfGuard::cookie_name(&self.config.cookies.consent_csrf_name, &request.client);
        let csrf = flow.consent.as_ref().map(|stage| stage.csrf.as_str()).unwrap_or_default();
        self.csrf
            .validate(jar, &cookie_name, csrf)
            .inspect_err(|_| self.env.metrics.increment(FlowMetric::CsrfRejected))?;

        let login = flow.handled_login()?;
        let authenticated_at = login
            .authenticated_at
            .ok_or_else(|| FlowError::server_error("The authenticatedAt value was not set."))?;

        let subject_identifier = self.obfuscator.obfuscate(
            &request.client,
            &login.subject,
            &login.force_subject_identifier,
        )?;

        Ok(ConsentResult {
            flow_id: flow.id.clone(),
            client_id: request.client.client_id.clone(),
            subject: login.subject.clone(),
            subject_identifier,
            granted_scope: granted.granted_scope,
            granted_audience: granted.granted_audience,
            session: granted.session,
            acr: login.acr.clone(),
            amr: login.amr.clone(),
            context: login.context.clone(),
            login_session_id: flow.login.session_id.clone(),
            authenticated_at,
            requested_at: flow.login.requested_at,
        })
    }
}
