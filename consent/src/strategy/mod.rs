//! Login, consent and logout controllers.
//!
//! [`DefaultStrategy`] drives the redirect protocol between the authorization
//! endpoint and the external login, consent and logout UIs:
//!
//! ```text
//! /oauth2/auth ──▶ login UI ──▶ /oauth2/auth?login_verifier ──▶ consent UI ──▶ /oauth2/auth?consent_verifier ──▶ tokens
//! ```
//!
//! Each step either finishes ([`Outcome::Continue`]) or tells the caller where
//! to send the user agent next ([`Outcome::Redirect`]). Cookies are read from
//! and written to the [`CookieJar`] the caller builds from the request and
//! turns into `Set-Cookie` headers afterwards.

use crate::codec::FlowCipher;
use crate::config::FlowConfig;
use crate::constants::params;
use crate::cookies::AuthenticationCookie;
use crate::csrf::CsrfGuard;
use crate::environment::FlowEnvironment;
use crate::error::{FlowError, Result};
use crate::metrics::FlowMetrics;
use crate::obfuscation::SubjectObfuscator;
use crate::providers::{
    ClientRepository, Clock, FlowStore, IdTokenStrategy, IdentityProviderSessions,
};
use crate::request::{AuthorizeRequest, LogoutParams};
use crate::state::{ConsentResult, LogoutResult, Outcome};
use cookie::CookieJar;

pub mod backchannel;
mod consent;
mod login;
mod logout;
mod requests;

pub use backchannel::{BackChannelNotifier, LogoutDelivery};
pub use requests::{AcceptConsentRequest, AcceptLoginRequest, ConsentRequest};

/// The flow controllers.
///
/// Holds no mutable state; every call works on the request's cookies and the
/// injected providers, so one instance serves all requests concurrently.
pub struct DefaultStrategy<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    config: FlowConfig,
    cipher: FlowCipher,
    env: FlowEnvironment<S, C, J, K, I>,
    csrf: CsrfGuard,
    auth_cookie: AuthenticationCookie,
    obfuscator: SubjectObfuscator,
    backchannel: BackChannelNotifier,
}

impl<S, C, J, K, I> DefaultStrategy<S, C, J, K, I>
where
    S: FlowStore + Clone,
    C: ClientRepository + Clone,
    J: IdTokenStrategy + Clone,
    K: Clock + Clone,
    I: IdentityProviderSessions + Clone,
{
    /// Create the controllers.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`](crate::FlowError::Configuration)
    /// if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(
        config: FlowConfig,
        cipher: FlowCipher,
        env: FlowEnvironment<S, C, J, K, I>,
    ) -> Result<Self> {
        config.validate()?;

        let backchannel =
            BackChannelNotifier::new(config.backchannel_timeout, env.metrics.clone())?;

        Ok(Self {
            csrf: CsrfGuard::new(config.cookies.clone()),
            auth_cookie: AuthenticationCookie::new(config.cookies.clone()),
            obfuscator: SubjectObfuscator::new(config.pairwise_salt.clone()),
            backchannel,
            config,
            cipher,
            env,
        })
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Injected providers.
    #[must_use]
    pub const fn env(&self) -> &FlowEnvironment<S, C, J, K, I> {
        &self.env
    }

    /// Flow counters.
    #[must_use]
    pub fn metrics(&self) -> &FlowMetrics {
        &self.env.metrics
    }

    /// Run the authorization request through login and consent.
    ///
    /// Dispatches on the verifier the request carries:
    ///
    /// - `device_verifier`: rejected
    /// - `consent_verifier`: verify consent and finish the flow
    /// - `login_verifier`: verify login, then start consent
    /// - neither: start login
    ///
    /// # Errors
    ///
    /// Returns the OAuth 2.0 error to report to the client.
    pub async fn handle_authorization_request(
        &self,
        jar: &mut CookieJar,
        request: &AuthorizeRequest,
    ) -> Result<Outcome<ConsentResult>> {
        if !request.params.device_verifier.is_empty() {
            tracing::debug!(client_id = %request.client.client_id, "Device verifier rejected");
            return Err(FlowError::invalid_request(format!(
                "The {} parameter is not supported by the authorization endpoint.",
                params::DEVICE_VERIFIER
            )));
        }

        if !request.params.consent_verifier.is_empty() {
            return self
                .verify_consent(jar, request, &request.params.consent_verifier)
                .await
                .map(Outcome::Continue);
        }

        if !request.params.login_verifier.is_empty() {
            let flow = self
                .verify_authentication(jar, request, &request.params.login_verifier)
                .await?;
            return self
                .request_consent(jar, request, flow)
                .await
                .map(Outcome::Redirect);
        }

        self.request_authentication(jar, request)
            .await
            .map(Outcome::Redirect)
    }

    /// Handle a request to the end-session endpoint.
    ///
    /// With a `logout_verifier` the logout completes; otherwise a logout
    /// request is created and the user agent sent to the logout UI.
    ///
    /// # Errors
    ///
    /// Returns the OAuth 2.0 error to report.
    pub async fn handle_logout(
        &self,
        jar: &mut CookieJar,
        params: &LogoutParams,
        request_url: &str,
    ) -> Result<Outcome<LogoutResult>> {
        if !params.logout_verifier.is_empty() {
            return self.complete_logout(jar, &params.logout_verifier).await;
        }

        self.issue_logout(jar, params, request_url)
            .await
            .map(Outcome::Redirect)
    }
}
