//! The login and consent flow record and its state machine.
//!
//! A [`Flow`] carries everything about one authorization attempt from the
//! first redirect to the login UI until consent is granted. It travels inside
//! encrypted flow tokens and is mirrored in the [`FlowStore`] so that
//! challenges and verifiers can be redeemed exactly once.
//!
//! ```text
//! LoginInitialized ─▶ LoginUnused ─▶ LoginUsed ─▶ ConsentInitialized ─▶ ConsentUnused ─▶ ConsentUsed
//!         └────────▶ LoginError ──────┘                      └────────▶ ConsentError ──────┘
//! ```
//!
//! [`FlowStore`]: crate::providers::FlowStore

use crate::client::Client;
use crate::codec::{FlowCipher, Purpose};
use crate::error::{FlowError, RequestDeniedError, Result};
use crate::utils::{checked_after, random_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a [`Flow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// The login request was created and the user agent sent to the login UI.
    LoginInitialized,
    /// The login UI accepted the request; the verifier was not redeemed yet.
    LoginUnused,
    /// The login verifier was redeemed.
    LoginUsed,
    /// The login UI rejected the request.
    LoginError,
    /// The consent request was created and the user agent sent to the consent UI.
    ConsentInitialized,
    /// The consent UI accepted the request; the verifier was not redeemed yet.
    ConsentUnused,
    /// The consent verifier was redeemed.
    ConsentUsed,
    /// The consent UI rejected the request.
    ConsentError,
}

impl FlowState {
    /// Whether the login UI may still accept or reject the request.
    #[must_use]
    pub const fn login_handleable(self) -> bool {
        matches!(self, Self::LoginInitialized | Self::LoginUnused | Self::LoginError)
    }

    /// Whether the consent UI may still accept or reject the request.
    #[must_use]
    pub const fn consent_handleable(self) -> bool {
        matches!(
            self,
            Self::ConsentInitialized | Self::ConsentUnused | Self::ConsentError
        )
    }

    /// Whether the login verifier has been redeemed.
    #[must_use]
    pub const fn login_redeemed(self) -> bool {
        matches!(
            self,
            Self::LoginUsed
                | Self::ConsentInitialized
                | Self::ConsentUnused
                | Self::ConsentUsed
                | Self::ConsentError
        )
    }
}

/// OpenID Connect parameters of the authorization request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConnectContext {
    /// Requested authentication context class references.
    #[serde(default)]
    pub acr_values: Vec<String>,

    /// Preferred UI locales.
    #[serde(default)]
    pub ui_locales: Vec<String>,

    /// Requested display mode.
    #[serde(default)]
    pub display: String,

    /// Claims of the `id_token_hint`, if one was sent.
    #[serde(default)]
    pub id_token_hint_claims: Option<Map<String, Value>>,

    /// Login hint.
    #[serde(default)]
    pub login_hint: String,
}

/// The login stage as presented to the login UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Client that started the flow.
    pub client: Client,

    /// Requested scope.
    pub requested_scope: Vec<String>,

    /// Requested access token audience.
    pub requested_audience: Vec<String>,

    /// Whether an authenticated session exists and the UI should not prompt.
    pub skip: bool,

    /// Subject of the existing session when `skip` is set.
    pub subject: String,

    /// OpenID Connect parameters.
    pub oidc_context: OpenIdConnectContext,

    /// Original authorization request URL.
    pub request_url: String,

    /// Authentication session id.
    pub session_id: String,

    /// CSRF value bound to the login CSRF cookie.
    pub csrf: String,

    /// When the login request was created.
    pub requested_at: DateTime<Utc>,

    /// When the existing session authenticated, if `skip` is set.
    pub authenticated_at: Option<DateTime<Utc>>,
}

/// Outcome of the login UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandledLoginRequest {
    /// Authenticated subject.
    #[serde(default)]
    pub subject: String,

    /// Remember the authentication in the browser.
    #[serde(default)]
    pub remember: bool,

    /// How long to remember, in seconds. `0` means for the browser session.
    #[serde(default)]
    pub remember_for: i64,

    /// Authentication context class reference.
    #[serde(default)]
    pub acr: String,

    /// Authentication methods references.
    #[serde(default)]
    pub amr: Vec<String>,

    /// Opaque context handed through to the consent UI.
    #[serde(default)]
    pub context: Value,

    /// Obfuscated subject to use instead of the computed one (pairwise only).
    #[serde(default)]
    pub force_subject_identifier: String,

    /// Session id at the upstream identity provider.
    #[serde(default)]
    pub identity_provider_session_id: String,

    /// When the user authenticated.
    #[serde(default)]
    pub authenticated_at: Option<DateTime<Utc>>,

    /// Set when the login UI rejected the request.
    #[serde(default)]
    pub error: Option<RequestDeniedError>,
}

/// The consent stage as stored on the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStage {
    /// Consent challenge id.
    pub challenge: String,

    /// Whether a remembered grant covers the request and the UI should not prompt.
    pub skip: bool,

    /// CSRF value bound to the consent CSRF cookie.
    pub csrf: String,

    /// When the consent request was created.
    pub requested_at: DateTime<Utc>,
}

/// Session data the consent UI attaches to issued tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentSessionData {
    /// Extra access token claims.
    #[serde(default)]
    pub access_token: Map<String, Value>,

    /// Extra ID token claims.
    #[serde(default)]
    pub id_token: Map<String, Value>,
}

/// Outcome of the consent UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandledConsentRequest {
    /// Granted scope.
    #[serde(default)]
    pub granted_scope: Vec<String>,

    /// Granted access token audience.
    #[serde(default)]
    pub granted_audience: Vec<String>,

    /// Token session data.
    #[serde(default)]
    pub session: ConsentSessionData,

    /// Remember the grant.
    #[serde(default)]
    pub remember: bool,

    /// How long to remember, in seconds. `0` means forever.
    #[serde(default)]
    pub remember_for: i64,

    /// When the consent UI handled the request.
    #[serde(default)]
    pub handled_at: Option<DateTime<Utc>>,

    /// Set when the consent UI rejected the request.
    #[serde(default)]
    pub error: Option<RequestDeniedError>,
}

impl HandledConsentRequest {
    /// Whether a remembered grant is still valid at `now`.
    #[must_use]
    pub fn remembered_at(&self, now: DateTime<Utc>) -> bool {
        if !self.remember || self.error.is_some() {
            return false;
        }
        if self.remember_for <= 0 {
            return true;
        }
        // A lifetime past the end of the calendar never runs out.
        self.handled_at.is_some_and(|at| {
            checked_after(at, self.remember_for).is_none_or(|until| until > now)
        })
    }

    /// Whether every requested scope was granted.
    #[must_use]
    pub fn covers(&self, requested_scope: &[String]) -> bool {
        requested_scope
            .iter()
            .all(|scope| self.granted_scope.iter().any(|granted| granted == scope))
    }
}

/// One authorization attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Flow id, also the login challenge id.
    pub id: String,

    /// Lifecycle state.
    pub state: FlowState,

    /// Login stage.
    pub login: LoginRequest,

    /// Login UI outcome.
    #[serde(default)]
    pub handled_login: Option<HandledLoginRequest>,

    /// Consent stage.
    #[serde(default)]
    pub consent: Option<ConsentStage>,

    /// Consent UI outcome.
    #[serde(default)]
    pub handled_consent: Option<HandledConsentRequest>,
}

impl Flow {
    /// Start a flow for a login request.
    #[must_use]
    pub fn new(login: LoginRequest) -> Self {
        Self {
            id: random_id(),
            state: FlowState::LoginInitialized,
            login,
            handled_login: None,
            consent: None,
            handled_consent: None,
        }
    }

    /// Record the login UI outcome.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Conflict`] if the login verifier was already
    /// redeemed.
    pub fn handle_login_request(&mut self, handled: HandledLoginRequest) -> Result<()> {
        if !self.state.login_handleable() {
            return Err(FlowError::Conflict(
                "The login request was already used and can no longer be changed".to_string(),
            ));
        }

        self.state = if handled.error.is_some() {
            FlowState::LoginError
        } else {
            FlowState::LoginUnused
        };
        self.handled_login = Some(handled);
        Ok(())
    }

    /// Redeem the login verifier.
    ///
    /// # Errors
    ///
    /// - [`FlowError::AlreadyUsed`] if it was redeemed before
    /// - [`FlowError::NotFound`] if the login UI never handled the request
    pub fn invalidate_login_request(&mut self) -> Result<()> {
        match self.state {
            FlowState::LoginUnused | FlowState::LoginError => {
                self.state = FlowState::LoginUsed;
                Ok(())
            }
            FlowState::LoginInitialized => Err(FlowError::NotFound),
            _ => Err(FlowError::AlreadyUsed),
        }
    }

    /// Create the consent stage.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ServerError`] unless the login verifier was
    /// redeemed and no consent stage exists yet.
    pub fn begin_consent(&mut self, skip: bool, now: DateTime<Utc>) -> Result<&ConsentStage> {
        if self.state != FlowState::LoginUsed || self.consent.is_some() {
            return Err(FlowError::server_error(format!(
                "consent stage requested for flow in state {:?}",
                self.state
            )));
        }

        self.state = FlowState::ConsentInitialized;
        Ok(self.consent.insert(ConsentStage {
            challenge: random_id(),
            skip,
            csrf: random_id(),
            requested_at: now,
        }))
    }

    /// Record the consent UI outcome.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Conflict`] if there is no consent stage or its
    /// verifier was already redeemed.
    pub fn handle_consent_request(&mut self, handled: HandledConsentRequest) -> Result<()> {
        if self.consent.is_none() || !self.state.consent_handleable() {
            return Err(FlowError::Conflict(
                "The consent request was already used and can no longer be changed".to_string(),
            ));
        }

        self.state = if handled.error.is_some() {
            FlowState::ConsentError
        } else {
            FlowState::ConsentUnused
        };
        self.handled_consent = Some(handled);
        Ok(())
    }

    /// Redeem the consent verifier.
    ///
    /// # Errors
    ///
    /// - [`FlowError::AlreadyUsed`] if it was redeemed before
    /// - [`FlowError::NotFound`] if the consent UI never handled the request
    pub fn invalidate_consent_request(&mut self) -> Result<()> {
        match self.state {
            FlowState::ConsentUnused | FlowState::ConsentError => {
                self.state = FlowState::ConsentUsed;
                Ok(())
            }
            FlowState::ConsentUsed => Err(FlowError::AlreadyUsed),
            _ => Err(FlowError::NotFound),
        }
    }

    /// The login UI outcome.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ServerError`] if the login was never handled.
    pub fn handled_login(&self) -> Result<&HandledLoginRequest> {
        self.handled_login
            .as_ref()
            .ok_or_else(|| FlowError::server_error(format!("flow {} has no handled login", self.id)))
    }

    /// The consent challenge id, if the consent stage exists.
    #[must_use]
    pub fn consent_challenge(&self) -> Option<&str> {
        self.consent.as_ref().map(|stage| stage.challenge.as_str())
    }

    /// Client id of the flow.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.login.client.client_id
    }

    /// Whether the login request is older than `max_age` at `now`.
    #[must_use]
    pub fn login_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.login.requested_at + max_age < now
    }

    /// Whether the consent request is older than `max_age` at `now`.
    #[must_use]
    pub fn consent_expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        self.consent
            .as_ref()
            .is_none_or(|stage| stage.requested_at + max_age < now)
    }

    /// Seal the flow into a token for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ServerError`] if sealing fails.
    pub fn to_token(&self, cipher: &FlowCipher, purpose: Purpose) -> Result<String> {
        cipher.encode(self, purpose)
    }

    /// Open a flow token sealed for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidToken`] if the token does not open.
    pub fn from_token(cipher: &FlowCipher, token: &str, purpose: Purpose) -> Result<Self> {
        cipher.decode(token, purpose)
    }
}
