//! Sessions, logout requests and controller results.

use crate::client::Client;
use crate::flow::ConsentSessionData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authenticated browser session.
///
/// Created on the first successful login in a browser, re-confirmed on every
/// later non-skipped login and deleted on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    /// Session id, the value of the authentication cookie.
    pub id: String,

    /// Authenticated subject.
    pub subject: String,

    /// When the subject last authenticated.
    pub authenticated_at: DateTime<Utc>,

    /// Whether the session survives the browser session.
    pub remember: bool,

    /// Session id at the upstream identity provider.
    #[serde(default)]
    pub identity_provider_session_id: String,
}

/// A pending or completed logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Logout challenge handed to the logout UI.
    pub challenge: String,

    /// Logout verifier returned by the logout UI.
    pub verifier: String,

    /// Subject being logged out.
    pub subject: String,

    /// Authentication session being terminated.
    pub session_id: String,

    /// Original end-session request URL.
    pub request_url: String,

    /// Whether a relying party started the logout with an `id_token_hint`.
    pub rp_initiated: bool,

    /// Client that started the logout, if RP-initiated.
    #[serde(default)]
    pub client: Option<Client>,

    /// Where to send the user agent when the logout completes.
    pub post_logout_redirect_uri: String,

    /// The logout UI accepted the request.
    #[serde(default)]
    pub accepted: bool,

    /// The logout UI rejected the request.
    #[serde(default)]
    pub rejected: bool,

    /// The verifier was redeemed.
    #[serde(default)]
    pub used: bool,
}

/// Pinned obfuscated subject for a (client, subject) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedObfuscatedLoginSession {
    /// Client id.
    pub client_id: String,

    /// Real subject.
    pub subject: String,

    /// Obfuscated subject the client sees.
    pub subject_obfuscated: String,
}

/// Result of a controller step.
///
/// `Redirect` is the protocol abort: the caller must send the user agent to
/// the given URL and stop processing the current request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The flow finished this step.
    Continue(T),
    /// Send the user agent here.
    Redirect(String),
}

impl<T> Outcome<T> {
    /// Redirect target, if this is a redirect.
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Self::Redirect(url) => Some(url),
            Self::Continue(_) => None,
        }
    }

    /// The completed value, if any.
    #[must_use]
    pub fn into_continue(self) -> Option<T> {
        match self {
            Self::Continue(value) => Some(value),
            Self::Redirect(_) => None,
        }
    }
}

/// Everything token issuance needs once consent was verified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentResult {
    /// Flow id.
    pub flow_id: String,

    /// Client id.
    pub client_id: String,

    /// Real subject.
    pub subject: String,

    /// Subject as the client sees it.
    pub subject_identifier: String,

    /// Granted scope.
    pub granted_scope: Vec<String>,

    /// Granted access token audience.
    pub granted_audience: Vec<String>,

    /// Token session data.
    pub session: ConsentSessionData,

    /// Authentication context class reference.
    pub acr: String,

    /// Authentication methods references.
    pub amr: Vec<String>,

    /// Opaque login context.
    pub context: Value,

    /// Authentication session id.
    pub login_session_id: String,

    /// When the subject authenticated.
    pub authenticated_at: DateTime<Utc>,

    /// When the authorization request was made.
    pub requested_at: DateTime<Utc>,
}

/// Result of a completed logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutResult {
    /// Where to send the user agent.
    pub redirect_to: String,

    /// Front-channel logout URLs to render as iframes before redirecting.
    pub front_channel_logout_urls: Vec<String>,
}

/// Redirect returned by the UI request API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTo {
    /// Where the UI must send the user agent.
    pub redirect_to: String,
}
