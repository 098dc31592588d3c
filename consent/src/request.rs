//! Inbound request parameters.
//!
//! The HTTP layer parses the authorization or end-session request, resolves
//! the client and hands the result to the controllers in these types.

use crate::client::Client;
use crate::error::{FlowError, Result};
use serde::Deserialize;
use url::Url;

/// Query parameters of an authorization request the flow engine reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthorizeParams {
    /// Space separated prompt values.
    pub prompt: String,
    /// Maximum authentication age in seconds.
    pub max_age: Option<String>,
    /// Previously issued ID token.
    pub id_token_hint: String,
    /// Space separated ACR values.
    pub acr_values: String,
    /// Space separated UI locales.
    pub ui_locales: String,
    /// Display mode.
    pub display: String,
    /// Login hint.
    pub login_hint: String,
    /// Verifier returned by the login UI.
    pub login_verifier: String,
    /// Verifier returned by the consent UI.
    pub consent_verifier: String,
    /// Verifier returned by a device verification UI.
    pub device_verifier: String,
}

impl AuthorizeParams {
    /// Parse from a raw query string. Unknown parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidRequest`] if the query is malformed.
    pub fn from_query(query: &str) -> Result<Self> {
        serde_urlencoded::from_str(query)
            .map_err(|e| FlowError::invalid_request(format!("Unable to parse query: {e}")))
    }
}

/// Authorization request as seen by the controllers.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Resolved client.
    pub client: Client,
    /// Requested scope.
    pub requested_scope: Vec<String>,
    /// Requested access token audience.
    pub requested_audience: Vec<String>,
    /// Validated redirect URI.
    pub redirect_uri: Url,
    /// Full authorization request URL, without verifiers.
    pub request_url: String,
    /// Flow parameters.
    pub params: AuthorizeParams,
}

impl AuthorizeRequest {
    /// Create a request without flow parameters.
    #[must_use]
    pub fn new(client: Client, redirect_uri: Url, request_url: impl Into<String>) -> Self {
        Self {
            client,
            requested_scope: Vec::new(),
            requested_audience: Vec::new(),
            redirect_uri,
            request_url: request_url.into(),
            params: AuthorizeParams::default(),
        }
    }

    /// Set the requested scope.
    #[must_use]
    pub fn with_scope<I, T>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.requested_scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Set the requested audience.
    #[must_use]
    pub fn with_audience<I, T>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.requested_audience = audience.into_iter().map(Into::into).collect();
        self
    }

    /// Set the flow parameters.
    #[must_use]
    pub fn with_params(mut self, params: AuthorizeParams) -> Self {
        self.params = params;
        self
    }

    /// Whether `prompt` contains `value`.
    #[must_use]
    pub fn has_prompt(&self, value: &str) -> bool {
        self.params.prompt.split_whitespace().any(|p| p == value)
    }

    /// Parsed `max_age`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidRequest`] if `max_age` is not an integer.
    pub fn max_age(&self) -> Result<Option<i64>> {
        match self.params.max_age.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                FlowError::invalid_request(format!(
                    "Unable to parse max_age \"{raw}\" as an integer"
                ))
            }),
        }
    }
}

/// Query parameters of an end-session request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogoutParams {
    /// Previously issued ID token.
    pub id_token_hint: String,
    /// Opaque client state echoed on the post-logout redirect.
    pub state: String,
    /// Where the client wants the user agent sent afterwards.
    pub post_logout_redirect_uri: String,
    /// Verifier returned by the logout UI.
    pub logout_verifier: String,
}

impl LogoutParams {
    /// Parse from a raw query string. Unknown parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidRequest`] if the query is malformed.
    pub fn from_query(query: &str) -> Result<Self> {
        serde_urlencoded::from_str(query)
            .map_err(|e| FlowError::invalid_request(format!("Unable to parse query: {e}")))
    }
}
