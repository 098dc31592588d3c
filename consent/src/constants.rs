//! Flow constants.
//!
//! Cookie names, redirect query parameters and protocol identifiers shared by
//! the controllers.

/// Default cookie names.
pub mod cookies {
    /// Cookie holding the authentication session id.
    pub const AUTHENTICATION_SESSION: &str = "oauth2_authentication_session";

    /// Base name of the login CSRF cookie.
    pub const LOGIN_CSRF: &str = "oauth2_authentication_csrf";

    /// Base name of the consent CSRF cookie.
    pub const CONSENT_CSRF: &str = "oauth2_consent_csrf";

    /// Suffix of the duplicate cookie written for user agents that mishandle
    /// `SameSite=None`.
    pub const LEGACY_SUFFIX: &str = "_legacy";
}

/// Query parameter names on redirects.
pub mod params {
    /// Login challenge handed to the login UI.
    pub const LOGIN_CHALLENGE: &str = "login_challenge";

    /// Login verifier returned by the login UI.
    pub const LOGIN_VERIFIER: &str = "login_verifier";

    /// Consent challenge handed to the consent UI.
    pub const CONSENT_CHALLENGE: &str = "consent_challenge";

    /// Consent verifier returned by the consent UI.
    pub const CONSENT_VERIFIER: &str = "consent_verifier";

    /// Verifier returned by a device verification UI.
    pub const DEVICE_VERIFIER: &str = "device_verifier";

    /// Logout challenge handed to the logout UI.
    pub const LOGOUT_CHALLENGE: &str = "logout_challenge";

    /// Logout verifier returned by the logout UI.
    pub const LOGOUT_VERIFIER: &str = "logout_verifier";

    /// Issuer appended to front-channel logout URLs.
    pub const ISSUER: &str = "iss";

    /// Session id appended to front-channel logout URLs.
    pub const SESSION_ID: &str = "sid";

    /// Opaque client state echoed on the post-logout redirect.
    pub const STATE: &str = "state";

    /// Form field carrying the back-channel logout token.
    pub const LOGOUT_TOKEN: &str = "logout_token";
}

/// Event type identifying a back-channel logout token.
pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// Default path of the end-session endpoint, relative to the issuer.
pub const END_SESSION_PATH: &str = "/oauth2/sessions/logout";

/// Upper bound on the decompressed size of a flow token.
pub const MAX_FLOW_TOKEN_SIZE: u64 = 1024 * 1024;
