//! Flow engine configuration.
//!
//! Values are provided by the application. Only cookie settings have a
//! meaningful default; the issuer and UI locations must always be supplied.

use crate::constants;
use crate::error::{FlowError, Result};
use chrono::Duration;
use url::Url;

/// `SameSite` attribute applied to flow cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSiteMode {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=None`
    None,
}

impl SameSiteMode {
    /// Convert to the `cookie` crate representation.
    #[must_use]
    pub const fn to_cookie(self) -> cookie::SameSite {
        match self {
            Self::Strict => cookie::SameSite::Strict,
            Self::Lax => cookie::SameSite::Lax,
            Self::None => cookie::SameSite::None,
        }
    }
}

/// How to pick among several remembered grants that all cover a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GrantTieBreak {
    /// The grant handled most recently wins.
    #[default]
    MostRecent,
    /// The grant with the lexicographically smallest consent challenge id wins.
    Lexicographic,
}

/// Cookie settings.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Mark cookies `Secure`.
    ///
    /// Default: true
    pub secure: bool,

    /// `SameSite` attribute.
    ///
    /// Default: `Lax`
    pub same_site: SameSiteMode,

    /// Write and accept a `_legacy` twin cookie without `SameSite` when the
    /// mode is `None`.
    ///
    /// Default: false
    pub same_site_legacy_workaround: bool,

    /// Name of the authentication session cookie.
    pub authentication_name: String,

    /// Base name of the login CSRF cookie.
    pub login_csrf_name: String,

    /// Base name of the consent CSRF cookie.
    pub consent_csrf_name: String,

    /// Cookie path.
    ///
    /// Default: `/`
    pub path: String,

    /// Cookie domain, host-only when unset.
    pub domain: Option<String>,
}

impl CookieConfig {
    /// Set the `Secure` flag.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `SameSite` mode.
    #[must_use]
    pub const fn with_same_site(mut self, same_site: SameSiteMode) -> Self {
        self.same_site = same_site;
        self
    }

    /// Enable or disable the legacy `SameSite=None` workaround.
    #[must_use]
    pub const fn with_legacy_workaround(mut self, enabled: bool) -> Self {
        self.same_site_legacy_workaround = enabled;
        self
    }

    /// Set the cookie domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the cookie path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Whether the `_legacy` twin cookie is written and honored.
    #[must_use]
    pub const fn uses_legacy_cookie(&self) -> bool {
        self.same_site_legacy_workaround && matches!(self.same_site, SameSiteMode::None)
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSiteMode::Lax,
            same_site_legacy_workaround: false,
            authentication_name: constants::cookies::AUTHENTICATION_SESSION.to_string(),
            login_csrf_name: constants::cookies::LOGIN_CSRF.to_string(),
            consent_csrf_name: constants::cookies::CONSENT_CSRF.to_string(),
            path: "/".to_string(),
            domain: None,
        }
    }
}

/// Flow engine configuration.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Issuer identifier, used as `iss` in logout tokens and front-channel URLs.
    pub issuer: Url,

    /// Login UI.
    pub login_url: Url,

    /// Consent UI.
    pub consent_url: Url,

    /// Logout UI.
    pub logout_url: Url,

    /// Where to send the user agent after a logout without a client-supplied
    /// redirect.
    pub post_logout_redirect_url: Url,

    /// Path of the end-session endpoint, relative to the issuer.
    ///
    /// Default: `/oauth2/sessions/logout`
    pub end_session_path: String,

    /// Maximum age of a login or consent request when its verifier is redeemed.
    /// Also the lifetime of the CSRF cookies.
    ///
    /// Default: 30 minutes
    pub consent_request_max_age: Duration,

    /// Cookie settings.
    pub cookies: CookieConfig,

    /// Remembered-grant selection rule.
    ///
    /// Default: [`GrantTieBreak::MostRecent`]
    pub grant_tie_break: GrantTieBreak,

    /// Salt for pairwise subject identifiers.
    pub pairwise_salt: String,

    /// Timeout of one back-channel logout delivery.
    ///
    /// Default: 5 seconds
    pub backchannel_timeout: std::time::Duration,
}

impl FlowConfig {
    /// Create a configuration.
    ///
    /// The post-logout redirect defaults to the issuer.
    ///
    /// # Arguments
    ///
    /// * `issuer` - Issuer URL (e.g., "https://auth.example.com/")
    /// * `login_url` - Login UI
    /// * `consent_url` - Consent UI
    /// * `logout_url` - Logout UI
    #[must_use]
    pub fn new(issuer: Url, login_url: Url, consent_url: Url, logout_url: Url) -> Self {
        Self {
            post_logout_redirect_url: issuer.clone(),
            issuer,
            login_url,
            consent_url,
            logout_url,
            end_session_path: constants::END_SESSION_PATH.to_string(),
            consent_request_max_age: Duration::minutes(30),
            cookies: CookieConfig::default(),
            grant_tie_break: GrantTieBreak::default(),
            pairwise_salt: String::new(),
            backchannel_timeout: std::time::Duration::from_secs(5),
        }
    }

    /// Set the default post-logout redirect.
    #[must_use]
    pub fn with_post_logout_redirect_url(mut self, url: Url) -> Self {
        self.post_logout_redirect_url = url;
        self
    }

    /// Set the maximum request age.
    #[must_use]
    pub const fn with_consent_request_max_age(mut self, max_age: Duration) -> Self {
        self.consent_request_max_age = max_age;
        self
    }

    /// Set cookie settings.
    #[must_use]
    pub fn with_cookies(mut self, cookies: CookieConfig) -> Self {
        self.cookies = cookies;
        self
    }

    /// Set the remembered-grant tie-break rule.
    #[must_use]
    pub const fn with_grant_tie_break(mut self, tie_break: GrantTieBreak) -> Self {
        self.grant_tie_break = tie_break;
        self
    }

    /// Set the pairwise subject salt.
    #[must_use]
    pub fn with_pairwise_salt(mut self, salt: impl Into<String>) -> Self {
        self.pairwise_salt = salt.into();
        self
    }

    /// Set the back-channel delivery timeout.
    #[must_use]
    pub const fn with_backchannel_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.backchannel_timeout = timeout;
        self
    }

    /// Issuer as it appears in tokens and query parameters.
    #[must_use]
    pub fn issuer_id(&self) -> &str {
        self.issuer.as_str()
    }

    /// Absolute URL of the end-session endpoint.
    #[must_use]
    pub fn end_session_url(&self) -> Url {
        crate::utils::append_path(&self.issuer, &self.end_session_path)
    }

    /// Check the configuration for values that would make every flow fail.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if the request age is not positive
    /// or a cookie name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.consent_request_max_age <= Duration::zero() {
            return Err(FlowError::Configuration(
                "consent_request_max_age must be positive".to_string(),
            ));
        }

        let names = [
            &self.cookies.authentication_name,
            &self.cookies.login_csrf_name,
            &self.cookies.consent_csrf_name,
        ];
        if names.iter().any(|name| name.is_empty()) {
            return Err(FlowError::Configuration(
                "cookie names must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FlowConfig {
        FlowConfig::new(
            Url::parse("https://auth.example.com/").unwrap(),
            Url::parse("https://ui.example.com/login").unwrap(),
            Url::parse("https://ui.example.com/consent").unwrap(),
            Url::parse("https://ui.example.com/logout").unwrap(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.consent_request_max_age, Duration::minutes(30));
        assert_eq!(config.grant_tie_break, GrantTieBreak::MostRecent);
        assert_eq!(config.backchannel_timeout, std::time::Duration::from_secs(5));
        assert_eq!(config.post_logout_redirect_url, config.issuer);
        assert!(config.cookies.secure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = config()
            .with_consent_request_max_age(Duration::minutes(5))
            .with_grant_tie_break(GrantTieBreak::Lexicographic)
            .with_pairwise_salt("salt")
            .with_cookies(CookieConfig::default().with_secure(false).with_domain("example.com"));

        assert_eq!(config.consent_request_max_age, Duration::minutes(5));
        assert_eq!(config.grant_tie_break, GrantTieBreak::Lexicographic);
        assert_eq!(config.pairwise_salt, "salt");
        assert!(!config.cookies.secure);
        assert_eq!(config.cookies.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_end_session_url() {
        assert_eq!(
            config().end_session_url().as_str(),
            "https://auth.example.com/oauth2/sessions/logout"
        );
    }

    #[test]
    fn test_legacy_cookie_requires_same_site_none() {
        let cookies = CookieConfig::default().with_legacy_workaround(true);
        assert!(!cookies.uses_legacy_cookie());
        assert!(cookies.with_same_site(SameSiteMode::None).uses_legacy_cookie());
    }

    #[test]
    fn test_validate_rejects_non_positive_age() {
        let config = config().with_consent_request_max_age(Duration::zero());
        assert!(matches!(config.validate(), Err(FlowError::Configuration(_))));
    }
}
