//! CSRF binding between a flow and the browser that started it.
//!
//! Each login or consent request stores a random CSRF value inside its flow
//! token and in an HttpOnly cookie named `<base>_<client suffix>`. When the
//! verifier comes back, both must match, which proves the verifier is being
//! redeemed by the same browser.
//!
//! Some user agents drop cookies marked `SameSite=None`. With the legacy
//! workaround enabled (and only when `SameSite=None` is configured) a twin
//! cookie without the attribute is written under `<name>_legacy` and read as a
//! fallback.

use crate::client::Client;
use crate::config::CookieConfig;
use crate::constants::cookies::LEGACY_SUFFIX;
use crate::error::{FlowError, Result};
use constant_time_eq::constant_time_eq;
use cookie::{Cookie, CookieJar};

/// Hint returned for every CSRF failure.
const CSRF_FAILURE_HINT: &str = "The CSRF session cookie could not be validated. Make sure that the browser accepts cookies and that the login and consent UIs are served from the same domain as the authorization server.";

/// Issues and validates CSRF cookies.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    config: CookieConfig,
}

impl CsrfGuard {
    /// Create a guard with the given cookie settings.
    #[must_use]
    pub const fn new(config: CookieConfig) -> Self {
        Self { config }
    }

    /// Cookie name for a client.
    #[must_use]
    pub fn cookie_name(base: &str, client: &Client) -> String {
        format!("{base}_{}", client.cookie_suffix())
    }

    /// Name of the legacy twin of a cookie.
    #[must_use]
    pub fn legacy_name(name: &str) -> String {
        format!("{name}{LEGACY_SUFFIX}")
    }

    /// Write the CSRF cookie (and its legacy twin when enabled).
    pub fn issue(&self, jar: &mut CookieJar, name: &str, value: &str, max_age: chrono::Duration) {
        let max_age = cookie::time::Duration::seconds(max_age.num_seconds());

        let mut primary = Cookie::build((name.to_string(), value.to_string()))
            .http_only(true)
            .secure(self.config.secure)
            .same_site(self.config.same_site.to_cookie())
            .path(self.config.path.clone())
            .max_age(max_age);
        if let Some(domain) = &self.config.domain {
            primary = primary.domain(domain.clone());
        }
        jar.add(primary);

        if self.config.uses_legacy_cookie() {
            let mut legacy = Cookie::build((Self::legacy_name(name), value.to_string()))
                .http_only(true)
                .secure(self.config.secure)
                .path(self.config.path.clone())
                .max_age(max_age);
            if let Some(domain) = &self.config.domain {
                legacy = legacy.domain(domain.clone());
            }
            jar.add(legacy);
        }
    }

    /// Check that the cookie carries `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Forbidden`] if the cookie is missing or its value
    /// differs. The error does not say which.
    pub fn validate(&self, jar: &CookieJar, name: &str, expected: &str) -> Result<()> {
        let Some(actual) = self.read(jar, name) else {
            tracing::debug!(cookie = %name, "CSRF cookie missing");
            return Err(FlowError::forbidden(CSRF_FAILURE_HINT));
        };

        if expected.is_empty() || !constant_time_eq(actual.as_bytes(), expected.as_bytes()) {
            tracing::debug!(cookie = %name, "CSRF cookie value mismatch");
            return Err(FlowError::forbidden(CSRF_FAILURE_HINT));
        }

        Ok(())
    }

    fn read<'a>(&self, jar: &'a CookieJar, name: &str) -> Option<&'a str> {
        if let Some(cookie) = jar.get(name).filter(|c| !c.value().is_empty()) {
            return Some(cookie.value());
        }

        if self.config.uses_legacy_cookie() && !name.ends_with(LEGACY_SUFFIX) {
            return jar
                .get(&Self::legacy_name(name))
                .map(Cookie::value)
                .filter(|value| !value.is_empty());
        }

        None
    }
}
