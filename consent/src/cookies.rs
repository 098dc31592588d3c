//! The authentication session cookie.

use crate::config::CookieConfig;
use cookie::{Cookie, CookieJar};

/// Reads and writes the cookie that remembers an authenticated browser.
///
/// The cookie value is the login session id. It is HttpOnly and follows the
/// configured `Secure`, `SameSite`, path and domain settings.
#[derive(Debug, Clone)]
pub struct AuthenticationCookie {
    config: CookieConfig,
}

impl AuthenticationCookie {
    /// Create a handle for the configured cookie.
    #[must_use]
    pub const fn new(config: CookieConfig) -> Self {
        Self { config }
    }

    /// Session id carried by the request, if any.
    #[must_use]
    pub fn session_id(&self, jar: &CookieJar) -> Option<String> {
        jar.get(&self.config.authentication_name)
            .map(Cookie::value)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    }

    /// Remember `session_id` in the browser.
    ///
    /// `remember_for` is in seconds; `0` makes it a browser-session cookie.
    pub fn set(&self, jar: &mut CookieJar, session_id: &str, remember_for: i64) {
        let mut builder = self.base(session_id.to_string());
        if remember_for > 0 {
            builder = builder.max_age(cookie::time::Duration::seconds(remember_for));
        }
        jar.add(builder);
    }

    /// Clear the cookie, returning the session id it held.
    pub fn revoke(&self, jar: &mut CookieJar) -> Option<String> {
        let session_id = self.session_id(jar);
        jar.remove(self.base(String::new()));
        session_id
    }

    fn base(&self, value: String) -> cookie::CookieBuilder<'static> {
        let mut builder = Cookie::build((self.config.authentication_name.clone(), value))
            .http_only(true)
            .secure(self.config.secure)
            .same_site(self.config.same_site.to_cookie())
            .path(self.config.path.clone());
        if let Some(domain) = &self.config.domain {
            builder = builder.domain(domain.clone());
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::cookies::AUTHENTICATION_SESSION;

    fn auth_cookie() -> AuthenticationCookie {
        AuthenticationCookie::new(CookieConfig::default())
    }

    #[test]
    fn test_set_and_read() {
        let handle = auth_cookie();
        let mut jar = CookieJar::new();
        assert_eq!(handle.session_id(&jar), None);

        handle.set(&mut jar, "sid-1", 3600);
        assert_eq!(handle.session_id(&jar).as_deref(), Some("sid-1"));

        let written = jar.get(AUTHENTICATION_SESSION).unwrap();
        assert_eq!(written.http_only(), Some(true));
        assert_eq!(written.max_age(), Some(cookie::time::Duration::hours(1)));
    }

    #[test]
    fn test_browser_session_cookie_has_no_max_age() {
        let handle = auth_cookie();
        let mut jar = CookieJar::new();
        handle.set(&mut jar, "sid-1", 0);
        assert_eq!(jar.get(AUTHENTICATION_SESSION).unwrap().max_age(), None);
    }

    #[test]
    fn test_revoke_emits_removal() {
        let handle = auth_cookie();
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(AUTHENTICATION_SESSION, "sid-1"));

        assert_eq!(handle.revoke(&mut jar).as_deref(), Some("sid-1"));
        assert_eq!(handle.session_id(&jar), None);
        assert!(jar.delta().any(|c| c.name() == AUTHENTICATION_SESSION));
        assert_eq!(handle.revoke(&mut jar), None);
    }
}
