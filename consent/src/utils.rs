//! URL and identifier helpers.

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use url::Url;

/// Generate a random identifier (128 bits, lowercase hex).
///
/// Used for challenge ids, session ids and CSRF values.
#[must_use]
pub fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Generate a 256-bit random value, base64url encoded.
#[must_use]
pub fn random_secret() -> String {
    use base64::Engine;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Append a path to a base URL, joining with exactly one slash.
///
/// # Examples
///
/// ```
/// use composable_rust_consent::utils::append_path;
/// use url::Url;
///
/// let base = Url::parse("https://auth.example.com/tenant/").unwrap();
/// assert_eq!(
///     append_path(&base, "/oauth2/sessions/logout").as_str(),
///     "https://auth.example.com/tenant/oauth2/sessions/logout"
/// );
/// ```
#[must_use]
pub fn append_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

/// Return `url` with the given query parameters set, replacing existing
/// parameters of the same name. Without parameters the URL is returned as is.
///
/// # Examples
///
/// ```
/// use composable_rust_consent::utils::with_query;
/// use url::Url;
///
/// let url = Url::parse("https://ui.example.com/login?lang=en").unwrap();
/// assert_eq!(
///     with_query(&url, &[("login_challenge", "abc")]).as_str(),
///     "https://ui.example.com/login?lang=en&login_challenge=abc"
/// );
/// ```
#[must_use]
pub fn with_query(url: &Url, params: &[(&str, &str)]) -> Url {
    let mut url = url.clone();
    if params.is_empty() {
        return url;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(name, _)| name == key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    url
}

/// Parse `raw` and set the given query parameters.
///
/// Returns `None` if `raw` is not an absolute URL.
#[must_use]
pub fn parse_with_query(raw: &str, params: &[(&str, &str)]) -> Option<Url> {
    Url::parse(raw).ok().map(|url| with_query(&url, params))
}

/// Whether the URL points at the local machine.
///
/// # Examples
///
/// ```
/// use composable_rust_consent::utils::is_localhost;
/// use url::Url;
///
/// assert!(is_localhost(&Url::parse("http://localhost:8080/cb").unwrap()));
/// assert!(is_localhost(&Url::parse("http://127.0.0.1/cb").unwrap()));
/// assert!(!is_localhost(&Url::parse("http://app.example.com/cb").unwrap()));
/// ```
#[must_use]
pub fn is_localhost(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => {
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Host of a URL including a non-default port, as used for sector identifiers.
#[must_use]
pub fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// `start` plus `seconds`, or `None` if that is not a representable instant.
///
/// Durations from requests and UIs go through here so that huge values read
/// as "never" instead of overflowing.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use composable_rust_consent::utils::checked_after;
///
/// let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
/// assert_eq!(
///     checked_after(start, 60),
///     Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap())
/// );
/// assert_eq!(checked_after(start, i64::MAX), None);
/// ```
#[must_use]
pub fn checked_after(start: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(seconds).and_then(|delta| start.checked_add_signed(delta))
}

/// Read a single query parameter from a URL string.
#[must_use]
pub fn query_param(raw: &str, name: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_unique() {
        let a = random_id();
        let b = random_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(random_secret(), random_secret());
    }

    #[test]
    fn test_with_query_replaces_existing_value() {
        let url = Url::parse("https://rp.example.com/cb?state=old&x=1").unwrap();
        let url = with_query(&url, &[("state", "new")]);
        assert_eq!(url.as_str(), "https://rp.example.com/cb?x=1&state=new");
    }

    #[test]
    fn test_with_query_without_params_keeps_url() {
        let url = Url::parse("https://rp.example.com/bye").unwrap();
        assert_eq!(with_query(&url, &[]).as_str(), "https://rp.example.com/bye");

        let url = Url::parse("https://rp.example.com/bye?lang=en").unwrap();
        assert_eq!(
            with_query(&url, &[]).as_str(),
            "https://rp.example.com/bye?lang=en"
        );
    }

    #[test]
    fn test_checked_after_overflow() {
        let start = Utc::now();
        assert_eq!(checked_after(start, 0), Some(start));
        assert_eq!(checked_after(start, i64::MAX), None);
        assert_eq!(checked_after(start, i64::MIN), None);
        assert!(checked_after(start, 400 * 24 * 3600).is_some());
    }

    #[test]
    fn test_append_path_root() {
        let base = Url::parse("https://auth.example.com").unwrap();
        assert_eq!(
            append_path(&base, "oauth2/sessions/logout").as_str(),
            "https://auth.example.com/oauth2/sessions/logout"
        );
    }

    #[test]
    fn test_host_with_port() {
        let url = Url::parse("https://rp.example.com:8443/cb").unwrap();
        assert_eq!(host_with_port(&url).as_deref(), Some("rp.example.com:8443"));

        let url = Url::parse("https://rp.example.com:443/cb").unwrap();
        assert_eq!(host_with_port(&url).as_deref(), Some("rp.example.com"));
    }

    #[test]
    fn test_query_param() {
        let raw = "https://ui.example.com/login?login_challenge=abc%3D";
        assert_eq!(query_param(raw, "login_challenge").as_deref(), Some("abc="));
        assert_eq!(query_param(raw, "missing"), None);
        assert_eq!(query_param("not a url", "x"), None);
    }
}
