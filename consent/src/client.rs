//! The view of a registered OAuth 2.0 client the flow engine needs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a client sees subject identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    /// Every client sees the same identifier.
    #[default]
    Public,
    /// Every sector sees a different, stable identifier.
    Pairwise,
}

/// Registered client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client id.
    pub client_id: String,

    /// Subject identifier type.
    #[serde(default)]
    pub subject_type: SubjectType,

    /// Sector identifier URI for pairwise subjects.
    #[serde(default)]
    pub sector_identifier_uri: Option<String>,

    /// Registered redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Registered post-logout redirect URIs.
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    /// Front-channel logout URI.
    #[serde(default)]
    pub frontchannel_logout_uri: Option<String>,

    /// Back-channel logout URI.
    #[serde(default)]
    pub backchannel_logout_uri: Option<String>,

    /// Public clients cannot keep a secret.
    #[serde(default)]
    pub public: bool,
}

impl Client {
    /// Create a confidential client with public subject identifiers.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Add a redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    /// Add a post-logout redirect URI.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uris.push(uri.into());
        self
    }

    /// Use pairwise subject identifiers.
    #[must_use]
    pub fn pairwise(mut self, sector_identifier_uri: Option<String>) -> Self {
        self.subject_type = SubjectType::Pairwise;
        self.sector_identifier_uri = sector_identifier_uri;
        self
    }

    /// Set the front-channel logout URI.
    #[must_use]
    pub fn with_frontchannel_logout_uri(mut self, uri: impl Into<String>) -> Self {
        self.frontchannel_logout_uri = Some(uri.into());
        self
    }

    /// Set the back-channel logout URI.
    #[must_use]
    pub fn with_backchannel_logout_uri(mut self, uri: impl Into<String>) -> Self {
        self.backchannel_logout_uri = Some(uri.into());
        self
    }

    /// Mark the client public.
    #[must_use]
    pub const fn into_public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Suffix appended to CSRF cookie names for this client.
    ///
    /// Keeps concurrent flows of different clients in one browser apart.
    #[must_use]
    pub fn cookie_suffix(&self) -> String {
        let digest = Sha256::digest(self.client_id.as_bytes());
        let hex = format!("{digest:x}");
        hex[..16].to_string()
    }

    /// Whether `uri` is a registered post-logout redirect URI.
    #[must_use]
    pub fn allows_post_logout_redirect(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|registered| registered == uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_suffix_is_stable_and_per_client() {
        let a = Client::new("app-a");
        let b = Client::new("app-b");
        assert_eq!(a.cookie_suffix(), Client::new("app-a").cookie_suffix());
        assert_ne!(a.cookie_suffix(), b.cookie_suffix());
        assert_eq!(a.cookie_suffix().len(), 16);
    }

    #[test]
    fn test_subject_type_serialization() {
        let client = Client::new("app").pairwise(None);
        let json = serde_json::to_string(&client).unwrap();
        assert!(json.contains(r#""subject_type":"pairwise""#));

        let parsed: Client = serde_json::from_str(r#"{"client_id":"x"}"#).unwrap();
        assert_eq!(parsed.subject_type, SubjectType::Public);
    }

    #[test]
    fn test_post_logout_redirect_is_exact_match() {
        let client = Client::new("app").with_post_logout_redirect_uri("https://rp.example.com/bye");
        assert!(client.allows_post_logout_redirect("https://rp.example.com/bye"));
        assert!(!client.allows_post_logout_redirect("https://rp.example.com/bye/"));
    }
}
