//! Subject identifier obfuscation.
//!
//! Clients registered with the `pairwise` subject type never see the real
//! subject. They see `hex(sha256(sector ‖ subject ‖ salt))`, where the sector
//! is the host of the client's sector identifier URI or, failing that, of its
//! only redirect URI. Clients in the same sector see the same identifier;
//! clients in different sectors cannot correlate users.

use crate::client::{Client, SubjectType};
use crate::error::{FlowError, Result};
use crate::utils::host_with_port;
use sha2::{Digest, Sha256};
use url::Url;

/// Computes the subject identifier a client sees.
#[derive(Debug, Clone)]
pub struct SubjectObfuscator {
    salt: String,
}

impl SubjectObfuscator {
    /// Create an obfuscator with the pairwise salt.
    #[must_use]
    pub const fn new(salt: String) -> Self {
        Self { salt }
    }

    /// Subject identifier for `client`.
    ///
    /// A non-empty `forced` identifier replaces the computed pairwise value.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidRequest`] if a pairwise client has no
    /// usable sector identifier.
    pub fn obfuscate(&self, client: &Client, subject: &str, forced: &str) -> Result<String> {
        match client.subject_type {
            SubjectType::Public => Ok(subject.to_string()),
            SubjectType::Pairwise if !forced.is_empty() => Ok(forced.to_string()),
            SubjectType::Pairwise => {
                let sector = sector_identifier(client)?;
                let mut hasher = Sha256::new();
                hasher.update(sector.as_bytes());
                hasher.update(subject.as_bytes());
                hasher.update(self.salt.as_bytes());
                Ok(format!("{:x}", hasher.finalize()))
            }
        }
    }
}

/// Sector identifier of a pairwise client.
///
/// # Errors
///
/// Returns [`FlowError::InvalidRequest`] if neither a sector identifier URI
/// nor exactly one redirect URI is registered, or the URI cannot be parsed.
pub fn sector_identifier(client: &Client) -> Result<String> {
    let raw = match client.sector_identifier_uri.as_deref().filter(|u| !u.is_empty()) {
        Some(uri) => uri,
        None => match client.redirect_uris.as_slice() {
            [only] => only.as_str(),
            [] => {
                return Err(FlowError::invalid_request(format!(
                    "Client \"{}\" uses pairwise subject identifiers but has neither a sector identifier URI nor a redirect URI",
                    client.client_id
                )));
            }
            _ => {
                return Err(FlowError::invalid_request(format!(
                    "Client \"{}\" uses pairwise subject identifiers and registers several redirect URIs, so a sector identifier URI is required",
                    client.client_id
                )));
            }
        },
    };

    let url = Url::parse(raw).map_err(|e| {
        FlowError::invalid_request(format!(
            "Unable to parse sector identifier of client \"{}\": {e}",
            client.client_id
        ))
    })?;

    host_with_port(&url).ok_or_else(|| {
        FlowError::invalid_request(format!(
            "Sector identifier of client \"{}\" has no host",
            client.client_id
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obfuscator() -> SubjectObfuscator {
        SubjectObfuscator::new("salt".to_string())
    }

    #[test]
    fn test_public_is_identity() {
        let client = Client::new("app").with_redirect_uri("https://rp.example.com/cb");
        assert_eq!(obfuscator().obfuscate(&client, "alice", "").unwrap(), "alice");
        assert_eq!(
            obfuscator().obfuscate(&client, "alice", "forced").unwrap(),
            "alice"
        );
    }

    #[test]
    fn test_pairwise_is_deterministic_per_sector() {
        let a = Client::new("a")
            .with_redirect_uri("https://rp.example.com/cb")
            .pairwise(None);
        let b = Client::new("b")
            .with_redirect_uri("https://rp.example.com/other")
            .pairwise(None);
        let c = Client::new("c")
            .with_redirect_uri("https://other.example.com/cb")
            .pairwise(None);

        let alice_a = obfuscator().obfuscate(&a, "alice", "").unwrap();
        assert_eq!(alice_a, obfuscator().obfuscate(&a, "alice", "").unwrap());
        assert_eq!(alice_a, obfuscator().obfuscate(&b, "alice", "").unwrap());
        assert_ne!(alice_a, obfuscator().obfuscate(&c, "alice", "").unwrap());
        assert_ne!(alice_a, obfuscator().obfuscate(&a, "bob", "").unwrap());
        assert_eq!(alice_a.len(), 64);
    }

    #[test]
    fn test_pairwise_matches_reference_hash() {
        let client = Client::new("a")
            .with_redirect_uri("https://rp.example.com/cb")
            .pairwise(None);
        let expected = format!(
            "{:x}",
            Sha256::digest(b"rp.example.comalicesalt")
        );
        assert_eq!(obfuscator().obfuscate(&client, "alice", "").unwrap(), expected);
    }

    #[test]
    fn test_salt_changes_identifier() {
        let client = Client::new("a")
            .with_redirect_uri("https://rp.example.com/cb")
            .pairwise(None);
        let other = SubjectObfuscator::new("pepper".to_string());
        assert_ne!(
            obfuscator().obfuscate(&client, "alice", "").unwrap(),
            other.obfuscate(&client, "alice", "").unwrap()
        );
    }

    #[test]
    fn test_sector_identifier_uri_takes_precedence() {
        let client = Client::new("a")
            .with_redirect_uri("https://one.example.com/cb")
            .with_redirect_uri("https://two.example.com/cb")
            .pairwise(Some("https://sector.example.com/uris.json".to_string()));
        assert_eq!(sector_identifier(&client).unwrap(), "sector.example.com");
    }

    #[test]
    fn test_pairwise_errors() {
        let none = Client::new("a").pairwise(None);
        assert!(matches!(
            obfuscator().obfuscate(&none, "alice", ""),
            Err(FlowError::InvalidRequest { .. })
        ));

        let many = Client::new("b")
            .with_redirect_uri("https://one.example.com/cb")
            .with_redirect_uri("https://two.example.com/cb")
            .pairwise(None);
        assert!(matches!(
            obfuscator().obfuscate(&many, "alice", ""),
            Err(FlowError::InvalidRequest { .. })
        ));

        let garbage = Client::new("c").with_redirect_uri("::not a url").pairwise(None);
        assert!(matches!(
            obfuscator().obfuscate(&garbage, "alice", ""),
            Err(FlowError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_forced_identifier_overrides_pairwise() {
        let client = Client::new("a").pairwise(None);
        assert_eq!(
            obfuscator().obfuscate(&client, "alice", "pinned").unwrap(),
            "pinned"
        );
    }
}
