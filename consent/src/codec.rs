//! Encrypted, purpose-tagged flow tokens.
//!
//! Challenges and verifiers are the flow record itself, sealed so that the
//! user agent carries the state between redirects:
//!
//! ```text
//! record ─▶ JSON ─▶ gzip ─▶ AES-256-GCM(aad = purpose) ─▶ base64url(nonce ‖ ciphertext)
//! ```
//!
//! Binding the purpose as associated data means a login challenge can never be
//! replayed as a login verifier (or any other purpose). Decryption tries the
//! current key first, then every rotated key, so keys can be rotated without
//! breaking flows in progress.
//!
//! # Security
//!
//! Every decode failure collapses into [`FlowError::InvalidToken`]; callers
//! cannot tell a bad key from a tampered payload or a wrong purpose.

use crate::constants::MAX_FLOW_TOKEN_SIZE;
use crate::error::{FlowError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

/// AES-GCM nonce length (96 bits).
const NONCE_LEN: usize = 12;

/// Required key length (256 bits).
pub const KEY_LEN: usize = 32;

/// What a flow token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Handed to the login UI.
    LoginChallenge,
    /// Returned by the login UI.
    LoginVerifier,
    /// Handed to the consent UI.
    ConsentChallenge,
    /// Returned by the consent UI.
    ConsentVerifier,
    /// Handed to a device verification UI run by the embedding service.
    DeviceChallenge,
    /// Returned by a device verification UI. The authorization endpoint
    /// rejects these; the embedding service redeems them.
    DeviceVerifier,
}

impl Purpose {
    /// Associated data bound into the ciphertext.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginChallenge => "login_challenge",
            Self::LoginVerifier => "login_verifier",
            Self::ConsentChallenge => "consent_challenge",
            Self::ConsentVerifier => "consent_verifier",
            Self::DeviceChallenge => "device_challenge",
            Self::DeviceVerifier => "device_verifier",
        }
    }
}

/// Seals and opens flow tokens.
///
/// Cheap to clone; the ciphers are shared.
#[derive(Clone)]
pub struct FlowCipher {
    /// Current key first, then rotated keys in order.
    ciphers: Arc<Vec<Aes256Gcm>>,
}

impl FlowCipher {
    /// Create a cipher from the current key and any rotated keys.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if a key is not exactly 32 bytes.
    pub fn new(current: &[u8], rotated: &[Vec<u8>]) -> Result<Self> {
        let ciphers = std::iter::once(current)
            .chain(rotated.iter().map(Vec::as_slice))
            .enumerate()
            .map(|(index, key)| {
                if key.len() != KEY_LEN {
                    return Err(FlowError::Configuration(format!(
                        "Flow key {index} must be exactly {KEY_LEN} bytes (256 bits) for AES-256-GCM"
                    )));
                }
                Aes256Gcm::new_from_slice(key).map_err(|e| {
                    FlowError::Configuration(format!("Failed to initialize AES-256-GCM cipher: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ciphers: Arc::new(ciphers),
        })
    }

    /// Generate a random key.
    #[must_use]
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Seal a record for one purpose.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ServerError`] if serialization or encryption fails.
    pub fn encode<T: Serialize>(&self, record: &T, purpose: Purpose) -> Result<String> {
        let json = serde_json::to_vec(record)
            .map_err(|e| FlowError::server_error(format!("flow serialization failed: {e}")))?;

        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| FlowError::server_error(format!("flow compression failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| FlowError::server_error(format!("flow compression failed: {e}")))?;

        let cipher = self
            .ciphers
            .first()
            .ok_or_else(|| FlowError::server_error("flow cipher has no key"))?;

        // Generate random nonce (96 bits for GCM)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &compressed,
                    aad: purpose.as_str().as_bytes(),
                },
            )
            .map_err(|e| FlowError::server_error(format!("flow encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Open a token sealed for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidToken`] on any failure.
    pub fn decode<T: DeserializeOwned>(&self, token: &str, purpose: Purpose) -> Result<T> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|_| FlowError::InvalidToken)?;
        if sealed.len() <= NONCE_LEN {
            return Err(FlowError::InvalidToken);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        let aad = purpose.as_str().as_bytes();

        let compressed = self
            .ciphers
            .iter()
            .find_map(|cipher| {
                cipher
                    .decrypt(nonce, Payload { msg: ciphertext, aad })
                    .ok()
            })
            .ok_or(FlowError::InvalidToken)?;

        let mut json = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .take(MAX_FLOW_TOKEN_SIZE)
            .read_to_end(&mut json)
            .map_err(|_| FlowError::InvalidToken)?;

        serde_json::from_slice(&json).map_err(|_| FlowError::InvalidToken)
    }
}

impl fmt::Debug for FlowCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowCipher")
            .field("keys", &self.ciphers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        scopes: Vec<String>,
    }

    fn record() -> Record {
        Record {
            id: "flow-1".to_string(),
            scopes: vec!["openid".to_string(), "offline".to_string()],
        }
    }

    fn cipher() -> FlowCipher {
        FlowCipher::new(&FlowCipher::generate_key(), &[]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        let token = cipher.encode(&record(), Purpose::LoginChallenge).unwrap();
        let decoded: Record = cipher.decode(&token, Purpose::LoginChallenge).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn test_purpose_isolation() {
        let cipher = cipher();
        let purposes = [
            Purpose::LoginChallenge,
            Purpose::LoginVerifier,
            Purpose::ConsentChallenge,
            Purpose::ConsentVerifier,
            Purpose::DeviceChallenge,
            Purpose::DeviceVerifier,
        ];

        for issued in purposes {
            let token = cipher.encode(&record(), issued).unwrap();
            for used in purposes.iter().copied().filter(|p| *p != issued) {
                assert_eq!(
                    cipher.decode::<Record>(&token, used),
                    Err(FlowError::InvalidToken),
                    "{issued:?} token decoded as {used:?}"
                );
            }
        }
    }

    #[test]
    fn test_tokens_are_not_deterministic() {
        let cipher = cipher();
        let a = cipher.encode(&record(), Purpose::LoginVerifier).unwrap();
        let b = cipher.encode(&record(), Purpose::LoginVerifier).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rotated_key_still_decodes() {
        let old_key = FlowCipher::generate_key();
        let old = FlowCipher::new(&old_key, &[]).unwrap();
        let token = old.encode(&record(), Purpose::ConsentVerifier).unwrap();

        let rotated = FlowCipher::new(&FlowCipher::generate_key(), &[old_key]).unwrap();
        let decoded: Record = rotated.decode(&token, Purpose::ConsentVerifier).unwrap();
        assert_eq!(decoded, record());

        let unrelated = cipher();
        assert_eq!(
            unrelated.decode::<Record>(&token, Purpose::ConsentVerifier),
            Err(FlowError::InvalidToken)
        );
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let cipher = cipher();
        let token = cipher.encode(&record(), Purpose::LoginChallenge).unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(bytes);

        assert_eq!(
            cipher.decode::<Record>(&tampered, Purpose::LoginChallenge),
            Err(FlowError::InvalidToken)
        );
    }

    #[test]
    fn test_garbage_is_invalid() {
        let cipher = cipher();
        for token in ["", "not base64!", "AAAA", &URL_SAFE_NO_PAD.encode([0u8; 64])] {
            assert_eq!(
                cipher.decode::<Record>(token, Purpose::LoginChallenge),
                Err(FlowError::InvalidToken)
            );
        }
    }

    #[test]
    fn test_wrong_shape_is_invalid() {
        let cipher = cipher();
        let token = cipher.encode(&"just a string", Purpose::LoginChallenge).unwrap();
        assert_eq!(
            cipher.decode::<Record>(&token, Purpose::LoginChallenge),
            Err(FlowError::InvalidToken)
        );
    }

    #[test]
    fn test_key_length_is_validated() {
        assert!(matches!(
            FlowCipher::new(&[0u8; 16], &[]),
            Err(FlowError::Configuration(_))
        ));
        assert!(matches!(
            FlowCipher::new(&[0u8; 32], &[vec![0u8; 31]]),
            Err(FlowError::Configuration(_))
        ));
    }
}
