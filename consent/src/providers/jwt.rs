//! ID token hint decoding and logout token signing.
//!
//! The engine never issues ID tokens; it only needs to read `id_token_hint`
//! values the provider signed earlier and to sign back-channel logout tokens
//! with the same key.

use crate::error::{FlowError, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use std::fmt;

/// JWT claims as a JSON object.
pub type Claims = Map<String, Value>;

/// Reads ID token hints and signs logout tokens.
pub trait IdTokenStrategy: Send + Sync {
    /// Verify the signature of an `id_token_hint` and return its claims.
    ///
    /// Expired hints are accepted; only the signature and structure are
    /// checked.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidRequest`] if the token is malformed or its
    /// signature does not verify.
    fn decode_id_token_hint(&self, token: &str) -> Result<Claims>;

    /// Sign a set of claims.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ServerError`] if signing fails.
    fn sign(&self, claims: &Claims) -> Result<String>;
}

/// [`IdTokenStrategy`] backed by `jsonwebtoken`.
#[derive(Clone)]
pub struct JwtStrategy {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    key_id: Option<String>,
}

impl JwtStrategy {
    /// HMAC-SHA256 with a shared secret.
    #[must_use]
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            key_id: None,
        }
    }

    /// RSA-SHA256 from PEM encoded keys.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Configuration`] if a key cannot be parsed.
    pub fn rs256_from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| FlowError::Configuration(format!("Invalid RSA private key: {e}")))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| FlowError::Configuration(format!("Invalid RSA public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding_key,
            decoding_key,
            key_id: None,
        })
    }

    /// Set the `kid` header of signed tokens.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Signing algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl IdTokenStrategy for JwtStrategy {
    fn decode_id_token_hint(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                FlowError::invalid_request(format!(
                    "Unable to decode the id_token_hint parameter: {e}"
                ))
            })
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let mut header = Header::new(self.algorithm);
        header.kid.clone_from(&self.key_id);

        jsonwebtoken::encode(&header, claims, &self.encoding_key)
            .map_err(|e| FlowError::server_error(format!("Unable to sign token: {e}")))
    }
}

impl fmt::Debug for JwtStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtStrategy")
            .field("algorithm", &self.algorithm)
            .field("encoding_key", &"<EncodingKey>")
            .field("decoding_key", &"<DecodingKey>")
            .field("key_id", &self.key_id)
            .finish()
    }
}
