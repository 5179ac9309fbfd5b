use jsonwebtoken::decode;
use jsonwebtoken::encode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use serde::Deserialize;
use serde::Serialize;

use super::errors::JwtError;

/// JWT token handler for encoding and decoding tokens.
///
/// Generic over the claims type so hosts can layer extra fields on top of
/// the engine's claim set. Uses HS256 (HMAC with SHA-256) with a symmetric
/// key derived from the configured secret.
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtHandler {
    /// Create a new JWT handler with a secret key.
    ///
    /// # Arguments
    /// * `secret` - Secret key for signing tokens (at least 32 bytes for HS256)
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: None,
            audience: None,
        }
    }

    /// Require an `iss` claim value during full validation.
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Require an `aud` claim value during full validation.
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Encode claims into a JWT token.
    ///
    /// # Errors
    /// * `EncodingFailed` - Token encoding failed
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let header = Header::new(self.algorithm);

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Decode and fully validate a JWT token (signature, lifetime, and
    /// issuer/audience when configured).
    ///
    /// # Errors
    /// * `TokenExpired` - Token lifetime has elapsed
    /// * `DecodingFailed` - Signature is invalid or the token is malformed
    pub fn decode<T: for<'de> Deserialize<'de>>(&self, token: &str) -> Result<T, JwtError> {
        self.run_decode(token, self.validation(true))
    }

    /// Decode a token checking the signature but ignoring its lifetime.
    ///
    /// This is the parse mode the refresh protocol requires: the presented
    /// access token may be expired, but its claims are only trusted if the
    /// signature still verifies. Issuer/audience checks are skipped here as
    /// well; the refresh token match is the authorization gate.
    ///
    /// # Errors
    /// * `DecodingFailed` - Signature is invalid or the token is malformed
    pub fn decode_expired_ok<T: for<'de> Deserialize<'de>>(
        &self,
        token: &str,
    ) -> Result<T, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        self.run_decode(token, validation)
    }

    fn validation(&self, validate_lifetime: bool) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = validate_lifetime;
        // jsonwebtoken only checks claims that are present unless they are
        // listed as required, so a token omitting `exp` or `iss` would slip
        // through. Require exactly what this handler is configured to check.
        validation.required_spec_claims.clear();
        if validate_lifetime {
            validation.required_spec_claims.insert("exp".to_string());
        }
        validation.leeway = 0;
        match &self.issuer {
            Some(iss) => {
                validation.set_issuer(&[iss]);
                validation.required_spec_claims.insert("iss".to_string());
            }
            None => {}
        }
        match &self.audience {
            Some(aud) => {
                validation.set_audience(&[aud]);
                validation.required_spec_claims.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }
        validation
    }

    fn run_decode<T: for<'de> Deserialize<'de>>(
        &self,
        token: &str,
        validation: Validation,
    ) -> Result<T, JwtError> {
        let token_data =
            decode::<T>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::DecodingFailed(e.to_string()),
            })?;

        Ok(token_data.claims)
    }
}
