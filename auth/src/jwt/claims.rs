use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::errors::JwtError;

/// Claim name carrying the account's username.
pub const CLAIM_UNIQUE_NAME: &str = "unique_name";

/// Claim name carrying the account's email-verification status.
pub const CLAIM_EMAIL_VERIFIED: &str = "is_email_verified";

/// Registered claim names that host-declared mappings may not shadow.
pub const RESERVED_CLAIMS: &[&str] = &[
    "sub",
    "exp",
    "iat",
    "nbf",
    "iss",
    "aud",
    CLAIM_UNIQUE_NAME,
    CLAIM_EMAIL_VERIFIED,
];

/// JWT claims for access tokens.
///
/// Standard RFC 7519 claims plus custom fields via the flattened `extra`
/// map. Standard fields are optional so the same type can round-trip
/// tokens minted by other issuers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Claims {
    /// Subject (account identifier)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration time (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Additional custom fields (flattened into the token)
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Create new empty claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set subject.
    pub fn with_subject(mut self, sub: impl ToString) -> Self {
        self.sub = Some(sub.to_string());
        self
    }

    /// Set expiration (Unix timestamp).
    pub fn with_expiration(mut self, exp: i64) -> Self {
        self.exp = Some(exp);
        self
    }

    /// Set issued at (Unix timestamp).
    pub fn with_issued_at(mut self, iat: i64) -> Self {
        self.iat = Some(iat);
        self
    }

    /// Set not before (Unix timestamp).
    pub fn with_not_before(mut self, nbf: i64) -> Self {
        self.nbf = Some(nbf);
        self
    }

    /// Set issuer.
    pub fn with_issuer(mut self, iss: String) -> Self {
        self.iss = Some(iss);
        self
    }

    /// Set audience.
    pub fn with_audience(mut self, aud: String) -> Self {
        self.aud = Some(aud);
        self
    }

    /// Add a custom field.
    pub fn with_extra(mut self, key: impl ToString, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.extra.insert(key.to_string(), json_value);
        }
        self
    }

    /// Get the subject, failing if absent.
    pub fn require_subject(&self) -> Result<&str, JwtError> {
        self.sub
            .as_deref()
            .ok_or_else(|| JwtError::MissingClaim("sub".to_string()))
    }

    /// Get the username from the `unique_name` claim.
    pub fn unique_name(&self) -> Option<&str> {
        self.extra.get(CLAIM_UNIQUE_NAME).and_then(|v| v.as_str())
    }

    /// Get the email-verification status claim.
    pub fn is_email_verified(&self) -> bool {
        self.extra
            .get(CLAIM_EMAIL_VERIFIED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Check if the token is expired at the given instant.
    pub fn is_expired(&self, current_timestamp: i64) -> bool {
        self.exp.map_or(false, |exp| exp < current_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let claims = Claims::new()
            .with_subject("42")
            .with_expiration(1234567890)
            .with_issued_at(1234567800)
            .with_issuer("account-engine".to_string())
            .with_extra(CLAIM_UNIQUE_NAME, "alice")
            .with_extra(CLAIM_EMAIL_VERIFIED, true);

        assert_eq!(claims.sub, Some("42".to_string()));
        assert_eq!(claims.exp, Some(1234567890));
        assert_eq!(claims.iat, Some(1234567800));
        assert_eq!(claims.iss, Some("account-engine".to_string()));
        assert_eq!(claims.unique_name(), Some("alice"));
        assert!(claims.is_email_verified());
    }

    #[test]
    fn test_require_subject() {
        let claims = Claims::new();
        assert!(matches!(
            claims.require_subject(),
            Err(JwtError::MissingClaim(_))
        ));

        let claims = claims.with_subject("7");
        assert_eq!(claims.require_subject().unwrap(), "7");
    }

    #[test]
    fn test_email_verified_defaults_false() {
        let claims = Claims::new();
        assert!(!claims.is_email_verified());
    }

    #[test]
    fn test_is_expired() {
        let claims = Claims::new().with_expiration(1000);

        assert!(!claims.is_expired(999));
        assert!(!claims.is_expired(1000));
        assert!(claims.is_expired(1001));
    }

    #[test]
    fn test_is_expired_no_exp_claim() {
        let claims = Claims::new();
        assert!(!claims.is_expired(9999999999));
    }
}
