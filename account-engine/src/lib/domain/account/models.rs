use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;

use crate::account::errors::AccountIdError;
use crate::account::errors::EmailError;
use crate::account::errors::PasswordPolicyError;
use crate::account::errors::UsernameError;

/// Account aggregate entity.
///
/// The persisted identity record owned by the engine, including the
/// pending-operation sub-state for email verification, password reset, and
/// the refresh token.
#[derive(Debug, Clone)]
pub struct Account {
    /// Store-assigned numeric identifier, immutable after first insert.
    pub id: AccountId,
    pub email: EmailAddress,
    pub username: Username,
    pub password_hash: String,
    pub is_email_verified: bool,
    /// Outstanding email-verification token, always paired with its expiry.
    pub email_verification: Option<OneTimeToken>,
    /// Email to apply when the paired verification token is consumed.
    pub pending_new_email: Option<EmailAddress>,
    /// Outstanding password-reset token, always paired with its expiry.
    pub password_reset: Option<OneTimeToken>,
    /// At most one live refresh token per account, replaced on rotation.
    pub refresh_token: Option<RefreshToken>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Drop all verification sub-state: token, expiry, and pending email.
    pub fn clear_email_verification(&mut self) {
        self.email_verification = None;
        self.pending_new_email = None;
    }

    /// Drop the password-reset token and its expiry.
    pub fn clear_password_reset(&mut self) {
        self.password_reset = None;
    }
}

/// Account unique identifier type.
///
/// Assigned by the store on first insert; `UNASSIGNED` until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(pub i64);

impl AccountId {
    pub const UNASSIGNED: AccountId = AccountId(0);

    /// Whether the store has assigned this id yet.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    /// Parse an account id from string (e.g. a JWT `sub` claim).
    ///
    /// # Errors
    /// * `InvalidFormat` - String is not a positive integer
    pub fn from_string(s: &str) -> Result<Self, AccountIdError> {
        match i64::from_str(s) {
            Ok(id) if id > 0 => Ok(AccountId(id)),
            _ => Err(AccountIdError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Username value type.
///
/// 2-24 characters, ASCII letters and digits only, at least one letter
/// (a pure-numeric username is rejected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    const MIN_LENGTH: usize = 2;
    const MAX_LENGTH: usize = 24;

    /// Create a new valid username.
    ///
    /// # Errors
    /// * `InvalidFormat` - Wrong length or a character outside `[A-Za-z0-9]`
    /// * `NoLetter` - No letter at all
    pub fn new(username: String) -> Result<Self, UsernameError> {
        let length = username.chars().count();
        if length < Self::MIN_LENGTH
            || length > Self::MAX_LENGTH
            || !username.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(UsernameError::InvalidFormat);
        }
        if !username.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(UsernameError::NoLetter);
        }
        Ok(Self(username))
    }

    /// Get username as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Email address type.
///
/// Validates against a conventional address grammar; empty input fails the
/// same way as any other malformed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated email address.
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not parse as an address
    pub fn new(email: String) -> Result<Self, EmailError> {
        email_address::EmailAddress::from_str(&email)
            .map(|_| EmailAddress(email))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    /// Get email as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Password shape policy.
///
/// Collects every violated rule into one error instead of stopping at the
/// first, so the caller sees the full list at once.
pub struct PasswordPolicy;

impl PasswordPolicy {
    const MIN_LENGTH: usize = 6;
    const MAX_LENGTH: usize = 32;

    pub fn validate(password: &str) -> Result<(), PasswordPolicyError> {
        let mut violations = Vec::new();
        let length = password.chars().count();
        if length < Self::MIN_LENGTH {
            violations.push(format!(
                "Minimum password length should be {} characters.",
                Self::MIN_LENGTH
            ));
        } else if length > Self::MAX_LENGTH {
            violations.push(format!(
                "Maximum password length should be {} characters.",
                Self::MAX_LENGTH
            ));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push("Password should contain at least 1 digit.".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_alphabetic()) {
            violations.push("Password should contain at least 1 letter.".to_string());
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(PasswordPolicyError { violations })
        }
    }
}

/// A single-use token tied to one pending operation.
///
/// Token and expiry travel together so a stored token can never lack its
/// expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Exact match against a presented token; empty input never matches.
    pub fn matches(&self, presented: &str) -> bool {
        !presented.is_empty() && self.token == presented
    }
}

/// The opaque server-side refresh credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
