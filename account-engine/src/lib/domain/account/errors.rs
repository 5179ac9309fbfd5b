use thiserror::Error;

/// Error for AccountId parsing failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountIdError {
    #[error("Invalid account id: {0}")]
    InvalidFormat(String),
}

/// Error for Username validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username must contain 2-24 characters and consist only of letters and digits.")]
    InvalidFormat,

    #[error("Username should have at least 1 letter.")]
    NoLetter,
}

/// Error for EmailAddress validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

/// Error for password policy violations.
///
/// Carries every violated rule, joined into one message, rather than the
/// first failure only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", violations.join(" "))]
pub struct PasswordPolicyError {
    pub violations: Vec<String>,
}

/// Error reported by the notification sender.
///
/// The kind is opaque to the engine; only success vs. failure matters here.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct NotifierError(pub String);

/// Top-level error for all engine operations.
///
/// Every variant maps onto the numeric code the host returns to its
/// transport layer, see [`EngineError::status_code`].
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    // Value object validation errors (automatically converted via #[from])
    #[error(transparent)]
    InvalidAccountId(#[from] AccountIdError),

    #[error(transparent)]
    InvalidUsername(#[from] UsernameError),

    #[error(transparent)]
    InvalidEmail(#[from] EmailError),

    #[error(transparent)]
    InvalidPassword(#[from] PasswordPolicyError),

    // State-transition errors
    #[error("Email already occupied. Please, choose another.")]
    EmailTaken,

    #[error("Username already occupied. Please, choose another.")]
    UsernameTaken,

    #[error("Verify your current email before {action}.")]
    EmailNotVerified { action: &'static str },

    /// Token lookup miss, token mismatch, and operations not allowed in the
    /// current state all collapse into this variant so callers cannot probe
    /// which accounts or tokens exist.
    #[error("Forbidden.")]
    Forbidden,

    #[error("Verification link has expired.")]
    LinkExpired,

    #[error("Check your credentials and try again.")]
    InvalidCredentials,

    #[error("Requested account does not exist.")]
    NotFound,

    #[error("Claim mapping conflicts with a registered claim: {0}")]
    ClaimMappingConflict(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to send notification: {0}")]
    Notification(#[from] NotifierError),

    #[error("Server has encountered an unexpected error while processing the request. Please, try again later.")]
    Internal,
}

impl EngineError {
    /// Numeric status code the host maps onto its transport response.
    ///
    /// 400 malformed input, 401 expired token, 403 forbidden in the current
    /// state (including token lookup misses), 404 plain entity lookup miss,
    /// 409 uniqueness conflict, 500 internal.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAccountId(_)
            | Self::InvalidUsername(_)
            | Self::InvalidEmail(_)
            | Self::InvalidPassword(_) => 400,
            Self::LinkExpired => 401,
            Self::EmailNotVerified { .. } | Self::Forbidden | Self::InvalidCredentials => 403,
            Self::NotFound => 404,
            Self::EmailTaken | Self::UsernameTaken => 409,
            Self::ClaimMappingConflict(_)
            | Self::Database(_)
            | Self::Notification(_)
            | Self::Internal => 500,
        }
    }

    /// Message safe to hand back to the caller.
    ///
    /// Internal failures keep their detail for the logs only and surface the
    /// fixed generic text instead.
    pub fn public_message(&self) -> String {
        match self.status_code() {
            500 => Self::Internal.to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("unexpected engine error: {err:#}");
        EngineError::Internal
    }
}
