use std::sync::Arc;

use auth::PasswordHasher;
use chrono::Duration;

use crate::account::errors::EngineError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::EmailAddress;
use crate::account::models::OneTimeToken;
use crate::account::models::PasswordPolicy;
use crate::account::models::Username;
use crate::account::ports::AccountRepository;
use crate::account::ports::Clock;
use crate::account::ports::TokenRng;
use crate::account::tokens;

/// The account state engine.
///
/// Owns every state transition on [`Account`]: credential setup, email
/// verification, email change, password reset, and credential checks.
/// Operations validate, then mutate the in-memory account; persisting the
/// result is the caller's responsibility (plain repository write, or
/// `orchestrator::MailGatedCommit` when an email must be coupled to the
/// commit).
///
/// No operation leaves a partial mutation behind on error: validation and
/// uniqueness checks run before any field is assigned.
pub struct AccountEngine<R>
where
    R: AccountRepository,
{
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn TokenRng>,
    password_hasher: PasswordHasher,
}

impl<R> AccountEngine<R>
where
    R: AccountRepository,
{
    /// Create a new engine with injected collaborators.
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>, rng: Arc<dyn TokenRng>) -> Self {
        Self {
            repository,
            clock,
            rng,
            password_hasher: PasswordHasher::new(),
        }
    }

    /// Build a new, unsaved account.
    ///
    /// Runs the setup steps in order: email, username, password, initial
    /// verification token. The first failing step short-circuits and nothing
    /// is persisted. On success the account is returned unverified, holding
    /// a fresh verification token; the caller persists it (normally through
    /// the orchestrator so the verification email is part of the commit).
    pub async fn create_account(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<Account, EngineError> {
        let email = self.checked_email(email).await?;
        let username = self.checked_username(username).await?;
        let password_hash = self.hashed_password(password)?;

        let mut account = Account {
            id: AccountId::UNASSIGNED,
            email,
            username,
            password_hash,
            is_email_verified: false,
            email_verification: None,
            pending_new_email: None,
            password_reset: None,
            refresh_token: None,
            created_at: self.clock.now(),
        };
        self.set_email_verification(&mut account).await?;
        Ok(account)
    }

    /// Retrieve an account by id.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, EngineError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound)
    }

    /// Retrieve an account by its email, the canonical credential identifier.
    pub async fn get_account_by_email(&self, email: &str) -> Result<Account, EngineError> {
        self.repository
            .find_by_email(email)
            .await?
            .ok_or(EngineError::NotFound)
    }

    /// Verify a credential pair and return the matching account.
    ///
    /// Lookup miss and password mismatch are indistinguishable to the
    /// caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Account, EngineError> {
        let account = self
            .repository
            .find_by_email(email)
            .await?
            .ok_or(EngineError::InvalidCredentials)?;

        let is_valid = self
            .password_hasher
            .verify(password, &account.password_hash)
            .map_err(|e| {
                tracing::error!("stored password hash for account {} is unreadable: {e}", account.id);
                EngineError::Internal
            })?;
        if !is_valid {
            return Err(EngineError::InvalidCredentials);
        }
        Ok(account)
    }

    /// Validate, uniqueness-check, and assign a new email.
    pub async fn set_email(
        &self,
        account: &mut Account,
        new_email: &str,
    ) -> Result<(), EngineError> {
        account.email = self.checked_email(new_email).await?;
        Ok(())
    }

    /// Validate, uniqueness-check, and assign a new username.
    pub async fn set_username(
        &self,
        account: &mut Account,
        new_username: &str,
    ) -> Result<(), EngineError> {
        account.username = self.checked_username(new_username).await?;
        Ok(())
    }

    /// Validate the password against policy and store its hash.
    pub async fn set_password(
        &self,
        account: &mut Account,
        password: &str,
    ) -> Result<(), EngineError> {
        account.password_hash = self.hashed_password(password)?;
        Ok(())
    }

    /// Start an email change for a verified account.
    ///
    /// The current email stays in place; `new_email` is parked as pending
    /// and applied only when the paired verification token is consumed.
    ///
    /// # Errors
    /// * `EmailNotVerified` (403) - Current email not verified yet
    /// * `InvalidEmail` (400) / `EmailTaken` (409) - New email rejected
    pub async fn set_email_change(
        &self,
        account: &mut Account,
        new_email: &str,
    ) -> Result<(), EngineError> {
        if !account.is_email_verified {
            return Err(EngineError::EmailNotVerified {
                action: "changing it",
            });
        }
        let new_email = self.checked_email(new_email).await?;
        let token = self.unique_verification_token().await?;
        account.email_verification = Some(self.expiring(token));
        account.pending_new_email = Some(new_email);
        Ok(())
    }

    /// Issue a fresh email-verification token for an unverified account.
    ///
    /// Calling this again before consumption replaces the outstanding token;
    /// the previous one stops verifying.
    ///
    /// # Errors
    /// * `Forbidden` (403) - Account is already verified
    pub async fn set_email_verification(&self, account: &mut Account) -> Result<(), EngineError> {
        if account.is_email_verified {
            return Err(EngineError::Forbidden);
        }
        let token = self.unique_verification_token().await?;
        account.is_email_verified = false;
        account.email_verification = Some(self.expiring(token));
        Ok(())
    }

    /// Consume a verification token.
    ///
    /// Applies the pending email change if one is parked (propagating a
    /// uniqueness conflict that arose since the token was issued), marks the
    /// email verified, and clears all verification sub-state. Returns the
    /// mutated, unsaved account.
    ///
    /// # Errors
    /// * `Forbidden` (403) - Empty token or no account holds it
    /// * `LinkExpired` (401) - Token expiry has passed
    pub async fn verify_email(&self, token: &str) -> Result<Account, EngineError> {
        if token.is_empty() {
            return Err(EngineError::Forbidden);
        }
        let mut account = self
            .repository
            .find_by_verification_token(token)
            .await?
            .ok_or(EngineError::Forbidden)?;
        let verification = account
            .email_verification
            .clone()
            .ok_or(EngineError::Forbidden)?;
        if verification.is_expired(self.clock.now()) {
            return Err(EngineError::LinkExpired);
        }
        if let Some(pending) = account.pending_new_email.clone() {
            self.set_email(&mut account, pending.as_str()).await?;
        }
        account.is_email_verified = true;
        account.clear_email_verification();
        Ok(account)
    }

    /// Issue a password-reset token.
    ///
    /// # Errors
    /// * `EmailNotVerified` (403) - Reset is gated on a verified email
    pub async fn set_password_reset(&self, account: &mut Account) -> Result<(), EngineError> {
        if !account.is_email_verified {
            return Err(EngineError::EmailNotVerified {
                action: "changing password",
            });
        }
        let token = self.unique_reset_token().await?;
        account.password_reset = Some(self.expiring(token));
        Ok(())
    }

    /// Consume a reset token and set the new password.
    ///
    /// A policy failure on the new password surfaces as 400 before the
    /// reset sub-state is touched, so the link stays usable.
    ///
    /// # Errors
    /// * `Forbidden` (403) - No outstanding reset, empty token, or mismatch
    /// * `LinkExpired` (401) - Token expiry has passed
    /// * `InvalidPassword` (400) - New password violates policy
    pub async fn verify_password(
        &self,
        account: &mut Account,
        token: &str,
        new_password: &str,
    ) -> Result<(), EngineError> {
        let reset = account.password_reset.clone().ok_or(EngineError::Forbidden)?;
        if !reset.matches(token) {
            return Err(EngineError::Forbidden);
        }
        if reset.is_expired(self.clock.now()) {
            return Err(EngineError::LinkExpired);
        }
        self.set_password(account, new_password).await?;
        account.clear_password_reset();
        Ok(())
    }

    /// Whether no account currently uses this email. Pure query.
    pub async fn check_email_available(&self, email: &str) -> Result<bool, EngineError> {
        Ok(!self.repository.email_exists(email).await?)
    }

    /// Whether no account currently uses this username. Pure query.
    pub async fn check_username_available(&self, username: &str) -> Result<bool, EngineError> {
        Ok(!self.repository.username_exists(username).await?)
    }

    async fn checked_email(&self, raw: &str) -> Result<EmailAddress, EngineError> {
        let email = EmailAddress::new(raw.to_string())?;
        if self.repository.email_exists(email.as_str()).await? {
            return Err(EngineError::EmailTaken);
        }
        Ok(email)
    }

    async fn checked_username(&self, raw: &str) -> Result<Username, EngineError> {
        let username = Username::new(raw.to_string())?;
        if self.repository.username_exists(username.as_str()).await? {
            return Err(EngineError::UsernameTaken);
        }
        Ok(username)
    }

    fn hashed_password(&self, password: &str) -> Result<String, EngineError> {
        PasswordPolicy::validate(password)?;
        self.password_hasher.hash(password).map_err(|e| {
            tracing::error!("password hashing failed: {e}");
            EngineError::Internal
        })
    }

    fn expiring(&self, token: String) -> OneTimeToken {
        OneTimeToken {
            token,
            expires_at: self.clock.now() + Duration::hours(tokens::TOKEN_TTL_HOURS),
        }
    }

    // Collision odds are astronomically small; the loops are a safety net,
    // not a performance concern.
    async fn unique_verification_token(&self) -> Result<String, EngineError> {
        loop {
            let token = tokens::single_use(self.rng.as_ref());
            if !self.repository.verification_token_exists(&token).await? {
                return Ok(token);
            }
        }
    }

    async fn unique_reset_token(&self) -> Result<String, EngineError> {
        loop {
            let token = tokens::single_use(self.rng.as_ref());
            if !self.repository.reset_token_exists(&token).await? {
                return Ok(token);
            }
        }
    }
}
