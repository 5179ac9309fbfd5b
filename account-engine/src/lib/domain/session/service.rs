use std::sync::Arc;

use auth::jwt::claims::CLAIM_EMAIL_VERIFIED;
use auth::jwt::claims::CLAIM_UNIQUE_NAME;
use auth::jwt::claims::RESERVED_CLAIMS;
use auth::Claims;
use auth::JwtError;
use auth::JwtHandler;
use chrono::Duration;

use crate::account::errors::EngineError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::RefreshToken;
use crate::account::ports::AccountRepository;
use crate::account::ports::Clock;
use crate::account::ports::TokenRng;
use crate::account::tokens;
use crate::config::JwtSettings;
use crate::session::models::ClaimMapping;
use crate::session::models::SessionTokens;

/// Issues and validates access tokens, and rotates refresh tokens.
///
/// Access tokens are signed HS256 claims sets asserting account id,
/// username, and verification status (so the host can gate verified-only
/// actions without a store round trip), plus any host-declared extra claim
/// mappings. Refresh tokens are opaque random strings stored on the
/// account, at most one live per account.
pub struct SessionIssuer<R>
where
    R: AccountRepository,
{
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn TokenRng>,
    jwt: JwtHandler,
    settings: JwtSettings,
    claim_mappings: Vec<ClaimMapping>,
}

impl<R> SessionIssuer<R>
where
    R: AccountRepository,
{
    /// Create an issuer, checking the declared claim mappings up front.
    ///
    /// # Errors
    /// * `ClaimMappingConflict` - Empty, duplicate, or registered claim name
    pub fn new(
        repository: Arc<R>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn TokenRng>,
        settings: JwtSettings,
        claim_mappings: Vec<ClaimMapping>,
    ) -> Result<Self, EngineError> {
        let mut seen = Vec::new();
        for mapping in &claim_mappings {
            let name = mapping.name();
            if name.is_empty()
                || RESERVED_CLAIMS.contains(&name)
                || seen.contains(&name)
            {
                return Err(EngineError::ClaimMappingConflict(name.to_string()));
            }
            seen.push(name);
        }

        let mut jwt = JwtHandler::new(settings.secret.as_bytes());
        if let Some(issuer) = &settings.issuer {
            jwt = jwt.with_issuer(issuer.clone());
        }
        if let Some(audience) = &settings.audience {
            jwt = jwt.with_audience(audience.clone());
        }

        Ok(Self {
            repository,
            clock,
            rng,
            jwt,
            settings,
            claim_mappings,
        })
    }

    /// Mint a signed access token for the account.
    pub fn issue_access_token(&self, account: &Account) -> Result<String, EngineError> {
        let now = self.clock.now();
        let expires_at = now + Duration::minutes(self.settings.access_lifetime_minutes);

        let mut claims = Claims::new()
            .with_subject(account.id)
            .with_issued_at(now.timestamp())
            .with_not_before(now.timestamp())
            .with_expiration(expires_at.timestamp())
            .with_extra(CLAIM_UNIQUE_NAME, account.username.as_str())
            .with_extra(CLAIM_EMAIL_VERIFIED, account.is_email_verified);
        if let Some(issuer) = &self.settings.issuer {
            claims = claims.with_issuer(issuer.clone());
        }
        if let Some(audience) = &self.settings.audience {
            claims = claims.with_audience(audience.clone());
        }
        for mapping in &self.claim_mappings {
            claims = claims.with_extra(mapping.name(), mapping.read(account));
        }

        self.jwt.encode(&claims).map_err(|e| {
            tracing::error!("access token encoding failed: {e}");
            EngineError::Internal
        })
    }

    /// Fully validate an access token and return its claims.
    ///
    /// # Errors
    /// * `LinkExpired` (401) - Token lifetime has elapsed
    /// * `Forbidden` (403) - Signature invalid or token malformed
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, EngineError> {
        self.jwt.decode(token).map_err(|e| match e {
            JwtError::TokenExpired => EngineError::LinkExpired,
            _ => EngineError::Forbidden,
        })
    }

    /// Ensure the account holds a live refresh token and return it.
    ///
    /// Re-issuing within the current token's lifetime returns the identical
    /// string; a new token is drawn only when none exists or the existing
    /// one has expired, and it replaces the old one wholesale. The caller
    /// persists the mutated account.
    pub fn issue_refresh_token(&self, account: &mut Account) -> String {
        let now = self.clock.now();
        if let Some(existing) = &account.refresh_token {
            if !existing.is_expired(now) {
                return existing.token.clone();
            }
        }
        let token = tokens::refresh(self.rng.as_ref());
        account.refresh_token = Some(RefreshToken {
            token: token.clone(),
            issued_at: now,
            expires_at: now + Duration::hours(self.settings.refresh_lifetime_hours),
        });
        token
    }

    /// Mint the access/refresh pair for a freshly authenticated account.
    pub fn open_session(&self, account: &mut Account) -> Result<SessionTokens, EngineError> {
        let access_token = self.issue_access_token(account)?;
        let refresh_token = self.issue_refresh_token(account);
        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    /// Exchange an access/refresh pair for a fresh access token.
    ///
    /// The presented access token may be expired; its signature must still
    /// verify. The account id is taken from its claims, the stored refresh
    /// record must match the presented string exactly and be unexpired.
    /// Every failure mode maps to the same 403 so callers cannot tell a
    /// missing account from a wrong token.
    pub async fn refresh_access_token(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<String, EngineError> {
        let claims: Claims = self
            .jwt
            .decode_expired_ok(access_token)
            .map_err(|_| EngineError::Forbidden)?;
        let id = claims
            .require_subject()
            .ok()
            .and_then(|sub| AccountId::from_string(sub).ok())
            .ok_or(EngineError::Forbidden)?;

        let account = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or(EngineError::Forbidden)?;
        let stored = account.refresh_token.as_ref().ok_or(EngineError::Forbidden)?;

        if refresh_token.is_empty()
            || stored.token != refresh_token
            || stored.is_expired(self.clock.now())
        {
            return Err(EngineError::Forbidden);
        }

        self.issue_access_token(&account)
    }
}
