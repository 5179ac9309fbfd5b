use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::account::errors::EngineError;
use crate::account::errors::NotifierError;
use crate::account::models::Account;
use crate::account::models::AccountId;

/// Persistence operations for the account aggregate.
///
/// The engine never talks to a store directly; the host wires an
/// implementation of this port (see `outbound::repositories` for the
/// Postgres adapter).
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Persist a new account and return it with its store-assigned id.
    ///
    /// # Errors
    /// * `EmailTaken` / `UsernameTaken` - Unique constraint violated
    /// * `Database` - Store operation failed
    async fn insert(&self, account: &Account) -> Result<Account, EngineError>;

    /// Update an existing account in place.
    ///
    /// # Errors
    /// * `NotFound` - No row with this id
    /// * `EmailTaken` / `UsernameTaken` - Unique constraint violated
    /// * `Database` - Store operation failed
    async fn update(&self, account: &Account) -> Result<Account, EngineError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, EngineError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, EngineError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, EngineError>;

    /// Look up the account holding an active email-verification token.
    async fn find_by_verification_token(&self, token: &str)
        -> Result<Option<Account>, EngineError>;

    /// Look up the account holding an active password-reset token.
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>, EngineError>;

    async fn email_exists(&self, email: &str) -> Result<bool, EngineError>;

    async fn username_exists(&self, username: &str) -> Result<bool, EngineError>;

    /// Whether any account currently holds this verification token.
    /// Backs the collision-retry loop at token generation time.
    async fn verification_token_exists(&self, token: &str) -> Result<bool, EngineError>;

    /// Whether any account currently holds this reset token.
    async fn reset_token_exists(&self, token: &str) -> Result<bool, EngineError>;

    /// Open a transaction for a write that must be coupled to an external
    /// side effect (see `orchestrator::MailGatedCommit`).
    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, EngineError>;
}

/// A store transaction holding uncommitted account writes.
///
/// `commit`/`rollback` take `&mut self` and fail on reuse instead of
/// consuming the transaction, so implementations stay object-safe and
/// mockable; dropping an unfinished transaction must roll it back.
#[async_trait]
pub trait AccountTransaction: Send {
    async fn insert(&mut self, account: &Account) -> Result<Account, EngineError>;

    async fn update(&mut self, account: &Account) -> Result<Account, EngineError>;

    async fn commit(&mut self) -> Result<(), EngineError>;

    async fn rollback(&mut self) -> Result<(), EngineError>;
}

/// A notification the engine asks the host to deliver.
///
/// `template` is an opaque reference the host's mailer resolves (file path,
/// template id, ...); `action_url` is substituted into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRequest {
    pub recipient: String,
    pub template: String,
    pub action_url: String,
    pub subject: String,
}

/// Outbound notification port (email delivery).
///
/// Failure must be distinguishable from success; its kind is opaque to the
/// engine. Delivery is blocking from the caller's perspective.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, mail: &MailRequest) -> Result<(), NotifierError>;
}

/// Time source, injected so expiry logic is testable.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cryptographically secure random source for token material.
pub trait TokenRng: Send + Sync + 'static {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Operating-system CSPRNG.
pub struct OsTokenRng;

impl TokenRng for OsTokenRng {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}
