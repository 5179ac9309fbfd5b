use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use account_engine::account::errors::EngineError;
use account_engine::account::errors::NotifierError;
use account_engine::account::models::Account;
use account_engine::account::models::AccountId;
use account_engine::account::orchestrator::AccountWrite;
use account_engine::account::orchestrator::MailGatedCommit;
use account_engine::account::ports::AccountRepository;
use account_engine::account::ports::AccountTransaction;
use account_engine::account::ports::Clock;
use account_engine::account::ports::MailRequest;
use account_engine::account::ports::Notifier;
use account_engine::account::ports::TokenRng;
use account_engine::account::service::AccountEngine;
use account_engine::config::JwtSettings;
use account_engine::session::service::SessionIssuer;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

/// In-memory account store mimicking the Postgres adapter's semantics,
/// including unique constraints and snapshot-based transactions.
pub struct InMemoryAccountRepository {
    store: Arc<Mutex<Store>>,
}

struct Store {
    accounts: HashMap<i64, Account>,
    next_id: i64,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                accounts: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    fn find_where(&self, predicate: impl Fn(&Account) -> bool) -> Option<Account> {
        self.store
            .lock()
            .unwrap()
            .accounts
            .values()
            .find(|a| predicate(a))
            .cloned()
    }
}

impl Store {
    fn insert(&mut self, account: &Account) -> Result<Account, EngineError> {
        self.check_unique(account, None)?;
        let mut saved = account.clone();
        saved.id = AccountId(self.next_id);
        self.next_id += 1;
        self.accounts.insert(saved.id.0, saved.clone());
        Ok(saved)
    }

    fn update(&mut self, account: &Account) -> Result<Account, EngineError> {
        if !self.accounts.contains_key(&account.id.0) {
            return Err(EngineError::NotFound);
        }
        self.check_unique(account, Some(account.id))?;
        self.accounts.insert(account.id.0, account.clone());
        Ok(account.clone())
    }

    fn check_unique(&self, account: &Account, except: Option<AccountId>) -> Result<(), EngineError> {
        for other in self.accounts.values() {
            if Some(other.id) == except {
                continue;
            }
            if other.email == account.email {
                return Err(EngineError::EmailTaken);
            }
            if other.username == account.username {
                return Err(EngineError::UsernameTaken);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account, EngineError> {
        self.store.lock().unwrap().insert(account)
    }

    async fn update(&self, account: &Account) -> Result<Account, EngineError> {
        self.store.lock().unwrap().update(account)
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, EngineError> {
        Ok(self.store.lock().unwrap().accounts.get(&id.0).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, EngineError> {
        Ok(self.find_where(|a| a.email.as_str() == email))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, EngineError> {
        Ok(self.find_where(|a| a.username.as_str() == username))
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>, EngineError> {
        Ok(self.find_where(|a| {
            a.email_verification
                .as_ref()
                .is_some_and(|t| t.token == token)
        }))
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>, EngineError> {
        Ok(self.find_where(|a| a.password_reset.as_ref().is_some_and(|t| t.token == token)))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, EngineError> {
        Ok(self.find_where(|a| a.email.as_str() == email).is_some())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, EngineError> {
        Ok(self
            .find_where(|a| a.username.as_str() == username)
            .is_some())
    }

    async fn verification_token_exists(&self, token: &str) -> Result<bool, EngineError> {
        Ok(self
            .find_where(|a| {
                a.email_verification
                    .as_ref()
                    .is_some_and(|t| t.token == token)
            })
            .is_some())
    }

    async fn reset_token_exists(&self, token: &str) -> Result<bool, EngineError> {
        Ok(self
            .find_where(|a| a.password_reset.as_ref().is_some_and(|t| t.token == token))
            .is_some())
    }

    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, EngineError> {
        let snapshot = self.store.lock().unwrap().accounts.clone();
        Ok(Box::new(InMemoryTx {
            store: self.store.clone(),
            snapshot: Some(snapshot),
        }))
    }
}

/// Snapshot-based transaction: writes apply immediately, rollback restores
/// the map captured at begin.
struct InMemoryTx {
    store: Arc<Mutex<Store>>,
    snapshot: Option<HashMap<i64, Account>>,
}

#[async_trait]
impl AccountTransaction for InMemoryTx {
    async fn insert(&mut self, account: &Account) -> Result<Account, EngineError> {
        self.store.lock().unwrap().insert(account)
    }

    async fn update(&mut self, account: &Account) -> Result<Account, EngineError> {
        self.store.lock().unwrap().update(account)
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| EngineError::Database("transaction already completed".to_string()))
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| EngineError::Database("transaction already completed".to_string()))?;
        self.store.lock().unwrap().accounts = snapshot;
        Ok(())
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.store.lock().unwrap().accounts = snapshot;
        }
    }
}

/// Clock tests can move forward.
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn starting_at(at: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(at)))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// OS randomness behind the injectable trait.
pub struct TestRng;

impl TokenRng for TestRng {
    fn fill_bytes(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Notifier capturing every request, optionally failing on demand.
pub struct RecordingNotifier {
    pub fail: Mutex<bool>,
    pub sent: Mutex<Vec<MailRequest>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, mail: &MailRequest) -> Result<(), NotifierError> {
        if *self.fail.lock().unwrap() {
            return Err(NotifierError("smtp connect refused".to_string()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Everything a lifecycle test needs, wired the way a host would wire it.
pub struct TestHarness {
    pub repository: Arc<InMemoryAccountRepository>,
    pub clock: Arc<TestClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: AccountEngine<InMemoryAccountRepository>,
    pub orchestrator: MailGatedCommit<InMemoryAccountRepository, RecordingNotifier>,
    pub issuer: SessionIssuer<InMemoryAccountRepository>,
}

impl TestHarness {
    pub fn new() -> Self {
        // Surface engine logs when RUST_LOG is set; repeated init is a no-op
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let repository = Arc::new(InMemoryAccountRepository::new());
        // Access-token expiry is checked against real wall-clock time by the
        // JWT layer, so the test clock starts at the real current instant and
        // only moves relative to it.
        let clock = TestClock::starting_at(Utc::now());
        let notifier = RecordingNotifier::new();
        let rng = Arc::new(TestRng);

        let engine = AccountEngine::new(repository.clone(), clock.clone(), rng.clone());
        let orchestrator = MailGatedCommit::new(repository.clone(), notifier.clone());
        let issuer = SessionIssuer::new(
            repository.clone(),
            clock.clone(),
            rng,
            JwtSettings {
                secret: "test-secret-key-for-jwt-signing-at-least-32-bytes".to_string(),
                issuer: Some("account-engine-tests".to_string()),
                audience: None,
                access_lifetime_minutes: 30,
                refresh_lifetime_hours: 720,
            },
            Vec::new(),
        )
        .expect("issuer construction failed");

        Self {
            repository,
            clock,
            notifier,
            engine,
            orchestrator,
            issuer,
        }
    }

    pub fn confirmation_mail(&self, recipient: &str, token: &str) -> MailRequest {
        MailRequest {
            recipient: recipient.to_string(),
            template: "email_confirm".to_string(),
            action_url: format!("https://host.example/auth/email/vrf?vrft={token}"),
            subject: "EmailConfirmation".to_string(),
        }
    }

    pub fn reset_mail(&self, recipient: &str, token: &str) -> MailRequest {
        MailRequest {
            recipient: recipient.to_string(),
            template: "password_reset".to_string(),
            action_url: format!("https://host.example/auth/password/reset?prt={token}"),
            subject: "PasswordReset".to_string(),
        }
    }

    /// Persist a mutated account, panicking on failure.
    pub async fn repository_update(&self, account: &Account) -> Account {
        self.repository
            .update(account)
            .await
            .expect("persisting account failed")
    }

    /// Sign up and commit through the orchestrator, returning the saved
    /// account.
    pub async fn signed_up_account(&self, email: &str, username: &str, password: &str) -> Account {
        let account = self
            .engine
            .create_account(email, username, password)
            .await
            .expect("create_account failed");
        let token = account
            .email_verification
            .as_ref()
            .expect("no verification token")
            .token
            .clone();
        let mail = self.confirmation_mail(email, &token);

        self.orchestrator
            .commit(AccountWrite::Insert(account), mail)
            .await
            .expect("signup commit failed")
    }

    /// Sign up and complete email verification.
    pub async fn verified_account(&self, email: &str, username: &str, password: &str) -> Account {
        let account = self.signed_up_account(email, username, password).await;
        let token = account
            .email_verification
            .as_ref()
            .expect("no verification token")
            .token
            .clone();
        let verified = self
            .engine
            .verify_email(&token)
            .await
            .expect("verify_email failed");
        self.repository
            .update(&verified)
            .await
            .expect("persisting verified account failed")
    }
}
