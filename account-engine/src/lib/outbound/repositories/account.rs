use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::Transaction;

use crate::account::errors::EngineError;
use crate::account::models::Account;
use crate::account::models::AccountId;
use crate::account::models::EmailAddress;
use crate::account::models::OneTimeToken;
use crate::account::models::RefreshToken;
use crate::account::models::Username;
use crate::account::ports::AccountRepository;
use crate::account::ports::AccountTransaction;

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, username, password_hash, is_email_verified,
           email_vrf_token, email_vrf_expires_at, pending_new_email,
           password_reset_token, password_reset_expires_at,
           refresh_token, refresh_issued_at, refresh_expires_at,
           created_at
    FROM accounts
"#;

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, condition: &str, value: &str) -> Result<Option<Account>, EngineError> {
        let sql = format!("{SELECT_COLUMNS} WHERE {condition}");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        row.map(account_from_row).transpose()
    }

    async fn exists(&self, condition: &str, value: &str) -> Result<bool, EngineError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM accounts WHERE {condition})");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        row.try_get(0)
            .map_err(|e| EngineError::Database(e.to_string()))
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn insert(&self, account: &Account) -> Result<Account, EngineError> {
        insert_with(&self.pool, account).await
    }

    async fn update(&self, account: &Account) -> Result<Account, EngineError> {
        update_with(&self.pool, account).await
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, EngineError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        row.map(account_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, EngineError> {
        self.find_one("email = $1", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, EngineError> {
        self.find_one("username = $1", username).await
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>, EngineError> {
        self.find_one("email_vrf_token = $1", token).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Account>, EngineError> {
        self.find_one("password_reset_token = $1", token).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, EngineError> {
        self.exists("email = $1", email).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, EngineError> {
        self.exists("username = $1", username).await
    }

    async fn verification_token_exists(&self, token: &str) -> Result<bool, EngineError> {
        self.exists("email_vrf_token = $1", token).await
    }

    async fn reset_token_exists(&self, token: &str) -> Result<bool, EngineError> {
        self.exists("password_reset_token = $1", token).await
    }

    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, EngineError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(Box::new(PostgresAccountTransaction { tx: Some(tx) }))
    }
}

/// An open Postgres transaction for account writes.
///
/// `commit`/`rollback` consume the inner transaction; a second terminal
/// call fails. Dropping without either rolls back (sqlx's drop behavior).
struct PostgresAccountTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresAccountTransaction {
    fn active(&mut self) -> Result<&mut Transaction<'static, Postgres>, EngineError> {
        self.tx
            .as_mut()
            .ok_or_else(|| EngineError::Database("transaction already completed".to_string()))
    }
}

#[async_trait]
impl AccountTransaction for PostgresAccountTransaction {
    async fn insert(&mut self, account: &Account) -> Result<Account, EngineError> {
        let tx = self.active()?;
        insert_with(&mut **tx, account).await
    }

    async fn update(&mut self, account: &Account) -> Result<Account, EngineError> {
        let tx = self.active()?;
        update_with(&mut **tx, account).await
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| EngineError::Database("transaction already completed".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| EngineError::Database("transaction already completed".to_string()))?;
        tx.rollback()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))
    }
}

async fn insert_with<'e, E>(executor: E, account: &Account) -> Result<Account, EngineError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO accounts (
            email, username, password_hash, is_email_verified,
            email_vrf_token, email_vrf_expires_at, pending_new_email,
            password_reset_token, password_reset_expires_at,
            refresh_token, refresh_issued_at, refresh_expires_at,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(account.email.as_str())
    .bind(account.username.as_str())
    .bind(&account.password_hash)
    .bind(account.is_email_verified)
    .bind(account.email_verification.as_ref().map(|t| t.token.as_str()))
    .bind(account.email_verification.as_ref().map(|t| t.expires_at))
    .bind(account.pending_new_email.as_ref().map(|e| e.as_str()))
    .bind(account.password_reset.as_ref().map(|t| t.token.as_str()))
    .bind(account.password_reset.as_ref().map(|t| t.expires_at))
    .bind(account.refresh_token.as_ref().map(|t| t.token.as_str()))
    .bind(account.refresh_token.as_ref().map(|t| t.issued_at))
    .bind(account.refresh_token.as_ref().map(|t| t.expires_at))
    .bind(account.created_at)
    .fetch_one(executor)
    .await
    .map_err(map_write_error)?;

    let id: i64 = row
        .try_get("id")
        .map_err(|e| EngineError::Database(e.to_string()))?;

    let mut saved = account.clone();
    saved.id = AccountId(id);
    Ok(saved)
}

async fn update_with<'e, E>(executor: E, account: &Account) -> Result<Account, EngineError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET email = $2, username = $3, password_hash = $4,
            is_email_verified = $5,
            email_vrf_token = $6, email_vrf_expires_at = $7,
            pending_new_email = $8,
            password_reset_token = $9, password_reset_expires_at = $10,
            refresh_token = $11, refresh_issued_at = $12, refresh_expires_at = $13
        WHERE id = $1
        "#,
    )
    .bind(account.id.0)
    .bind(account.email.as_str())
    .bind(account.username.as_str())
    .bind(&account.password_hash)
    .bind(account.is_email_verified)
    .bind(account.email_verification.as_ref().map(|t| t.token.as_str()))
    .bind(account.email_verification.as_ref().map(|t| t.expires_at))
    .bind(account.pending_new_email.as_ref().map(|e| e.as_str()))
    .bind(account.password_reset.as_ref().map(|t| t.token.as_str()))
    .bind(account.password_reset.as_ref().map(|t| t.expires_at))
    .bind(account.refresh_token.as_ref().map(|t| t.token.as_str()))
    .bind(account.refresh_token.as_ref().map(|t| t.issued_at))
    .bind(account.refresh_token.as_ref().map(|t| t.expires_at))
    .execute(executor)
    .await
    .map_err(map_write_error)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NotFound);
    }

    Ok(account.clone())
}

fn map_write_error(e: sqlx::Error) -> EngineError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            if db_err.constraint() == Some("accounts_email_key") {
                return EngineError::EmailTaken;
            }
            if db_err.constraint() == Some("accounts_username_key") {
                return EngineError::UsernameTaken;
            }
        }
    }
    EngineError::Database(e.to_string())
}

fn account_from_row(row: PgRow) -> Result<Account, EngineError> {
    let get_err = |e: sqlx::Error| EngineError::Database(e.to_string());

    let email: String = row.try_get("email").map_err(get_err)?;
    let username: String = row.try_get("username").map_err(get_err)?;
    let pending_new_email: Option<String> = row.try_get("pending_new_email").map_err(get_err)?;

    Ok(Account {
        id: AccountId(row.try_get("id").map_err(get_err)?),
        email: EmailAddress::new(email)?,
        username: Username::new(username)?,
        password_hash: row.try_get("password_hash").map_err(get_err)?,
        is_email_verified: row.try_get("is_email_verified").map_err(get_err)?,
        email_verification: one_time_token(
            row.try_get("email_vrf_token").map_err(get_err)?,
            row.try_get("email_vrf_expires_at").map_err(get_err)?,
        )?,
        pending_new_email: pending_new_email.map(EmailAddress::new).transpose()?,
        password_reset: one_time_token(
            row.try_get("password_reset_token").map_err(get_err)?,
            row.try_get("password_reset_expires_at").map_err(get_err)?,
        )?,
        refresh_token: refresh_token(
            row.try_get("refresh_token").map_err(get_err)?,
            row.try_get("refresh_issued_at").map_err(get_err)?,
            row.try_get("refresh_expires_at").map_err(get_err)?,
        )?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}

/// Rebuild a token/expiry pair; one half without the other is a corrupt row.
fn one_time_token(
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Option<OneTimeToken>, EngineError> {
    match (token, expires_at) {
        (Some(token), Some(expires_at)) => Ok(Some(OneTimeToken { token, expires_at })),
        (None, None) => Ok(None),
        _ => Err(EngineError::Database(
            "account row holds a token without its expiry".to_string(),
        )),
    }
}

fn refresh_token(
    token: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Option<RefreshToken>, EngineError> {
    match (token, issued_at, expires_at) {
        (Some(token), Some(issued_at), Some(expires_at)) => Ok(Some(RefreshToken {
            token,
            issued_at,
            expires_at,
        })),
        (None, None, None) => Ok(None),
        _ => Err(EngineError::Database(
            "account row holds a refresh token without its timestamps".to_string(),
        )),
    }
}
