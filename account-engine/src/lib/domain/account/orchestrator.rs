use std::sync::Arc;

use crate::account::errors::EngineError;
use crate::account::models::Account;
use crate::account::ports::AccountRepository;
use crate::account::ports::MailRequest;
use crate::account::ports::Notifier;

/// The account write a gated commit should flush.
#[derive(Debug, Clone)]
pub enum AccountWrite {
    /// First persistence of a new account; the returned copy carries the
    /// store-assigned id.
    Insert(Account),
    Update(Account),
}

/// Couples a persistence commit to an email under an all-or-nothing
/// contract.
///
/// The write is flushed inside a transaction, then the notifier is called;
/// if delivery fails the transaction is rolled back and the notifier's
/// error is surfaced. An account is never left durable in a state that
/// promised an email which was not sent.
pub struct MailGatedCommit<R, N>
where
    R: AccountRepository,
    N: Notifier,
{
    repository: Arc<R>,
    notifier: Arc<N>,
}

impl<R, N> MailGatedCommit<R, N>
where
    R: AccountRepository,
    N: Notifier,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>) -> Self {
        Self {
            repository,
            notifier,
        }
    }

    /// Flush the write, send the mail, then commit.
    ///
    /// # Errors
    /// * Any repository error from the flush (transaction rolled back)
    /// * `Notification` (500) - Delivery failed, transaction rolled back
    pub async fn commit(
        &self,
        write: AccountWrite,
        mail: MailRequest,
    ) -> Result<Account, EngineError> {
        let mut tx = self.repository.begin().await?;

        let flushed = match &write {
            AccountWrite::Insert(account) => tx.insert(account).await,
            AccountWrite::Update(account) => tx.update(account).await,
        };
        let saved = match flushed {
            Ok(saved) => saved,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!("rollback after failed flush also failed: {rb}");
                }
                return Err(e);
            }
        };

        if let Err(send_err) = self.notifier.send(&mail).await {
            tracing::warn!(
                recipient = %mail.recipient,
                "notification failed, rolling back account write: {send_err}"
            );
            if let Err(rb) = tx.rollback().await {
                // The notifier error is still the one the caller needs.
                tracing::error!("rollback after failed notification also failed: {rb}");
            }
            return Err(EngineError::Notification(send_err));
        }

        tx.commit().await?;
        Ok(saved)
    }
}
