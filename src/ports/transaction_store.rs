//! Port for payment transaction persistence.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PlanId, Timestamp, TransactionId, UserId};
use crate::domain::payment::{PaymentTransaction, ProviderKind};

/// Outcome of a conditional status transition.
///
/// The store applies `UPDATE ... WHERE status = 'pending'` and reports
/// whether this caller won the race. `AlreadyDecided` is not an error:
/// a concurrent caller settled the row first and the terminal state holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// This call moved the row out of pending.
    Applied,
    /// The row was already terminal; nothing changed.
    AlreadyDecided,
}

/// Persistence port for payment transactions.
///
/// The compare-and-set transition methods are the only way a transaction
/// leaves the pending state; implementations must make them atomic.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persists a new pending transaction.
    async fn create(&self, transaction: &PaymentTransaction) -> Result<(), DomainError>;

    /// Looks up a transaction by its internal id.
    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Looks up a transaction by its short public reference.
    async fn find_by_short_id(
        &self,
        short_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Looks up a transaction by the provider's own reference.
    async fn find_by_provider_reference(
        &self,
        provider: ProviderKind,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError>;

    /// Returns another pending transaction for the same user and plan,
    /// excluding the given transaction itself.
    async fn find_other_pending(
        &self,
        user_id: &UserId,
        plan_id: &PlanId,
        exclude: &TransactionId,
    ) -> Result<Option<TransactionId>, DomainError>;

    /// Atomically moves a pending transaction to completed, recording the
    /// provider's reference and the completion time.
    async fn complete_if_pending(
        &self,
        id: &TransactionId,
        provider_txn_id: &str,
        completed_at: Timestamp,
    ) -> Result<StatusTransition, DomainError>;

    /// Atomically moves a pending transaction to failed.
    async fn fail_if_pending(
        &self,
        id: &TransactionId,
        provider_txn_id: &str,
    ) -> Result<StatusTransition, DomainError>;
}
