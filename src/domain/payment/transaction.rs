//! Payment transaction entity and its status state machine.
//!
//! A `PaymentTransaction` is the single source of truth for "has this
//! payment been credited yet". Rows are created `Pending`, transition at
//! most once to `Completed` or `Failed` via an atomic conditional update
//! in the store, and are never deleted (audit trail).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{PlanId, Timestamp, TransactionId, UserId};

use super::amount::MinorUnits;
use super::provider::ProviderKind;

/// Lifecycle status of a payment transaction.
///
/// `Pending` is the only non-terminal state. No transition out of
/// `Completed` or `Failed` exists anywhere in the codebase; the store
/// enforces this with `WHERE status = 'pending'` conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single payment attempt for one user and plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Internal id; doubles as the prepare token echoed back by webhook
    /// gateways on completion.
    pub id: TransactionId,
    /// Short provider-facing reference code, distinct from `id` so the
    /// first callback can locate the row without knowing internals.
    pub short_id: String,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub provider: ProviderKind,
    /// Amount in minor currency units. Never floating point.
    pub amount: MinorUnits,
    pub status: TransactionStatus,
    /// The provider's own transaction identifier, recorded once known.
    pub provider_txn_id: Option<String>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl PaymentTransaction {
    /// Creates a fresh pending transaction for a payment attempt.
    pub fn new_pending(
        user_id: UserId,
        plan_id: PlanId,
        provider: ProviderKind,
        amount: MinorUnits,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            short_id: generate_short_id(),
            user_id,
            plan_id,
            provider,
            amount,
            status: TransactionStatus::Pending,
            provider_txn_id: None,
            created_at: Timestamp::now(),
            completed_at: None,
        }
    }

    /// Returns true if this transaction can still be decided.
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }
}

/// Generates a short user/provider-facing reference code.
///
/// Twelve hex characters from a fresh UUID; short enough for payment forms
/// and SMS receipts, long enough that guessing is impractical.
pub fn generate_short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
