//! Reconciliation of provider payment notifications.
//!
//! The service implements the two-step prepare/complete handshake used by
//! webhook providers and the single-step settlement used by client-verified
//! providers. All paths converge on one linearization point: the store's
//! conditional pending-to-terminal transition. Whoever wins that transition
//! applies the subscription extension exactly once; everyone else gets an
//! idempotent success acknowledgement with no side effects.

use std::sync::Arc;

use crate::domain::foundation::{PlanId, Timestamp, TransactionId, UserId};
use crate::ports::{StatusTransition, TransactionStore, UserAccount, UserStore, VerifiedPurchase};

use super::amount::MinorUnits;
use super::errors::PaymentError;
use super::plan::{Plan, PlanCatalog};
use super::subscription::{extend_from, SubscriptionGrant};
use super::transaction::{PaymentTransaction, TransactionStatus};
use super::ProviderKind;

/// Click's code for a transaction it reports as failed or cancelled.
const PROVIDER_CANCELLED_CODE: i64 = -9;

/// A prepare request, after signature verification and parsing.
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    /// The merchant reference the provider echoes back (our short id).
    pub merchant_reference: String,
    /// Amount the provider claims, in minor units.
    pub claimed_amount: MinorUnits,
}

/// Successful prepare: the token the provider must echo at complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareReceipt {
    pub transaction_id: TransactionId,
}

/// A complete request, after signature verification and parsing.
#[derive(Debug, Clone)]
pub struct CompleteRequest {
    pub merchant_reference: String,
    /// The prepare token issued earlier.
    pub prepare_id: TransactionId,
    /// The provider's own transaction reference.
    pub provider_txn_id: String,
    pub claimed_amount: MinorUnits,
    /// Provider-reported status code; negative means the provider itself
    /// failed or cancelled the payment.
    pub provider_error: i64,
}

/// Successful settlement, first-time or replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub transaction_id: TransactionId,
    /// True only for the call that won the pending-to-completed
    /// transition. Replays and race losers report false.
    pub extension_applied: bool,
    pub grant: Option<SubscriptionGrant>,
}

/// Core payment reconciliation service.
pub struct ReconciliationService {
    transactions: Arc<dyn TransactionStore>,
    users: Arc<dyn UserStore>,
    catalog: Arc<PlanCatalog>,
}

impl ReconciliationService {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        users: Arc<dyn UserStore>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            transactions,
            users,
            catalog,
        }
    }

    /// Validates a payment attempt before the provider charges the user.
    ///
    /// Prepare never mutates the transaction. A re-prepare of a still
    /// pending transaction is a no-op success returning the same receipt.
    ///
    /// # Errors
    ///
    /// - `TransactionNotFound` - no transaction carries this reference
    /// - `ProviderReportedCancellation` - the transaction already failed
    /// - `AlreadyProcessed` - the transaction already completed
    /// - `DuplicatePendingTransaction` - another pending attempt exists
    ///   for the same user and plan
    /// - `AmountMismatch` - claimed amount outside tolerance
    /// - `UserNotFound` - the owning user no longer exists
    pub async fn prepare(&self, request: PrepareRequest) -> Result<PrepareReceipt, PaymentError> {
        let transaction = self
            .transactions
            .find_by_short_id(&request.merchant_reference)
            .await?
            .ok_or_else(|| PaymentError::not_found(&request.merchant_reference))?;

        self.check_replayable(&transaction)?;
        let plan = self.plan_for(&transaction.plan_id)?;

        if let Some(existing) = self
            .transactions
            .find_other_pending(&transaction.user_id, &transaction.plan_id, &transaction.id)
            .await?
        {
            return Err(PaymentError::duplicate_pending(
                transaction.user_id,
                existing,
            ));
        }

        self.check_amount(&transaction, plan, request.claimed_amount)?;
        self.require_user(&transaction.user_id).await?;

        Ok(PrepareReceipt {
            transaction_id: transaction.id,
        })
    }

    /// Settles a payment the provider reports as charged.
    ///
    /// The conditional store transition is the only decision point; a
    /// replay or a concurrent loser observes `AlreadyDecided` and returns
    /// success without touching the subscription. Replays against a
    /// terminal transaction, including repeated cancellations, are acked
    /// with success so the provider's retry loop terminates.
    ///
    /// # Errors
    ///
    /// - `ProviderReportedCancellation` - negative provider status that
    ///   marked a still-pending transaction failed
    /// - `TransactionNotFound` - the prepare token matches no transaction
    ///   with this merchant reference
    /// - `AmountMismatch` - claimed amount outside tolerance
    /// - `UserNotFound` - the owning user no longer exists
    pub async fn complete(
        &self,
        request: CompleteRequest,
    ) -> Result<CompletionOutcome, PaymentError> {
        if request.provider_error < 0 {
            // Marking failed is itself conditional; an already-decided
            // transaction keeps its terminal state and the cancellation
            // is acked as a no-op instead of re-failing anything.
            let transition = self
                .transactions
                .fail_if_pending(&request.prepare_id, &request.provider_txn_id)
                .await?;
            return match transition {
                StatusTransition::Applied => Err(PaymentError::ProviderReportedCancellation {
                    provider_code: request.provider_error,
                }),
                StatusTransition::AlreadyDecided => Ok(CompletionOutcome {
                    transaction_id: request.prepare_id,
                    extension_applied: false,
                    grant: None,
                }),
            };
        }

        let transaction = self
            .transactions
            .find_by_id(&request.prepare_id)
            .await?
            .filter(|t| t.short_id == request.merchant_reference)
            .ok_or_else(|| PaymentError::not_found(request.prepare_id.to_string()))?;

        let plan = self.plan_for(&transaction.plan_id)?;

        if transaction.status.is_terminal() {
            // Idempotent replay of an already decided payment. Completed
            // and failed alike are acked without re-running side effects.
            return Ok(CompletionOutcome {
                transaction_id: transaction.id,
                extension_applied: false,
                grant: None,
            });
        }

        self.check_amount(&transaction, plan, request.claimed_amount)?;
        let user = self.require_user(&transaction.user_id).await?;

        self.settle(&transaction, plan, &request.provider_txn_id, user.subscription_expires_at)
            .await
    }

    /// Settles a purchase confirmed directly with the provider.
    ///
    /// Used by providers without a webhook handshake: the transaction row
    /// is created on demand, keyed by the provider's own reference, then
    /// settled through the same conditional transition as webhooks.
    pub async fn apply_verified_purchase(
        &self,
        user_id: &UserId,
        plan_id: &PlanId,
        provider: ProviderKind,
        purchase: &VerifiedPurchase,
    ) -> Result<CompletionOutcome, PaymentError> {
        let plan = self
            .catalog
            .get(plan_id)
            .ok_or_else(|| PaymentError::plan_not_found(plan_id.as_str()))?;
        let user = self.require_user(user_id).await?;

        let transaction = match self
            .transactions
            .find_by_provider_reference(provider, &purchase.provider_reference)
            .await?
        {
            Some(existing) => existing,
            None => {
                self.record_purchase(user_id, plan, provider, &purchase.provider_reference)
                    .await?
            }
        };

        match transaction.status {
            TransactionStatus::Completed => Ok(CompletionOutcome {
                transaction_id: transaction.id,
                extension_applied: false,
                grant: None,
            }),
            TransactionStatus::Failed => Err(PaymentError::ProviderReportedCancellation {
                provider_code: PROVIDER_CANCELLED_CODE,
            }),
            TransactionStatus::Pending => {
                self.settle(
                    &transaction,
                    plan,
                    &purchase.provider_reference,
                    user.subscription_expires_at,
                )
                .await
            }
        }
    }

    /// Drives a pending transaction through the conditional completion
    /// and, on winning, applies the subscription extension.
    async fn settle(
        &self,
        transaction: &PaymentTransaction,
        plan: &Plan,
        provider_txn_id: &str,
        current_expiry: Option<Timestamp>,
    ) -> Result<CompletionOutcome, PaymentError> {
        let now = Timestamp::now();

        let transition = self
            .transactions
            .complete_if_pending(&transaction.id, provider_txn_id, now)
            .await?;

        match transition {
            StatusTransition::AlreadyDecided => {
                // A concurrent caller settled this transaction; its
                // extension already happened.
                tracing::debug!(
                    transaction_id = %transaction.id,
                    "completion lost the race, acknowledging without side effects"
                );
                Ok(CompletionOutcome {
                    transaction_id: transaction.id,
                    extension_applied: false,
                    grant: None,
                })
            }
            StatusTransition::Applied => {
                let grant = extend_from(current_expiry, now, plan);
                let updated = self
                    .users
                    .update_subscription(&transaction.user_id, &grant)
                    .await?;

                tracing::info!(
                    transaction_id = %transaction.id,
                    user_id = %transaction.user_id,
                    plan_id = transaction.plan_id.as_str(),
                    tier = grant.tier.as_str(),
                    expires_at = %grant.expires_at,
                    "payment settled, subscription extended"
                );
                debug_assert_eq!(updated.subscription_expires_at, Some(grant.expires_at));

                Ok(CompletionOutcome {
                    transaction_id: transaction.id,
                    extension_applied: true,
                    grant: Some(grant),
                })
            }
        }
    }

    /// Creates the on-demand transaction row for a client-verified
    /// purchase. On a creation race the existing row is reused.
    async fn record_purchase(
        &self,
        user_id: &UserId,
        plan: &Plan,
        provider: ProviderKind,
        provider_reference: &str,
    ) -> Result<PaymentTransaction, PaymentError> {
        let amount = match provider {
            ProviderKind::GooglePlay => plan.price_usd_cents,
            _ => plan.price,
        };
        let mut transaction =
            PaymentTransaction::new_pending(*user_id, plan.id.clone(), provider, amount);
        // The provider reference is known up front here, unlike the
        // webhook flow where it arrives at completion.
        transaction.provider_txn_id = Some(provider_reference.to_string());

        match self.transactions.create(&transaction).await {
            Ok(()) => Ok(transaction),
            Err(create_err) => {
                // Two concurrent verifications can both miss the lookup;
                // the unique provider reference makes one insert lose.
                match self
                    .transactions
                    .find_by_provider_reference(provider, provider_reference)
                    .await?
                {
                    Some(existing) => Ok(existing),
                    None => Err(create_err.into()),
                }
            }
        }
    }

    fn plan_for(&self, plan_id: &PlanId) -> Result<&Plan, PaymentError> {
        self.catalog
            .get(plan_id)
            .ok_or_else(|| PaymentError::plan_not_found(plan_id.as_str()))
    }

    /// Rejects prepare attempts against terminal transactions.
    fn check_replayable(&self, transaction: &PaymentTransaction) -> Result<(), PaymentError> {
        match transaction.status {
            TransactionStatus::Pending => Ok(()),
            TransactionStatus::Completed => Err(PaymentError::AlreadyProcessed(transaction.id)),
            TransactionStatus::Failed => Err(PaymentError::ProviderReportedCancellation {
                provider_code: PROVIDER_CANCELLED_CODE,
            }),
        }
    }

    /// Checks the claimed amount against the stored transaction amount,
    /// within the rounding tolerance.
    fn check_amount(
        &self,
        transaction: &PaymentTransaction,
        plan: &Plan,
        claimed: MinorUnits,
    ) -> Result<(), PaymentError> {
        // The stored amount is canonical; the plan price is only logged
        // when they disagree, which signals catalog drift.
        if transaction.amount.value() != plan.price.value() {
            tracing::warn!(
                transaction_id = %transaction.id,
                stored = transaction.amount.value(),
                plan_price = plan.price.value(),
                "stored transaction amount differs from current plan price"
            );
        }

        if !transaction.amount.matches(claimed) {
            return Err(PaymentError::amount_mismatch(
                transaction.amount.value(),
                claimed.value(),
            ));
        }
        Ok(())
    }

    async fn require_user(&self, user_id: &UserId) -> Result<UserAccount, PaymentError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(*user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::DomainError;
    use crate::domain::payment::plan::{self, SubscriptionTier};
    use crate::ports::UserAccount;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // ══════════════════════════════════════════════════════════════════
    // In-memory test doubles
    // ══════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct InMemoryTransactionStore {
        rows: Mutex<HashMap<TransactionId, PaymentTransaction>>,
        complete_calls: AtomicU32,
    }

    impl InMemoryTransactionStore {
        fn seed(&self, transaction: PaymentTransaction) {
            self.rows
                .lock()
                .unwrap()
                .insert(transaction.id, transaction);
        }

        fn status_of(&self, id: &TransactionId) -> TransactionStatus {
            self.rows.lock().unwrap()[id].status
        }
    }

    #[async_trait]
    impl TransactionStore for InMemoryTransactionStore {
        async fn create(&self, transaction: &PaymentTransaction) -> Result<(), DomainError> {
            self.rows
                .lock()
                .unwrap()
                .insert(transaction.id, transaction.clone());
            Ok(())
        }

        async fn find_by_id(
            &self,
            id: &TransactionId,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }

        async fn find_by_short_id(
            &self,
            short_id: &str,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|t| t.short_id == short_id)
                .cloned())
        }

        async fn find_by_provider_reference(
            &self,
            provider: ProviderKind,
            reference: &str,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|t| {
                    t.provider == provider && t.provider_txn_id.as_deref() == Some(reference)
                })
                .cloned())
        }

        async fn find_other_pending(
            &self,
            user_id: &UserId,
            plan_id: &PlanId,
            exclude: &TransactionId,
        ) -> Result<Option<TransactionId>, DomainError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|t| {
                    t.user_id == *user_id
                        && t.plan_id == *plan_id
                        && t.id != *exclude
                        && t.is_pending()
                })
                .map(|t| t.id))
        }

        async fn complete_if_pending(
            &self,
            id: &TransactionId,
            provider_txn_id: &str,
            completed_at: Timestamp,
        ) -> Result<StatusTransition, DomainError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(id)
                .ok_or_else(|| DomainError::database("row vanished"))?;
            if !row.is_pending() {
                return Ok(StatusTransition::AlreadyDecided);
            }
            row.status = TransactionStatus::Completed;
            row.provider_txn_id = Some(provider_txn_id.to_string());
            row.completed_at = Some(completed_at);
            Ok(StatusTransition::Applied)
        }

        async fn fail_if_pending(
            &self,
            id: &TransactionId,
            provider_txn_id: &str,
        ) -> Result<StatusTransition, DomainError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(id)
                .ok_or_else(|| DomainError::database("row vanished"))?;
            if !row.is_pending() {
                return Ok(StatusTransition::AlreadyDecided);
            }
            row.status = TransactionStatus::Failed;
            row.provider_txn_id = Some(provider_txn_id.to_string());
            Ok(StatusTransition::Applied)
        }
    }

    struct InMemoryUserStore {
        accounts: Mutex<HashMap<UserId, UserAccount>>,
        extension_calls: AtomicU32,
    }

    impl InMemoryUserStore {
        fn with_user(user_id: UserId) -> Self {
            let mut accounts = HashMap::new();
            accounts.insert(
                user_id,
                UserAccount {
                    id: user_id,
                    subscription_tier: SubscriptionTier::Free,
                    subscription_expires_at: None,
                },
            );
            Self {
                accounts: Mutex::new(accounts),
                extension_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl UserStore for InMemoryUserStore {
        async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError> {
            Ok(self.accounts.lock().unwrap().get(id).cloned())
        }

        async fn update_subscription(
            &self,
            id: &UserId,
            grant: &SubscriptionGrant,
        ) -> Result<UserAccount, DomainError> {
            self.extension_calls.fetch_add(1, Ordering::SeqCst);
            let mut accounts = self.accounts.lock().unwrap();
            let account = accounts
                .get_mut(id)
                .ok_or_else(|| DomainError::database("user vanished"))?;
            account.subscription_tier = grant.tier;
            account.subscription_expires_at = Some(grant.expires_at);
            Ok(account.clone())
        }
    }

    // ══════════════════════════════════════════════════════════════════
    // Fixtures
    // ══════════════════════════════════════════════════════════════════

    struct Harness {
        service: ReconciliationService,
        transactions: Arc<InMemoryTransactionStore>,
        users: Arc<InMemoryUserStore>,
        user_id: UserId,
    }

    fn harness() -> Harness {
        let user_id = UserId::new();
        let transactions = Arc::new(InMemoryTransactionStore::default());
        let users = Arc::new(InMemoryUserStore::with_user(user_id));
        let service = ReconciliationService::new(
            transactions.clone(),
            users.clone(),
            Arc::new(plan::DEFAULT_CATALOG.clone()),
        );
        Harness {
            service,
            transactions,
            users,
            user_id,
        }
    }

    fn silver_id() -> PlanId {
        PlanId::new("silver_monthly").unwrap()
    }

    fn pending_silver(user_id: UserId) -> PaymentTransaction {
        PaymentTransaction::new_pending(
            user_id,
            silver_id(),
            ProviderKind::Click,
            MinorUnits::new(100_000),
        )
    }

    fn prepare_request(transaction: &PaymentTransaction) -> PrepareRequest {
        PrepareRequest {
            merchant_reference: transaction.short_id.clone(),
            claimed_amount: transaction.amount,
        }
    }

    fn complete_request(transaction: &PaymentTransaction) -> CompleteRequest {
        CompleteRequest {
            merchant_reference: transaction.short_id.clone(),
            prepare_id: transaction.id,
            provider_txn_id: "click-12345".to_string(),
            claimed_amount: transaction.amount,
            provider_error: 0,
        }
    }

    // ══════════════════════════════════════════════════════════════════
    // Prepare
    // ══════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn prepare_returns_transaction_id_without_mutation() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let receipt = h.service.prepare(prepare_request(&tx)).await.unwrap();

        assert_eq!(receipt.transaction_id, tx.id);
        assert_eq!(h.transactions.status_of(&tx.id), TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn prepare_of_unknown_reference_is_not_found() {
        let h = harness();

        let err = h
            .service
            .prepare(PrepareRequest {
                merchant_reference: "ffffffffffff".to_string(),
                claimed_amount: MinorUnits::new(100_000),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn prepare_replay_of_pending_transaction_succeeds() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let first = h.service.prepare(prepare_request(&tx)).await.unwrap();
        let second = h.service.prepare(prepare_request(&tx)).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn prepare_of_completed_transaction_is_already_processed() {
        let h = harness();
        let mut tx = pending_silver(h.user_id);
        tx.status = TransactionStatus::Completed;
        h.transactions.seed(tx.clone());

        let err = h.service.prepare(prepare_request(&tx)).await.unwrap_err();

        assert_eq!(err, PaymentError::AlreadyProcessed(tx.id));
    }

    #[tokio::test]
    async fn prepare_rejects_second_pending_attempt_for_same_plan() {
        let h = harness();
        let first = pending_silver(h.user_id);
        let second = pending_silver(h.user_id);
        h.transactions.seed(first.clone());
        h.transactions.seed(second.clone());

        let err = h.service.prepare(prepare_request(&second)).await.unwrap_err();

        assert_eq!(
            err,
            PaymentError::duplicate_pending(h.user_id, first.id)
        );
    }

    #[tokio::test]
    async fn prepare_tolerates_one_minor_unit_of_rounding() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut request = prepare_request(&tx);
        request.claimed_amount = MinorUnits::new(tx.amount.value() - 1);

        assert!(h.service.prepare(request).await.is_ok());
    }

    #[tokio::test]
    async fn prepare_rejects_amount_outside_tolerance() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut request = prepare_request(&tx);
        request.claimed_amount = MinorUnits::new(tx.amount.value() - 2);

        let err = h.service.prepare(request).await.unwrap_err();
        assert_eq!(
            err,
            PaymentError::amount_mismatch(tx.amount.value(), tx.amount.value() - 2)
        );
    }

    // ══════════════════════════════════════════════════════════════════
    // Complete
    // ══════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn complete_settles_and_extends_subscription() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let outcome = h.service.complete(complete_request(&tx)).await.unwrap();

        assert!(outcome.extension_applied);
        let grant = outcome.grant.unwrap();
        assert_eq!(grant.tier, SubscriptionTier::Silver);
        assert_eq!(
            h.transactions.status_of(&tx.id),
            TransactionStatus::Completed
        );
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn complete_replay_acknowledges_without_second_extension() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let first = h.service.complete(complete_request(&tx)).await.unwrap();
        let second = h.service.complete(complete_request(&tx)).await.unwrap();

        assert!(first.extension_applied);
        assert!(!second.extension_applied);
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn complete_with_provider_error_marks_failed() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut request = complete_request(&tx);
        request.provider_error = -5017;

        let err = h.service.complete(request).await.unwrap_err();

        assert_eq!(
            err,
            PaymentError::ProviderReportedCancellation {
                provider_code: -5017
            }
        );
        assert_eq!(h.transactions.status_of(&tx.id), TransactionStatus::Failed);
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_error_after_completion_is_acked_without_refailing() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        h.service.complete(complete_request(&tx)).await.unwrap();

        let mut request = complete_request(&tx);
        request.provider_error = -1;
        let outcome = h.service.complete(request).await.unwrap();

        assert!(!outcome.extension_applied);
        assert_eq!(
            h.transactions.status_of(&tx.id),
            TransactionStatus::Completed
        );
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_cancellation_is_acked_after_first_failure() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut request = complete_request(&tx);
        request.provider_error = -5017;
        h.service.complete(request.clone()).await.unwrap_err();

        let outcome = h.service.complete(request).await.unwrap();

        assert!(!outcome.extension_applied);
        assert_eq!(h.transactions.status_of(&tx.id), TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn complete_replay_on_failed_transaction_is_acked() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut cancellation = complete_request(&tx);
        cancellation.provider_error = -5017;
        h.service.complete(cancellation).await.unwrap_err();

        let outcome = h.service.complete(complete_request(&tx)).await.unwrap();

        assert!(!outcome.extension_applied);
        assert!(outcome.grant.is_none());
        assert_eq!(h.transactions.status_of(&tx.id), TransactionStatus::Failed);
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn complete_with_mismatched_reference_is_not_found() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut request = complete_request(&tx);
        request.merchant_reference = "000000000000".to_string();

        let err = h.service.complete(request).await.unwrap_err();
        assert!(matches!(err, PaymentError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn complete_amount_mismatch_leaves_transaction_pending() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let mut request = complete_request(&tx);
        request.claimed_amount = MinorUnits::new(50_000);

        let err = h.service.complete(request).await.unwrap_err();

        assert!(matches!(err, PaymentError::AmountMismatch { .. }));
        assert_eq!(h.transactions.status_of(&tx.id), TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_completions_extend_exactly_once() {
        let h = harness();
        let tx = pending_silver(h.user_id);
        h.transactions.seed(tx.clone());

        let service = Arc::new(h.service);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = service.clone();
            let request = complete_request(&tx);
            handles.push(tokio::spawn(async move { svc.complete(request).await }));
        }

        let mut winners = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            if outcome.extension_applied {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 1);
    }

    // ══════════════════════════════════════════════════════════════════
    // Client-verified purchases
    // ══════════════════════════════════════════════════════════════════

    fn verified(reference: &str) -> VerifiedPurchase {
        VerifiedPurchase {
            provider_reference: reference.to_string(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn verified_purchase_creates_and_settles_transaction() {
        let h = harness();

        let outcome = h
            .service
            .apply_verified_purchase(
                &h.user_id,
                &silver_id(),
                ProviderKind::GooglePlay,
                &verified("GPA.1234-5678"),
            )
            .await
            .unwrap();

        assert!(outcome.extension_applied);
        assert_eq!(
            h.transactions.status_of(&outcome.transaction_id),
            TransactionStatus::Completed
        );
    }

    #[tokio::test]
    async fn verified_purchase_replay_is_idempotent() {
        let h = harness();

        let first = h
            .service
            .apply_verified_purchase(
                &h.user_id,
                &silver_id(),
                ProviderKind::GooglePlay,
                &verified("GPA.1234-5678"),
            )
            .await
            .unwrap();
        let second = h
            .service
            .apply_verified_purchase(
                &h.user_id,
                &silver_id(),
                ProviderKind::GooglePlay,
                &verified("GPA.1234-5678"),
            )
            .await
            .unwrap();

        assert_eq!(first.transaction_id, second.transaction_id);
        assert!(!second.extension_applied);
        assert_eq!(h.users.extension_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn verified_purchase_for_unknown_plan_is_rejected() {
        let h = harness();

        let err = h
            .service
            .apply_verified_purchase(
                &h.user_id,
                &PlanId::new("platinum_lifetime").unwrap(),
                ProviderKind::GooglePlay,
                &verified("GPA.0000"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::PlanNotFound(_)));
    }
}
