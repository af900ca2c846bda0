//! Integration tests for the Click webhook flow.
//!
//! Exercises the full path a provider notification takes: form command,
//! MD5 signature verification, prepare/complete reconciliation, and the
//! subscription extension, over in-memory store implementations.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use secrecy::SecretString;
use tokio::sync::RwLock;

use linguapay::application::handlers::payment::{ClickWebhookCommand, ClickWebhookHandler};
use linguapay::domain::foundation::{
    DomainError, PlanId, Timestamp, TransactionId, UserId,
};
use linguapay::domain::payment::{
    ClickSignatureVerifier, MinorUnits, PaymentTransaction, ProviderKind, ReconciliationService,
    SignedFields, SubscriptionGrant, SubscriptionTier, TransactionStatus, WebhookAction,
    DEFAULT_CATALOG,
};
use linguapay::ports::{
    StatusTransition, TransactionStore, UserAccount, UserStore,
};

const SECRET: &str = "integration_secret_key";
const SERVICE_ID: i64 = 80012;

// =============================================================================
// Test Infrastructure
// =============================================================================

#[derive(Default)]
struct MemoryTransactionStore {
    rows: RwLock<HashMap<TransactionId, PaymentTransaction>>,
}

impl MemoryTransactionStore {
    async fn seed(&self, transaction: PaymentTransaction) {
        self.rows
            .write()
            .await
            .insert(transaction.id, transaction);
    }

    async fn get(&self, id: &TransactionId) -> PaymentTransaction {
        self.rows.read().await[id].clone()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create(&self, transaction: &PaymentTransaction) -> Result<(), DomainError> {
        self.rows
            .write()
            .await
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_short_id(
        &self,
        short_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
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
            .read()
            .await
            .values()
            .find(|t| t.provider == provider && t.provider_txn_id.as_deref() == Some(reference))
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
            .read()
            .await
            .values()
            .find(|t| {
                t.user_id == *user_id
                    && t.plan_id == *plan_id
                    && t.id != *exclude
                    && t.status == TransactionStatus::Pending
            })
            .map(|t| t.id))
    }

    async fn complete_if_pending(
        &self,
        id: &TransactionId,
        provider_txn_id: &str,
        completed_at: Timestamp,
    ) -> Result<StatusTransition, DomainError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(id)
            .ok_or_else(|| DomainError::database("missing row"))?;
        if row.status != TransactionStatus::Pending {
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
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(id)
            .ok_or_else(|| DomainError::database("missing row"))?;
        if row.status != TransactionStatus::Pending {
            return Ok(StatusTransition::AlreadyDecided);
        }
        row.status = TransactionStatus::Failed;
        row.provider_txn_id = Some(provider_txn_id.to_string());
        Ok(StatusTransition::Applied)
    }
}

struct MemoryUserStore {
    accounts: RwLock<HashMap<UserId, UserAccount>>,
    extension_calls: AtomicU32,
}

impl MemoryUserStore {
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
            accounts: RwLock::new(accounts),
            extension_calls: AtomicU32::new(0),
        }
    }

    async fn account(&self, user_id: &UserId) -> UserAccount {
        self.accounts.read().await[user_id].clone()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn update_subscription(
        &self,
        id: &UserId,
        grant: &SubscriptionGrant,
    ) -> Result<UserAccount, DomainError> {
        self.extension_calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| DomainError::database("missing user"))?;
        account.subscription_tier = grant.tier;
        account.subscription_expires_at = Some(grant.expires_at);
        Ok(account.clone())
    }
}

struct TestEnv {
    handler: Arc<ClickWebhookHandler>,
    transactions: Arc<MemoryTransactionStore>,
    users: Arc<MemoryUserStore>,
    user_id: UserId,
}

fn env() -> TestEnv {
    let user_id = UserId::new();
    let transactions = Arc::new(MemoryTransactionStore::default());
    let users = Arc::new(MemoryUserStore::with_user(user_id));
    let reconciliation = Arc::new(ReconciliationService::new(
        transactions.clone(),
        users.clone(),
        Arc::new(DEFAULT_CATALOG.clone()),
    ));
    let verifier = Arc::new(ClickSignatureVerifier::new(SecretString::new(
        SECRET.to_string(),
    )));
    TestEnv {
        handler: Arc::new(ClickWebhookHandler::new(verifier, reconciliation)),
        transactions,
        users,
        user_id,
    }
}

fn silver_transaction(user_id: UserId) -> PaymentTransaction {
    PaymentTransaction::new_pending(
        user_id,
        PlanId::new("silver_monthly").unwrap(),
        ProviderKind::Click,
        MinorUnits::new(100_000),
    )
}

/// Builds a correctly signed webhook command.
fn signed_command(
    click_trans_id: i64,
    merchant_trans_id: &str,
    merchant_prepare_id: Option<String>,
    amount_major: f64,
    action: i64,
    error: i64,
) -> ClickWebhookCommand {
    let signer = ClickSignatureVerifier::new(SecretString::new(SECRET.to_string()));
    let amount = MinorUnits::from_major(amount_major);
    let sign_time = "2026-08-29 10:15:00".to_string();

    let sign_string = signer.sign_hex(&SignedFields {
        click_trans_id,
        service_id: SERVICE_ID,
        merchant_trans_id,
        merchant_prepare_id: merchant_prepare_id.as_deref(),
        amount,
        action: WebhookAction::from_code(action).unwrap(),
        sign_time: &sign_time,
    });

    ClickWebhookCommand {
        click_trans_id,
        service_id: SERVICE_ID,
        merchant_trans_id: merchant_trans_id.to_string(),
        merchant_prepare_id,
        amount: amount_major,
        action,
        error,
        sign_time,
        sign_string,
    }
}

// =============================================================================
// Full handshake
// =============================================================================

#[tokio::test]
async fn prepare_then_complete_extends_subscription() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let prepare = env
        .handler
        .handle(signed_command(700_001, &tx.short_id, None, 1000.0, 0, 0))
        .await;
    assert_eq!(prepare.error, 0);
    let prepare_id = prepare.merchant_prepare_id.clone().unwrap();
    assert_eq!(prepare_id, tx.id.to_string());

    let complete = env
        .handler
        .handle(signed_command(
            700_001,
            &tx.short_id,
            Some(prepare_id),
            1000.0,
            1,
            0,
        ))
        .await;
    assert_eq!(complete.error, 0);
    assert_eq!(complete.merchant_confirm_id, Some(tx.id.to_string()));

    let stored = env.transactions.get(&tx.id).await;
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.provider_txn_id.as_deref(), Some("700001"));

    let account = env.users.account(&env.user_id).await;
    assert_eq!(account.subscription_tier, SubscriptionTier::Silver);
    assert!(account.subscription_expires_at.is_some());
}

#[tokio::test]
async fn corrupted_signature_leaves_transaction_pending() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let mut cmd = signed_command(700_002, &tx.short_id, None, 1000.0, 0, 0);
    cmd.sign_string = "0badc0ffee0badc0ffee0badc0ffee00".to_string();

    let result = env.handler.handle(cmd).await;

    assert_eq!(result.error, -1);
    assert_eq!(
        env.transactions.get(&tx.id).await.status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let mut cmd = signed_command(700_003, &tx.short_id, None, 1000.0, 0, 0);
    cmd.action = 2;

    assert_eq!(env.handler.handle(cmd).await.error, -3);
}

#[tokio::test]
async fn unknown_merchant_reference_is_rejected() {
    let env = env();

    let result = env
        .handler
        .handle(signed_command(700_004, "ffffffffffff", None, 1000.0, 0, 0))
        .await;

    assert_eq!(result.error, -6);
}

// =============================================================================
// Amounts
// =============================================================================

#[tokio::test]
async fn amount_within_one_minor_unit_is_accepted() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    // 999.99 sums = 99_999 tiyin, one short of the stored 100_000.
    let result = env
        .handler
        .handle(signed_command(700_005, &tx.short_id, None, 999.99, 0, 0))
        .await;

    assert_eq!(result.error, 0);
}

#[tokio::test]
async fn amount_outside_tolerance_is_rejected() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let result = env
        .handler
        .handle(signed_command(700_006, &tx.short_id, None, 999.0, 0, 0))
        .await;

    assert_eq!(result.error, -2);
    assert_eq!(
        env.transactions.get(&tx.id).await.status,
        TransactionStatus::Pending
    );
}

// =============================================================================
// Idempotency and concurrency
// =============================================================================

#[tokio::test]
async fn completed_transaction_replay_acknowledges_without_second_extension() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let complete = signed_command(
        700_007,
        &tx.short_id,
        Some(tx.id.to_string()),
        1000.0,
        1,
        0,
    );

    let first = env.handler.handle(complete.clone()).await;
    let second = env.handler.handle(complete).await;

    assert_eq!(first.error, 0);
    assert_eq!(second.error, 0);
    assert_eq!(env.users.extension_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replayed_prepare_after_completion_reports_already_paid() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    env.handler
        .handle(signed_command(
            700_008,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            0,
        ))
        .await;

    let result = env
        .handler
        .handle(signed_command(700_008, &tx.short_id, None, 1000.0, 0, 0))
        .await;

    assert_eq!(result.error, -4);
}

#[tokio::test]
async fn concurrent_completes_extend_exactly_once() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let futures = (0..10).map(|_| {
        let handler = env.handler.clone();
        let cmd = signed_command(
            700_009,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            0,
        );
        async move { handler.handle(cmd).await }
    });

    let results = join_all(futures).await;

    for result in &results {
        assert_eq!(result.error, 0, "every delivery must be acknowledged");
    }
    assert_eq!(env.users.extension_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Failure reporting
// =============================================================================

#[tokio::test]
async fn provider_reported_failure_marks_transaction_failed() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let result = env
        .handler
        .handle(signed_command(
            700_010,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            -5017,
        ))
        .await;

    assert_eq!(result.error, -9);
    assert_eq!(
        env.transactions.get(&tx.id).await.status,
        TransactionStatus::Failed
    );
    assert_eq!(env.users.extension_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failure_report_after_completion_does_not_revert_terminal_state() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    env.handler
        .handle(signed_command(
            700_011,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            0,
        ))
        .await;

    let result = env
        .handler
        .handle(signed_command(
            700_011,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            -1,
        ))
        .await;

    assert_eq!(result.error, 0, "terminal replays are acknowledged");
    assert_eq!(
        env.transactions.get(&tx.id).await.status,
        TransactionStatus::Completed
    );
    assert_eq!(env.users.extension_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn complete_replay_on_failed_transaction_is_acknowledged() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    env.handler
        .handle(signed_command(
            700_015,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            -5017,
        ))
        .await;

    let result = env
        .handler
        .handle(signed_command(
            700_015,
            &tx.short_id,
            Some(tx.id.to_string()),
            1000.0,
            1,
            0,
        ))
        .await;

    assert_eq!(result.error, 0, "retries against a decided transaction stop");
    assert_eq!(
        env.transactions.get(&tx.id).await.status,
        TransactionStatus::Failed
    );
    assert_eq!(env.users.extension_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn duplicate_pending_attempt_is_cancelled() {
    let env = env();
    let first = silver_transaction(env.user_id);
    let second = silver_transaction(env.user_id);
    env.transactions.seed(first.clone()).await;
    env.transactions.seed(second.clone()).await;

    let result = env
        .handler
        .handle(signed_command(700_012, &second.short_id, None, 1000.0, 0, 0))
        .await;

    assert_eq!(result.error, -9);
}

// =============================================================================
// Subscription arithmetic through the whole stack
// =============================================================================

#[tokio::test]
async fn second_purchase_extends_from_previous_expiry() {
    let env = env();
    let tx1 = silver_transaction(env.user_id);
    env.transactions.seed(tx1.clone()).await;

    env.handler
        .handle(signed_command(
            700_013,
            &tx1.short_id,
            Some(tx1.id.to_string()),
            1000.0,
            1,
            0,
        ))
        .await;
    let first_expiry = env
        .users
        .account(&env.user_id)
        .await
        .subscription_expires_at
        .unwrap();

    let tx2 = silver_transaction(env.user_id);
    env.transactions.seed(tx2.clone()).await;
    env.handler
        .handle(signed_command(
            700_014,
            &tx2.short_id,
            Some(tx2.id.to_string()),
            1000.0,
            1,
            0,
        ))
        .await;
    let second_expiry = env
        .users
        .account(&env.user_id)
        .await
        .subscription_expires_at
        .unwrap();

    // Second 30-day purchase lands on top of the first, not on top of now.
    assert_eq!(second_expiry, first_expiry.add_days(30));
}

#[tokio::test]
async fn prepare_id_is_a_valid_transaction_id() {
    let env = env();
    let tx = silver_transaction(env.user_id);
    env.transactions.seed(tx.clone()).await;

    let prepare = env
        .handler
        .handle(signed_command(700_015, &tx.short_id, None, 1000.0, 0, 0))
        .await;

    let id = TransactionId::from_str(&prepare.merchant_prepare_id.unwrap()).unwrap();
    assert_eq!(id, tx.id);
}
