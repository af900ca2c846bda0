//! CreatePaymentHandler - Command handler for starting a checkout.
//!
//! Creates the pending transaction the provider will later reconcile
//! against, and builds the provider-specific payment link.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::{PlanId, TransactionId, UserId};
use crate::domain::payment::{PaymentError, PaymentTransaction, PlanCatalog, ProviderKind};
use crate::ports::{CheckoutProvider, TransactionStore, UserStore};

/// Command to start a checkout for a plan.
#[derive(Debug, Clone)]
pub struct CreatePaymentCommand {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub provider: ProviderKind,
}

/// Result of starting a checkout.
#[derive(Debug, Clone)]
pub struct CreatePaymentResult {
    pub transaction_id: TransactionId,
    /// Public reference the provider echoes back in webhooks.
    pub short_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Where to send the user to pay, when the provider has a hosted page.
    pub pay_url: Option<String>,
}

/// Handler for creating payment transactions.
pub struct CreatePaymentHandler {
    transactions: Arc<dyn TransactionStore>,
    users: Arc<dyn UserStore>,
    catalog: Arc<PlanCatalog>,
    checkouts: HashMap<ProviderKind, Arc<dyn CheckoutProvider>>,
}

impl CreatePaymentHandler {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        users: Arc<dyn UserStore>,
        catalog: Arc<PlanCatalog>,
        checkouts: HashMap<ProviderKind, Arc<dyn CheckoutProvider>>,
    ) -> Self {
        Self {
            transactions,
            users,
            catalog,
            checkouts,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreatePaymentCommand,
    ) -> Result<CreatePaymentResult, PaymentError> {
        let plan = self
            .catalog
            .get(&cmd.plan_id)
            .ok_or_else(|| PaymentError::plan_not_found(cmd.plan_id.as_str()))?;

        self.users
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(cmd.user_id))?;

        let transaction = PaymentTransaction::new_pending(
            cmd.user_id,
            cmd.plan_id.clone(),
            cmd.provider,
            plan.price,
        );

        // One live attempt per user and plan; a stale pending attempt must
        // fail or expire before a new one can start.
        if let Some(existing) = self
            .transactions
            .find_other_pending(&cmd.user_id, &cmd.plan_id, &transaction.id)
            .await?
        {
            return Err(PaymentError::duplicate_pending(cmd.user_id, existing));
        }

        self.transactions.create(&transaction).await?;

        // Providers without a hosted page (Google Play) have no checkout
        // registered; the client completes the purchase in-app instead.
        let pay_url = match self.checkouts.get(&cmd.provider) {
            Some(checkout) => Some(checkout.checkout_url(plan, &transaction.short_id).await?),
            None => None,
        };

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %cmd.user_id,
            plan_id = cmd.plan_id.as_str(),
            provider = cmd.provider.as_str(),
            "checkout started"
        );

        Ok(CreatePaymentResult {
            transaction_id: transaction.id,
            short_id: transaction.short_id,
            amount: transaction.amount.value(),
            pay_url,
        })
    }
}
