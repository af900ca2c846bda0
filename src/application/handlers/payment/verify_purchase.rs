//! VerifyPurchaseHandler - Command handler for client-verified purchases.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::{PlanId, TransactionId, UserId};
use crate::domain::payment::{
    PaymentError, PlanCatalog, ProviderKind, ReconciliationService, SubscriptionGrant,
};
use crate::ports::PurchaseVerifier;

/// Command to verify a purchase token with its provider.
#[derive(Debug, Clone)]
pub struct VerifyPurchaseCommand {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub provider: ProviderKind,
    /// Provider-specific proof: a Play Billing purchase token or a Payme
    /// receipt id.
    pub token: String,
}

/// Result of a verified purchase.
#[derive(Debug, Clone)]
pub struct VerifyPurchaseResult {
    pub transaction_id: TransactionId,
    /// False when this was a replay of an already settled purchase.
    pub extension_applied: bool,
    pub grant: Option<SubscriptionGrant>,
}

/// Handler dispatching purchase verification to the right provider.
pub struct VerifyPurchaseHandler {
    verifiers: HashMap<ProviderKind, Arc<dyn PurchaseVerifier>>,
    reconciliation: Arc<ReconciliationService>,
    catalog: Arc<PlanCatalog>,
}

impl VerifyPurchaseHandler {
    pub fn new(
        verifiers: HashMap<ProviderKind, Arc<dyn PurchaseVerifier>>,
        reconciliation: Arc<ReconciliationService>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        Self {
            verifiers,
            reconciliation,
            catalog,
        }
    }

    pub async fn handle(
        &self,
        cmd: VerifyPurchaseCommand,
    ) -> Result<VerifyPurchaseResult, PaymentError> {
        let plan = self
            .catalog
            .get(&cmd.plan_id)
            .ok_or_else(|| PaymentError::plan_not_found(cmd.plan_id.as_str()))?;

        let verifier = self.verifiers.get(&cmd.provider).ok_or_else(|| {
            PaymentError::verification_failed(format!(
                "Provider {} does not support client verification",
                cmd.provider.as_str()
            ))
        })?;

        let purchase = verifier.verify(&cmd.token, plan).await?;

        let outcome = self
            .reconciliation
            .apply_verified_purchase(&cmd.user_id, &cmd.plan_id, cmd.provider, &purchase)
            .await?;

        Ok(VerifyPurchaseResult {
            transaction_id: outcome.transaction_id,
            extension_applied: outcome.extension_applied,
            grant: outcome.grant,
        })
    }
}
