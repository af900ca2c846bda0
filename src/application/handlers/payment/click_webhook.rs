//! ClickWebhookHandler - Command handler for inbound Click webhooks.
//!
//! Click always expects HTTP 200 with its own error vocabulary in the
//! body, so this handler never fails; every outcome is folded into a
//! `ClickWebhookResult` carrying the Click code.
//!
//! | Click code | Meaning |
//! |-----------:|---------|
//! | 0 | Success |
//! | -1 | Signature check failed |
//! | -2 | Incorrect amount |
//! | -3 | Action not found |
//! | -4 | Already paid |
//! | -5 | User or plan does not exist |
//! | -6 | Transaction does not exist |
//! | -7 | Failed to update user |
//! | -8 | Error in request from Click |
//! | -9 | Transaction cancelled |

use std::str::FromStr;
use std::sync::Arc;

use crate::domain::foundation::TransactionId;
use crate::domain::payment::{
    ClickSignatureVerifier, CompleteRequest, MinorUnits, PaymentError, PrepareRequest,
    ReconciliationService, SignedFields, WebhookAction,
};

/// Command carrying the parsed Click webhook form.
#[derive(Debug, Clone)]
pub struct ClickWebhookCommand {
    pub click_trans_id: i64,
    pub service_id: i64,
    pub merchant_trans_id: String,
    pub merchant_prepare_id: Option<String>,
    /// Amount in major units, as Click sends it.
    pub amount: f64,
    pub action: i64,
    /// Click's own status; negative means the payment failed upstream.
    pub error: i64,
    pub sign_time: String,
    pub sign_string: String,
}

/// Body Click expects back, echoing its identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickWebhookResult {
    pub click_trans_id: i64,
    pub merchant_trans_id: String,
    pub merchant_prepare_id: Option<String>,
    pub merchant_confirm_id: Option<String>,
    pub error: i64,
    pub error_note: &'static str,
}

impl ClickWebhookResult {
    fn success(cmd: &ClickWebhookCommand) -> Self {
        Self {
            click_trans_id: cmd.click_trans_id,
            merchant_trans_id: cmd.merchant_trans_id.clone(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: 0,
            error_note: "Success",
        }
    }

    fn failure(cmd: &ClickWebhookCommand, error: i64, error_note: &'static str) -> Self {
        Self {
            click_trans_id: cmd.click_trans_id,
            merchant_trans_id: cmd.merchant_trans_id.clone(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error,
            error_note,
        }
    }
}

/// Handler for the Click prepare/complete webhook.
pub struct ClickWebhookHandler {
    verifier: Arc<ClickSignatureVerifier>,
    reconciliation: Arc<ReconciliationService>,
}

impl ClickWebhookHandler {
    pub fn new(
        verifier: Arc<ClickSignatureVerifier>,
        reconciliation: Arc<ReconciliationService>,
    ) -> Self {
        Self {
            verifier,
            reconciliation,
        }
    }

    pub async fn handle(&self, cmd: ClickWebhookCommand) -> ClickWebhookResult {
        let Some(action) = WebhookAction::from_code(cmd.action) else {
            return ClickWebhookResult::failure(&cmd, -3, "Action not found");
        };

        if !cmd.amount.is_finite() || cmd.amount < 0.0 {
            return ClickWebhookResult::failure(&cmd, -8, "Error in request from click");
        }
        let amount = MinorUnits::from_major(cmd.amount);

        let fields = SignedFields {
            click_trans_id: cmd.click_trans_id,
            service_id: cmd.service_id,
            merchant_trans_id: &cmd.merchant_trans_id,
            merchant_prepare_id: cmd.merchant_prepare_id.as_deref(),
            amount,
            action,
            sign_time: &cmd.sign_time,
        };
        if self.verifier.verify(&fields, &cmd.sign_string).is_err() {
            return ClickWebhookResult::failure(&cmd, -1, "SIGN CHECK FAILED!");
        }

        match action {
            WebhookAction::Prepare => self.prepare(&cmd, amount).await,
            WebhookAction::Complete => self.complete(&cmd, amount).await,
        }
    }

    async fn prepare(&self, cmd: &ClickWebhookCommand, amount: MinorUnits) -> ClickWebhookResult {
        let request = PrepareRequest {
            merchant_reference: cmd.merchant_trans_id.clone(),
            claimed_amount: amount,
        };

        match self.reconciliation.prepare(request).await {
            Ok(receipt) => {
                let mut result = ClickWebhookResult::success(cmd);
                result.merchant_prepare_id = Some(receipt.transaction_id.to_string());
                result
            }
            Err(err) => self.map_error(cmd, err),
        }
    }

    async fn complete(&self, cmd: &ClickWebhookCommand, amount: MinorUnits) -> ClickWebhookResult {
        let Some(prepare_id) = cmd
            .merchant_prepare_id
            .as_deref()
            .and_then(|s| TransactionId::from_str(s).ok())
        else {
            return ClickWebhookResult::failure(cmd, -6, "Transaction does not exist");
        };

        let request = CompleteRequest {
            merchant_reference: cmd.merchant_trans_id.clone(),
            prepare_id,
            provider_txn_id: cmd.click_trans_id.to_string(),
            claimed_amount: amount,
            provider_error: cmd.error,
        };

        match self.reconciliation.complete(request).await {
            Ok(outcome) => {
                let mut result = ClickWebhookResult::success(cmd);
                result.merchant_prepare_id = cmd.merchant_prepare_id.clone();
                result.merchant_confirm_id = Some(outcome.transaction_id.to_string());
                result
            }
            Err(err) => self.map_error(cmd, err),
        }
    }

    /// Translates a reconciliation error into Click's vocabulary.
    fn map_error(&self, cmd: &ClickWebhookCommand, err: PaymentError) -> ClickWebhookResult {
        let (code, note): (i64, &'static str) = match &err {
            PaymentError::SignatureInvalid => (-1, "SIGN CHECK FAILED!"),
            PaymentError::AmountMismatch { .. } => (-2, "Incorrect parameter amount"),
            PaymentError::AlreadyProcessed(_) => (-4, "Already paid"),
            PaymentError::UserNotFound(_) | PaymentError::PlanNotFound(_) => {
                (-5, "User does not exist")
            }
            PaymentError::TransactionNotFound(_) => (-6, "Transaction does not exist"),
            PaymentError::Infrastructure(_) => (-7, "Failed to update user"),
            PaymentError::MalformedRequest(_) | PaymentError::VerificationFailed(_) => {
                (-8, "Error in request from click")
            }
            PaymentError::DuplicatePendingTransaction { .. }
            | PaymentError::ProviderReportedCancellation { .. } => (-9, "Transaction cancelled"),
        };

        if err.is_transient() {
            tracing::error!(
                merchant_trans_id = cmd.merchant_trans_id,
                error = %err,
                "webhook processing hit infrastructure failure"
            );
        } else {
            tracing::warn!(
                merchant_trans_id = cmd.merchant_trans_id,
                click_code = code,
                error = %err,
                "webhook rejected"
            );
        }

        ClickWebhookResult::failure(cmd, code, note)
    }
}
