//! HTTP DTOs for payment endpoints.
//!
//! The JSON/form boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};

use crate::application::handlers::payment::{
    ClickWebhookCommand, ClickWebhookResult, CreatePaymentResult, VerifyPurchaseResult,
};
use crate::domain::payment::{PaymentTransaction, ProviderKind, TransactionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Click webhook form, posted as `application/x-www-form-urlencoded`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClickWebhookForm {
    pub click_trans_id: i64,
    pub service_id: i64,
    pub merchant_trans_id: String,
    #[serde(default)]
    pub merchant_prepare_id: Option<String>,
    /// Amount in major units, two decimals.
    pub amount: f64,
    pub action: i64,
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub error_note: Option<String>,
    pub sign_time: String,
    pub sign_string: String,
}

impl From<ClickWebhookForm> for ClickWebhookCommand {
    fn from(form: ClickWebhookForm) -> Self {
        ClickWebhookCommand {
            click_trans_id: form.click_trans_id,
            service_id: form.service_id,
            merchant_trans_id: form.merchant_trans_id,
            merchant_prepare_id: form.merchant_prepare_id,
            amount: form.amount,
            action: form.action,
            error: form.error,
            sign_time: form.sign_time,
            sign_string: form.sign_string,
        }
    }
}

/// Request to start a checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub plan_id: String,
    pub provider: ProviderKind,
}

/// Request to verify a client-side purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPurchaseRequest {
    pub plan_id: String,
    pub provider: ProviderKind,
    /// Play Billing purchase token or Payme receipt id.
    pub token: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body Click expects back from both webhook actions.
#[derive(Debug, Clone, Serialize)]
pub struct ClickWebhookResponse {
    pub click_trans_id: i64,
    pub merchant_trans_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_prepare_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_confirm_id: Option<String>,
    pub error: i64,
    pub error_note: &'static str,
}

impl ClickWebhookResponse {
    /// Response for a body that could not be parsed; there are no
    /// correlation fields to echo back.
    pub fn bad_request() -> Self {
        Self {
            click_trans_id: 0,
            merchant_trans_id: String::new(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: -8,
            error_note: "Error in request from click",
        }
    }
}

impl From<ClickWebhookResult> for ClickWebhookResponse {
    fn from(result: ClickWebhookResult) -> Self {
        Self {
            click_trans_id: result.click_trans_id,
            merchant_trans_id: result.merchant_trans_id,
            merchant_prepare_id: result.merchant_prepare_id,
            merchant_confirm_id: result.merchant_confirm_id,
            error: result.error,
            error_note: result.error_note,
        }
    }
}

/// Response for a started checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentResponse {
    pub transaction_id: String,
    pub short_id: String,
    /// Amount in minor units.
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,
}

impl From<CreatePaymentResult> for CreatePaymentResponse {
    fn from(result: CreatePaymentResult) -> Self {
        Self {
            transaction_id: result.transaction_id.to_string(),
            short_id: result.short_id,
            amount: result.amount,
            pay_url: result.pay_url,
        }
    }
}

/// Response for a verified purchase.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyPurchaseResponse {
    pub transaction_id: String,
    /// False when the purchase had already been settled.
    pub extension_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_expires_at: Option<String>,
}

impl From<VerifyPurchaseResult> for VerifyPurchaseResponse {
    fn from(result: VerifyPurchaseResult) -> Self {
        let (tier, expires_at) = match result.grant {
            Some(grant) => (
                Some(grant.tier.as_str().to_string()),
                Some(grant.expires_at.to_rfc3339()),
            ),
            None => (None, None),
        };
        Self {
            transaction_id: result.transaction_id.to_string(),
            extension_applied: result.extension_applied,
            tier,
            subscription_expires_at: expires_at,
        }
    }
}

/// Transaction status view.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub short_id: String,
    pub plan_id: String,
    pub provider: ProviderKind,
    /// Amount in minor units.
    pub amount: i64,
    pub status: TransactionStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<PaymentTransaction> for TransactionResponse {
    fn from(t: PaymentTransaction) -> Self {
        Self {
            id: t.id.to_string(),
            short_id: t.short_id,
            plan_id: t.plan_id.as_str().to_string(),
            provider: t.provider,
            amount: t.amount.value(),
            status: t.status,
            created_at: t.created_at.to_rfc3339(),
            completed_at: t.completed_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

/// Generic error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
