//! Payme receipt adapter.
//!
//! Talks JSON-RPC to the Payme merchant API. Checkout creates a receipt
//! the client pays in the Payme app; verification re-fetches the receipt
//! and accepts it once it reaches the paid state.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PaymeConfig;
use crate::domain::payment::{PaymentError, Plan, ProviderKind};
use crate::ports::{CheckoutProvider, PurchaseVerifier, VerifiedPurchase};

/// Receipt state meaning the money has been debited.
const RECEIPT_STATE_PAID: i64 = 4;

/// A created receipt awaiting payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymeReceipt {
    pub receipt_id: String,
    pub pay_url: String,
}

/// Payme merchant API adapter.
pub struct PaymeAdapter {
    config: PaymeConfig,
    http_client: reqwest::Client,
    request_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: serde_json::Value,
}

#[derive(Deserialize)]
struct ReceiptResult {
    receipt: Receipt,
}

#[derive(Deserialize)]
struct Receipt {
    #[serde(rename = "_id")]
    id: String,
    state: i64,
}

impl PaymeAdapter {
    /// Creates a new adapter with the given credentials.
    pub fn new(config: PaymeConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            request_id: AtomicU64::new(1),
        }
    }

    /// Creates a receipt for the plan price and returns the link the
    /// client pays through.
    pub async fn create_receipt(&self, plan: &Plan, order_reference: &str) -> Result<PaymeReceipt, PaymentError> {
        let result = self
            .call(
                "receipts.create",
                json!({
                    "amount": plan.price.value(),
                    "account": {
                        "order_id": order_reference,
                        "plan_id": plan.id.as_str(),
                    },
                }),
            )
            .await?;

        let receipt: ReceiptResult = serde_json::from_value(result)
            .map_err(|e| PaymentError::infrastructure(format!("Payme receipt response: {}", e)))?;

        let pay_url = format!("https://checkout.paycom.uz/{}", receipt.receipt.id);
        Ok(PaymeReceipt {
            receipt_id: receipt.receipt.id,
            pay_url,
        })
    }

    /// Issues one JSON-RPC call and unwraps the result envelope.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, PaymentError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let auth = format!(
            "{}:{}",
            self.config.merchant_id,
            self.config.api_key.expose_secret()
        );

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header("X-Auth", auth)
            .json(&json!({ "id": id, "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| PaymentError::infrastructure(format!("Payme request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%status, method, "Payme API returned an error status");
            return Err(PaymentError::infrastructure(format!(
                "Payme API returned status {}",
                status
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| PaymentError::infrastructure(format!("Payme response: {}", e)))?;

        if let Some(error) = envelope.error {
            tracing::warn!(code = error.code, message = %error.message, method, "Payme rejected the call");
            return Err(PaymentError::verification_failed(format!(
                "Payme error {}",
                error.code
            )));
        }

        envelope
            .result
            .ok_or_else(|| PaymentError::infrastructure("Payme response missing result"))
    }
}

#[async_trait]
impl CheckoutProvider for PaymeAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Payme
    }

    async fn checkout_url(&self, plan: &Plan, reference: &str) -> Result<String, PaymentError> {
        let receipt = self.create_receipt(plan, reference).await?;
        Ok(receipt.pay_url)
    }
}

#[async_trait]
impl PurchaseVerifier for PaymeAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Payme
    }

    /// Verifies a receipt the client claims to have paid. The token is
    /// the receipt id returned at checkout.
    async fn verify(&self, token: &str, _plan: &Plan) -> Result<VerifiedPurchase, PaymentError> {
        let result = self.call("receipts.get", json!({ "id": token })).await?;

        let receipt: ReceiptResult = serde_json::from_value(result)
            .map_err(|e| PaymentError::infrastructure(format!("Payme receipt response: {}", e)))?;

        if receipt.receipt.state != RECEIPT_STATE_PAID {
            return Err(PaymentError::verification_failed(format!(
                "Payme receipt in state {}, expected paid",
                receipt.receipt.state
            )));
        }

        Ok(VerifiedPurchase {
            provider_reference: receipt.receipt.id,
            expires_at: None,
        })
    }
}
