//! Port for client-initiated purchase verification.
//!
//! Providers that do not push webhooks (Google Play) or that are checked
//! from the client after checkout (Payme receipts) are verified on demand:
//! the client submits a token and the adapter confirms payment with the
//! provider before the transaction is settled.

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::domain::payment::{PaymentError, Plan, ProviderKind};

/// A purchase the provider has confirmed as paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPurchase {
    /// The provider's own stable reference for this purchase.
    pub provider_reference: String,
    /// Provider-reported expiry, when the provider manages the period
    /// itself (Google Play subscriptions).
    pub expires_at: Option<Timestamp>,
}

/// Verification port for a single payment provider.
#[async_trait]
pub trait PurchaseVerifier: Send + Sync {
    /// The provider this verifier talks to.
    fn provider(&self) -> ProviderKind;

    /// Confirms with the provider that `token` represents a settled
    /// purchase of `plan`.
    ///
    /// # Errors
    ///
    /// - `VerificationFailed` - the provider rejected the token or the
    ///   purchase is not in a payable state
    /// - `Infrastructure` - the provider could not be reached
    async fn verify(&self, token: &str, plan: &Plan) -> Result<VerifiedPurchase, PaymentError>;
}
