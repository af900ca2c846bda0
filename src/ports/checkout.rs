//! Port for building provider checkout links.

use async_trait::async_trait;

use crate::domain::payment::{PaymentError, Plan, ProviderKind};

/// Builds the hosted payment page link for a provider.
///
/// Providers without a hosted page (Google Play) simply have no
/// implementation registered.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// The provider this checkout belongs to.
    fn provider(&self) -> ProviderKind;

    /// Builds the URL the user pays through. `reference` is the merchant
    /// reference the provider will echo back when reconciling.
    async fn checkout_url(&self, plan: &Plan, reference: &str) -> Result<String, PaymentError>;
}
