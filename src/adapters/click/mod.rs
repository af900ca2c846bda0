//! Click checkout adapter.
//!
//! Click has no receipt API for checkout; the hosted page is addressed
//! entirely through query parameters, with the merchant reference
//! carried in `transaction_param` so Click can echo it back to the
//! webhook later.

use async_trait::async_trait;

use crate::config::ClickConfig;
use crate::domain::payment::{PaymentError, Plan, ProviderKind};
use crate::ports::CheckoutProvider;

const PAY_PAGE_URL: &str = "https://my.click.uz/services/pay";

/// Builds Click hosted payment page links.
pub struct ClickCheckout {
    config: ClickConfig,
}

impl ClickCheckout {
    pub fn new(config: ClickConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CheckoutProvider for ClickCheckout {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Click
    }

    async fn checkout_url(&self, plan: &Plan, reference: &str) -> Result<String, PaymentError> {
        let service_id = plan
            .service_id_for(ProviderKind::Click)
            .ok_or_else(|| PaymentError::plan_not_found(plan.id.as_str()))?;

        Ok(format!(
            "{}?service_id={}&merchant_id={}&amount={}&transaction_param={}",
            PAY_PAGE_URL,
            service_id,
            self.config.merchant_id,
            plan.price.to_major_string(),
            reference,
        ))
    }
}
