//! Payment command and query handlers.

mod click_webhook;
mod create_payment;
mod get_transaction;
mod verify_purchase;

pub use click_webhook::{ClickWebhookCommand, ClickWebhookHandler, ClickWebhookResult};
pub use create_payment::{CreatePaymentCommand, CreatePaymentHandler, CreatePaymentResult};
pub use get_transaction::{GetTransactionHandler, GetTransactionQuery};
pub use verify_purchase::{VerifyPurchaseCommand, VerifyPurchaseHandler, VerifyPurchaseResult};
