//! Payment domain: transactions, plans, signatures, and the
//! reconciliation logic that turns provider notifications into
//! subscription time.

pub mod amount;
pub mod errors;
pub mod plan;
pub mod provider;
pub mod reconciliation;
pub mod signature;
pub mod subscription;
pub mod transaction;

pub use amount::{MinorUnits, AMOUNT_TOLERANCE};
pub use errors::PaymentError;
pub use plan::{Plan, PlanCatalog, SubscriptionTier, DEFAULT_CATALOG};
pub use provider::ProviderKind;
pub use reconciliation::{
    CompleteRequest, CompletionOutcome, PrepareReceipt, PrepareRequest, ReconciliationService,
};
pub use signature::{ClickSignatureVerifier, SignedFields, WebhookAction};
pub use subscription::{extend_from, SubscriptionGrant};
pub use transaction::{generate_short_id, PaymentTransaction, TransactionStatus};
