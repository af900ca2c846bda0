//! Ports: trait boundaries between the domain and its adapters.

pub mod checkout;
pub mod purchase_verifier;
pub mod transaction_store;
pub mod user_store;

pub use checkout::CheckoutProvider;
pub use purchase_verifier::{PurchaseVerifier, VerifiedPurchase};
pub use transaction_store::{StatusTransition, TransactionStore};
pub use user_store::{UserAccount, UserStore};
