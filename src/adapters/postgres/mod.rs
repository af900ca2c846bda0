//! PostgreSQL adapters.

mod transaction_store;
mod user_store;

pub use transaction_store::PostgresTransactionStore;
pub use user_store::PostgresUserStore;
