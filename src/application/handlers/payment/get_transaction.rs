//! GetTransactionHandler - Query handler for transaction status.

use std::str::FromStr;
use std::sync::Arc;

use crate::domain::foundation::{TransactionId, UserId};
use crate::domain::payment::{PaymentError, PaymentTransaction};
use crate::ports::TransactionStore;

/// Query for the status of one of the caller's transactions.
#[derive(Debug, Clone)]
pub struct GetTransactionQuery {
    pub user_id: UserId,
    /// Either the internal UUID or the short public reference.
    pub reference: String,
}

/// Handler resolving a transaction by either reference form.
pub struct GetTransactionHandler {
    transactions: Arc<dyn TransactionStore>,
}

impl GetTransactionHandler {
    pub fn new(transactions: Arc<dyn TransactionStore>) -> Self {
        Self { transactions }
    }

    pub async fn handle(
        &self,
        query: GetTransactionQuery,
    ) -> Result<PaymentTransaction, PaymentError> {
        let transaction = match TransactionId::from_str(&query.reference) {
            Ok(id) => self.transactions.find_by_id(&id).await?,
            Err(_) => self.transactions.find_by_short_id(&query.reference).await?,
        };

        // Ownership check folds into not-found so the endpoint does not
        // leak other users' transaction ids.
        transaction
            .filter(|t| t.user_id == query.user_id)
            .ok_or_else(|| PaymentError::not_found(query.reference))
    }
}
