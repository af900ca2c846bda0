//! PostgreSQL implementation of TransactionStore.
//!
//! The conditional `WHERE status = 'pending'` updates are the single
//! linearization point for settlement; row-level atomicity of UPDATE is
//! what makes concurrent webhook replays safe.

use crate::domain::foundation::{
    DomainError, ErrorCode, PlanId, Timestamp, TransactionId, UserId,
};
use crate::domain::payment::{
    MinorUnits, PaymentTransaction, ProviderKind, TransactionStatus,
};
use crate::ports::{StatusTransition, TransactionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

/// PostgreSQL implementation of the TransactionStore port.
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a payment transaction.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    short_id: String,
    user_id: Uuid,
    plan_id: String,
    provider: String,
    amount: i64,
    status: String,
    provider_txn_id: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let provider = ProviderKind::from_str(&row.provider).map_err(|_| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid provider value: {}", row.provider),
            )
        })?;
        let status = parse_status(&row.status)?;
        let plan_id = PlanId::new(&row.plan_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan_id: {}", e))
        })?;

        Ok(PaymentTransaction {
            id: TransactionId::from_uuid(row.id),
            short_id: row.short_id,
            user_id: UserId::from_uuid(row.user_id),
            plan_id,
            provider,
            amount: MinorUnits::new(row.amount),
            status,
            provider_txn_id: row.provider_txn_id,
            created_at: Timestamp::from_datetime(row.created_at),
            completed_at: row.completed_at.map(Timestamp::from_datetime),
        })
    }
}

fn parse_status(s: &str) -> Result<TransactionStatus, DomainError> {
    match s {
        "pending" => Ok(TransactionStatus::Pending),
        "completed" => Ok(TransactionStatus::Completed),
        "failed" => Ok(TransactionStatus::Failed),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid status value: {}", s),
        )),
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, short_id, user_id, plan_id, provider, amount, status,
           provider_txn_id, created_at, completed_at
    FROM payment_transactions
"#;

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn create(&self, transaction: &PaymentTransaction) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, short_id, user_id, plan_id, provider, amount, status,
                provider_txn_id, created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(&transaction.short_id)
        .bind(transaction.user_id.as_uuid())
        .bind(transaction.plan_id.as_str())
        .bind(transaction.provider.as_str())
        .bind(transaction.amount.value())
        .bind(transaction.status.as_str())
        .bind(&transaction.provider_txn_id)
        .bind(transaction.created_at.as_datetime())
        .bind(transaction.completed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint().is_some() {
                    return DomainError::new(
                        ErrorCode::DuplicatePendingTransaction,
                        "Transaction reference already exists",
                    );
                }
            }
            DomainError::database(format!("Failed to save transaction: {}", e))
        })?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TransactionId,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let row: Option<TransactionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::database(format!("Failed to find transaction: {}", e))
                })?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_by_short_id(
        &self,
        short_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let row: Option<TransactionRow> =
            sqlx::query_as(&format!("{} WHERE short_id = $1", SELECT_COLUMNS))
                .bind(short_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::database(format!("Failed to find transaction: {}", e))
                })?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_by_provider_reference(
        &self,
        provider: ProviderKind,
        reference: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "{} WHERE provider = $1 AND provider_txn_id = $2",
            SELECT_COLUMNS
        ))
        .bind(provider.as_str())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find transaction: {}", e)))?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_other_pending(
        &self,
        user_id: &UserId,
        plan_id: &PlanId,
        exclude: &TransactionId,
    ) -> Result<Option<TransactionId>, DomainError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM payment_transactions
            WHERE user_id = $1 AND plan_id = $2 AND status = 'pending' AND id != $3
            LIMIT 1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(plan_id.as_str())
        .bind(exclude.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check pending transactions: {}", e)))?;

        Ok(id.map(TransactionId::from_uuid))
    }

    async fn complete_if_pending(
        &self,
        id: &TransactionId,
        provider_txn_id: &str,
        completed_at: Timestamp,
    ) -> Result<StatusTransition, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'completed', provider_txn_id = $2, completed_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(provider_txn_id)
        .bind(completed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to complete transaction: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(StatusTransition::AlreadyDecided)
        } else {
            Ok(StatusTransition::Applied)
        }
    }

    async fn fail_if_pending(
        &self,
        id: &TransactionId,
        provider_txn_id: &str,
    ) -> Result<StatusTransition, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'failed', provider_txn_id = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(provider_txn_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to mark transaction failed: {}", e)))?;

        if result.rows_affected() == 0 {
            Ok(StatusTransition::AlreadyDecided)
        } else {
            Ok(StatusTransition::Applied)
        }
    }
}
