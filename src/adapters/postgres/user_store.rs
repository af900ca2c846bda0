//! PostgreSQL implementation of UserStore.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::payment::{SubscriptionGrant, SubscriptionTier};
use crate::ports::{UserAccount, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the UserStore port.
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    subscription_tier: String,
    subscription_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserAccount {
            id: UserId::from_uuid(row.id),
            subscription_tier: parse_tier(&row.subscription_tier)?,
            subscription_expires_at: row.subscription_expires_at.map(Timestamp::from_datetime),
        })
    }
}

fn parse_tier(s: &str) -> Result<SubscriptionTier, DomainError> {
    match s {
        "free" => Ok(SubscriptionTier::Free),
        "silver" => Ok(SubscriptionTier::Silver),
        "gold" => Ok(SubscriptionTier::Gold),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid tier value: {}", s),
        )),
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_tier, subscription_expires_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find user: {}", e)))?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn update_subscription(
        &self,
        id: &UserId,
        grant: &SubscriptionGrant,
    ) -> Result<UserAccount, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET subscription_tier = $2, subscription_expires_at = $3, updated_at = now()
            WHERE id = $1
            RETURNING id, subscription_tier, subscription_expires_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(grant.tier.as_str())
        .bind(grant.expires_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to update subscription: {}", e)))?;

        row.map(UserAccount::try_from).transpose()?.ok_or_else(|| {
            DomainError::new(ErrorCode::UserNotFound, format!("User {} not found", id))
        })
    }
}
