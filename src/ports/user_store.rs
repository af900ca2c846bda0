//! Port for user account lookup and subscription updates.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::payment::{SubscriptionGrant, SubscriptionTier};

/// The slice of a user account the payment flow needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    pub subscription_tier: SubscriptionTier,
    pub subscription_expires_at: Option<Timestamp>,
}

/// Persistence port for user subscriptions.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up a user by id.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserAccount>, DomainError>;

    /// Applies a subscription grant and returns the updated account.
    async fn update_subscription(
        &self,
        id: &UserId,
        grant: &SubscriptionGrant,
    ) -> Result<UserAccount, DomainError>;
}
