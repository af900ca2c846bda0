//! Subscription extension arithmetic.
//!
//! Extension is monotone: a paid period is always appended after whatever
//! access the user already has, so paying early never costs remaining time
//! and paying after a lapse starts from the payment moment.

use crate::domain::foundation::Timestamp;

use super::plan::{Plan, SubscriptionTier};

/// The outcome of a successful payment applied to a user's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionGrant {
    pub tier: SubscriptionTier,
    pub expires_at: Timestamp,
}

/// Computes the grant produced by paying for `plan` at `now`.
///
/// The new expiry is `max(current_expiry, now) + plan.duration_days`.
pub fn extend_from(
    current_expiry: Option<Timestamp>,
    now: Timestamp,
    plan: &Plan,
) -> SubscriptionGrant {
    let base = match current_expiry {
        Some(expiry) if expiry.is_after(&now) => expiry,
        _ => now,
    };

    SubscriptionGrant {
        tier: plan.tier,
        expires_at: base.add_days(plan.duration_days),
    }
}
