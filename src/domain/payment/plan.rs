//! Subscription plan catalog.
//!
//! Static mapping from a plan id to tier, duration, price, and the
//! provider-specific service/product identifiers each gateway uses to
//! refer to the same plan.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::foundation::PlanId;

use super::amount::MinorUnits;
use super::provider::ProviderKind;

/// Subscription tier granted by a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// No paid entitlement.
    Free,
    /// Entry paid tier.
    Silver,
    /// Full-access tier.
    Gold,
}

impl SubscriptionTier {
    /// Returns the display name for this tier.
    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Silver => "Silver",
            SubscriptionTier::Gold => "Gold",
        }
    }

    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Silver => "silver",
            SubscriptionTier::Gold => "gold",
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A purchasable subscription plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: PlanId,
    pub tier: SubscriptionTier,
    pub duration_days: i64,
    /// Local-currency price in minor units (tiyin).
    pub price: MinorUnits,
    /// USD price in cents, used by Google Play.
    pub price_usd_cents: MinorUnits,
    /// Provider-specific service/product identifiers. Providers absent
    /// from the map cannot sell this plan.
    pub provider_service_ids: HashMap<ProviderKind, String>,
}

impl Plan {
    /// Returns the service id this provider uses for the plan, if the plan
    /// is sold through that provider.
    pub fn service_id_for(&self, provider: ProviderKind) -> Option<&str> {
        self.provider_service_ids.get(&provider).map(String::as_str)
    }
}

/// The catalog of all purchasable plans.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, Plan>,
}

impl PlanCatalog {
    /// Builds a catalog from a list of plans.
    pub fn new(plans: Vec<Plan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Looks up a plan by id.
    pub fn get(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.get(id)
    }

    /// Finds the plan a provider's service id refers to.
    ///
    /// Used by webhook handlers, which receive the provider's service id
    /// rather than our plan id.
    pub fn find_by_service_id(&self, provider: ProviderKind, service_id: &str) -> Option<&Plan> {
        self.plans
            .values()
            .find(|p| p.service_id_for(provider) == Some(service_id))
    }

    /// Returns the number of plans in the catalog.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Returns true if the catalog holds no plans.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Default production catalog.
///
/// Plan ids match the Google Play product ids exactly; other providers map
/// through `provider_service_ids`.
pub static DEFAULT_CATALOG: Lazy<PlanCatalog> = Lazy::new(|| {
    PlanCatalog::new(vec![
        Plan {
            id: PlanId::new("silver_monthly").expect("static plan id"),
            tier: SubscriptionTier::Silver,
            duration_days: 30,
            price: MinorUnits::new(100_000), // 1,000 UZS in tiyin
            price_usd_cents: MinorUnits::new(149),
            provider_service_ids: HashMap::from([
                (ProviderKind::Click, "80012".to_string()),
                (ProviderKind::Payme, "silver_monthly_receipt".to_string()),
            ]),
        },
        Plan {
            id: PlanId::new("gold_monthly").expect("static plan id"),
            tier: SubscriptionTier::Gold,
            duration_days: 30,
            price: MinorUnits::new(5_000_000), // 50,000 UZS in tiyin
            price_usd_cents: MinorUnits::new(499),
            provider_service_ids: HashMap::from([
                (ProviderKind::Click, "80013".to_string()),
                (ProviderKind::Payme, "gold_monthly_receipt".to_string()),
            ]),
        },
    ])
});
