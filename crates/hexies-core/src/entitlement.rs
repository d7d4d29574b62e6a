//! Entitlement evaluation: pure access and quota decisions
//!
//! Every decision fails closed: without a subscription record nothing is
//! accessible and nothing can be created.

use std::collections::HashSet;

use crate::data::{CatalogItem, Feature, PlanId, SubscriptionRecord, UserId};

/// Which plans are granted access to non-free catalog items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementPolicy {
    premium_plans: HashSet<PlanId>,
}

impl EntitlementPolicy {
    pub fn new<I: IntoIterator<Item = PlanId>>(premium_plans: I) -> Self {
        Self {
            premium_plans: premium_plans.into_iter().collect(),
        }
    }

    pub fn grants_premium(&self, plan: PlanId) -> bool {
        self.premium_plans.contains(&plan)
    }
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self::new([PlanId::Pro, PlanId::Lifetime, PlanId::Enterprise])
    }
}

/// Plan used for access decisions: anything not active counts as free.
pub fn effective_plan(subscription: &SubscriptionRecord) -> PlanId {
    if subscription.is_active() {
        subscription.plan_id
    } else {
        PlanId::Free
    }
}

/// Decides whether the current user may use `item`.
pub fn can_access(
    item: &CatalogItem,
    subscription: Option<&SubscriptionRecord>,
    current_user: Option<&UserId>,
    policy: &EntitlementPolicy,
) -> bool {
    let Some(subscription) = subscription else {
        return false;
    };

    if item.is_free {
        return true;
    }

    if item.is_user_created && item.is_owned_by(current_user) {
        return true;
    }

    subscription.is_active() && policy.grants_premium(subscription.plan_id)
}

/// Decides whether one more user item may be created.
pub fn can_create_user_item(subscription: Option<&SubscriptionRecord>) -> bool {
    match subscription {
        None => false,
        Some(s) if s.is_unlimited() => true,
        Some(s) => i64::from(s.user_item_count) < s.user_item_limit,
    }
}

/// Decides whether a plan-gated feature is available.
pub fn can_access_feature(feature: Feature, subscription: Option<&SubscriptionRecord>) -> bool {
    match subscription {
        Some(s) if s.is_active() => feature.plans().contains(&s.plan_id),
        _ => false,
    }
}
