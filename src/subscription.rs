//! Simulated subscription state.
//!
//! The compositor only reads [`SubscriptionState::is_pro`]; the expiry is
//! recorded for display and never enforced.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// A purchasable plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Stable identifier, e.g. `pro_monthly`.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Price in the smallest display unit.
    pub price: u32,
    /// Length of the subscription period.
    pub duration_days: u32,
}

/// Monthly Pro plan.
pub const PRO_MONTHLY: Plan = Plan {
    id: "pro_monthly",
    name: "Pro Monthly",
    price: 299,
    duration_days: 30,
};

/// Yearly Pro plan.
pub const PRO_YEARLY: Plan = Plan {
    id: "pro_yearly",
    name: "Pro Yearly",
    price: 1999,
    duration_days: 365,
};

/// Every plan on offer.
pub const PLANS: [Plan; 2] = [PRO_MONTHLY, PRO_YEARLY];

impl Plan {
    /// Look a plan up by id.
    #[must_use]
    pub fn by_id(id: &str) -> Option<Self> {
        PLANS.into_iter().find(|p| p.id == id)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} days)", self.name, self.duration_days)
    }
}

/// Whether branding is suppressed, and until when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionState {
    is_pro: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    /// The initial, non-Pro state.
    #[must_use]
    pub fn free() -> Self {
        Self::default()
    }

    /// Activate `plan` at `now`: Pro until `now + plan.duration_days`.
    ///
    /// Activating again replaces the expiry; the state never returns to free.
    pub fn activate(&mut self, plan: Plan, now: DateTime<Utc>) {
        let expires_at = now + Duration::days(i64::from(plan.duration_days));
        self.is_pro = true;
        self.expires_at = Some(expires_at);
        info!(plan = plan.id, %expires_at, "subscription activated");
    }

    /// Whether the branding mark is suppressed.
    #[must_use]
    pub fn is_pro(&self) -> bool {
        self.is_pro
    }

    /// When the current plan ends, if one was bought.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}
