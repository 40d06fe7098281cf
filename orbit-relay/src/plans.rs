//! Plan lookup: account → bandwidth ceiling.
//!
//! The relay asks a [`PlanLookup`] once per connection. The bundled
//! [`ConfigPlans`] reads tiers and assignments from the `[plans]` section;
//! deployments backed by a billing database provide their own implementation.

use crate::config::PlansConfig;
use async_trait::async_trait;
use orbit_types::AccountId;
use std::collections::HashMap;
use std::num::NonZeroU32;

/// Bandwidth allowance of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    /// Frames are never delayed.
    Unlimited,
    /// Sustained ceiling in bytes per second, with one second of burst.
    BytesPerSecond(NonZeroU32),
}

impl RateLimit {
    /// Build from an optional configured rate; `None` and zero mean unlimited.
    pub fn from_config(bytes_per_second: Option<u32>) -> Self {
        match bytes_per_second.and_then(NonZeroU32::new) {
            Some(rate) => Self::BytesPerSecond(rate),
            None => Self::Unlimited,
        }
    }

    /// Whether frames of this account go through the limiter.
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::BytesPerSecond(_))
    }
}

/// Resolves the rate limit of an account.
#[async_trait]
pub trait PlanLookup: Send + Sync {
    /// Return the bandwidth allowance for `account`.
    async fn rate_limit(&self, account: &AccountId) -> RateLimit;
}

/// Plans from the relay configuration file.
#[derive(Debug, Clone)]
pub struct ConfigPlans {
    tiers: HashMap<String, RateLimit>,
    accounts: HashMap<AccountId, String>,
    default_plan: String,
}

impl ConfigPlans {
    /// Build from the `[plans]` section.
    pub fn new(config: &PlansConfig) -> Self {
        let tiers = config
            .tiers
            .iter()
            .map(|(name, tier)| {
                (
                    name.to_ascii_lowercase(),
                    RateLimit::from_config(tier.bytes_per_second),
                )
            })
            .collect();

        let accounts = config
            .accounts
            .iter()
            .map(|(account, plan)| (AccountId::new(account.as_str()), plan.to_ascii_lowercase()))
            .collect();

        Self {
            tiers,
            accounts,
            default_plan: config.default_plan.to_ascii_lowercase(),
        }
    }

    /// Name of the plan an account is on.
    pub fn plan_of(&self, account: &AccountId) -> &str {
        self.accounts
            .get(account)
            .map(String::as_str)
            .unwrap_or(&self.default_plan)
    }
}

#[async_trait]
impl PlanLookup for ConfigPlans {
    async fn rate_limit(&self, account: &AccountId) -> RateLimit {
        let plan = self.plan_of(account);
        match self.tiers.get(plan) {
            Some(limit) => *limit,
            None => {
                tracing::warn!("Unknown plan {:?} for {}, treating as unlimited", plan, account);
                RateLimit::Unlimited
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;

    fn plans() -> ConfigPlans {
        let mut config = PlansConfig::default();
        config
            .accounts
            .insert("bob@example.com".to_string(), "TITAN".to_string());
        config
            .accounts
            .insert("eve@example.com".to_string(), "platinum".to_string());
        config.tiers.insert(
            "free".to_string(),
            TierConfig {
                bytes_per_second: Some(0),
            },
        );
        ConfigPlans::new(&config)
    }

    #[test]
    fn rate_limit_from_config() {
        assert_eq!(RateLimit::from_config(None), RateLimit::Unlimited);
        assert_eq!(RateLimit::from_config(Some(0)), RateLimit::Unlimited);
        assert_eq!(
            RateLimit::from_config(Some(10)),
            RateLimit::BytesPerSecond(NonZeroU32::new(10).unwrap())
        );
        assert!(RateLimit::from_config(Some(10)).is_limited());
    }

    #[tokio::test]
    async fn unassigned_accounts_get_default_plan() {
        let plans = plans();
        let alice = AccountId::new("alice@example.com");
        assert_eq!(plans.plan_of(&alice), "scout");
        assert_eq!(
            plans.rate_limit(&alice).await,
            RateLimit::BytesPerSecond(NonZeroU32::new(500_000).unwrap())
        );
    }

    #[tokio::test]
    async fn assigned_plan_is_case_insensitive() {
        let plans = plans();
        let bob = AccountId::new("bob@example.com");
        assert_eq!(plans.plan_of(&bob), "titan");
        assert_eq!(plans.rate_limit(&bob).await, RateLimit::Unlimited);
    }

    #[tokio::test]
    async fn unknown_plan_is_unlimited() {
        let plans = plans();
        let eve = AccountId::new("eve@example.com");
        assert_eq!(plans.rate_limit(&eve).await, RateLimit::Unlimited);
    }
}
