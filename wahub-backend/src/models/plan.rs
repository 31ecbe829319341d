use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Subscription plans offered in the storefront
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
    Free,
    Starter,
    Pro,
    Business,
}

/// Quotas attached to a plan. `None` means unlimited.
#[derive(Debug, Clone, Serialize)]
pub struct PlanLimits {
    pub max_instances: usize,
    pub daily_message_limit: Option<i64>,
    pub max_bulk_contacts: usize,
    pub max_chatbot_rules: usize,
}

/// Storefront entry for a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanOffer {
    pub plan: Plan,
    pub label: &'static str,
    pub monthly_price_cents: u32,
    pub limits: PlanLimits,
    pub features: Vec<&'static str>,
}

impl Plan {
    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                max_instances: 1,
                daily_message_limit: Some(100),
                max_bulk_contacts: 0,
                max_chatbot_rules: 3,
            },
            Self::Starter => PlanLimits {
                max_instances: 3,
                daily_message_limit: Some(1_000),
                max_bulk_contacts: 200,
                max_chatbot_rules: 20,
            },
            Self::Pro => PlanLimits {
                max_instances: 10,
                daily_message_limit: Some(10_000),
                max_bulk_contacts: 2_000,
                max_chatbot_rules: 100,
            },
            Self::Business => PlanLimits {
                max_instances: 50,
                daily_message_limit: None,
                max_bulk_contacts: 20_000,
                max_chatbot_rules: 500,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Starter => "Starter",
            Self::Pro => "Pro",
            Self::Business => "Business",
        }
    }

    pub fn monthly_price_cents(&self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Starter => 1_900,
            Self::Pro => 4_900,
            Self::Business => 14_900,
        }
    }

    fn features(&self) -> Vec<&'static str> {
        let mut features = vec!["QR pairing", "Send and receive messages", "Webhooks"];
        if *self != Self::Free {
            features.push("Bulk messaging");
            features.push("Public REST API");
        }
        if matches!(self, Self::Pro | Self::Business) {
            features.push("Per-instance proxies");
        }
        if *self == Self::Business {
            features.push("Unlimited daily messages");
        }
        features
    }

    pub fn offer(&self) -> PlanOffer {
        PlanOffer {
            plan: *self,
            label: self.label(),
            monthly_price_cents: self.monthly_price_cents(),
            limits: self.limits(),
            features: self.features(),
        }
    }

    /// Full storefront catalogue, cheapest first
    pub fn catalogue() -> Vec<PlanOffer> {
        use strum::IntoEnumIterator;
        Self::iter().map(|p| p.offer()).collect()
    }
}

/// A user's daily sending allowance for one UTC day
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DailyQuota {
    pub plan: Plan,
    pub limit: Option<i64>,
    pub sent_today: i64,
}

impl DailyQuota {
    /// Messages still allowed today, None when unlimited
    pub fn remaining(&self) -> Option<i64> {
        self.limit.map(|limit| (limit - self.sent_today).max(0))
    }

    pub fn allows(&self, count: i64) -> bool {
        self.remaining().map_or(true, |remaining| count <= remaining)
    }
}
