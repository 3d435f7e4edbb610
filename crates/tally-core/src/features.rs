//! Static tier feature map
//!
//! Feature sets are per-tier, not cumulative: `pro` does not automatically
//! include the `free` set. This mirrors the product configuration as given;
//! tests pin the behavior so a deliberate merge shows up as a diff here.

use crate::models::Tier;

/// Features available on the free tier
pub const FREE_FEATURES: &[&str] = &["basic_tracking", "monthly_summary", "basic_categories"];

/// Features available on the pro tier
pub const PRO_FEATURES: &[&str] = &[
    "unlimited_history",
    "advanced_analytics",
    "custom_categories",
    "data_export",
    "budget_goals",
    "recurring_expenses",
];

/// Features available on the enterprise tier
///
/// Carries `advanced_analytics` alongside the enterprise-only set so both
/// paid tiers answer yes for it.
pub const ENTERPRISE_FEATURES: &[&str] = &[
    "advanced_analytics",
    "api_access",
    "multiple_users",
    "custom_branding",
    "priority_support",
    "custom_reports",
];

/// The allowed feature set for a tier
pub fn tier_features(tier: Tier) -> &'static [&'static str] {
    match tier {
        Tier::Free => FREE_FEATURES,
        Tier::Pro => PRO_FEATURES,
        Tier::Enterprise => ENTERPRISE_FEATURES,
    }
}

/// Whether a tier grants a named feature
pub fn tier_allows(tier: Tier, feature: &str) -> bool {
    tier_features(tier).contains(&feature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_sets_are_disjoint_per_tier() {
        assert!(tier_allows(Tier::Free, "basic_tracking"));
        assert!(!tier_allows(Tier::Pro, "basic_tracking"));
        assert!(tier_allows(Tier::Pro, "advanced_analytics"));
        assert!(tier_allows(Tier::Enterprise, "api_access"));
        assert!(tier_allows(Tier::Enterprise, "advanced_analytics"));
        assert!(!tier_allows(Tier::Free, "advanced_analytics"));
        assert!(!tier_allows(Tier::Enterprise, "data_export"));
    }

    #[test]
    fn test_unknown_feature_denied_everywhere() {
        for tier in [Tier::Free, Tier::Pro, Tier::Enterprise] {
            assert!(!tier_allows(tier, "time_travel"));
        }
    }
}
