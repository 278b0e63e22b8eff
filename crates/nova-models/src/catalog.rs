//! Static purchase catalog: add-ons, packs, credit packs, plan prices.
//!
//! The catalog is immutable at runtime and injected into the billing
//! engines at construction. Every purchase path resolves its key here
//! before touching any state.

use std::collections::BTreeMap;

use crate::entitlements::EntitlementKind;
use crate::plan::PlanTier;

/// One-shot trial grant issued on a new identity's first debit.
pub const TRIAL_CREDITS: i64 = 5;

/// Days added to each bundled entitlement when a pro or studio plan is
/// purchased. Fixed, independent of the plan period.
pub const BUNDLED_ENTITLEMENT_DAYS: i64 = 30;

/// A purchasable time-bounded add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonSku {
    pub key: &'static str,
    pub cost: i64,
    pub days: i64,
    pub grants: EntitlementKind,
}

/// A purchasable permanent style pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSku {
    pub id: &'static str,
    pub cost: i64,
    /// Lowest plan tier whose subscribers get this pack without buying it.
    pub included_from: PlanTier,
}

/// A credit top-up product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPackSku {
    pub id: &'static str,
    pub credits: i64,
}

/// The full static catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    addons: BTreeMap<&'static str, AddonSku>,
    packs: BTreeMap<&'static str, PackSku>,
    credit_packs: BTreeMap<&'static str, CreditPackSku>,
    /// (plan, period days) -> price in credits.
    plan_prices: BTreeMap<(PlanTier, u32), i64>,
}

impl Default for Catalog {
    fn default() -> Self {
        use EntitlementKind::{AdFree, NoWatermark, ProPrompt, Templates};

        let addons = [
            AddonSku { key: "no_watermark_7d", cost: 15, days: 7, grants: NoWatermark },
            AddonSku { key: "no_watermark_30d", cost: 40, days: 30, grants: NoWatermark },
            AddonSku { key: "ad_free_7d", cost: 10, days: 7, grants: AdFree },
            AddonSku { key: "ad_free_30d", cost: 25, days: 30, grants: AdFree },
            AddonSku { key: "templates_30d", cost: 30, days: 30, grants: Templates },
            AddonSku { key: "pro_prompt_30d", cost: 35, days: 30, grants: ProPrompt },
        ]
        .into_iter()
        .map(|sku| (sku.key, sku))
        .collect();

        let packs = [
            PackSku { id: "cinematic_pack", cost: 20, included_from: PlanTier::Pro },
            PackSku { id: "anime_pack", cost: 20, included_from: PlanTier::Pro },
            PackSku { id: "retro_pack", cost: 15, included_from: PlanTier::Basic },
        ]
        .into_iter()
        .map(|sku| (sku.id, sku))
        .collect();

        let credit_packs = [
            CreditPackSku { id: "credits_50", credits: 50 },
            CreditPackSku { id: "credits_120", credits: 120 },
            CreditPackSku { id: "credits_300", credits: 300 },
        ]
        .into_iter()
        .map(|sku| (sku.id, sku))
        .collect();

        let plan_prices = [
            ((PlanTier::Basic, 30), 100),
            ((PlanTier::Basic, 365), 1000),
            ((PlanTier::Pro, 30), 250),
            ((PlanTier::Pro, 365), 2500),
            ((PlanTier::Studio, 30), 500),
            ((PlanTier::Studio, 365), 5000),
        ]
        .into_iter()
        .collect();

        Self { addons, packs, credit_packs, plan_prices }
    }
}

impl Catalog {
    pub fn addon(&self, key: &str) -> Option<&AddonSku> {
        self.addons.get(key)
    }

    pub fn pack(&self, id: &str) -> Option<&PackSku> {
        self.packs.get(id)
    }

    pub fn credit_pack(&self, id: &str) -> Option<&CreditPackSku> {
        self.credit_packs.get(id)
    }

    /// Price for a plan over a period, if that combination is sold.
    pub fn plan_price(&self, plan: PlanTier, period_days: u32) -> Option<i64> {
        self.plan_prices.get(&(plan, period_days)).copied()
    }

    pub fn addon_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.addons.keys().copied()
    }

    pub fn pack_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.packs.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addon_lookup() {
        let catalog = Catalog::default();
        let sku = catalog.addon("no_watermark_7d").unwrap();
        assert_eq!(sku.cost, 15);
        assert_eq!(sku.days, 7);
        assert_eq!(sku.grants, EntitlementKind::NoWatermark);
        assert!(catalog.addon("no_watermark_90d").is_none());
    }

    #[test]
    fn test_pack_inclusion_tiers() {
        let catalog = Catalog::default();
        assert_eq!(catalog.pack("cinematic_pack").unwrap().included_from, PlanTier::Pro);
        assert_eq!(catalog.pack("retro_pack").unwrap().included_from, PlanTier::Basic);
        assert!(catalog.pack("nonexistent_pack").is_none());
    }

    #[test]
    fn test_credit_pack_amounts() {
        let catalog = Catalog::default();
        assert_eq!(catalog.credit_pack("credits_50").unwrap().credits, 50);
        assert_eq!(catalog.credit_pack("credits_300").unwrap().credits, 300);
    }

    #[test]
    fn test_plan_price_table() {
        let catalog = Catalog::default();
        assert_eq!(catalog.plan_price(PlanTier::Basic, 30), Some(100));
        assert_eq!(catalog.plan_price(PlanTier::Studio, 365), Some(5000));
        // Free is never sold; odd periods are not sold.
        assert_eq!(catalog.plan_price(PlanTier::Free, 30), None);
        assert_eq!(catalog.plan_price(PlanTier::Pro, 90), None);
    }
}
