//! Time-bounded entitlement grants.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::clock;

/// The discrete, independently purchasable entitlement grants.
///
/// Prompt-builder access is deliberately not listed here: it is derived
/// from the studio plan and never sold or extended on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementKind {
    NoWatermark,
    AdFree,
    Templates,
    ProPrompt,
}

impl EntitlementKind {
    /// All four grants, in stored-field order.
    pub const ALL: [EntitlementKind; 4] = [
        EntitlementKind::NoWatermark,
        EntitlementKind::AdFree,
        EntitlementKind::Templates,
        EntitlementKind::ProPrompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementKind::NoWatermark => "no_watermark",
            EntitlementKind::AdFree => "ad_free",
            EntitlementKind::Templates => "templates",
            EntitlementKind::ProPrompt => "pro_prompt",
        }
    }
}

impl std::fmt::Display for EntitlementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entitlement state carried on a user ledger.
///
/// Each `*_until` field is an independent expiry. `prompt_builder_until`
/// shadows the studio plan window. `packs_owned` is the permanent
/// (never-expiring) pack set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entitlements {
    pub no_watermark_until: Option<DateTime<Utc>>,
    pub ad_free_until: Option<DateTime<Utc>>,
    pub templates_until: Option<DateTime<Utc>>,
    pub pro_prompt_until: Option<DateTime<Utc>>,
    pub prompt_builder_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub packs_owned: BTreeSet<String>,
}

impl Entitlements {
    /// Read the expiry for a discrete grant.
    pub fn until(&self, kind: EntitlementKind) -> Option<DateTime<Utc>> {
        match kind {
            EntitlementKind::NoWatermark => self.no_watermark_until,
            EntitlementKind::AdFree => self.ad_free_until,
            EntitlementKind::Templates => self.templates_until,
            EntitlementKind::ProPrompt => self.pro_prompt_until,
        }
    }

    /// Write the expiry for a discrete grant.
    pub fn set_until(&mut self, kind: EntitlementKind, until: Option<DateTime<Utc>>) {
        match kind {
            EntitlementKind::NoWatermark => self.no_watermark_until = until,
            EntitlementKind::AdFree => self.ad_free_until = until,
            EntitlementKind::Templates => self.templates_until = until,
            EntitlementKind::ProPrompt => self.pro_prompt_until = until,
        }
    }

    /// Whether a discrete grant is currently active.
    pub fn is_active(&self, kind: EntitlementKind, now: DateTime<Utc>) -> bool {
        clock::is_active(self.until(kind), now)
    }

    /// Stack a grant by `days` per the extension rule.
    ///
    /// Returns the new expiry.
    pub fn extend(
        &mut self,
        kind: EntitlementKind,
        days: i64,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let new_until = clock::extend(self.until(kind), days, now);
        self.set_until(kind, Some(new_until));
        new_until
    }

    /// Whether a permanent pack is in the owned set.
    pub fn owns_pack(&self, pack_id: &str) -> bool {
        self.packs_owned.contains(pack_id)
    }

    /// Add a pack id to the owned set. Idempotent.
    pub fn grant_pack(&mut self, pack_id: impl Into<String>) {
        self.packs_owned.insert(pack_id.into());
    }
}
