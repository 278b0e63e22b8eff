//! Plan tiers and generation limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Absolute ceilings that apply regardless of plan.
pub const HARD_MAX_DURATION_SECS: u32 = 20;
pub const HARD_MAX_FRAME_RATE: u32 = 60;

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Basic,
    Pro,
    Studio,
}

impl PlanTier {
    /// Parse from string (case-insensitive). Unknown values fall back to free.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "basic" => PlanTier::Basic,
            "pro" => PlanTier::Pro,
            "studio" => PlanTier::Studio,
            _ => PlanTier::Free,
        }
    }

    /// Parse a purchasable plan id. Free is the fallback state, never sold.
    pub fn purchasable_from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Some(PlanTier::Basic),
            "pro" => Some(PlanTier::Pro),
            "studio" => Some(PlanTier::Studio),
            _ => None,
        }
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Studio => "studio",
        }
    }

    /// Paid plans that bundle the no-watermark/ad-free/templates/pro-prompt grants.
    pub fn bundles_entitlements(&self) -> bool {
        matches!(self, PlanTier::Pro | PlanTier::Studio)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output resolution tier, totally ordered for limit comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum ResolutionTier {
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl ResolutionTier {
    /// Parse from string. Unknown values fall back to the lowest tier.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "1080p" => ResolutionTier::Hd1080,
            "4k" => ResolutionTier::Uhd4k,
            _ => ResolutionTier::Hd720,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::Hd720 => "720p",
            ResolutionTier::Hd1080 => "1080p",
            ResolutionTier::Uhd4k => "4k",
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-plan generation ceilings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanLimits {
    /// Plan identifier.
    pub plan_id: String,
    /// Maximum clip duration in seconds.
    pub max_duration_secs: u32,
    /// Maximum frame rate.
    pub max_frame_rate: u32,
    /// Highest allowed resolution tier.
    pub max_resolution: ResolutionTier,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            plan_id: "free".to_string(),
            max_duration_secs: 5,
            max_frame_rate: 30,
            max_resolution: ResolutionTier::Hd720,
        }
    }
}

impl PlanLimits {
    /// Create limits for a specific plan tier.
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self::default(),
            PlanTier::Basic => Self {
                plan_id: "basic".to_string(),
                max_duration_secs: 10,
                max_frame_rate: 30,
                max_resolution: ResolutionTier::Hd1080,
            },
            PlanTier::Pro => Self {
                plan_id: "pro".to_string(),
                max_duration_secs: 15,
                max_frame_rate: 60,
                max_resolution: ResolutionTier::Uhd4k,
            },
            PlanTier::Studio => Self {
                plan_id: "studio".to_string(),
                max_duration_secs: 20,
                max_frame_rate: 60,
                max_resolution: ResolutionTier::Uhd4k,
            },
        }
    }
}

/// Which requested dimension violated a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LimitDimension {
    Duration,
    FrameRate,
    Resolution,
}

impl LimitDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitDimension::Duration => "duration",
            LimitDimension::FrameRate => "frame_rate",
            LimitDimension::Resolution => "resolution",
        }
    }
}

impl std::fmt::Display for LimitDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of checking requested parameters against hard and plan ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitCheck {
    Ok,
    /// Request exceeds an absolute ceiling that no plan lifts.
    HardCap {
        dimension: LimitDimension,
        requested: u32,
        max: u32,
    },
    /// Request exceeds the resolved plan's ceiling.
    PlanCap {
        dimension: LimitDimension,
        plan: PlanTier,
        requested: String,
        allowed: String,
    },
}

/// Check requested generation parameters against hard caps first, then the
/// plan's own ceilings. Hard-cap violations win over plan violations so a
/// free user asking for 30s is told about the 20s ceiling, not the 5s one.
pub fn enforce_limits(
    plan: PlanTier,
    duration_secs: u32,
    frame_rate: u32,
    resolution: ResolutionTier,
) -> LimitCheck {
    if duration_secs > HARD_MAX_DURATION_SECS {
        return LimitCheck::HardCap {
            dimension: LimitDimension::Duration,
            requested: duration_secs,
            max: HARD_MAX_DURATION_SECS,
        };
    }
    if frame_rate > HARD_MAX_FRAME_RATE {
        return LimitCheck::HardCap {
            dimension: LimitDimension::FrameRate,
            requested: frame_rate,
            max: HARD_MAX_FRAME_RATE,
        };
    }

    let limits = PlanLimits::for_tier(plan);
    if duration_secs > limits.max_duration_secs {
        return LimitCheck::PlanCap {
            dimension: LimitDimension::Duration,
            plan,
            requested: format!("{}s", duration_secs),
            allowed: format!("{}s", limits.max_duration_secs),
        };
    }
    if frame_rate > limits.max_frame_rate {
        return LimitCheck::PlanCap {
            dimension: LimitDimension::FrameRate,
            plan,
            requested: format!("{}fps", frame_rate),
            allowed: format!("{}fps", limits.max_frame_rate),
        };
    }
    if resolution > limits.max_resolution {
        return LimitCheck::PlanCap {
            dimension: LimitDimension::Resolution,
            plan,
            requested: resolution.as_str().to_string(),
            allowed: limits.max_resolution.as_str().to_string(),
        };
    }

    LimitCheck::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_from_string() {
        assert_eq!(PlanTier::from_str("free"), PlanTier::Free);
        assert_eq!(PlanTier::from_str("basic"), PlanTier::Basic);
        assert_eq!(PlanTier::from_str("pro"), PlanTier::Pro);
        assert_eq!(PlanTier::from_str("studio"), PlanTier::Studio);
        assert_eq!(PlanTier::from_str("unknown"), PlanTier::Free); // Default
        assert_eq!(PlanTier::from_str("STUDIO"), PlanTier::Studio); // Case insensitive
        assert_eq!(PlanTier::from_str("Pro"), PlanTier::Pro); // Mixed case
    }

    #[test]
    fn test_purchasable_excludes_free() {
        assert_eq!(PlanTier::purchasable_from_str("free"), None);
        assert_eq!(PlanTier::purchasable_from_str("basic"), Some(PlanTier::Basic));
        assert_eq!(PlanTier::purchasable_from_str("garbage"), None);
    }

    #[test]
    fn test_resolution_ordering() {
        assert!(ResolutionTier::Hd720 < ResolutionTier::Hd1080);
        assert!(ResolutionTier::Hd1080 < ResolutionTier::Uhd4k);
    }

    #[test]
    fn test_resolution_from_string_unknown_is_lowest() {
        assert_eq!(ResolutionTier::from_str("4K"), ResolutionTier::Uhd4k);
        assert_eq!(ResolutionTier::from_str("1080p"), ResolutionTier::Hd1080);
        assert_eq!(ResolutionTier::from_str("8k"), ResolutionTier::Hd720);
        assert_eq!(ResolutionTier::from_str(""), ResolutionTier::Hd720);
    }

    #[test]
    fn test_limits_per_tier() {
        let free = PlanLimits::for_tier(PlanTier::Free);
        assert_eq!(free.max_duration_secs, 5);
        assert_eq!(free.max_resolution, ResolutionTier::Hd720);

        let studio = PlanLimits::for_tier(PlanTier::Studio);
        assert_eq!(studio.max_duration_secs, 20);
        assert_eq!(studio.max_frame_rate, 60);
        assert_eq!(studio.max_resolution, ResolutionTier::Uhd4k);
    }

    #[test]
    fn test_enforce_within_limits() {
        let check = enforce_limits(PlanTier::Free, 5, 30, ResolutionTier::Hd720);
        assert_eq!(check, LimitCheck::Ok);
    }

    #[test]
    fn test_enforce_hard_cap_before_plan_cap() {
        // 30s violates both the free ceiling and the hard ceiling; the hard
        // cap must be reported.
        let check = enforce_limits(PlanTier::Free, 30, 30, ResolutionTier::Hd720);
        assert!(matches!(
            check,
            LimitCheck::HardCap { dimension: LimitDimension::Duration, requested: 30, max: 20 }
        ));
    }

    #[test]
    fn test_enforce_hard_cap_frame_rate() {
        let check = enforce_limits(PlanTier::Studio, 10, 120, ResolutionTier::Hd720);
        assert!(matches!(
            check,
            LimitCheck::HardCap { dimension: LimitDimension::FrameRate, requested: 120, max: 60 }
        ));
    }

    #[test]
    fn test_enforce_plan_cap_resolution() {
        let check = enforce_limits(PlanTier::Free, 5, 30, ResolutionTier::Uhd4k);
        match check {
            LimitCheck::PlanCap { dimension, plan, requested, allowed } => {
                assert_eq!(dimension, LimitDimension::Resolution);
                assert_eq!(plan, PlanTier::Free);
                assert_eq!(requested, "4k");
                assert_eq!(allowed, "720p");
            }
            other => panic!("expected plan cap, got {:?}", other),
        }
    }

    #[test]
    fn test_enforce_plan_cap_duration() {
        let check = enforce_limits(PlanTier::Basic, 15, 30, ResolutionTier::Hd720);
        assert!(matches!(
            check,
            LimitCheck::PlanCap { dimension: LimitDimension::Duration, plan: PlanTier::Basic, .. }
        ));
    }

    #[test]
    fn test_studio_at_hard_ceiling_is_ok() {
        let check = enforce_limits(PlanTier::Studio, 20, 60, ResolutionTier::Uhd4k);
        assert_eq!(check, LimitCheck::Ok);
    }
}
