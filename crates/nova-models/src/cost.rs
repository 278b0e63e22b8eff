//! Generation credit cost calculation.
//!
//! This module provides the cost function for video generation requests.
//! The function is pure: identical inputs always yield the same integer
//! cost, which idempotent retry matching and the billing tests rely on.
//!
//! # Example
//!
//! ```ignore
//! use nova_models::{GenerationCostCalculator, ResolutionTier};
//!
//! let cost = GenerationCostCalculator::new(5, 30, ResolutionTier::Hd720, "kling")
//!     .calculate();
//!
//! assert_eq!(cost.total, 1); // 1 base unit, all factors 1.0
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::ResolutionTier;

/// Seconds of output covered by one base unit.
pub const SECS_PER_BASE_UNIT: u32 = 5;

/// Frame-rate multiplier. Unknown rates price as baseline.
pub fn frame_rate_factor(frame_rate: u32) -> f64 {
    match frame_rate {
        60 => 1.5,
        _ => 1.0,
    }
}

/// Resolution multiplier.
pub fn resolution_factor(resolution: ResolutionTier) -> f64 {
    match resolution {
        ResolutionTier::Hd720 => 1.0,
        ResolutionTier::Hd1080 => 1.5,
        ResolutionTier::Uhd4k => 2.5,
    }
}

/// Model multiplier. Unknown model ids price as baseline.
pub fn model_factor(model: &str) -> f64 {
    match model.to_lowercase().as_str() {
        "runway" => 1.5,
        "veo" => 2.0,
        _ => 1.0,
    }
}

// =============================================================================
// Cost Breakdown
// =============================================================================

/// Itemized cost of a single generation request, returned to clients so
/// the charge is explainable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostBreakdown {
    /// `ceil(duration / 5s)` base units before multipliers.
    pub base_units: u32,
    /// Frame-rate multiplier applied.
    pub frame_rate_factor: f64,
    /// Resolution multiplier applied.
    pub resolution_factor: f64,
    /// Model multiplier applied.
    pub model_factor: f64,
    /// Final credit cost, never below 1.
    pub total: u32,
}

// =============================================================================
// Cost Calculator
// =============================================================================

/// Calculator for generation costs.
///
/// Cost formula: `max(1, ceil(ceil(duration/5) * fpsFactor * resFactor * modelFactor))`.
#[derive(Debug, Clone)]
pub struct GenerationCostCalculator {
    duration_secs: u32,
    frame_rate: u32,
    resolution: ResolutionTier,
    model: String,
}

impl GenerationCostCalculator {
    /// Create a new calculator with the requested parameters.
    pub fn new(
        duration_secs: u32,
        frame_rate: u32,
        resolution: ResolutionTier,
        model: impl Into<String>,
    ) -> Self {
        Self {
            duration_secs,
            frame_rate,
            resolution,
            model: model.into(),
        }
    }

    /// Calculate the total cost breakdown.
    pub fn calculate(&self) -> CostBreakdown {
        let base_units = self.duration_secs.div_ceil(SECS_PER_BASE_UNIT);
        let fps = frame_rate_factor(self.frame_rate);
        let res = resolution_factor(self.resolution);
        let model = model_factor(&self.model);

        let raw = (base_units as f64) * fps * res * model;
        let total = (raw.ceil() as u32).max(1);

        CostBreakdown {
            base_units,
            frame_rate_factor: fps,
            resolution_factor: res,
            model_factor: model,
            total,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_generation_costs_one() {
        let cost = GenerationCostCalculator::new(5, 30, ResolutionTier::Hd720, "kling")
            .calculate();

        assert_eq!(cost.base_units, 1);
        assert_eq!(cost.total, 1);
    }

    #[test]
    fn test_duration_rounds_up_to_base_units() {
        let cost = GenerationCostCalculator::new(6, 30, ResolutionTier::Hd720, "kling")
            .calculate();
        assert_eq!(cost.base_units, 2);
        assert_eq!(cost.total, 2);

        let cost = GenerationCostCalculator::new(10, 30, ResolutionTier::Hd720, "kling")
            .calculate();
        assert_eq!(cost.base_units, 2);
        assert_eq!(cost.total, 2);
    }

    #[test]
    fn test_factors_multiply_and_round_up() {
        // 2 units * 1.5 fps * 1.5 res = 4.5 -> 5
        let cost = GenerationCostCalculator::new(10, 60, ResolutionTier::Hd1080, "kling")
            .calculate();
        assert_eq!(cost.base_units, 2);
        assert_eq!(cost.total, 5);
    }

    #[test]
    fn test_model_factor() {
        // 1 unit * 2.0 model = 2
        let cost = GenerationCostCalculator::new(5, 30, ResolutionTier::Hd720, "veo")
            .calculate();
        assert_eq!(cost.total, 2);

        // 1 unit * 1.5 model = 1.5 -> 2
        let cost = GenerationCostCalculator::new(5, 30, ResolutionTier::Hd720, "runway")
            .calculate();
        assert_eq!(cost.total, 2);
    }

    #[test]
    fn test_unknown_model_prices_as_baseline() {
        let known = GenerationCostCalculator::new(5, 30, ResolutionTier::Hd720, "kling")
            .calculate();
        let unknown = GenerationCostCalculator::new(5, 30, ResolutionTier::Hd720, "some-new-model")
            .calculate();
        assert_eq!(known.total, unknown.total);
    }

    #[test]
    fn test_zero_duration_floors_at_one() {
        let cost = GenerationCostCalculator::new(0, 30, ResolutionTier::Hd720, "kling")
            .calculate();
        assert_eq!(cost.base_units, 0);
        assert_eq!(cost.total, 1);
    }

    #[test]
    fn test_max_everything() {
        // 4 units * 1.5 fps * 2.5 res * 2.0 model = 30
        let cost = GenerationCostCalculator::new(20, 60, ResolutionTier::Uhd4k, "veo")
            .calculate();
        assert_eq!(cost.base_units, 4);
        assert_eq!(cost.total, 30);
    }

    #[test]
    fn test_determinism() {
        let a = GenerationCostCalculator::new(13, 60, ResolutionTier::Uhd4k, "runway")
            .calculate();
        let b = GenerationCostCalculator::new(13, 60, ResolutionTier::Uhd4k, "runway")
            .calculate();
        assert_eq!(a, b);
    }

}
