//! # Recovery Configuration
//!
//! Tunable parameters of every engine stage, grouped per stage.
//!
//! All groups deserialize with `#[serde(default)]`, so a TOML file only needs
//! to name the values it overrides. Defaults reproduce the constants in
//! [`crate::primitives`].

use crate::expansion::ExpansionRules;
use crate::primitives::{
    CORRELATION_FREQUENCY_SCALE, DEFAULT_ATTRACTOR_WEIGHT, DEFAULT_ATTRACTORS,
    DEFAULT_CANDIDATE_SPREAD, DEFAULT_COPLANAR_LIFT, GAUSS_NEWTON_MAX_ITERATIONS,
    GAUSS_NEWTON_TOLERANCE, MIN_DISTANCE, MULTI_PASS_INNER_ITERATIONS, SINGULAR_PIVOT,
    STABILITY_COV_THRESHOLD,
};
use crate::types::{PolyrecError, PolyrecResult};
use serde::{Deserialize, Serialize};

// =============================================================================
// TOP LEVEL
// =============================================================================

/// Configuration for a full recovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub corruption: CorruptionConfig,
    pub oscillation: OscillationConfig,
    pub refinement: RefinementConfig,
    pub triangulation: TriangulationConfig,
    pub expansion: ExpansionRules,
}

impl RecoveryConfig {
    /// Validate every group.
    pub fn validate(&self) -> PolyrecResult<()> {
        self.corruption.validate()?;
        self.oscillation.validate()?;
        self.refinement.validate()?;
        self.triangulation.validate()?;
        self.expansion.validate()
    }
}

// =============================================================================
// CORRUPTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorruptionConfig {
    /// Values with `|x|` above this are corrupted.
    /// Default: 1e6.
    pub threshold: f64,
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self { threshold: 1e6 }
    }
}

impl CorruptionConfig {
    pub fn validate(&self) -> PolyrecResult<()> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(PolyrecError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

// =============================================================================
// OSCILLATION
// =============================================================================

/// What to do with a sample series whose length is not a power of two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Append zeros up to the next power of two.
    #[default]
    ZeroPad,
    /// Fail with `NonPowerOfTwo`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillationConfig {
    /// A dimension is stable when its magnitude CoV is below this.
    /// Default: 0.10.
    pub stability_cov_threshold: f64,

    /// Frequency scale (Hz) of the cross-correlation decay.
    /// Default: 10.0.
    pub correlation_scale: f64,

    /// Default: zero padding.
    pub padding: PaddingPolicy,
}

impl Default for OscillationConfig {
    fn default() -> Self {
        Self {
            stability_cov_threshold: STABILITY_COV_THRESHOLD,
            correlation_scale: CORRELATION_FREQUENCY_SCALE,
            padding: PaddingPolicy::ZeroPad,
        }
    }
}

impl OscillationConfig {
    pub fn validate(&self) -> PolyrecResult<()> {
        if !(self.stability_cov_threshold.is_finite() && self.stability_cov_threshold > 0.0) {
            return Err(PolyrecError::InvalidConfig(format!(
                "oscillation.stability_cov_threshold must be positive, got {}",
                self.stability_cov_threshold
            )));
        }
        if !(self.correlation_scale.is_finite() && self.correlation_scale > 0.0) {
            return Err(PolyrecError::InvalidConfig(format!(
                "oscillation.correlation_scale must be positive, got {}",
                self.correlation_scale
            )));
        }
        Ok(())
    }
}

// =============================================================================
// REFINEMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Number of multi-pass rounds.
    /// Default: 9 (three rounds per dimension).
    pub num_passes: u32,

    /// Candidates requested from the provider per round.
    /// Default: 8.
    pub candidates_per_pass: usize,

    /// Sweep cap of each round.
    /// Default: 10.
    pub inner_iterations: u32,

    /// A sweep whose corruption change is below this has converged.
    /// Default: 0.01.
    pub convergence_threshold: f64,

    /// Half-width of the seeded candidate offset window.
    /// Default: 3.
    pub spread: u32,

    /// Score multiplier bonus for dimensions with a stable signature.
    /// Default: 0.1.
    pub stability_bonus: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            num_passes: 9,
            candidates_per_pass: 8,
            inner_iterations: MULTI_PASS_INNER_ITERATIONS,
            convergence_threshold: 0.01,
            spread: DEFAULT_CANDIDATE_SPREAD,
            stability_bonus: 0.1,
        }
    }
}

impl RefinementConfig {
    pub fn validate(&self) -> PolyrecResult<()> {
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(PolyrecError::InvalidThreshold(self.convergence_threshold));
        }
        if self.inner_iterations == 0 {
            return Err(PolyrecError::InvalidConfig(
                "refinement.inner_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.stability_bonus.is_finite() && self.stability_bonus >= 0.0) {
            return Err(PolyrecError::InvalidConfig(format!(
                "refinement.stability_bonus must be non-negative, got {}",
                self.stability_bonus
            )));
        }
        Ok(())
    }
}

// =============================================================================
// TRIANGULATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Gauss–Newton iteration cap.
    /// Default: 100.
    pub max_iterations: u32,

    /// Stop when the update norm drops below this.
    /// Default: 1e-6.
    pub tolerance: f64,

    /// Pivots below this make the system singular.
    /// Default: 1e-10.
    pub singular_pivot: f64,

    /// Floor for point-to-anchor distances.
    /// Default: 1e-10.
    pub min_distance: f64,

    /// Stability attractors. An empty list disables the bias.
    /// Default: 4, 16, 256, 65536, 27, 7625597484987, 3125.
    pub attractors: Vec<f64>,

    /// Blend weight toward the nearest attractor.
    /// Default: 0.1.
    pub attractor_weight: f64,

    /// Normal offset applied to a start point lying in the anchor plane.
    /// Default: 1.0. Zero disables the lift.
    pub coplanar_lift: f64,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            max_iterations: GAUSS_NEWTON_MAX_ITERATIONS,
            tolerance: GAUSS_NEWTON_TOLERANCE,
            singular_pivot: SINGULAR_PIVOT,
            min_distance: MIN_DISTANCE,
            attractors: DEFAULT_ATTRACTORS.to_vec(),
            attractor_weight: DEFAULT_ATTRACTOR_WEIGHT,
            coplanar_lift: DEFAULT_COPLANAR_LIFT,
        }
    }
}

impl TriangulationConfig {
    /// The default solver with the attractor bias switched off.
    #[must_use]
    pub fn unbiased() -> Self {
        Self {
            attractors: Vec::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PolyrecResult<()> {
        if self.max_iterations == 0 {
            return Err(PolyrecError::InvalidConfig(
                "triangulation.max_iterations must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("tolerance", self.tolerance),
            ("singular_pivot", self.singular_pivot),
            ("min_distance", self.min_distance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(PolyrecError::InvalidConfig(format!(
                    "triangulation.{name} must be positive, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.attractor_weight) {
            return Err(PolyrecError::InvalidConfig(format!(
                "triangulation.attractor_weight must be within [0, 1], got {}",
                self.attractor_weight
            )));
        }
        if self.attractors.iter().any(|a| !a.is_finite()) {
            return Err(PolyrecError::InvalidConfig(
                "triangulation.attractors must be finite".to_string(),
            ));
        }
        if !(self.coplanar_lift.is_finite() && self.coplanar_lift >= 0.0) {
            return Err(PolyrecError::InvalidConfig(format!(
                "triangulation.coplanar_lift must be non-negative, got {}",
                self.coplanar_lift
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RecoveryConfig::default()
            .validate()
            .expect("default config is valid");
    }

    #[test]
    fn default_attractors_match_primitives() {
        let config = TriangulationConfig::default();
        assert_eq!(config.attractors, DEFAULT_ATTRACTORS.to_vec());
        assert_eq!(config.attractor_weight, 0.1);
        assert!(TriangulationConfig::unbiased().attractors.is_empty());
    }

    #[test]
    fn rejects_non_positive_corruption_threshold() {
        let config = RecoveryConfig {
            corruption: CorruptionConfig { threshold: 0.0 },
            ..RecoveryConfig::default()
        };
        assert_eq!(config.validate(), Err(PolyrecError::InvalidThreshold(0.0)));
    }

    #[test]
    fn rejects_attractor_weight_above_one() {
        let config = TriangulationConfig {
            attractor_weight: 1.5,
            ..TriangulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PolyrecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_inner_iterations() {
        let config = RefinementConfig {
            inner_iterations: 0,
            ..RefinementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn padding_defaults_to_zero_pad() {
        assert_eq!(OscillationConfig::default().padding, PaddingPolicy::ZeroPad);
    }
}
