//! # Recovery Pipeline
//!
//! Runs every stage over one job:
//!
//! ```text
//! positions ──► scan ──► vertex mask ──► StructuralMap ──► assessment
//!                                            │
//! samples ──► oscillation map ──────────────►├──► multi-pass refinement
//!                                            │
//! anchors ──────────────────────────────────►├──► triangulation ──► metrics
//!                                            │
//!                                            └──► expansion (optional)
//! ```
//!
//! Positions are flattened `V × 3`. A vertex is corrupted when any of its
//! three coordinates is flagged by the scan. In JSON, a missing coordinate
//! is written as `null` and read back as NaN.

use crate::candidate::{CandidateProvider, SeededCandidateProvider};
use crate::config::RecoveryConfig;
use crate::corruption::{CorruptionReport, assess_structure, detect_corruption};
use crate::expansion::{
    ExpansionMetrics, PlatonicSolid, StructuralExpander, compute_expansion_metrics,
};
use crate::oscillation::{OscillationAnalyzer, OscillationMap};
use crate::refinement::refine_structure_multi_pass;
use crate::triangulation::{RecoveryMetrics, Triangulator};
use crate::types::{Anchor, AnchorSystem, PolyrecError, PolyrecResult, Position, StructuralMap};
use serde::{Deserialize, Serialize};

/// Coordinates per vertex.
const VERTEX_STRIDE: usize = 3;

// =============================================================================
// INPUT
// =============================================================================

/// Time series, one row of `num_samples` per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    pub data: Vec<f64>,
    pub num_dimensions: usize,
    pub num_samples: usize,
    pub sampling_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryJob {
    /// Flattened `[x0, y0, z0, x1, ...]`; `null` marks a lost coordinate.
    #[serde(with = "nullable_values")]
    pub positions: Vec<f64>,
    pub vertices: u32,
    pub edges: u32,
    pub faces: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<SampleSeries>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand_to: Option<PlatonicSolid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand_level: Option<u32>,
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Counts after refinement. The mask stays indexed by input vertex.
    pub structure: StructuralMap,
    pub corrupted_elements: usize,
    pub element_corruption_rate: f64,
    /// Classification of the input before refinement.
    pub assessment: CorruptionReport,
    pub oscillations: Option<OscillationMap>,
    pub refinement_converged: bool,
    /// Corrupted vertices that were not triangulated keep NaN coordinates.
    pub positions: Vec<Position>,
    /// 1.0 for clean vertices, 0.0 for corrupted vertices left unrecovered.
    pub confidences: Vec<f64>,
    pub recovered_vertices: usize,
    pub metrics: RecoveryMetrics,
    pub expansion: Option<StructuralMap>,
    pub expansion_metrics: Option<ExpansionMetrics>,
}

// =============================================================================
// PIPELINE
// =============================================================================

pub struct RecoveryPipeline<P = SeededCandidateProvider> {
    config: RecoveryConfig,
    provider: P,
    analyzer: OscillationAnalyzer,
    triangulator: Triangulator,
    expander: StructuralExpander,
}

impl RecoveryPipeline {
    /// Pipeline with the seeded provider built from `config.refinement`.
    pub fn from_config(config: RecoveryConfig) -> PolyrecResult<Self> {
        let provider = SeededCandidateProvider::new(
            config.refinement.spread,
            config.refinement.stability_bonus,
        );
        Self::new(config, provider)
    }
}

impl<P: CandidateProvider> RecoveryPipeline<P> {
    /// Validate `config` and assemble every stage.
    pub fn new(config: RecoveryConfig, provider: P) -> PolyrecResult<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: OscillationAnalyzer::new(config.oscillation.clone()),
            triangulator: Triangulator::new(config.triangulation.clone()),
            expander: StructuralExpander::new(config.expansion.clone()),
            config,
            provider,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn run(&self, job: &RecoveryJob) -> PolyrecResult<RecoveryReport> {
        let vertex_count = job.vertices as usize;
        let expected = vertex_count * VERTEX_STRIDE;
        if job.positions.len() != expected {
            return Err(PolyrecError::DimensionMismatch {
                expected,
                actual: job.positions.len(),
            });
        }
        if job.expand_to.is_some() && job.expand_level.is_some() {
            return Err(PolyrecError::InvalidParameter(
                "expand_to and expand_level are mutually exclusive".to_string(),
            ));
        }

        // Stage 1: scan
        let scan = detect_corruption(&job.positions, self.config.corruption.threshold)?;
        let mask = scan.vertex_mask(VERTEX_STRIDE)?;
        let mut structure =
            StructuralMap::new(job.vertices, job.edges, job.faces).with_corruption_mask(mask)?;
        let mut positions: Vec<Position> = job
            .positions
            .chunks_exact(VERTEX_STRIDE)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let trusted: Vec<Position> = positions
            .iter()
            .zip(&structure.corruption_mask)
            .filter_map(|(p, &flag)| (!flag).then_some(*p))
            .collect();
        let assessment = assess_structure(&structure, &trusted);
        tracing::info!(
            corrupted_elements = scan.corrupted,
            corrupted_vertices = structure.corrupted_vertex_count(),
            kind = ?assessment.kind,
            "corruption scan complete"
        );

        // Stage 2: oscillations
        let oscillations = job
            .samples
            .as_ref()
            .map(|s| {
                self.analyzer
                    .analyze(&s.data, s.num_dimensions, s.num_samples, s.sampling_rate)
            })
            .transpose()?;
        if let Some(map) = &oscillations {
            tracing::info!(
                dimensions = map.num_dimensions(),
                converging = map.is_converging,
                "oscillation analysis complete"
            );
        }

        // Stage 3: counts
        let delta_before = structure.invariant_delta();
        let refinement_converged = refine_structure_multi_pass(
            &mut structure,
            oscillations.as_ref(),
            &self.provider,
            &self.config.refinement,
        );
        tracing::info!(
            delta_before,
            delta_after = structure.invariant_delta(),
            converged = refinement_converged,
            "refinement complete"
        );

        // Stage 4: positions
        let mut confidences: Vec<f64> = structure
            .corruption_mask
            .iter()
            .map(|&flag| if flag { 0.0 } else { 1.0 })
            .collect();
        let recovered_vertices = if job.anchors.is_empty() {
            0
        } else {
            let anchors = AnchorSystem::new(job.anchors.clone())?;
            self.triangulator.recover_all_vertices(
                &anchors,
                &structure,
                &mut positions,
                &mut confidences,
            )?
        };
        let metrics = RecoveryMetrics::compute(&confidences, &structure.corruption_mask)?;
        tracing::info!(
            recovered_vertices,
            recovery_rate = metrics.recovery_rate,
            avg_confidence = metrics.avg_confidence,
            "triangulation complete"
        );

        // Stage 5: expansion
        let expansion = match (job.expand_to, job.expand_level) {
            (Some(target), _) => self.expander.expand_to_platonic_solid(&structure, target),
            (None, Some(level)) => self.expander.expand_model_by_level(&structure, level),
            (None, None) => None,
        };
        let expansion_metrics = expansion
            .as_ref()
            .map(|expanded| compute_expansion_metrics(&structure, expanded));
        if let Some(m) = &expansion_metrics {
            tracing::info!(quality = m.quality_score, "expansion complete");
        }

        Ok(RecoveryReport {
            structure,
            corrupted_elements: scan.corrupted,
            element_corruption_rate: scan.rate,
            assessment,
            oscillations,
            refinement_converged,
            positions,
            confidences,
            recovered_vertices,
            metrics,
            expansion,
            expansion_metrics,
        })
    }
}

/// `Vec<f64>` with `null` standing for NaN.
mod nullable_values {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| (!v.is_nan()).then_some(*v))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateRequest;
    use crate::config::TriangulationConfig;
    use crate::types::{Dimension, SearchCandidate};

    fn tetrahedron_job() -> RecoveryJob {
        RecoveryJob {
            positions: vec![
                0.0, 0.0, 0.0, //
                f64::NAN, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0,
            ],
            vertices: 4,
            edges: 6,
            faces: 4,
            samples: None,
            anchors: Vec::new(),
            expand_to: None,
            expand_level: None,
        }
    }

    fn no_candidates(_: &CandidateRequest<'_>) -> Vec<SearchCandidate> {
        Vec::new()
    }

    #[test]
    fn clean_counts_pass_through() {
        let pipeline = RecoveryPipeline::from_config(RecoveryConfig::default()).expect("defaults");
        let report = pipeline.run(&tetrahedron_job()).expect("valid job");

        assert_eq!(report.corrupted_elements, 1);
        assert_eq!(report.structure.corruption_mask, vec![false, true, false, false]);
        assert!(report.structure.satisfies_invariant());
        assert_eq!(report.recovered_vertices, 0);
        assert_eq!(report.confidences, vec![1.0, 0.0, 1.0, 1.0]);
        assert_eq!(report.metrics.corrupted_vertices, 1);
        assert!(report.positions[1][0].is_nan());
        assert!(report.expansion.is_none());
    }

    #[test]
    fn anchors_recover_masked_vertex() {
        let mut job = tetrahedron_job();
        job.anchors = vec![
            Anchor::new(0, [0.0, 0.0, 0.0]),
            Anchor::new(2, [0.0, 1.0, 0.0]),
            Anchor::new(3, [0.0, 0.0, 1.0]),
        ];
        let config = RecoveryConfig {
            triangulation: TriangulationConfig::unbiased(),
            ..RecoveryConfig::default()
        };
        let report = RecoveryPipeline::from_config(config)
            .expect("valid config")
            .run(&job)
            .expect("valid job");

        assert_eq!(report.recovered_vertices, 1);
        assert!(report.positions[1].iter().all(|c| c.is_finite()));
        assert!(report.confidences[1] > 0.0 && report.confidences[1] <= 1.0);
        assert_eq!(report.positions[0], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn refinement_repairs_counts_before_expansion() {
        let mut job = tetrahedron_job();
        job.faces = 3;
        job.expand_to = Some(PlatonicSolid::Cube);

        let report = RecoveryPipeline::from_config(RecoveryConfig::default())
            .expect("defaults")
            .run(&job)
            .expect("valid job");

        assert!(report.refinement_converged);
        assert!(report.structure.satisfies_invariant());
        let cube = report.expansion.expect("cube archetype");
        assert_eq!((cube.num_vertices, cube.num_edges, cube.num_faces), (8, 12, 6));
        assert!(report.expansion_metrics.is_some_and(|m| m.invariant_maintained));
    }

    #[test]
    fn custom_provider_is_used() {
        let mut job = tetrahedron_job();
        job.faces = 3;
        let pipeline =
            RecoveryPipeline::new(RecoveryConfig::default(), no_candidates).expect("defaults");
        let report = pipeline.run(&job).expect("valid job");

        assert!(!report.refinement_converged);
        assert_eq!(report.structure.count(Dimension::Face), 3);
    }

    #[test]
    fn level_expansion_and_samples() {
        let mut job = tetrahedron_job();
        job.expand_level = Some(2);
        job.samples = Some(SampleSeries {
            data: (0..16).map(|i| f64::from(i % 4)).collect(),
            num_dimensions: 1,
            num_samples: 16,
            sampling_rate: 16.0,
        });

        let report = RecoveryPipeline::from_config(RecoveryConfig::default())
            .expect("defaults")
            .run(&job)
            .expect("valid job");

        assert_eq!(report.oscillations.as_ref().map(OscillationMap::num_dimensions), Some(1));
        let expanded = report.expansion.expect("level expansion");
        assert_eq!((expanded.num_vertices, expanded.num_edges), (8, 12));
        assert!(expanded.satisfies_invariant());
    }

    #[test]
    fn rejects_malformed_jobs() {
        let pipeline = RecoveryPipeline::from_config(RecoveryConfig::default()).expect("defaults");

        let mut short = tetrahedron_job();
        short.positions.pop();
        assert_eq!(
            pipeline.run(&short),
            Err(PolyrecError::DimensionMismatch {
                expected: 12,
                actual: 11
            })
        );

        let mut both = tetrahedron_job();
        both.expand_to = Some(PlatonicSolid::Cube);
        both.expand_level = Some(1);
        assert!(matches!(pipeline.run(&both), Err(PolyrecError::InvalidParameter(_))));

        let mut sparse = tetrahedron_job();
        sparse.anchors = vec![Anchor::new(0, [0.0; 3])];
        assert!(matches!(
            pipeline.run(&sparse),
            Err(PolyrecError::InsufficientAnchors { .. })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RecoveryConfig::default();
        config.corruption.threshold = -1.0;
        assert!(RecoveryPipeline::from_config(config).is_err());
    }
}
