//! # polyrec-core
//!
//! The structural recovery engine for polyrec - THE LOGIC.
//!
//! Given a polyhedral structure whose element counts (V, E, F) and vertex
//! layout were corrupted, this crate restores a structure satisfying the
//! Euler invariant `V - E + F = 2` and triangulates lost vertex positions
//! from a sparse set of trusted anchors.
//!
//! ## Data Flow
//!
//! ```text
//! raw values ──► corruption ──► mask
//! samples    ──► oscillation ──► signatures
//!                     │
//!                     ▼
//!   candidate provider ──► refinement (mutates counts)
//!                     │
//!                     ▼
//!              triangulation (fills masked positions)
//!                     │
//!                     ▼
//!              expansion (optional)
//! ```
//!
//! ## Architectural Constraints
//!
//! - Synchronous, in-memory, no I/O
//! - Every loop is bounded by an explicit iteration cap
//! - Stochastic choices derive from an explicit nonce
//! - Refinement and expansion never increase `|V - E + F - 2|`

// =============================================================================
// MODULES
// =============================================================================

pub mod candidate;
pub mod config;
pub mod corruption;
pub mod expansion;
pub mod oscillation;
pub mod pipeline;
pub mod primitives;
pub mod refinement;
pub mod triangulation;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Anchor, AnchorSystem, Dimension, PolyrecError, PolyrecResult, Position, SearchCandidate,
    StructuralMap,
};

// =============================================================================
// RE-EXPORTS: Engine Components
// =============================================================================

pub use candidate::{CandidateProvider, CandidateRequest, SeededCandidateProvider};
pub use config::{
    CorruptionConfig, OscillationConfig, PaddingPolicy, RecoveryConfig, RefinementConfig,
    TriangulationConfig,
};
pub use corruption::{
    CorruptionKind, CorruptionReport, CorruptionScan, assess_structure, detect_corruption,
};
pub use expansion::{
    Archetype, ExpansionMetrics, ExpansionRule, ExpansionRules, HierarchyMetrics, PlatonicSolid,
    SelfSimilarHierarchy, StructuralExpander, compute_expansion_metrics, is_expansion_valid,
};
pub use oscillation::{OscillationAnalyzer, OscillationMap, OscillationSignature};
pub use refinement::{
    CandidateOutcome, ConvergenceHistory, IterativeSearch, RefinementOutcome, RejectReason,
    SweepTermination, apply_candidate, is_structure_converged, refine_structure,
    refine_structure_multi_pass,
};
pub use triangulation::{
    RecoveryMetrics, SolveTermination, TriangulationMetrics, Triangulator, VertexRecovery,
};

// =============================================================================
// RE-EXPORTS: Orchestration
// =============================================================================

pub use pipeline::{RecoveryJob, RecoveryPipeline, RecoveryReport, SampleSeries};
