//! # Structural Expansion
//!
//! Grows a structure into a larger one that satisfies `V - E + F = 2`.
//!
//! Three growth modes:
//!
//! - **Archetype**: replace the counts with a platonic solid's canonical
//!   triple. The rule table and the canonical counts are data
//!   ([`ExpansionRules`]) and can be swapped through configuration.
//! - **Level**: scale every count by `1 + 0.5·level`, then force
//!   `F := 2 + E - V`.
//! - **Self-similar**: each vertex of level `k` becomes a copy of level `k`,
//!   giving `V' = V²`, `E' = E·V`, `F' = 2 + E' - V'`.
//!
//! The corruption reductions attached to each mode (×0.8, ×0.9, ×0.618)
//! are heuristics carried on the result, not measurements.

use crate::primitives::{
    LEVEL_CORRUPTION_RETENTION, LEVEL_GROWTH_PER_STEP, MAX_HIERARCHY_LEVELS,
    PLATONIC_CORRUPTION_RETENTION, QUALITY_WEIGHT_CORRUPTION, QUALITY_WEIGHT_GROWTH,
    QUALITY_WEIGHT_INVARIANT, SELF_SIMILAR_SCALE,
};
use crate::types::{PolyrecError, PolyrecResult, StructuralMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retention applied to a level's corruption per cleaner coarse level.
const COARSE_GUIDANCE: f64 = 0.9;
/// Retention applied to a level's corruption per cleaner fine level.
const FINE_GUIDANCE: f64 = 0.95;

// =============================================================================
// ARCHETYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatonicSolid {
    Tetrahedron,
    Cube,
    Octahedron,
    Dodecahedron,
    Icosahedron,
}

impl PlatonicSolid {
    pub const ALL: [Self; 5] = [
        Self::Tetrahedron,
        Self::Cube,
        Self::Octahedron,
        Self::Dodecahedron,
        Self::Icosahedron,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tetrahedron => "tetrahedron",
            Self::Cube => "cube",
            Self::Octahedron => "octahedron",
            Self::Dodecahedron => "dodecahedron",
            Self::Icosahedron => "icosahedron",
        }
    }
}

impl fmt::Display for PlatonicSolid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlatonicSolid {
    type Err = PolyrecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|solid| solid.name() == wanted)
            .ok_or_else(|| PolyrecError::InvalidParameter(format!("unknown platonic solid: {s}")))
    }
}

/// Canonical element counts of one solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archetype {
    pub solid: PlatonicSolid,
    pub vertices: u32,
    pub edges: u32,
    pub faces: u32,
}

impl Archetype {
    #[must_use]
    pub const fn new(solid: PlatonicSolid, vertices: u32, edges: u32, faces: u32) -> Self {
        Self {
            solid,
            vertices,
            edges,
            faces,
        }
    }

    #[must_use]
    pub fn matches(&self, map: &StructuralMap) -> bool {
        (map.num_vertices, map.num_edges, map.num_faces)
            == (self.vertices, self.edges, self.faces)
    }
}

/// Directed expansion `source -> target` with its growth factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpansionRule {
    pub source: PlatonicSolid,
    pub target: PlatonicSolid,
    pub factor: f64,
}

impl ExpansionRule {
    #[must_use]
    pub const fn new(source: PlatonicSolid, target: PlatonicSolid, factor: f64) -> Self {
        Self {
            source,
            target,
            factor,
        }
    }
}

/// Archetype table plus expansion rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionRules {
    /// Canonical counts per solid.
    ///
    /// Default: the five convex regular polyhedra.
    pub archetypes: Vec<Archetype>,
    /// Allowed expansions.
    ///
    /// Default: tetrahedron to cube/octahedron/icosahedron, cube and
    /// octahedron into each other and to their larger dual pair, and
    /// dodecahedron/icosahedron into each other.
    pub rules: Vec<ExpansionRule>,
}

impl Default for ExpansionRules {
    fn default() -> Self {
        use PlatonicSolid::{Cube, Dodecahedron, Icosahedron, Octahedron, Tetrahedron};
        Self {
            archetypes: vec![
                Archetype::new(Tetrahedron, 4, 6, 4),
                Archetype::new(Cube, 8, 12, 6),
                Archetype::new(Octahedron, 6, 12, 8),
                Archetype::new(Dodecahedron, 20, 30, 12),
                Archetype::new(Icosahedron, 12, 30, 20),
            ],
            rules: vec![
                ExpansionRule::new(Tetrahedron, Cube, 2.0),
                ExpansionRule::new(Tetrahedron, Octahedron, 1.5),
                ExpansionRule::new(Tetrahedron, Icosahedron, 3.0),
                ExpansionRule::new(Cube, Octahedron, 1.5),
                ExpansionRule::new(Octahedron, Cube, 1.5),
                ExpansionRule::new(Cube, Dodecahedron, 2.5),
                ExpansionRule::new(Octahedron, Icosahedron, 2.5),
                ExpansionRule::new(Dodecahedron, Icosahedron, 1.618),
                ExpansionRule::new(Icosahedron, Dodecahedron, 1.618),
            ],
        }
    }
}

impl ExpansionRules {
    /// Archetypes must be unique per solid; factors finite and positive.
    pub fn validate(&self) -> PolyrecResult<()> {
        for (i, archetype) in self.archetypes.iter().enumerate() {
            if self.archetypes[..i].iter().any(|a| a.solid == archetype.solid) {
                return Err(PolyrecError::InvalidConfig(format!(
                    "expansion.archetypes lists {} twice",
                    archetype.solid
                )));
            }
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| !(r.factor.is_finite() && r.factor > 0.0))
        {
            return Err(PolyrecError::InvalidConfig(format!(
                "expansion factor {} -> {} must be positive, got {}",
                rule.source, rule.target, rule.factor
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn archetype(&self, solid: PlatonicSolid) -> Option<&Archetype> {
        self.archetypes.iter().find(|a| a.solid == solid)
    }

    /// Solid whose canonical counts equal the map's counts.
    #[must_use]
    pub fn classify(&self, map: &StructuralMap) -> Option<PlatonicSolid> {
        self.archetypes
            .iter()
            .find(|a| a.matches(map))
            .map(|a| a.solid)
    }

    /// Growth factor of `source -> target`; 1.0 when no rule exists.
    #[must_use]
    pub fn expansion_factor(&self, source: PlatonicSolid, target: PlatonicSolid) -> f64 {
        self.rules
            .iter()
            .find(|r| r.source == source && r.target == target)
            .map_or(1.0, |r| r.factor)
    }

    /// Targets reachable from `source` in rule order.
    #[must_use]
    pub fn available_expansions(&self, source: PlatonicSolid) -> Vec<PlatonicSolid> {
        self.rules
            .iter()
            .filter(|r| r.source == source)
            .map(|r| r.target)
            .collect()
    }
}

// =============================================================================
// EXPANDER
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct StructuralExpander {
    rules: ExpansionRules,
}

impl StructuralExpander {
    #[must_use]
    pub const fn new(rules: ExpansionRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub const fn rules(&self) -> &ExpansionRules {
        &self.rules
    }

    /// Build the target's canonical structure.
    ///
    /// Returns `None` when the target has no archetype or its counts break
    /// the invariant. The result has a clean mask and carries the source's
    /// corruption percentage scaled by 0.8.
    #[must_use]
    pub fn expand_to_platonic_solid(
        &self,
        source: &StructuralMap,
        target: PlatonicSolid,
    ) -> Option<StructuralMap> {
        let Some(archetype) = self.rules.archetype(target) else {
            tracing::warn!(%target, "no archetype for expansion target");
            return None;
        };
        let mut expanded = StructuralMap::new(archetype.vertices, archetype.edges, archetype.faces);
        if !expanded.satisfies_invariant() {
            tracing::warn!(
                %target,
                euler = expanded.euler_characteristic(),
                "archetype violates the invariant"
            );
            return None;
        }
        expanded.corruption_percentage =
            source.corruption_percentage * PLATONIC_CORRUPTION_RETENTION;
        tracing::debug!(%target, "expanded to archetype");
        Some(expanded)
    }

    /// Scale every count by `1 + 0.5·level` (rounded down) and force
    /// `F := 2 + E - V`.
    ///
    /// Returns `None` when a scaled count leaves `u32` or the forced face
    /// count would be below one.
    #[must_use]
    pub fn expand_model_by_level(
        &self,
        source: &StructuralMap,
        level: u32,
    ) -> Option<StructuralMap> {
        let scale = 1.0 + LEVEL_GROWTH_PER_STEP * f64::from(level);
        let vertices = scale_count(source.num_vertices, scale)?;
        let edges = scale_count(source.num_edges, scale)?;

        let faces = 2 + i64::from(edges) - i64::from(vertices);
        if faces < 1 {
            tracing::warn!(level, vertices, edges, "level expansion leaves no faces");
            return None;
        }
        let faces = u32::try_from(faces).ok()?;

        let mut expanded = StructuralMap::new(vertices, edges, faces);
        expanded.corruption_percentage = source.corruption_percentage * LEVEL_CORRUPTION_RETENTION;
        tracing::debug!(level, vertices, edges, faces, "expanded by level");
        Some(expanded)
    }
}

fn scale_count(count: u32, scale: f64) -> Option<u32> {
    let scaled = (f64::from(count) * scale).floor();
    (scaled <= f64::from(u32::MAX)).then_some(scaled as u32)
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    f64::from(numerator) / f64::from(denominator)
}

/// Invariant holds, every count is non-zero, and the mask covers `V`.
#[must_use]
pub fn is_expansion_valid(map: &StructuralMap) -> bool {
    map.satisfies_invariant()
        && map.num_vertices > 0
        && map.num_edges > 0
        && map.num_faces > 0
        && map.corruption_mask.len() == map.num_vertices as usize
}

// =============================================================================
// METRICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpansionMetrics {
    /// Ratios are 0.0 when the source count is zero.
    pub vertex_ratio: f64,
    pub edge_ratio: f64,
    pub face_ratio: f64,
    /// `source - expanded` corruption percentage.
    pub corruption_reduction: f64,
    pub invariant_maintained: bool,
    /// `0.5·maintained + 0.3·reduced + 0.2·grew`, in `[0, 1]`.
    pub quality_score: f64,
}

#[must_use]
pub fn compute_expansion_metrics(
    source: &StructuralMap,
    expanded: &StructuralMap,
) -> ExpansionMetrics {
    let vertex_ratio = ratio(expanded.num_vertices, source.num_vertices);
    let corruption_reduction = source.corruption_percentage - expanded.corruption_percentage;
    let invariant_maintained = expanded.satisfies_invariant();

    let mut quality_score = 0.0;
    if invariant_maintained {
        quality_score += QUALITY_WEIGHT_INVARIANT;
    }
    if corruption_reduction > 0.0 {
        quality_score += QUALITY_WEIGHT_CORRUPTION;
    }
    if vertex_ratio > 1.0 {
        quality_score += QUALITY_WEIGHT_GROWTH;
    }

    ExpansionMetrics {
        vertex_ratio,
        edge_ratio: ratio(expanded.num_edges, source.num_edges),
        face_ratio: ratio(expanded.num_faces, source.num_faces),
        corruption_reduction,
        invariant_maintained,
        quality_score,
    }
}

// =============================================================================
// SELF-SIMILAR HIERARCHY
// =============================================================================

/// Levels from coarse (index 0, the base) to fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfSimilarHierarchy {
    levels: Vec<StructuralMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HierarchyMetrics {
    pub num_levels: usize,
    pub self_similarity_score: f64,
    pub all_levels_valid: bool,
    pub average_corruption: f64,
    pub total_vertices: u64,
}

impl SelfSimilarHierarchy {
    /// Build `num_levels` levels starting from a clean-mask copy of `base`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for zero levels or more than
    /// [`MAX_HIERARCHY_LEVELS`], `CountOverflow` when a level's counts leave
    /// `u32`.
    pub fn generate(base: &StructuralMap, num_levels: usize) -> PolyrecResult<Self> {
        if num_levels == 0 {
            return Err(PolyrecError::InvalidParameter(
                "hierarchy needs at least one level".to_string(),
            ));
        }
        if num_levels > MAX_HIERARCHY_LEVELS {
            return Err(PolyrecError::InvalidParameter(format!(
                "hierarchy is limited to {MAX_HIERARCHY_LEVELS} levels, got {num_levels}"
            )));
        }
        let mut first = StructuralMap::new(base.num_vertices, base.num_edges, base.num_faces);
        first.corruption_percentage = base.corruption_percentage;

        let mut levels = Vec::with_capacity(num_levels);
        levels.push(first);
        for depth in 1..num_levels {
            let next = next_level(&levels[depth - 1], depth)?;
            levels.push(next);
        }
        tracing::debug!(num_levels, "self-similar hierarchy generated");
        Ok(Self { levels })
    }

    #[must_use]
    pub fn levels(&self) -> &[StructuralMap] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, depth: usize) -> Option<&StructuralMap> {
        self.levels.get(depth)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Every level satisfies the invariant with non-zero counts, and vertex
    /// counts strictly grow.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let levels_ok = self.levels.iter().all(|l| {
            l.satisfies_invariant() && l.num_vertices > 0 && l.num_edges > 0 && l.num_faces > 0
        });
        levels_ok
            && self
                .levels
                .windows(2)
                .all(|pair| pair[1].num_vertices > pair[0].num_vertices)
    }

    /// Mean over adjacent levels of `1 / (1 + |rv - re| + |re - rf|)`.
    /// Zero with fewer than two levels.
    #[must_use]
    pub fn self_similarity_score(&self) -> f64 {
        if self.levels.len() < 2 {
            return 0.0;
        }
        let total: f64 = self
            .levels
            .windows(2)
            .map(|pair| {
                let (prev, curr) = (&pair[0], &pair[1]);
                let rv = ratio(curr.num_vertices, prev.num_vertices);
                let re = ratio(curr.num_edges, prev.num_edges);
                let rf = ratio(curr.num_faces, prev.num_faces);
                1.0 / (1.0 + (rv - re).abs() + (re - rf).abs())
            })
            .sum();
        total / (self.levels.len() - 1) as f64
    }

    /// Lower the corruption of one level using cleaner neighbours: ×0.9 per
    /// coarser level and ×0.95 per finer level that is less corrupted.
    ///
    /// Returns `false` when `depth` is out of range.
    pub fn guide_level(&mut self, depth: usize) -> bool {
        let Some(mut corruption) = self.levels.get(depth).map(|l| l.corruption_percentage) else {
            return false;
        };
        for (i, other) in self.levels.iter().enumerate() {
            if i == depth || other.corruption_percentage >= corruption {
                continue;
            }
            corruption *= if i < depth { COARSE_GUIDANCE } else { FINE_GUIDANCE };
        }
        self.levels[depth].corruption_percentage = corruption;
        true
    }

    #[must_use]
    pub fn metrics(&self) -> HierarchyMetrics {
        let total_corruption: f64 = self.levels.iter().map(|l| l.corruption_percentage).sum();
        HierarchyMetrics {
            num_levels: self.levels.len(),
            self_similarity_score: self.self_similarity_score(),
            all_levels_valid: self.is_valid(),
            average_corruption: total_corruption / self.levels.len().max(1) as f64,
            total_vertices: self.levels.iter().map(|l| u64::from(l.num_vertices)).sum(),
        }
    }
}

fn next_level(current: &StructuralMap, depth: usize) -> PolyrecResult<StructuralMap> {
    let overflow = |what: &str| {
        PolyrecError::CountOverflow(format!("{what} count at hierarchy level {depth}"))
    };
    let vertices = current
        .num_vertices
        .checked_mul(current.num_vertices)
        .ok_or_else(|| overflow("vertex"))?;
    let edges = current
        .num_edges
        .checked_mul(current.num_vertices)
        .ok_or_else(|| overflow("edge"))?;
    // A negative face count is floored to one; validation then flags it.
    let faces = (2 + i64::from(edges) - i64::from(vertices)).max(1);
    let faces = u32::try_from(faces).map_err(|_| overflow("face"))?;

    let mut level = StructuralMap::new(vertices, edges, faces);
    level.corruption_percentage = current.corruption_percentage * SELF_SIMILAR_SCALE;
    Ok(level)
}
