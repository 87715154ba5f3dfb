//! # CLI Command Implementations

use crate::CliError;
use polyrec_core::{
    PlatonicSolid, RecoveryConfig, RecoveryJob, RecoveryPipeline, RecoveryReport,
    SelfSimilarHierarchy, StructuralExpander, StructuralMap, compute_expansion_metrics,
    detect_corruption,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum size of a value or job file (100 MB).
const MAX_INPUT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Resolve `path` to an existing regular file no larger than `limit`.
fn validate_input_file(path: &Path, limit: u64) -> Result<PathBuf, CliError> {
    let canonical = path.canonicalize().map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !canonical.is_file() {
        return Err(CliError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let size = std::fs::metadata(&canonical)
        .map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > limit {
        return Err(CliError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit,
        });
    }
    Ok(canonical)
}

fn read_text(path: &Path, limit: u64) -> Result<String, CliError> {
    let canonical = validate_input_file(path, limit)?;
    std::fs::read_to_string(&canonical).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = read_text(path, MAX_INPUT_FILE_SIZE)?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// LOADERS
// =============================================================================

/// Load and validate a TOML configuration, or the defaults when `path` is
/// `None`. Missing keys fall back to their defaults.
pub fn load_config(path: Option<&Path>) -> Result<RecoveryConfig, CliError> {
    let Some(path) = path else {
        return Ok(RecoveryConfig::default());
    };
    let text = read_text(path, MAX_CONFIG_FILE_SIZE)?;
    let config: RecoveryConfig = toml::from_str(&text).map_err(|source| CliError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Read a JSON array of numbers; `null` entries become NaN.
pub fn read_values(path: &Path) -> Result<Vec<f64>, CliError> {
    let values: Vec<Option<f64>> = read_json(path)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

pub fn load_job(path: &Path) -> Result<RecoveryJob, CliError> {
    read_json(path)
}

/// The default configuration rendered as TOML.
pub fn render_default_config() -> Result<String, CliError> {
    Ok(toml::to_string_pretty(&RecoveryConfig::default())?)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// DETECT COMMAND
// =============================================================================

/// Scan a value file and report flagged elements.
pub fn cmd_detect(
    values: &Path,
    threshold: Option<f64>,
    stride: Option<usize>,
    json_mode: bool,
) -> Result<(), CliError> {
    let data = read_values(values)?;
    let threshold = threshold.unwrap_or(RecoveryConfig::default().corruption.threshold);
    tracing::info!(file = %values.display(), elements = data.len(), threshold, "scanning");

    let scan = detect_corruption(&data, threshold)?;
    let grouped = stride.map(|s| scan.vertex_mask(s)).transpose()?;
    let flagged: Vec<usize> = scan
        .mask
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect();

    if json_mode {
        print_json(&serde_json::json!({
            "elements": data.len(),
            "threshold": threshold,
            "corrupted": scan.corrupted,
            "rate": scan.rate,
            "mask": scan.mask,
            "group_mask": grouped,
        }));
        return Ok(());
    }

    println!("Corruption Scan");
    println!("===============");
    println!("Elements:  {}", data.len());
    println!("Threshold: {}", threshold);
    println!("Corrupted: {} ({:.2}%)", scan.corrupted, scan.rate * 100.0);
    if !flagged.is_empty() {
        println!("Flagged:   {:?}", flagged);
    }
    if let Some(groups) = grouped {
        let bad = groups.iter().filter(|&&g| g).count();
        println!("Groups:    {} of {} corrupted", bad, groups.len());
    }
    Ok(())
}

// =============================================================================
// RECOVER COMMAND
// =============================================================================

/// Load a job, run the pipeline, and return its report.
pub fn run_recovery(job: &Path, config: Option<&Path>) -> Result<RecoveryReport, CliError> {
    let config = load_config(config)?;
    let job = load_job(job)?;
    let pipeline = RecoveryPipeline::from_config(config)?;
    Ok(pipeline.run(&job)?)
}

/// Run the full pipeline on a job file.
pub fn cmd_recover(
    job: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    json_mode: bool,
) -> Result<(), CliError> {
    let report = run_recovery(job, config)?;

    if let Some(output) = output {
        let rendered = serde_json::to_string_pretty(&report).map_err(CliError::JsonRender)?;
        std::fs::write(output, rendered).map_err(|source| CliError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %output.display(), "report written");
    }

    if json_mode {
        let value = serde_json::to_value(&report).map_err(CliError::JsonRender)?;
        print_json(&value);
        return Ok(());
    }

    let s = &report.structure;
    println!("Recovery Report");
    println!("===============");
    println!(
        "Assessment:      {:?} ({})",
        report.assessment.kind, report.assessment.description
    );
    println!(
        "Structure:       V={} E={} F={} (chi={})",
        s.num_vertices,
        s.num_edges,
        s.num_faces,
        s.euler_characteristic()
    );
    println!(
        "Refinement:      {}",
        if report.refinement_converged { "converged" } else { "not converged" }
    );
    println!("Corrupted:       {} vertices", report.metrics.corrupted_vertices);
    println!("Triangulated:    {} vertices", report.recovered_vertices);
    println!("Recovery rate:   {:.1}%", report.metrics.recovery_rate * 100.0);
    println!("Avg confidence:  {:.4}", report.metrics.avg_confidence);
    if let Some(oscillations) = &report.oscillations {
        println!(
            "Oscillations:    {} dimensions, {}",
            oscillations.num_dimensions(),
            if oscillations.is_converging { "converging" } else { "diverging" }
        );
    }
    if let (Some(e), Some(m)) = (&report.expansion, &report.expansion_metrics) {
        println!(
            "Expansion:       V={} E={} F={} (quality {:.2})",
            e.num_vertices, e.num_edges, e.num_faces, m.quality_score
        );
    }
    Ok(())
}

// =============================================================================
// EXPAND COMMAND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandMode {
    Archetype(PlatonicSolid),
    Level(u32),
    Hierarchy(usize),
}

/// Expand the structure `[V, E, F]`.
pub fn cmd_expand(
    counts: [u32; 3],
    mode: ExpandMode,
    config: Option<&Path>,
    json_mode: bool,
) -> Result<(), CliError> {
    let config = load_config(config)?;
    let source = StructuralMap::new(counts[0], counts[1], counts[2]);
    let expander = StructuralExpander::new(config.expansion);

    if let ExpandMode::Hierarchy(levels) = mode {
        let hierarchy = SelfSimilarHierarchy::generate(&source, levels)?;
        let metrics = hierarchy.metrics();
        if json_mode {
            print_json(&serde_json::json!({
                "levels": hierarchy.levels(),
                "metrics": metrics,
            }));
            return Ok(());
        }
        println!("Self-Similar Hierarchy");
        println!("======================");
        for (depth, level) in hierarchy.levels().iter().enumerate() {
            println!(
                "  L{}: V={} E={} F={}",
                depth, level.num_vertices, level.num_edges, level.num_faces
            );
        }
        println!("Valid:           {}", metrics.all_levels_valid);
        println!("Self-similarity: {:.4}", metrics.self_similarity_score);
        println!("Total vertices:  {}", metrics.total_vertices);
        return Ok(());
    }

    let expanded = match mode {
        ExpandMode::Archetype(target) => expander.expand_to_platonic_solid(&source, target),
        ExpandMode::Level(level) => expander.expand_model_by_level(&source, level),
        ExpandMode::Hierarchy(_) => None,
    }
    .ok_or_else(|| CliError::ExpansionRejected(format!("{mode:?} from {counts:?}")))?;

    let metrics = compute_expansion_metrics(&source, &expanded);
    let source_solid = expander.rules().classify(&source);
    let available = source_solid
        .map(|solid| expander.rules().available_expansions(solid))
        .unwrap_or_default();

    if json_mode {
        print_json(&serde_json::json!({
            "source": source,
            "source_solid": source_solid,
            "expanded": expanded,
            "metrics": metrics,
            "available_expansions": available,
        }));
        return Ok(());
    }

    println!("Expansion");
    println!("=========");
    println!(
        "Source:    V={} E={} F={}{}",
        source.num_vertices,
        source.num_edges,
        source.num_faces,
        source_solid.map(|s| format!(" ({s})")).unwrap_or_default()
    );
    println!(
        "Expanded:  V={} E={} F={}",
        expanded.num_vertices, expanded.num_edges, expanded.num_faces
    );
    println!(
        "Ratios:    V x{:.3} E x{:.3} F x{:.3}",
        metrics.vertex_ratio, metrics.edge_ratio, metrics.face_ratio
    );
    println!(
        "Invariant: {}",
        if metrics.invariant_maintained { "maintained" } else { "violated" }
    );
    println!("Quality:   {:.2}", metrics.quality_score);
    if let (Some(solid), ExpandMode::Archetype(target)) = (source_solid, mode) {
        println!("Factor:    {}", expander.rules().expansion_factor(solid, target));
    }
    if !available.is_empty() {
        let names: Vec<&str> = available.iter().map(|s| s.name()).collect();
        println!("Available: {}", names.join(", "));
    }
    Ok(())
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

/// Print the defaults, or validate `check`.
pub fn cmd_config(check: Option<&Path>, json_mode: bool) -> Result<(), CliError> {
    match check {
        Some(path) => {
            let config = load_config(Some(path))?;
            if json_mode {
                print_json(&serde_json::json!({ "valid": true, "config": config }));
            } else {
                println!("{}: valid", path.display());
            }
        }
        None if json_mode => print_json(&serde_json::json!(RecoveryConfig::default())),
        None => print!("{}", render_default_config()?),
    }
    Ok(())
}
