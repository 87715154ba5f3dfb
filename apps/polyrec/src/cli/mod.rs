//! # Polyrec CLI Module
//!
//! ## Available Commands
//!
//! - `detect` - Scan a value file for corrupted elements
//! - `recover` - Run the full recovery pipeline on a job file
//! - `expand` - Expand a structure by archetype, level, or hierarchy
//! - `config` - Print or check the recovery configuration

mod commands;

use crate::CliError;
use clap::{ArgGroup, Parser, Subcommand};
use polyrec_core::PlatonicSolid;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Polyrec - structural recovery
///
/// Repairs corrupted polyhedral structures so that V - E + F = 2 holds again,
/// and triangulates lost vertex positions from trusted anchors.
#[derive(Parser, Debug)]
#[command(name = "polyrec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Flag NaN, infinite and oversized values
    Detect {
        /// JSON array of numbers; null marks a lost value
        #[arg(short, long)]
        values: PathBuf,

        /// Magnitude above which a value is corrupted (default from config)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Collapse the element mask into groups of this size
        #[arg(short, long)]
        stride: Option<usize>,
    },

    /// Run the full recovery pipeline
    Recover {
        /// Job file (JSON)
        #[arg(short, long)]
        job: PathBuf,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the full report (JSON) to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Expand a structure
    #[command(group(
        ArgGroup::new("mode")
            .required(true)
            .args(["target", "level", "hierarchy"])
    ))]
    Expand {
        /// Vertex count
        #[arg(long)]
        vertices: u32,

        /// Edge count
        #[arg(long)]
        edges: u32,

        /// Face count
        #[arg(long)]
        faces: u32,

        /// Target solid (tetrahedron, cube, octahedron, dodecahedron, icosahedron)
        #[arg(short, long)]
        target: Option<PlatonicSolid>,

        /// Grow every count by 1 + 0.5 * level
        #[arg(short, long)]
        level: Option<u32>,

        /// Build a self-similar hierarchy with this many levels (at most 64)
        #[arg(long)]
        hierarchy: Option<usize>,

        /// Rule table (TOML configuration file)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as TOML
    Config {
        /// Validate this configuration file instead
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), CliError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Detect {
            values,
            threshold,
            stride,
        } => cmd_detect(&values, threshold, stride, json_mode),
        Commands::Recover {
            job,
            config,
            output,
        } => cmd_recover(&job, config.as_deref(), output.as_deref(), json_mode),
        Commands::Expand {
            vertices,
            edges,
            faces,
            target,
            level,
            hierarchy,
            config,
        } => {
            let mode = match (target, level, hierarchy) {
                (Some(solid), _, _) => ExpandMode::Archetype(solid),
                (None, Some(level), _) => ExpandMode::Level(level),
                (None, None, Some(levels)) => ExpandMode::Hierarchy(levels),
                // the required group guarantees one of the three
                (None, None, None) => ExpandMode::Level(0),
            };
            cmd_expand(
                [vertices, edges, faces],
                mode,
                config.as_deref(),
                json_mode,
            )
        }
        Commands::Config { check } => cmd_config(check.as_deref(), json_mode),
    }
}
