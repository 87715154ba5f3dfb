//! # Polyrec - Structural Recovery
//!
//! The command-line front end of the polyrec recovery engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              apps/polyrec (THE BINARY)           │
//! │                                                  │
//! │   ┌──────────────┐        ┌──────────────────┐   │
//! │   │     CLI      │        │  JSON / TOML I/O │   │
//! │   │    (clap)    │        │  (serde)         │   │
//! │   └──────┬───────┘        └────────┬─────────┘   │
//! │          └────────────┬────────────┘             │
//! │                       ▼                          │
//! │               ┌───────────────┐                  │
//! │               │ polyrec-core  │                  │
//! │               │  (THE LOGIC)  │                  │
//! │               └───────────────┘                  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! polyrec detect --values values.json --threshold 100
//! polyrec recover --job job.json --config polyrec.toml
//! polyrec expand --vertices 4 --edges 6 --faces 4 --target octahedron
//! polyrec config > polyrec.toml
//! ```

use clap::Parser;
use polyrec::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // POLYREC_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("POLYREC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "polyrec=info,polyrec_core=info".into());

    // Logs go to stderr so stdout stays clean for reports.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner to stderr.
fn print_banner() {
    eprintln!(
        r"
   ▲  polyrec v{}
  ╱ ╲ V - E + F = 2
 ▕───▏structural recovery
",
        env!("CARGO_PKG_VERSION")
    );
}
