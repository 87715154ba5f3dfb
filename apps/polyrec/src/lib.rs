//! # Polyrec Application Library
//!
//! File handling and command implementations behind the `polyrec` binary.
//! The recovery engine itself lives in `polyrec-core`.

pub mod cli;
pub mod error;

pub use error::CliError;
