//! # polaris-cli
//!
//! Command-line interface for the Polaris runner.
//!
//! ## Commands
//!
//! - `polaris run`: Handle the triggering event (default)
//! - `polaris characters`: List configured characters
//! - `polaris tools <character>`: Show a character's aggregated tool catalog
//! - `polaris completions <shell>`: Shell completions

pub mod commands;

pub use commands::Cli;
