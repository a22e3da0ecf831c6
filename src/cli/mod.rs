//! Command-line interface definitions for the `blockyard` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `blockyard` binary.
#[derive(Debug, Parser)]
#[command(
    name = "blockyard",
    about = "Replay block volume lifecycle plans against the in-memory reference store",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Apply a JSON lifecycle plan and print the resulting inventory.
    #[command(
        name = "replay",
        about = "Apply a JSON lifecycle plan and print the resulting inventory"
    )]
    Replay(ReplayCommand),
}

/// Arguments for the `blockyard replay` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ReplayCommand {
    /// Path to the plan file.
    ///
    /// The plan names a tenant, a default location, and a list of steps
    /// tagged by `op`. Creating steps may `bind` their handle to a label that
    /// later steps reference as `@label`.
    #[arg(value_name = "PLAN")]
    pub(crate) plan: String,
    /// Pretty-print the JSON report.
    #[arg(long)]
    pub(crate) pretty: bool,
}
