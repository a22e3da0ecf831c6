//! Binary entry point for the Blockyard CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use blockyard::{ReplayError, ReplayPlan, ReplayReport};

use cli::{Cli, ReplayCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
    #[error("failed to render report: {0}")]
    Render(String),
    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

// Logs go to stderr so the JSON report on stdout stays machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Replay(command) => replay(command).await,
    }
}

async fn replay(command: ReplayCommand) -> Result<(), CliError> {
    let path = Utf8PathBuf::from(command.plan);
    let plan = ReplayPlan::read(&path)?;
    let report = plan.run().await?;
    let rendered = render_report(&report, command.pretty)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

fn render_report(report: &ReplayReport, pretty: bool) -> Result<String, CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    rendered.map_err(|err| CliError::Render(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
