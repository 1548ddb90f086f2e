//! `baseline`: converge an AWS account to the governance baseline.
//!
//! Usage:
//!   baseline plan                      show what apply would change
//!   baseline apply                     create and update managed resources
//!   baseline teardown                  remove managed resources
//!   baseline validate                  check the catalog and configuration
//!   baseline catalog                   print controls in dependency order
//!
//!   baseline --simulate state.json apply   run against a simulated account
//!
//! Exit status: 0 when the run fully converged, 1 when any control did not,
//! 2 when the run could not start or its journal could not be written.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use baseline_audit::InMemoryJournal;
use baseline_aws::{AwsCliAccount, InMemoryAccount};
use baseline_contracts::{
    error::{BaselineError, BaselineResult},
    report::RunReport,
};
use baseline_core::{reporter, traits::AccountApi, Catalog, Runner};

use config::BaselineConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Idempotent AWS governance-baseline applier.
///
/// Inspects the account, compares it with the control catalog and converges
/// only what is missing or has drifted on resources this baseline owns.
#[derive(Parser)]
#[command(name = "baseline", version)]
struct Cli {
    /// Configuration file [default: ./baseline.toml when present].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control catalog TOML [default: the built-in AWS account baseline].
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Report format.
    #[arg(long, global = true, value_enum, default_value_t = Format::Human)]
    format: Format,

    /// Append every mutating call to a hash-chained journal at this path.
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    /// Run against a simulated account stored in this JSON file instead of
    /// the live account. The file is created if missing and rewritten after
    /// the run.
    #[arg(long, global = true)]
    simulate: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Inspect and reconcile; print the changes apply would make.
    Plan,
    /// Converge the account to the catalog.
    Apply,
    /// Remove managed resources, dependents first.
    Teardown,
    /// Load and validate the catalog and configuration, then exit.
    Validate,
    /// Print the controls in dependency order.
    Catalog,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Human,
    Json,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    // Set RUST_LOG=debug for per-control progress.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn execute(cli: &Cli) -> BaselineResult<ExitCode> {
    let config = BaselineConfig::load(cli.config.as_deref())?;
    let catalog = load_catalog(cli.catalog.as_deref())?;

    match cli.command {
        Command::Validate => {
            println!(
                "catalog OK: {} controls in {} dependency waves",
                catalog.len(),
                catalog.waves().len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Catalog => {
            print_catalog(&catalog, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan | Command::Apply | Command::Teardown => run(cli, config, catalog).await,
    }
}

fn load_catalog(path: Option<&Path>) -> BaselineResult<Catalog> {
    match path {
        Some(p) => baseline_catalog::from_file(p),
        None => baseline_catalog::default_catalog(),
    }
}

// ── Runs ──────────────────────────────────────────────────────────────────────

async fn run(cli: &Cli, config: BaselineConfig, catalog: Catalog) -> BaselineResult<ExitCode> {
    let simulated = match &cli.simulate {
        Some(path) => Some(Arc::new(InMemoryAccount::load(path)?)),
        None => None,
    };
    let api: Arc<dyn AccountApi> = match &simulated {
        Some(account) => account.clone(),
        None => Arc::new(AwsCliAccount::new(config.aws.clone())?),
    };

    let mut runner = Runner::new(catalog, api)
        .with_marker(config.ownership.marker())
        .with_settings(config.run.clone())
        .with_retry(config.retry.clone());
    if let Some(path) = &cli.journal {
        runner = runner.with_journal(Arc::new(InMemoryJournal::open(path)?));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight calls");
            interrupt.cancel();
        }
    });

    let report = match cli.command {
        Command::Plan => runner.plan(cancel).await,
        Command::Teardown => runner.teardown(cancel).await,
        _ => runner.apply(cancel).await,
    }?;

    if let (Some(account), Some(path)) = (&simulated, &cli.simulate) {
        account.save(path)?;
    }

    print_report(&report, cli.format)?;
    if let Some(reason) = &report.journal_error {
        eprintln!("error: {}", reason);
    }
    Ok(ExitCode::from(exit_status(&report)))
}

fn exit_status(report: &RunReport) -> u8 {
    if report.journal_error.is_some() {
        2
    } else if report.fully_succeeded() {
        0
    } else {
        1
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

fn stdout_error(e: serde_json::Error) -> BaselineError {
    BaselineError::Io {
        path: "<stdout>".to_string(),
        reason: e.to_string(),
    }
}

fn print_report(report: &RunReport, format: Format) -> BaselineResult<()> {
    match format {
        Format::Human => print!("{}", reporter::render_human(report)),
        Format::Json => println!("{}", reporter::render_json(report).map_err(stdout_error)?),
    }
    Ok(())
}

fn print_catalog(catalog: &Catalog, format: Format) -> BaselineResult<()> {
    match format {
        Format::Human => {
            for (level, wave) in catalog.waves().iter().enumerate() {
                println!("wave {}", level);
                for control in wave {
                    let deps: Vec<&str> = control.depends_on.iter().map(|d| d.as_str()).collect();
                    if deps.is_empty() {
                        println!("  {:<32} {}", control.id.as_str(), control.resource_ref());
                    } else {
                        println!(
                            "  {:<32} {}  (after {})",
                            control.id.as_str(),
                            control.resource_ref(),
                            deps.join(", ")
                        );
                    }
                }
            }
        }
        Format::Json => {
            let waves: Vec<_> = catalog
                .waves()
                .iter()
                .enumerate()
                .map(|(level, wave)| json!({ "wave": level, "controls": wave }))
                .collect();
            let text = serde_json::to_string_pretty(&waves).map_err(stdout_error)?;
            println!("{}", text);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    use baseline_contracts::report::{ControlOutcome, RunMode, RunReport};
    use baseline_core::reporter;

    use super::{exit_status, Cli, Command, Format};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "baseline",
            "apply",
            "--format",
            "json",
            "--simulate",
            "state.json",
            "--journal",
            "journal.json",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Apply);
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.simulate.unwrap().to_str(), Some("state.json"));
        assert!(cli.journal.is_some());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["baseline"]).is_err());
    }

    // ── Exit status ──────────────────────────────────────────────────────────

    fn report(outcome: ControlOutcome) -> RunReport {
        let control = baseline_catalog::default_catalog()
            .unwrap()
            .waves()[0][0]
            .clone();
        reporter::finish(
            Default::default(),
            RunMode::Apply,
            chrono::Utc::now(),
            vec![reporter::entry(&control, outcome, 0)],
            false,
        )
    }

    #[test]
    fn exit_status_follows_the_report() {
        assert_eq!(exit_status(&report(ControlOutcome::NoActionNeeded)), 0);
        assert_eq!(
            exit_status(&report(ControlOutcome::Unresolvable { reason: "manual".to_string() })),
            1
        );

        let mut unjournaled = report(ControlOutcome::NoActionNeeded);
        unjournaled.journal_error = Some("journal write failed: read-only".to_string());
        assert_eq!(exit_status(&unjournaled), 2);
    }

    #[test]
    fn human_format_is_the_default() {
        let cli = Cli::try_parse_from(["baseline", "plan"]).unwrap();
        assert_eq!(cli.format, Format::Human);
        assert!(cli.config.is_none());
    }
}
