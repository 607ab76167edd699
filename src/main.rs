use anyhow::Result;
use chrono::Local;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledger_audit::cli::{formatters, Cli, Commands};
use ledger_audit::config::resolve_settings;
use ledger_audit::dispatcher::{self, AuditOptions, AuditOutcome};
use ledger_audit::error::AuditError;
use ledger_audit::pricing::{StaticMarketData, YahooMarketData};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Audit {
            input,
            output,
            config,
            offline,
            as_of,
            concurrency,
            dry_run,
        } => {
            let args = AuditArgs {
                input,
                output,
                config,
                offline,
                as_of,
                concurrency,
                dry_run,
            };
            match handle_audit(args).await {
                Ok(outcome) => {
                    match &outcome.written {
                        Some(path) => {
                            println!("{}", formatters::format_status_success(&path.display().to_string()))
                        }
                        None => println!("STATUS: SUCCESS"),
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    println!("{}", formatters::format_status_failure(&failure_message(&e)));
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Splits { ticker, config } => match handle_splits(&ticker, config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                println!("{}", formatters::format_status_failure(&failure_message(&e)));
                ExitCode::FAILURE
            }
        },
    }
}

/// Logs go to stderr; stdout carries only tables and status lines
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Locked output gets its own actionable message; everything else shows the
/// full context chain
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AuditError>() {
        Some(locked @ AuditError::OutputLocked { .. }) => locked.to_string(),
        _ => format!("{:#}", err),
    }
}

struct AuditArgs {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    offline: bool,
    as_of: Option<chrono::NaiveDate>,
    concurrency: Option<usize>,
    dry_run: bool,
}

async fn handle_audit(args: AuditArgs) -> Result<AuditOutcome> {
    let settings = resolve_settings(args.config.as_deref())?;

    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());
    let mut opts = AuditOptions::new(args.input, args.output, as_of);
    opts.concurrency = args
        .concurrency
        .unwrap_or(settings.market_data.concurrency)
        .max(1);
    opts.dry_run = args.dry_run;
    opts.tickers = settings.tickers;

    println!("{} Reconstructing trade history...", "⏳".cyan());

    let outcome = if dispatcher::offline_requested(args.offline) {
        info!("Offline mode: no split adjustment, last trade prices");
        dispatcher::run_audit(&opts, Arc::new(StaticMarketData::offline())).await?
    } else {
        let market_data = YahooMarketData::new(&settings.market_data.user_agent)?;
        dispatcher::run_audit(&opts, Arc::new(market_data)).await?
    };

    if opts.dry_run {
        print!("\n{}\n", formatters::format_report_table(&outcome.report));
    }
    print!("{}", formatters::format_run_summary(&outcome));

    Ok(outcome)
}

async fn handle_splits(ticker: &str, config: Option<PathBuf>) -> Result<()> {
    let settings = resolve_settings(config.as_deref())?;
    let market_data = YahooMarketData::new(&settings.market_data.user_agent)?;
    let splits = dispatcher::run_splits(&market_data, ticker).await?;
    print!(
        "{}",
        formatters::format_splits_table(&ticker.trim().to_uppercase(), &splits)
    );
    Ok(())
}
