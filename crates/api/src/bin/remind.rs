//! One-shot reminder run for process schedulers.
//!
//! Prints the run summary as a single JSON line on stdout. Logs go to stderr.
//! Exit codes: 0 run completed, 1 run failed, 2 configuration error.

use std::io::Write;
use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;

use leasekeep_api::app::AppServices;
use leasekeep_api::app::services::build_services;
use leasekeep_infra::{AppConfig, ConfigError};
use leasekeep_reminders::RunOptions;

#[derive(Debug, Parser)]
#[command(name = "leasekeep-remind")]
#[command(about = "Send due reminders once and print the run summary", long_about = None)]
struct Cli {
    /// Validate and render every reminder without sending anything.
    #[arg(long)]
    dry_run: bool,

    /// Evaluate the due window at this instant (RFC 3339 or YYYY-MM-DD) instead of now.
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("expected RFC 3339 instant or YYYY-MM-DD, got '{raw}'"))
}

const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    leasekeep_observability::init_stderr();
    let config = match load_config(config) {
        Ok(config) => config,
        Err(code) => return ExitCode::from(code),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    ExitCode::from(runtime.block_on(run(cli, config)))
}

fn load_config(config: Result<AppConfig, ConfigError>) -> Result<AppConfig, u8> {
    config.map_err(|e| {
        eprintln!("configuration error: {e}");
        EXIT_CONFIG
    })
}

async fn run(cli: Cli, config: AppConfig) -> u8 {
    let services = match build_services(&config).await {
        Ok(services) => services,
        Err(e) => {
            eprintln!("startup failed: {e:#}");
            return EXIT_FAILURE;
        }
    };

    let now = cli.now.unwrap_or_else(Utc::now);
    let options = RunOptions { dry_run: cli.dry_run };
    execute(services, now, options, &mut std::io::stdout().lock()).await
}

/// Run once, write the summary line to `out` and release the services.
async fn execute(
    services: AppServices,
    now: DateTime<Utc>,
    options: RunOptions,
    out: &mut impl Write,
) -> u8 {
    let result = services.runner().run_with(now, options).await;
    services.shutdown().await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("reminder run failed: {e}");
            return EXIT_FAILURE;
        }
    };

    let written = serde_json::to_string(&summary)
        .map_err(|e| e.to_string())
        .and_then(|line| writeln!(out, "{line}").map_err(|e| e.to_string()));
    match written {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("failed to write summary: {e}");
            EXIT_FAILURE
        }
    }
}
