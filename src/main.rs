use anyhow::{Context, Result};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod report;
mod services;

use config::{AppConfig, OutputFormat};
use report::{JsonReporter, TextReporter};
use services::{aws_cli::ProcessAwsCli, check_suite::CheckSuite};

/// Exit status for configuration and usage errors, matching clap.
const EXIT_USAGE: u8 = 2;

/// Report a configuration error on stderr and map it to `EXIT_USAGE`.
fn load_config(resolved: Result<AppConfig>) -> Result<AppConfig, u8> {
    resolved.map_err(|err| {
        eprintln!("error: {err:#}");
        EXIT_USAGE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup (stderr keeps the report stream clean) ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    // --- Parse config ---
    let cfg = match load_config(AppConfig::from_env_and_args()) {
        Ok(cfg) => cfg,
        Err(code) => return Ok(ExitCode::from(code)),
    };
    tracing::debug!("Starting aws-credential-check with config: {:?}", cfg);

    let cli = ProcessAwsCli::new(&cfg.aws_bin, &cfg.region)
        .with_profile(cfg.profile.clone())
        .with_timeout(cfg.timeout);
    let mut suite =
        CheckSuite::new(cli.clone(), &cfg).context("creating staging directory")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    // --- List mode ---
    if cfg.list_only {
        match cfg.format {
            OutputFormat::Text => report::render_plan(&mut out, suite.checks()),
            OutputFormat::Json => report::render_plan_json(&mut out, suite.checks()),
        }
        .context("writing check plan")?;
        return Ok(ExitCode::SUCCESS);
    }

    // --- Caller identity (informational, carried in the report) ---
    if cfg.show_identity {
        let arn = match cli.caller_identity().await {
            Ok(arn) => arn,
            Err(err) => {
                tracing::warn!("Could not resolve caller identity: {}", err);
                None
            }
        };
        if arn.is_none() {
            eprintln!("Caller identity: unavailable");
        }
        suite.set_caller_arn(arn);
    }

    // --- Run checks ---
    let use_colors = cfg.use_colors(io::stdout().is_terminal());
    let summary = match cfg.format {
        OutputFormat::Text => suite.run(&mut TextReporter::new(&mut out, use_colors)).await,
        OutputFormat::Json => suite.run(&mut JsonReporter::new(&mut out)).await,
    }
    .context("writing check report")?;

    Ok(ExitCode::from(summary.exit_code()))
}
