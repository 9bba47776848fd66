// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kompakt: adaptive PDF compression from the command line.
//
// Entry point. Initialises logging (to stderr), runs the batch and prints one
// JSON report per input on stdout.

mod args;
mod report;
mod run;

use anyhow::Result;
use clap::Parser;

use args::Args;
use report::ReportStatus;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_filter())),
        )
        .init();

    tracing::info!(inputs = args.inputs.len(), "Kompakt starting");

    let reports = run::run(&args)?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let failed = reports
        .iter()
        .filter(|report| report.status == ReportStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} inputs failed", failed, reports.len());
    }
    Ok(())
}
