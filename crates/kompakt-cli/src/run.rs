// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch driver: one background task per input, a bounded number in flight,
// results written atomically.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kompakt_core::config::EngineConfig;
use kompakt_core::error::KompaktError;
use kompakt_document::fingerprint;
use kompakt_core::types::TaskId;
use kompakt_engine::{SearchController, TaskRegistry};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::args::Args;
use crate::report::FileReport;

/// Load the configuration the flags point at.
pub fn load_config(args: &Args) -> Result<EngineConfig> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = args.apply_overrides(config.with_env_overrides());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Pair every input with its output path. Two inputs landing on the same
/// output is an error, raised before anything is written.
pub fn output_plan(args: &Args) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut plan = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let output = args.output_path(input);
        if let Some(previous) = claimed.insert(output.clone(), input) {
            bail!(
                "{} and {} would both be written to {}",
                previous.display(),
                input.display(),
                output.display()
            );
        }
        plan.push((input.clone(), output));
    }
    Ok(plan)
}

/// Compress every input and report on each, in input order.
pub fn run(args: &Args) -> Result<Vec<FileReport>> {
    let config = load_config(args)?;
    let plan = output_plan(args)?;
    let controller = Arc::new(SearchController::new(config).context("Failed to set up the search")?);

    if args.inputs.len() > 1
        && let Some(dir) = &args.output
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let jobs = args.job_limit();
    info!(inputs = plan.len(), jobs, "Starting batch");

    let registry: TaskRegistry<FileReport> = TaskRegistry::new();
    let mut in_flight = VecDeque::with_capacity(jobs);
    let mut reports = Vec::with_capacity(plan.len());
    for (input, output) in plan {
        if in_flight.len() >= jobs
            && let Some((done, task)) = in_flight.pop_front()
        {
            reports.push(collect(&registry, done, task)?);
        }

        let job_input = input.clone();
        let base64 = args.base64;
        let controller = Arc::clone(&controller);
        let task = registry.submit(&input.display().to_string(), move || {
            process_file(&controller, &job_input, &output, base64)
        });
        in_flight.push_back((input, task));
    }
    while let Some((input, task)) = in_flight.pop_front() {
        reports.push(collect(&registry, input, task)?);
    }
    Ok(reports)
}

/// Wait for one task and turn its result into a report.
fn collect(
    registry: &TaskRegistry<FileReport>,
    input: PathBuf,
    task: kompakt_core::error::Result<TaskId>,
) -> Result<FileReport> {
    let report = match task {
        Ok(id) => {
            registry.wait(id, None)?;
            match registry.fetch(id) {
                Ok(report) => report.with_task_id(id),
                Err(err) => FileReport::failed(input, err).with_task_id(id),
            }
        }
        Err(err) => FileReport::failed(input, err),
    };
    Ok(report)
}

fn process_file(
    controller: &SearchController,
    input: &Path,
    output: &Path,
    base64: bool,
) -> kompakt_core::error::Result<FileReport> {
    let raw = std::fs::read(input)?;
    let buffer = if base64 { decode_base64(&raw)? } else { raw };
    let input_sha256 = fingerprint(&buffer);

    let outcome = controller.compress(&buffer)?;
    let output_sha256 = fingerprint(&outcome.best_buffer);

    if base64 {
        write_atomically(output, STANDARD.encode(&outcome.best_buffer).as_bytes())?;
    } else {
        write_atomically(output, &outcome.best_buffer)?;
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        input_sha256 = %input_sha256,
        output_sha256 = %output_sha256,
        size_kb = outcome.size_kb(),
        "Document written"
    );
    Ok(FileReport::from_outcome(
        input.to_path_buf(),
        output.to_path_buf(),
        &outcome,
        input_sha256,
        output_sha256,
    ))
}

fn decode_base64(raw: &[u8]) -> kompakt_core::error::Result<Vec<u8>> {
    let text: Vec<u8> = raw.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    STANDARD
        .decode(&text)
        .map_err(|err| KompaktError::Decode(format!("invalid base64 input: {}", err)))
}

/// Write through a temporary file in the target directory and rename it into
/// place; a failure leaves nothing behind.
fn write_atomically(path: &Path, bytes: &[u8]) -> kompakt_core::error::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut file = NamedTempFile::new_in(&dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| {
        warn!(path = %path.display(), error = %err.error, "Failed to persist output");
        KompaktError::Io(err.error)
    })?;
    Ok(())
}
