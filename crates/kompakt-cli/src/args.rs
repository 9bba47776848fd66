// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use clap::{Parser, ValueEnum};
use kompakt_core::config::EngineConfig;
use kompakt_core::types::{LadderDirection, SearchPolicy};

#[derive(Parser, Debug)]
#[command(name = "kompakt")]
#[command(
    author,
    version,
    about = "Shrink PDFs by searching render scale x JPEG quality for the best size/fidelity trade-off"
)]
pub struct Args {
    /// Input PDF files (base64 text files with --base64)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file for a single input, output directory for several
    /// (defaults to `<name>.kompakt.pdf` next to each input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON engine configuration; missing sections use defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Acceptance policy, overriding the configuration file
    #[arg(short, long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Score points a candidate must gain over the original (best-of-ladder)
    #[arg(long, default_value_t = 5.0)]
    pub margin: f32,

    /// Output/input size ratio to reach (target-ratio)
    #[arg(long, default_value_t = 0.5)]
    pub target_ratio: f32,

    /// Minimum similarity a target-ratio candidate must keep
    #[arg(long, default_value_t = 0.85)]
    pub min_similarity: f32,

    /// Walk the ladder from the smallest output upwards (target-ratio)
    #[arg(long)]
    pub aggressive_first: bool,

    /// Inputs and outputs are base64 text instead of raw PDF bytes
    #[arg(long)]
    pub base64: bool,

    /// Parallel candidate workers per document
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Documents processed at once (defaults to the number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop starting new candidates after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Verbosity level (-v, -vv) when RUST_LOG is not set
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    BestOfLadder,
    TargetRatio,
    Exhaustive,
}

impl Args {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    pub fn search_policy(&self) -> Option<SearchPolicy> {
        let policy = match self.policy? {
            PolicyArg::BestOfLadder => SearchPolicy::BestOfLadder {
                margin: self.margin,
            },
            PolicyArg::TargetRatio => SearchPolicy::TargetRatio {
                target_ratio: self.target_ratio,
                min_similarity: self.min_similarity,
                direction: if self.aggressive_first {
                    LadderDirection::AggressiveFirst
                } else {
                    LadderDirection::ConservativeFirst
                },
            },
            PolicyArg::Exhaustive => SearchPolicy::Exhaustive,
        };
        Some(policy)
    }

    /// How many documents may be in flight at once.
    pub fn job_limit(&self) -> usize {
        self.jobs.filter(|jobs| *jobs > 0).unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    /// Flags win over the configuration file.
    pub fn apply_overrides(&self, mut config: EngineConfig) -> EngineConfig {
        if let Some(policy) = self.search_policy() {
            config.policy = policy;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.deadline_secs.is_some() {
            config.deadline_secs = self.deadline_secs;
        }
        config
    }

    /// Where the result for `input` goes.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let extension = if self.base64 { "kompakt.b64" } else { "kompakt.pdf" };
        let default_name = || {
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            format!("{}.{}", stem, extension)
        };

        match &self.output {
            Some(path) if self.inputs.len() == 1 => path.clone(),
            Some(dir) => dir.join(default_name()),
            None => input.with_file_name(default_name()),
        }
    }
}
