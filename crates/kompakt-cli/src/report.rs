// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-input JSON report.

use std::path::PathBuf;

use kompakt_core::types::{CompressionConfig, SearchOutcome};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Compressed,
    KeptOriginal,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub original_bytes: usize,
    pub output_bytes: usize,
    pub output_kb: f64,
    pub reduction: f32,
    pub score: f32,
    pub similarity: Option<f32>,
    pub critical: bool,
    pub applied: Option<CompressionConfig>,
    pub input_sha256: Option<String>,
    pub output_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn from_outcome(
        input: PathBuf,
        output: PathBuf,
        outcome: &SearchOutcome,
        input_sha256: String,
        output_sha256: String,
    ) -> Self {
        Self {
            input,
            status: if outcome.is_original() {
                ReportStatus::KeptOriginal
            } else {
                ReportStatus::Compressed
            },
            output: Some(output),
            task_id: None,
            original_bytes: outcome.original_size_bytes,
            output_bytes: outcome.best_size_bytes,
            output_kb: outcome.size_kb(),
            reduction: outcome.reduction(),
            score: outcome.score,
            similarity: outcome.similarity,
            critical: outcome.critical,
            applied: outcome.applied,
            input_sha256: Some(input_sha256),
            output_sha256: Some(output_sha256),
            error: None,
        }
    }

    pub fn failed(input: PathBuf, error: impl ToString) -> Self {
        Self {
            input,
            status: ReportStatus::Failed,
            output: None,
            task_id: None,
            original_bytes: 0,
            output_bytes: 0,
            output_kb: 0.0,
            reduction: 0.0,
            score: 0.0,
            similarity: None,
            critical: false,
            applied: None,
            input_sha256: None,
            output_sha256: None,
            error: Some(error.to_string()),
        }
    }

    pub fn with_task_id(mut self, task_id: impl ToString) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }
}
