// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kompakt-engine: the adaptive compression search.
//
// One invocation parses the input once, classifies it, renders a reference
// page, then walks a ladder of (scale, quality) configurations. Each rung is
// executed (locally or by a remote service), scored against the reference and
// reduced by the configured acceptance policy.

pub mod analyzer;
pub mod backend;
pub mod controller;
pub mod executor;
pub mod ladder;
pub mod reference;
pub mod scorer;
pub mod tasks;

pub use analyzer::{AnalysisReport, DocumentAnalyzer, analyze_image};
pub use backend::RemoteExecutor;
pub use controller::SearchController;
pub use executor::{CandidateExecutor, LocalExecutor};
pub use ladder::CandidateGenerator;
pub use reference::ReferenceExtractor;
pub use scorer::{ScoreBreakdown, SimilarityScorer, weighted_score};
pub use tasks::{TaskInfo, TaskRegistry};

#[cfg(test)]
pub(crate) mod fixtures;
