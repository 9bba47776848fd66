// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Search controller: drives one adaptive compression search.
//
// The input is parsed once, classified and rendered into a reference page.
// The ladder is then walked (sequentially or by a small pool of scoped
// workers) and every candidate that survives execution and scoring is handed,
// in ladder order, to the acceptance policy. The scoring policies treat
// keeping the original as a candidate too; a target-ratio walk answers to its
// size and similarity bounds instead.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Instant;

use image::DynamicImage;
use kompakt_core::config::EngineConfig;
use kompakt_core::error::Result;
use kompakt_core::types::{Candidate, CompressionConfig, LadderDirection, SearchOutcome, SearchPolicy};
use kompakt_document::{ImageLayerRenderer, PageRenderer, PdfSource};
use tracing::{Span, debug, info, instrument, warn};

use crate::analyzer::DocumentAnalyzer;
use crate::backend::RemoteExecutor;
use crate::executor::{CandidateExecutor, LocalExecutor};
use crate::ladder::CandidateGenerator;
use crate::reference::ReferenceExtractor;
use crate::scorer::{SimilarityScorer, weighted_score};

/// Shared, read-only state of one search.
struct Evaluation<'a> {
    buffer: &'a [u8],
    reference: Option<&'a DynamicImage>,
    weight: f32,
    deadline: Option<Instant>,
}

impl Evaluation<'_> {
    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Entry point of the engine.
pub struct SearchController {
    config: EngineConfig,
    executor: Arc<dyn CandidateExecutor>,
    analyzer: DocumentAnalyzer,
    reference: ReferenceExtractor,
    scorer: SimilarityScorer,
    ladder: CandidateGenerator,
}

impl SearchController {
    /// Build a controller with the built-in renderer, and the remote executor
    /// when a backend is configured (the local one otherwise).
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let renderer: Arc<dyn PageRenderer> = Arc::new(ImageLayerRenderer::new());
        let executor: Arc<dyn CandidateExecutor> = match &config.backend {
            Some(backend) => Arc::new(RemoteExecutor::new(backend)?),
            None => Arc::new(LocalExecutor::new(
                Arc::clone(&renderer),
                config.touch_up.clone(),
            )),
        };
        Self::with_components(config, renderer, executor)
    }

    /// Build a controller around caller-provided capabilities.
    pub fn with_components(
        config: EngineConfig,
        renderer: Arc<dyn PageRenderer>,
        executor: Arc<dyn CandidateExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let ladder = CandidateGenerator::new(&config.ladder)?;
        let comparison_scale = config.scoring.comparison_scale;

        info!(
            executor = executor.name(),
            rungs = ladder.len(),
            workers = config.workers,
            policy = config.policy.name(),
            "Search controller ready"
        );

        Ok(Self {
            analyzer: DocumentAnalyzer::new(Arc::clone(&renderer), config.analysis.clone()),
            reference: ReferenceExtractor::new(Arc::clone(&renderer), comparison_scale),
            scorer: SimilarityScorer::new(renderer, comparison_scale),
            executor,
            ladder,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Search with the configured policy.
    pub fn compress(&self, buffer: &[u8]) -> Result<SearchOutcome> {
        self.compress_with(buffer, &self.config.policy)
    }

    /// Search with an explicit policy. Only an unparseable input (`Decode`) or
    /// an invalid policy is an error; when nothing beats the original, the
    /// original bytes come back unchanged.
    #[instrument(skip(self, buffer, policy), fields(bytes_len = buffer.len(), policy = policy.name()))]
    pub fn compress_with(&self, buffer: &[u8], policy: &SearchPolicy) -> Result<SearchOutcome> {
        policy.validate()?;
        let started = Instant::now();
        let deadline = self.config.deadline().map(|limit| started + limit);

        let (critical, reference) = {
            let source = PdfSource::from_bytes(buffer)?;
            let critical = self.analyzer.classify(&source);
            (critical, self.reference.extract(&source))
        };

        let weight = self.config.scoring.weight_for(critical);
        let baseline_similarity = reference.as_ref().map(|_| 1.0);
        let baseline = weighted_score(baseline_similarity, 0.0, weight);
        info!(critical, weight, baseline, has_reference = reference.is_some(), "Document analyzed");

        let mut order = walk_order(self.ladder.generate(), policy);
        if !self.executor.uses_scale() {
            order = distinct_qualities(order);
        }
        let evaluation = Evaluation {
            buffer,
            reference: reference.as_ref(),
            weight,
            deadline,
        };

        let workers = self.config.workers.min(order.len());
        let results = if workers > 1 {
            self.evaluate_parallel(&order, &evaluation, policy, workers)
        } else {
            self.evaluate_sequential(&order, &evaluation, policy)
        };
        let evaluated = results.iter().filter(|c| c.is_some()).count();

        let outcome = match select(policy, baseline, buffer.len(), results) {
            Some(winner) => SearchOutcome::from_candidate(winner, buffer.len(), critical),
            None => SearchOutcome::original(buffer.to_vec(), baseline, baseline_similarity, critical),
        };

        info!(
            applied = ?outcome.applied,
            score = outcome.score,
            size_bytes = outcome.best_size_bytes,
            original_bytes = outcome.original_size_bytes,
            evaluated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search finished"
        );
        Ok(outcome)
    }

    /// Execute and score one rung. Every failure is logged and skipped.
    fn evaluate_candidate(&self, evaluation: &Evaluation<'_>, config: CompressionConfig) -> Option<Candidate> {
        let result = self.executor.run(evaluation.buffer, config).and_then(|output| {
            let breakdown = self.scorer.score(
                evaluation.reference,
                &output,
                evaluation.buffer.len(),
                evaluation.weight,
            )?;
            Ok((output, breakdown))
        });

        match result {
            Ok((output, breakdown)) => {
                info!(
                    scale = config.scale(),
                    quality = config.quality(),
                    score = breakdown.score,
                    similarity = ?breakdown.similarity,
                    size_bytes = output.len(),
                    "Candidate evaluated"
                );
                Some(Candidate {
                    config,
                    size_bytes: output.len(),
                    buffer: output,
                    similarity: breakdown.similarity,
                    score: breakdown.score,
                })
            }
            Err(err) => {
                warn!(
                    scale = config.scale(),
                    quality = config.quality(),
                    executor = self.executor.name(),
                    error = %err,
                    "Candidate skipped"
                );
                None
            }
        }
    }

    fn evaluate_sequential(
        &self,
        order: &[CompressionConfig],
        evaluation: &Evaluation<'_>,
        policy: &SearchPolicy,
    ) -> Vec<Option<Candidate>> {
        let mut results = Vec::with_capacity(order.len());
        for config in order {
            if evaluation.deadline_passed() {
                info!(remaining = order.len() - results.len(), "Deadline passed, not starting more candidates");
                break;
            }
            let candidate = self.evaluate_candidate(evaluation, *config);
            let done = candidate
                .as_ref()
                .is_some_and(|c| meets_target(policy, evaluation.buffer.len(), c));
            results.push(candidate);
            if done {
                debug!("Target reached, stopping ladder walk");
                break;
            }
        }
        results
    }

    /// Workers pull ladder positions from a shared counter; results are slotted
    /// back by position so the policy sees them in ladder order.
    fn evaluate_parallel(
        &self,
        order: &[CompressionConfig],
        evaluation: &Evaluation<'_>,
        policy: &SearchPolicy,
        workers: usize,
    ) -> Vec<Option<Candidate>> {
        let next = AtomicUsize::new(0);
        // Positions after an accepted target candidate are not started.
        let stop_at = AtomicUsize::new(usize::MAX);
        let mut results: Vec<Option<Candidate>> = vec![None; order.len()];

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for _ in 0..workers {
                let tx = tx.clone();
                let (next, stop_at) = (&next, &stop_at);
                let span = Span::current();
                scope.spawn(move || {
                    let _entered = span.enter();
                    loop {
                        if evaluation.deadline_passed() {
                            break;
                        }
                        let position = next.fetch_add(1, Ordering::SeqCst);
                        if position >= order.len() || position > stop_at.load(Ordering::SeqCst) {
                            break;
                        }
                        let candidate = self.evaluate_candidate(evaluation, order[position]);
                        if tx.send((position, candidate)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (position, candidate) in rx {
                if let Some(candidate) = &candidate
                    && meets_target(policy, evaluation.buffer.len(), candidate)
                {
                    stop_at.fetch_min(position, Ordering::SeqCst);
                }
                results[position] = candidate;
            }
        });

        results
    }
}

/// Ladder order for the policy: aggressive first, except a conservative
/// target-ratio walk.
fn walk_order(mut ladder: Vec<CompressionConfig>, policy: &SearchPolicy) -> Vec<CompressionConfig> {
    if let SearchPolicy::TargetRatio {
        direction: LadderDirection::ConservativeFirst,
        ..
    } = policy
    {
        ladder.reverse();
    }
    ladder
}

/// Drop rungs that differ only in scale, keeping the first of each quality.
fn distinct_qualities(order: Vec<CompressionConfig>) -> Vec<CompressionConfig> {
    let mut seen = HashSet::new();
    order
        .into_iter()
        .filter(|config| seen.insert(config.quality()))
        .collect()
}

fn meets_similarity(candidate: &Candidate, min_similarity: f32) -> bool {
    match candidate.similarity {
        Some(similarity) => similarity >= min_similarity,
        None => min_similarity <= 0.0,
    }
}

/// Whether a candidate ends a target-ratio walk: small enough and similar
/// enough. The score plays no part.
fn meets_target(policy: &SearchPolicy, original_size: usize, candidate: &Candidate) -> bool {
    let SearchPolicy::TargetRatio {
        target_ratio,
        min_similarity,
        ..
    } = policy
    else {
        return false;
    };
    if original_size == 0 {
        return false;
    }
    let ratio = candidate.size_bytes as f64 / original_size as f64;
    ratio <= f64::from(*target_ratio) && meets_similarity(candidate, *min_similarity)
}

/// Reduce ladder-ordered results to the adopted candidate, if any.
///
/// Best-of-ladder and exhaustive pick the highest score, ties going to the
/// earlier position, and never adopt anything at or below the baseline. A
/// target-ratio walk takes its first hit; failing that, the most conservative
/// candidate that meets the similarity floor and is smaller than the original.
fn select(
    policy: &SearchPolicy,
    baseline: f32,
    original_size: usize,
    results: Vec<Option<Candidate>>,
) -> Option<Candidate> {
    let candidates = results.into_iter().flatten();

    if let SearchPolicy::TargetRatio {
        min_similarity,
        direction,
        ..
    } = policy
    {
        let mut fallback: Option<Candidate> = None;
        for candidate in candidates {
            if meets_target(policy, original_size, &candidate) {
                return Some(candidate);
            }
            let admissible =
                meets_similarity(&candidate, *min_similarity) && candidate.size_bytes < original_size;
            // Walk order puts the most conservative rung first or last.
            let replace = match direction {
                LadderDirection::ConservativeFirst => fallback.is_none(),
                LadderDirection::AggressiveFirst => true,
            };
            if admissible && replace {
                fallback = Some(candidate);
            }
        }
        return fallback;
    }

    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        if best.as_ref().is_none_or(|current| candidate.score > current.score) {
            best = Some(candidate);
        }
    }

    let best = best?;
    let floor = match policy {
        SearchPolicy::BestOfLadder { margin } => baseline + margin,
        _ => baseline,
    };
    (best.score > baseline && best.score >= floor).then_some(best)
}
