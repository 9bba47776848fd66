// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Similarity scorer: weighs perceptual similarity against size reduction.

use std::sync::Arc;

use image::DynamicImage;
use kompakt_core::error::Result;
use kompakt_core::types::size_reduction;
use kompakt_document::{PageRenderer, ssim_images};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::executor::reparse;

/// Components of a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// SSIM against the reference, absent without a reference.
    pub similarity: Option<f32>,
    pub size_reduction: f32,
    /// `100 · (w·similarity + (1−w)·size_reduction)`, or `100 · size_reduction`
    /// when there is no similarity.
    pub score: f32,
}

/// The scoring function on a 0–100 scale. Pure and deterministic.
pub fn weighted_score(similarity: Option<f32>, size_reduction: f32, weight: f32) -> f32 {
    let reduction = size_reduction.clamp(0.0, 1.0);
    match similarity {
        Some(similarity) => {
            let weight = weight.clamp(0.0, 1.0);
            100.0 * (weight * similarity.clamp(0.0, 1.0) + (1.0 - weight) * reduction)
        }
        None => 100.0 * reduction,
    }
}

/// Scores candidates against a reference page.
pub struct SimilarityScorer {
    renderer: Arc<dyn PageRenderer>,
    comparison_scale: f32,
}

impl SimilarityScorer {
    pub fn new(renderer: Arc<dyn PageRenderer>, comparison_scale: f32) -> Self {
        Self {
            renderer,
            comparison_scale,
        }
    }

    /// Score one candidate buffer. Rendering or comparison failures are
    /// candidate-scoped errors.
    #[instrument(skip_all, fields(candidate_bytes = candidate.len(), original_size = original_size, weight = weight))]
    pub fn score(
        &self,
        reference: Option<&DynamicImage>,
        candidate: &[u8],
        original_size: usize,
        weight: f32,
    ) -> Result<ScoreBreakdown> {
        let reduction = size_reduction(original_size, candidate.len());

        let similarity = match reference {
            Some(reference) => {
                let source = reparse(candidate)?;
                let page = self
                    .renderer
                    .render_page(&source, 0, self.comparison_scale)?;
                Some(ssim_images(reference, &page)?)
            }
            None => None,
        };

        let breakdown = ScoreBreakdown {
            similarity,
            size_reduction: reduction,
            score: weighted_score(similarity, reduction, weight),
        };
        debug!(
            similarity = ?breakdown.similarity,
            size_reduction = breakdown.size_reduction,
            score = breakdown.score,
            "Candidate scored"
        );
        Ok(breakdown)
    }
}
