// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Kompakt compression engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KompaktError, Result};

/// One rung of the compression ladder: render scale × JPEG quality.
///
/// Scale is relative to the page's media box in PDF points, so a scale of 1.0
/// rasterizes at 72 DPI and 2.0 at 144 DPI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    scale: f32,
    quality: u8,
}

impl CompressionConfig {
    /// Validate and build a config. Scale must be finite and ≥ 1, quality in 1..=100.
    pub fn new(scale: f32, quality: u8) -> Result<Self> {
        if !scale.is_finite() || scale < 1.0 {
            return Err(KompaktError::InvalidConfig(format!(
                "render scale must be a finite number >= 1, got {scale}"
            )));
        }
        if !(1..=100).contains(&quality) {
            return Err(KompaktError::InvalidConfig(format!(
                "quality must be in 1..=100, got {quality}"
            )));
        }
        Ok(Self { scale, quality })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl std::fmt::Display for CompressionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scale={} quality={}", self.scale, self.quality)
    }
}

/// A trial compression result produced by one executor + scorer run.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub config: CompressionConfig,
    pub buffer: Vec<u8>,
    pub size_bytes: usize,
    /// SSIM against the reference page, absent when no reference exists.
    pub similarity: Option<f32>,
    /// Weighted score on a 0–100 scale.
    pub score: f32,
}

/// The externally visible result of a search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_buffer: Vec<u8>,
    pub best_size_bytes: usize,
    pub original_size_bytes: usize,
    /// Config of the winning candidate, `None` when the original was kept.
    pub applied: Option<CompressionConfig>,
    pub score: f32,
    pub similarity: Option<f32>,
    pub critical: bool,
}

impl SearchOutcome {
    /// Outcome that hands the input back untouched.
    pub fn original(
        buffer: Vec<u8>,
        baseline_score: f32,
        baseline_similarity: Option<f32>,
        critical: bool,
    ) -> Self {
        let size = buffer.len();
        Self {
            best_buffer: buffer,
            best_size_bytes: size,
            original_size_bytes: size,
            applied: None,
            score: baseline_score,
            similarity: baseline_similarity,
            critical,
        }
    }

    /// Outcome adopting a winning candidate.
    pub fn from_candidate(candidate: Candidate, original_size_bytes: usize, critical: bool) -> Self {
        Self {
            best_size_bytes: candidate.size_bytes,
            best_buffer: candidate.buffer,
            original_size_bytes,
            applied: Some(candidate.config),
            score: candidate.score,
            similarity: candidate.similarity,
            critical,
        }
    }

    /// Output size in kilobytes.
    pub fn size_kb(&self) -> f64 {
        self.best_size_bytes as f64 / 1024.0
    }

    /// Fraction of bytes saved, in [0, 1].
    pub fn reduction(&self) -> f32 {
        size_reduction(self.original_size_bytes, self.best_size_bytes)
    }

    /// Whether the original buffer was kept.
    pub fn is_original(&self) -> bool {
        self.applied.is_none()
    }
}

/// `clamp((original − candidate) / original, 0, 1)`; zero for an empty original.
pub fn size_reduction(original_size: usize, candidate_size: usize) -> f32 {
    if original_size == 0 {
        return 0.0;
    }
    let saved = original_size as f64 - candidate_size as f64;
    (saved / original_size as f64).clamp(0.0, 1.0) as f32
}

/// Order in which the target-ratio policy walks the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LadderDirection {
    /// Start from the highest-fidelity rung and tighten.
    #[default]
    ConservativeFirst,
    /// Start from the smallest-output rung and relax.
    AggressiveFirst,
}

/// Acceptance policy applied by the search controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SearchPolicy {
    /// Evaluate the whole ladder and adopt the best candidate only when it
    /// beats keeping the original by `margin` score points.
    BestOfLadder {
        #[serde(default = "default_margin")]
        margin: f32,
    },
    /// Accept the first candidate that reaches `target_ratio` (output/input)
    /// while keeping `min_similarity`.
    TargetRatio {
        target_ratio: f32,
        #[serde(default = "default_min_similarity")]
        min_similarity: f32,
        #[serde(default)]
        direction: LadderDirection,
    },
    /// Evaluate the whole ladder and adopt the top score, no margin.
    Exhaustive,
}

fn default_margin() -> f32 {
    5.0
}

fn default_min_similarity() -> f32 {
    0.85
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self::BestOfLadder {
            margin: default_margin(),
        }
    }
}

impl SearchPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BestOfLadder { .. } => "best-of-ladder",
            Self::TargetRatio { .. } => "target-ratio",
            Self::Exhaustive => "exhaustive",
        }
    }

    /// Reject nonsensical parameters before a search starts.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::BestOfLadder { margin } if !margin.is_finite() || *margin < 0.0 => Err(
                KompaktError::InvalidConfig(format!("margin must be >= 0, got {margin}")),
            ),
            Self::TargetRatio {
                target_ratio,
                min_similarity,
                ..
            } => {
                if !(*target_ratio > 0.0 && *target_ratio <= 1.0) {
                    return Err(KompaktError::InvalidConfig(format!(
                        "target ratio must be in (0, 1], got {target_ratio}"
                    )));
                }
                if !(0.0..=1.0).contains(min_similarity) {
                    return Err(KompaktError::InvalidConfig(format!(
                        "minimum similarity must be in [0, 1], got {min_similarity}"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Unique identifier for a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Accepted, not yet picked up.
    Pending,
    /// Currently executing.
    Running,
    /// Finished; the result can be fetched.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Timeout, refused connection, 5xx; safe to retry.
    Transient,
    /// Bad payload, client error; retrying will not help.
    Permanent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_out_of_range_values() {
        assert!(CompressionConfig::new(0.5, 80).is_err());
        assert!(CompressionConfig::new(f32::NAN, 80).is_err());
        assert!(CompressionConfig::new(2.0, 0).is_err());
        assert!(CompressionConfig::new(2.0, 101).is_err());
        let config = CompressionConfig::new(2.0, 75).expect("valid");
        assert_eq!(config.scale(), 2.0);
        assert_eq!(config.quality(), 75);
    }

    #[test]
    fn size_reduction_is_clamped() {
        assert_eq!(size_reduction(1000, 250), 0.75);
        assert_eq!(size_reduction(1000, 1500), 0.0);
        assert_eq!(size_reduction(1000, 0), 1.0);
        assert_eq!(size_reduction(0, 10), 0.0);
    }

    #[test]
    fn policy_round_trips_through_json() {
        let json = r#"{"kind":"target-ratio","target_ratio":0.5}"#;
        let policy: SearchPolicy = serde_json::from_str(json).expect("parse");
        assert_eq!(
            policy,
            SearchPolicy::TargetRatio {
                target_ratio: 0.5,
                min_similarity: 0.85,
                direction: LadderDirection::ConservativeFirst,
            }
        );

        let best: SearchPolicy = serde_json::from_str(r#"{"kind":"best-of-ladder"}"#).expect("parse");
        assert_eq!(best, SearchPolicy::default());
    }

    #[test]
    fn policy_validation() {
        let bad = SearchPolicy::TargetRatio {
            target_ratio: 1.5,
            min_similarity: 0.9,
            direction: LadderDirection::AggressiveFirst,
        };
        assert!(bad.validate().is_err());
        assert!(SearchPolicy::BestOfLadder { margin: -1.0 }.validate().is_err());
        assert!(SearchPolicy::Exhaustive.validate().is_ok());
    }

    #[test]
    fn outcome_reports_kilobytes() {
        let outcome = SearchOutcome::original(vec![0u8; 2048], 80.0, Some(1.0), true);
        assert!(outcome.is_original());
        assert_eq!(outcome.size_kb(), 2.0);
        assert_eq!(outcome.reduction(), 0.0);
    }
}
