// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Candidate generator: the ordered ladder of compression configurations.

use kompakt_core::config::LadderConfig;
use kompakt_core::error::{KompaktError, Result};
use kompakt_core::types::CompressionConfig;

/// Deterministic, restartable ladder of render scale × quality.
///
/// Scales ascending crossed with qualities ascending: the first rung is the
/// most aggressive (smallest raster, lowest quality), the last the most
/// conservative. The ladder does not depend on the document's criticality.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    ladder: Vec<CompressionConfig>,
}

impl CandidateGenerator {
    /// Validate every rung up front; an empty or invalid ladder is an
    /// `InvalidConfig` error.
    pub fn new(config: &LadderConfig) -> Result<Self> {
        if config.scales.is_empty() || config.qualities.is_empty() {
            return Err(KompaktError::InvalidConfig(
                "ladder needs at least one scale and one quality".into(),
            ));
        }

        let mut scales = config.scales.clone();
        for scale in &scales {
            // Surfaces non-finite and sub-unit scales before sorting.
            CompressionConfig::new(*scale, 100)?;
        }
        scales.sort_by(f32::total_cmp);
        scales.dedup();

        let mut qualities = config.qualities.clone();
        qualities.sort_unstable();
        qualities.dedup();

        let mut ladder = Vec::with_capacity(scales.len() * qualities.len());
        for scale in &scales {
            for quality in &qualities {
                ladder.push(CompressionConfig::new(*scale, *quality)?);
            }
        }
        Ok(Self { ladder })
    }

    /// The full ladder, most aggressive first.
    pub fn generate(&self) -> Vec<CompressionConfig> {
        self.ladder.clone()
    }

    pub fn len(&self) -> usize {
        self.ladder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ladder.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_runs_aggressive_to_conservative() {
        let ladder = CandidateGenerator::new(&LadderConfig::default())
            .expect("valid")
            .generate();
        assert_eq!(ladder.len(), 15);
        assert_eq!((ladder[0].scale(), ladder[0].quality()), (1.0, 55));
        assert_eq!((ladder[4].scale(), ladder[4].quality()), (1.0, 95));
        assert_eq!((ladder[5].scale(), ladder[5].quality()), (2.0, 55));
        assert_eq!((ladder[14].scale(), ladder[14].quality()), (3.0, 95));
    }

    #[test]
    fn unsorted_duplicates_are_normalised() {
        let config = LadderConfig {
            scales: vec![2.0, 1.0, 2.0],
            qualities: vec![90, 60, 90],
        };
        let generator = CandidateGenerator::new(&config).expect("valid");
        let ladder = generator.generate();
        let pairs: Vec<(f32, u8)> = ladder.iter().map(|c| (c.scale(), c.quality())).collect();
        assert_eq!(pairs, vec![(1.0, 60), (1.0, 90), (2.0, 60), (2.0, 90)]);
        // Restartable: a second call yields the same ladder.
        assert_eq!(generator.generate(), ladder);
    }

    #[test]
    fn invalid_rungs_are_rejected() {
        let bad_scale = LadderConfig {
            scales: vec![0.5],
            qualities: vec![80],
        };
        assert!(matches!(
            CandidateGenerator::new(&bad_scale),
            Err(KompaktError::InvalidConfig(_))
        ));
        let bad_quality = LadderConfig {
            scales: vec![1.0],
            qualities: vec![0],
        };
        assert!(CandidateGenerator::new(&bad_quality).is_err());
        let empty = LadderConfig {
            scales: vec![],
            qualities: vec![80],
        };
        assert!(CandidateGenerator::new(&empty).is_err());
    }
}
