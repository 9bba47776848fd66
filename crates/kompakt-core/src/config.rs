// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration. Every threshold the search uses lives here so that
// deployments can tune them from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KompaktError, Result};
use crate::types::SearchPolicy;

/// Environment variable overriding [`BackendConfig::endpoint`].
pub const BACKEND_URL_ENV: &str = "KOMPAKT_BACKEND_URL";

/// Complete engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub ladder: LadderConfig,
    pub scoring: ScoringConfig,
    pub touch_up: TouchUpConfig,
    pub policy: SearchPolicy,
    /// Parallel candidate workers; 0 or 1 evaluates the ladder sequentially.
    pub workers: usize,
    /// Stop starting new candidates after this many seconds.
    pub deadline_secs: Option<u64>,
    /// Remote compression service. When set, candidates are produced by the
    /// service instead of the local rasterizer.
    pub backend: Option<BackendConfig>,
}

impl EngineConfig {
    /// Load settings from a JSON file. Missing sections fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the file/default values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV)
            && !url.trim().is_empty()
        {
            let backend = self.backend.get_or_insert_with(BackendConfig::default);
            backend.endpoint = url.trim().to_string();
        }
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Reject values that would make the search meaningless.
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        self.scoring.validate()?;
        if self.analysis.sample_stride == 0 {
            return Err(KompaktError::InvalidConfig(
                "analysis sample stride must be positive".into(),
            ));
        }
        let render_scale = self.analysis.render_scale;
        if !render_scale.is_finite() || render_scale <= 0.0 {
            return Err(KompaktError::InvalidConfig(format!(
                "analysis render scale must be positive, got {render_scale}"
            )));
        }
        if !self.comparison_scale_is_valid() {
            return Err(KompaktError::InvalidConfig(format!(
                "comparison scale must be >= 1, got {}",
                self.scoring.comparison_scale
            )));
        }
        if let Some(backend) = &self.backend
            && backend.endpoint.trim().is_empty()
        {
            return Err(KompaktError::InvalidConfig(
                "backend endpoint is empty".into(),
            ));
        }
        Ok(())
    }

    fn comparison_scale_is_valid(&self) -> bool {
        self.scoring.comparison_scale.is_finite() && self.scoring.comparison_scale >= 1.0
    }
}

/// Heuristics for the fidelity-critical classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Render scale for the classification pass.
    pub render_scale: f32,
    /// Pixel distance between grid samples in each axis.
    pub sample_stride: u32,
    /// Blue must exceed red by more than this to count as institutional colour.
    pub blue_margin: i32,
    /// Green must exceed red by more than this to count as institutional colour.
    pub green_margin: i32,
    /// Summed absolute channel difference marking a text/edge sample.
    pub edge_threshold: i32,
    /// Institutional-colour proportion above which a page is critical.
    pub institutional_ratio: f32,
    /// Dense-text proportion above which a page is critical.
    pub dense_text_ratio: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.0,
            sample_stride: 15,
            blue_margin: 30,
            green_margin: 10,
            edge_threshold: 120,
            institutional_ratio: 0.08,
            dense_text_ratio: 0.12,
        }
    }
}

/// Render scales × qualities crossed into the candidate ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    pub scales: Vec<f32>,
    pub qualities: Vec<u8>,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            scales: vec![1.0, 2.0, 3.0],
            qualities: vec![55, 65, 75, 85, 95],
        }
    }
}

/// Weights and comparison settings for the similarity scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Similarity weight for documents classified as fidelity-critical.
    pub critical_weight: f32,
    /// Similarity weight for everything else.
    pub standard_weight: f32,
    /// Render scale of the reference and candidate comparison pages.
    pub comparison_scale: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_weight: 0.8,
            standard_weight: 0.5,
            comparison_scale: 2.0,
        }
    }
}

impl ScoringConfig {
    pub fn weight_for(&self, critical: bool) -> f32 {
        if critical {
            self.critical_weight
        } else {
            self.standard_weight
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("critical", self.critical_weight),
            ("standard", self.standard_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(KompaktError::InvalidConfig(format!(
                    "{name} weight must be in [0, 1], got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Deterministic cosmetic transform applied to every rasterized page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchUpConfig {
    /// Qualities strictly below this get smoothing + desaturation, others a
    /// contrast boost.
    pub smoothing_below_quality: u8,
    /// Gaussian sigma for the smoothing pass.
    pub blur_sigma: f32,
    /// Fraction of each pixel's chroma removed (0 = none, 1 = grayscale).
    pub desaturation: f32,
    /// Contrast factor for high-quality rungs; 1.0 is a no-op.
    pub contrast_factor: f32,
}

impl Default for TouchUpConfig {
    fn default() -> Self {
        Self {
            smoothing_below_quality: 70,
            blur_sigma: 0.6,
            desaturation: 0.15,
            contrast_factor: 1.08,
        }
    }
}

/// Remote compression service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Full URL of the compress endpoint.
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Retries per candidate for transient failures.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Consecutive transport failures before the circuit opens.
    pub failure_threshold: u32,
    /// Ignore `HTTP(S)_PROXY` from the environment, e.g. for a sidecar service.
    pub no_proxy: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
            max_retries: 1,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 5_000,
            failure_threshold: 3,
            no_proxy: false,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.analysis.sample_stride, 15);
        assert_eq!(config.analysis.edge_threshold, 120);
        assert_eq!(config.scoring.weight_for(true), 0.8);
        assert_eq!(config.scoring.weight_for(false), 0.5);
        assert_eq!(config.ladder.scales, vec![1.0, 2.0, 3.0]);
        assert!(config.backend.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{
            "policy": {"kind": "exhaustive"},
            "ladder": {"qualities": [60, 90]},
            "backend": {"endpoint": "http://compress.internal/api/v1/misc/compress-pdf"}
        }"#;
        let config: EngineConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(config.policy, SearchPolicy::Exhaustive);
        assert_eq!(config.ladder.qualities, vec![60, 90]);
        assert_eq!(config.ladder.scales, vec![1.0, 2.0, 3.0]);
        let backend = config.backend.expect("backend section");
        assert_eq!(backend.connect_timeout(), Duration::from_secs(10));
        assert_eq!(backend.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn invalid_weight_is_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.critical_weight = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_backend_endpoint_is_rejected() {
        let config = EngineConfig {
            backend: Some(BackendConfig::default()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kompakt.json");
        std::fs::write(&path, r#"{"workers": 4, "deadline_secs": 30}"#).expect("write");
        let config = EngineConfig::from_json_file(&path).expect("load");
        assert_eq!(config.workers, 4);
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn analysis_render_scale_must_be_positive() {
        for render_scale in [0.0, -1.0, f32::NAN] {
            let config = EngineConfig {
                analysis: AnalysisConfig {
                    render_scale,
                    ..Default::default()
                },
                ..Default::default()
            };
            let err = config.validate().err().expect("must fail");
            assert!(matches!(err, KompaktError::InvalidConfig(_)));
        }
    }
}
