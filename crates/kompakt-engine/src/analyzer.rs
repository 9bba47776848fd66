// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document analyzer: decides whether a document is fidelity-critical from
// sparse pixel statistics of a low-resolution render of its first page.
//
// Two signals are sampled on a fixed grid: "institutional" colour (blue or
// green dominant over red, as in letterheads, stamps and seals) and dense
// text, approximated by strong local intensity changes between neighbouring
// samples.

use std::sync::Arc;

use image::DynamicImage;
use kompakt_core::config::AnalysisConfig;
use kompakt_core::error::Result;
use kompakt_document::{PageRenderer, PdfSource};
use tracing::{debug, instrument, warn};

/// Sampled statistics behind a criticality decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisReport {
    /// Number of grid samples taken.
    pub samples: usize,
    /// Share of samples with institutional colour.
    pub institutional_ratio: f32,
    /// Share of samples on a strong edge.
    pub dense_text_ratio: f32,
    pub critical: bool,
}

/// Classify a rendered page.
pub fn analyze_image(page: &DynamicImage, config: &AnalysisConfig) -> AnalysisReport {
    let rgb = page.to_rgb8();
    let (width, height) = rgb.dimensions();
    let stride = config.sample_stride.max(1);

    let mut samples = 0usize;
    let mut institutional = 0usize;
    let mut dense = 0usize;

    for y in (0..height).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            samples += 1;
            let [r, g, b] = rgb.get_pixel(x, y).0.map(i32::from);

            if b > r + config.blue_margin || g > r + config.green_margin {
                institutional += 1;
            }

            // Right neighbour, or the one below on the last column.
            let neighbour = if x + stride < width {
                Some((x + stride, y))
            } else if y + stride < height {
                Some((x, y + stride))
            } else {
                None
            };
            if let Some((nx, ny)) = neighbour {
                let [nr, ng, nb] = rgb.get_pixel(nx, ny).0.map(i32::from);
                let delta = (r - nr).abs() + (g - ng).abs() + (b - nb).abs();
                if delta > config.edge_threshold {
                    dense += 1;
                }
            }
        }
    }

    let ratio = |count: usize| {
        if samples == 0 {
            0.0
        } else {
            count as f32 / samples as f32
        }
    };
    let institutional_ratio = ratio(institutional);
    let dense_text_ratio = ratio(dense);

    AnalysisReport {
        samples,
        institutional_ratio,
        dense_text_ratio,
        critical: institutional_ratio > config.institutional_ratio
            || dense_text_ratio > config.dense_text_ratio,
    }
}

/// Classifies documents as fidelity-critical.
pub struct DocumentAnalyzer {
    renderer: Arc<dyn PageRenderer>,
    config: AnalysisConfig,
}

impl DocumentAnalyzer {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: AnalysisConfig) -> Self {
        Self { renderer, config }
    }

    /// Render page 0 at the analysis scale and report the sampled statistics.
    pub fn analyze(&self, source: &PdfSource) -> Result<AnalysisReport> {
        let page = self
            .renderer
            .render_page(source, 0, self.config.render_scale)?;
        Ok(analyze_image(&page, &self.config))
    }

    /// Whether the document needs fidelity-biased scoring. A page that cannot
    /// be rendered is treated as critical.
    #[instrument(skip_all, fields(pages = source.page_count()))]
    pub fn classify(&self, source: &PdfSource) -> bool {
        match self.analyze(source) {
            Ok(report) => {
                debug!(
                    samples = report.samples,
                    institutional_ratio = report.institutional_ratio,
                    dense_text_ratio = report.dense_text_ratio,
                    critical = report.critical,
                    "Document classified"
                );
                report.critical
            }
            Err(err) => {
                warn!(error = %err, "analysis render failed, treating document as critical");
                true
            }
        }
    }
}
