// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compression executors: turn one ladder rung into a candidate document.

use std::sync::Arc;

use kompakt_core::config::TouchUpConfig;
use kompakt_core::error::{KompaktError, Result};
use kompakt_core::types::CompressionConfig;
use kompakt_document::{EncodedPage, ImageProcessor, PageRenderer, PdfAssembler, PdfSource};
use tracing::{debug, instrument};

/// Produces a complete candidate document for one configuration.
///
/// Implementations must only return buffers that parse and have the same
/// page count as the input. Every failure is candidate-scoped (`Render`,
/// `Encode`, `Backend`, `Validation`).
pub trait CandidateExecutor: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Whether the render scale changes what [`Self::run`] produces. When it
    /// does not, the controller runs each quality once.
    fn uses_scale(&self) -> bool {
        true
    }

    fn run(&self, buffer: &[u8], config: CompressionConfig) -> Result<Vec<u8>>;
}

/// Parse the original again inside an executor. The caller has already
/// accepted it, so a failure here only sinks the candidate.
pub(crate) fn reparse(buffer: &[u8]) -> Result<PdfSource> {
    PdfSource::from_bytes(buffer).map_err(|err| match err {
        KompaktError::Decode(detail) => KompaktError::Validation(detail),
        other => other,
    })
}

/// Rasterizes every page, touches it up, re-encodes it as JPEG and reassembles
/// an image-only document.
pub struct LocalExecutor {
    renderer: Arc<dyn PageRenderer>,
    touch_up: TouchUpConfig,
}

impl LocalExecutor {
    pub fn new(renderer: Arc<dyn PageRenderer>, touch_up: TouchUpConfig) -> Self {
        Self { renderer, touch_up }
    }
}

impl CandidateExecutor for LocalExecutor {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, buffer), fields(scale = config.scale(), quality = config.quality()))]
    fn run(&self, buffer: &[u8], config: CompressionConfig) -> Result<Vec<u8>> {
        let source = reparse(buffer)?;
        let mut assembler = PdfAssembler::new();

        for index in 0..source.page_count() {
            let geometry = source.page_geometry(index)?;
            let page = self.renderer.render_page(&source, index, config.scale())?;
            let processor = ImageProcessor::from_dynamic(page)
                .touch_up(config.quality(), &self.touch_up);
            let jpeg = processor.to_jpeg_bytes(config.quality())?;
            assembler.push_page(EncodedPage::jpeg(
                jpeg,
                processor.width(),
                processor.height(),
                processor.is_grayscale(),
                geometry,
            ))?;
        }

        if assembler.page_count() != source.page_count() {
            return Err(KompaktError::Validation(format!(
                "assembled {} pages from a {} page source",
                assembler.page_count(),
                source.page_count()
            )));
        }
        let output = assembler.finish()?;
        PdfSource::validate(&output, source.page_count())?;

        debug!(output_bytes = output.len(), "Candidate assembled");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use kompakt_document::ImageLayerRenderer;

    fn executor() -> LocalExecutor {
        LocalExecutor::new(Arc::new(ImageLayerRenderer::new()), TouchUpConfig::default())
    }

    #[test]
    fn candidate_keeps_page_count_and_geometry() {
        let original = fixtures::lossless_pdf(3, fixtures::text_scan_page);
        let config = CompressionConfig::new(2.0, 75).expect("config");
        let output = executor().run(&original, config).expect("run");

        let source = PdfSource::from_bytes(&output).expect("parse");
        assert_eq!(source.page_count(), 3);
        let geometry = source.page_geometry(2).expect("geometry");
        assert_eq!(geometry, fixtures::geometry());
        assert!(output.len() < original.len());
    }

    #[test]
    fn lower_quality_never_grows_output() {
        let original = fixtures::lossless_pdf(2, fixtures::photo_page);
        for scale in [1.0, 2.0] {
            let low = executor()
                .run(&original, CompressionConfig::new(scale, 55).expect("config"))
                .expect("low");
            let high = executor()
                .run(&original, CompressionConfig::new(scale, 95).expect("config"))
                .expect("high");
            assert!(low.len() <= high.len(), "scale {scale}: {} > {}", low.len(), high.len());
        }
    }

    #[test]
    fn unrenderable_page_fails_the_candidate() {
        let original = fixtures::pdf_without_raster_layer();
        let err = executor()
            .run(&original, CompressionConfig::new(1.0, 75).expect("config"))
            .err()
            .expect("must fail");
        assert!(err.is_candidate_scoped());
    }
}
