// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reference extractor: the ground-truth page every candidate is compared to.

use std::sync::Arc;

use image::DynamicImage;
use kompakt_document::{PageRenderer, PdfSource};
use tracing::{debug, instrument, warn};

/// Renders page 0 of the original at the comparison scale.
pub struct ReferenceExtractor {
    renderer: Arc<dyn PageRenderer>,
    comparison_scale: f32,
}

impl ReferenceExtractor {
    pub fn new(renderer: Arc<dyn PageRenderer>, comparison_scale: f32) -> Self {
        Self {
            renderer,
            comparison_scale,
        }
    }

    /// `None` when the document has no pages or the page cannot be rendered;
    /// scoring then falls back to size reduction alone.
    #[instrument(skip_all, fields(scale = self.comparison_scale))]
    pub fn extract(&self, source: &PdfSource) -> Option<DynamicImage> {
        if source.page_count() == 0 {
            return None;
        }
        match self.renderer.render_page(source, 0, self.comparison_scale) {
            Ok(page) => {
                debug!(width = page.width(), height = page.height(), "Reference page rendered");
                Some(page)
            }
            Err(err) => {
                warn!(error = %err, "no reference page, scoring by size only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use kompakt_document::ImageLayerRenderer;

    #[test]
    fn reference_is_rendered_at_comparison_scale() {
        let data = fixtures::lossless_pdf(2, fixtures::photo_page);
        let source = PdfSource::from_bytes(&data).expect("parse");
        let extractor = ReferenceExtractor::new(Arc::new(ImageLayerRenderer::new()), 2.0);
        let page = extractor.extract(&source).expect("reference");
        assert_eq!(
            (page.width(), page.height()),
            (fixtures::PAGE_WIDTH * 2, fixtures::PAGE_HEIGHT * 2)
        );
    }

    #[test]
    fn unrenderable_page_has_no_reference() {
        let data = fixtures::pdf_without_raster_layer();
        let source = PdfSource::from_bytes(&data).expect("parse");
        let extractor = ReferenceExtractor::new(Arc::new(ImageLayerRenderer::new()), 2.0);
        assert!(extractor.extract(&source).is_none());
    }
}
