// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Render module: page rasterization capability.

pub mod layer;

pub use layer::ImageLayerRenderer;

use image::DynamicImage;
use kompakt_core::error::Result;

use crate::pdf::reader::PdfSource;

/// Rasterizes one page of a parsed document.
///
/// `scale` is pixels per PDF point, so the output of a conforming renderer is
/// `media box × scale` pixels. Failures are reported as
/// [`kompakt_core::KompaktError::Render`].
pub trait PageRenderer: Send + Sync {
    fn render_page(&self, source: &PdfSource, index: usize, scale: f32) -> Result<DynamicImage>;
}
