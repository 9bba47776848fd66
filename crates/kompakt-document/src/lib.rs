// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kompakt-document: Document capabilities for the Kompakt compression engine.
//
// Provides PDF parsing and image-only reassembly (`lopdf`), page rasterization
// behind the `PageRenderer` trait, the per-page touch-up and JPEG encoding
// pipeline, the SSIM similarity metric, and document fingerprinting.

pub mod image;
pub mod integrity;
pub mod pdf;
pub mod render;
pub mod similarity;

// Re-export the primary structs so callers can use `kompakt_document::PdfSource` etc.
pub use crate::image::processor::ImageProcessor;
pub use integrity::fingerprint;
pub use pdf::reader::{PageGeometry, PdfSource};
pub use pdf::writer::{EncodedPage, PdfAssembler};
pub use render::{ImageLayerRenderer, PageRenderer};
pub use similarity::{ssim, ssim_images};
