// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: the per-page touch-up (smoothing, desaturation, contrast)
// and JPEG encoding applied to every rasterized page of a candidate.

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer};
use imageproc::filter::gaussian_blur_f32;
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use kompakt_core::config::TouchUpConfig;
use kompakt_core::error::{KompaktError, Result};
use tracing::{debug, instrument, trace};

/// The one resampling filter used for page rasters. Rendering, comparison and
/// resizing all go through [`ImageProcessor::resize_exact`].
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Touch-up and encoding pipeline operating on a single rendered page.
///
/// Each method consumes `self` and returns a new `ImageProcessor`, so the
/// pipeline reads as a chain:
///
/// ```ignore
/// let jpeg = ImageProcessor::from_dynamic(page)
///     .touch_up(quality, &config.touch_up)
///     .to_jpeg_bytes(quality)?;
/// ```
///
/// Grayscale pages stay single-channel throughout.
pub struct ImageProcessor {
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Wrap a rendered page. Anything that is not 8-bit gray is normalised to
    /// 8-bit RGB (alpha is dropped, pages are opaque).
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let image = if image.color().has_color() {
            match image {
                DynamicImage::ImageRgb8(_) => image,
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            }
        } else {
            match image {
                DynamicImage::ImageLuma8(_) => image,
                other => DynamicImage::ImageLuma8(other.to_luma8()),
            }
        };
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_grayscale(&self) -> bool {
        matches!(self.image, DynamicImage::ImageLuma8(_))
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Resize to exactly `width` x `height` with [`RESAMPLE_FILTER`].
    pub fn resize_exact(self, width: u32, height: u32) -> Self {
        if self.width() == width && self.height() == height {
            return self;
        }
        let resized = self.image.resize_exact(width, height, RESAMPLE_FILTER);
        Self::from_dynamic(resized)
    }

    /// Gaussian smoothing. A non-positive sigma is a no-op.
    pub fn smooth(self, sigma: f32) -> Self {
        if sigma.is_nan() || sigma <= 0.0 {
            return self;
        }
        let image = match self.image {
            DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(gaussian_blur_f32(&gray, sigma)),
            other => DynamicImage::ImageRgb8(gaussian_blur_f32(&other.to_rgb8(), sigma)),
        };
        Self { image }
    }

    /// Pull every pixel toward its luminance by `amount` (0 = unchanged,
    /// 1 = fully gray). Gray pages are returned as-is.
    pub fn desaturate(self, amount: f32) -> Self {
        let amount = amount.clamp(0.0, 1.0);
        if amount == 0.0 || self.is_grayscale() {
            return self;
        }
        let rgb = self.image.to_rgb8();
        let desaturated = ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
            let image::Rgb([r, g, b]) = *rgb.get_pixel(x, y);
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            let pull = |channel: u8| -> u8 {
                let val = channel as f32 + amount * (luma - channel as f32);
                val.round().clamp(0.0, 255.0) as u8
            };
            image::Rgb([pull(r), pull(g), pull(b)])
        });
        Self {
            image: DynamicImage::ImageRgb8(desaturated),
        }
    }

    /// Adjust contrast around mid-gray. Values > 1.0 increase contrast; 1.0 is
    /// a no-op.
    pub fn adjust_contrast(self, factor: f32) -> Self {
        if factor == 1.0 || !factor.is_finite() {
            return self;
        }
        let adjust = |channel: u8| -> u8 {
            let val = factor * (channel as f32 - 128.0) + 128.0;
            val.round().clamp(0.0, 255.0) as u8
        };
        let image = match self.image {
            DynamicImage::ImageLuma8(gray) => {
                let contrasted = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
                    image::Luma([adjust(gray.get_pixel(x, y).0[0])])
                });
                DynamicImage::ImageLuma8(contrasted)
            }
            other => {
                let rgb = other.to_rgb8();
                let contrasted = ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
                    let image::Rgb([r, g, b]) = *rgb.get_pixel(x, y);
                    image::Rgb([adjust(r), adjust(g), adjust(b)])
                });
                DynamicImage::ImageRgb8(contrasted)
            }
        };
        Self { image }
    }

    /// Deterministic cosmetic pass chosen by the target quality: aggressive
    /// rungs get smoothing and slight desaturation (fewer high-frequency
    /// coefficients for the encoder), the rest a mild contrast boost.
    #[instrument(skip(self, config))]
    pub fn touch_up(self, quality: u8, config: &TouchUpConfig) -> Self {
        if quality < config.smoothing_below_quality {
            trace!(sigma = config.blur_sigma, "Smoothing page");
            self.smooth(config.blur_sigma).desaturate(config.desaturation)
        } else {
            trace!(factor = config.contrast_factor, "Boosting contrast");
            self.adjust_contrast(config.contrast_factor)
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode as baseline JPEG with optimized Huffman tables and 4:2:0 chroma
    /// subsampling. Gray pages are encoded single-channel.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = (self.width(), self.height());
        let (Ok(w16), Ok(h16)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(KompaktError::Encode(format!(
                "page of {width}x{height} pixels exceeds the JPEG size limit"
            )));
        };

        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, quality.clamp(1, 100));
        encoder.set_optimized_huffman_tables(true);

        let result = match &self.image {
            DynamicImage::ImageLuma8(gray) => encoder.encode(gray.as_raw(), w16, h16, ColorType::Luma),
            other => {
                encoder.set_sampling_factor(SamplingFactor::R_4_2_0);
                let rgb = other.to_rgb8();
                encoder.encode(rgb.as_raw(), w16, h16, ColorType::Rgb)
            }
        };
        result.map_err(|err| KompaktError::Encode(format!("JPEG encoding failed: {}", err)))?;

        debug!(width, height, quality, bytes = buffer.len(), "Page encoded");
        Ok(buffer)
    }
}
