// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structural similarity (SSIM) between two rendered pages.
//
// Gaussian-weighted local statistics (11 taps, sigma 1.5) with the usual
// stabilising constants K1 = 0.01, K2 = 0.03 for 8-bit data. The mean of the
// SSIM map is clamped to [0, 1].

use image::{DynamicImage, GrayImage};
use kompakt_core::error::{KompaktError, Result};
use tracing::trace;

use crate::image::processor::ImageProcessor;

const WINDOW_TAPS: usize = 11;
const WINDOW_SIGMA: f32 = 1.5;
const DYNAMIC_RANGE: f32 = 255.0;
const K1: f32 = 0.01;
const K2: f32 = 0.03;

/// Mean SSIM of two equally sized luminance images.
pub fn ssim(reference: &GrayImage, candidate: &GrayImage) -> Result<f32> {
    if reference.dimensions() != candidate.dimensions() {
        return Err(KompaktError::Validation(format!(
            "cannot compare {:?} with {:?}",
            reference.dimensions(),
            candidate.dimensions()
        )));
    }
    let (width, height) = reference.dimensions();
    if width == 0 || height == 0 {
        return Err(KompaktError::Validation("cannot compare empty images".into()));
    }
    let (width, height) = (width as usize, height as usize);

    let x: Vec<f32> = reference.as_raw().iter().map(|&v| v as f32).collect();
    let y: Vec<f32> = candidate.as_raw().iter().map(|&v| v as f32).collect();
    let xx: Vec<f32> = x.iter().map(|v| v * v).collect();
    let yy: Vec<f32> = y.iter().map(|v| v * v).collect();
    let xy: Vec<f32> = x.iter().zip(&y).map(|(a, b)| a * b).collect();

    let kernel = gaussian_kernel();
    let mu_x = blur(&x, width, height, &kernel);
    let mu_y = blur(&y, width, height, &kernel);
    let e_xx = blur(&xx, width, height, &kernel);
    let e_yy = blur(&yy, width, height, &kernel);
    let e_xy = blur(&xy, width, height, &kernel);

    let c1 = (K1 * DYNAMIC_RANGE).powi(2);
    let c2 = (K2 * DYNAMIC_RANGE).powi(2);

    let mut total = 0.0f64;
    for i in 0..width * height {
        let (mx, my) = (mu_x[i], mu_y[i]);
        let var_x = e_xx[i] - mx * mx;
        let var_y = e_yy[i] - my * my;
        let cov = e_xy[i] - mx * my;
        let numerator = (2.0 * mx * my + c1) * (2.0 * cov + c2);
        let denominator = (mx * mx + my * my + c1) * (var_x + var_y + c2);
        total += f64::from(numerator / denominator);
    }

    let mean = (total / (width * height) as f64).clamp(0.0, 1.0) as f32;
    trace!(width, height, ssim = mean, "SSIM computed");
    Ok(mean)
}

/// SSIM of two rendered pages. The candidate is resampled to the reference
/// dimensions when they differ; both are compared as 8-bit luma.
pub fn ssim_images(reference: &DynamicImage, candidate: &DynamicImage) -> Result<f32> {
    let reference = reference.to_luma8();
    let candidate = ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(candidate.to_luma8()))
        .resize_exact(reference.width(), reference.height())
        .into_dynamic()
        .to_luma8();
    ssim(&reference, &candidate)
}

fn gaussian_kernel() -> [f32; WINDOW_TAPS] {
    let radius = (WINDOW_TAPS / 2) as f32;
    let mut kernel = [0.0f32; WINDOW_TAPS];
    for (i, weight) in kernel.iter_mut().enumerate() {
        let d = i as f32 - radius;
        *weight = (-(d * d) / (2.0 * WINDOW_SIGMA * WINDOW_SIGMA)).exp();
    }
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Separable convolution with edge samples repeated at the borders.
fn blur(src: &[f32], width: usize, height: usize, kernel: &[f32; WINDOW_TAPS]) -> Vec<f32> {
    let radius = (WINDOW_TAPS / 2) as isize;
    let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

    let mut horizontal = vec![0.0f32; src.len()];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = clamp(x as isize + k as isize - radius, width);
                acc += row[sx] * weight;
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut out = vec![0.0f32; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = clamp(y as isize + k as isize - radius, height);
                acc += horizontal[sy * width + x] * weight;
            }
            out[y * width + x] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn pattern(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            image::Luma([((x * 13 + y * 7) % 200) as u8 + if (x / 8 + y / 8) % 2 == 0 { 40 } else { 0 }])
        })
    }

    #[test]
    fn identical_images_score_one() {
        let image = pattern(64, 48);
        let score = ssim(&image, &image).expect("ssim");
        assert!((score - 1.0).abs() < 1e-4, "score {score}");
    }

    #[test]
    fn kernel_is_normalised() {
        let sum: f32 = gaussian_kernel().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distortion_lowers_similarity() {
        let image = pattern(64, 48);
        let noisy = GrayImage::from_fn(64, 48, |x, y| {
            let base = image.get_pixel(x, y).0[0];
            image::Luma([if (x + y) % 2 == 0 { base.saturating_add(60) } else { base.saturating_sub(60) }])
        });
        let flat = GrayImage::from_pixel(64, 48, image::Luma([128]));

        let noisy_score = ssim(&image, &noisy).expect("ssim");
        let flat_score = ssim(&image, &flat).expect("ssim");
        assert!(noisy_score < 0.9, "noisy {noisy_score}");
        assert!(flat_score < noisy_score, "flat {flat_score} noisy {noisy_score}");
        assert!((0.0..=1.0).contains(&flat_score));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        assert!(ssim(&pattern(10, 10), &pattern(10, 11)).is_err());
    }

    #[test]
    fn images_are_resampled_before_comparison() {
        let reference = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, image::Rgb([90, 90, 90])));
        let candidate = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 15, image::Rgb([90, 90, 90])));
        let score = ssim_images(&reference, &candidate).expect("ssim");
        assert!(score > 0.99, "score {score}");
    }
}
