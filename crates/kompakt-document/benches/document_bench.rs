// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the per-candidate hot paths in kompakt-document:
// SSIM between two rendered pages and the touch-up + JPEG encode of one page.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma, RgbImage};

use kompakt_core::config::TouchUpConfig;
use kompakt_document::{ImageProcessor, ssim};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A 360x480 page: light paper texture with dark text-like bars, the size of
/// a small page rendered at scale 2.
fn synthetic_page() -> RgbImage {
    RgbImage::from_fn(360, 480, |x, y| {
        let ink = (y / 12) % 2 == 0 && (x / 5) % 7 != 0 && (40..320).contains(&x);
        if ink {
            image::Rgb([30, 30, 40])
        } else {
            let paper = 235 + ((x * 3 + y * 5) % 15) as u8;
            image::Rgb([paper, paper, paper - 6])
        }
    })
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_ssim(c: &mut Criterion) {
    let reference = DynamicImage::ImageRgb8(synthetic_page()).to_luma8();
    let candidate = GrayImage::from_fn(360, 480, |x, y| {
        let value = reference.get_pixel(x, y).0[0];
        Luma([value.saturating_add(((x + y) % 5) as u8)])
    });

    c.bench_function("ssim (360x480)", |b| {
        b.iter(|| black_box(ssim(black_box(&reference), black_box(&candidate))));
    });
}

fn bench_touch_up_and_encode(c: &mut Criterion) {
    let page = DynamicImage::ImageRgb8(synthetic_page());
    let config = TouchUpConfig::default();

    for quality in [55u8, 85] {
        c.bench_function(&format!("touch_up + jpeg q{quality} (360x480)"), |b| {
            b.iter(|| {
                let processor =
                    ImageProcessor::from_dynamic(black_box(page.clone())).touch_up(quality, &config);
                black_box(processor.to_jpeg_bytes(quality))
            });
        });
    }
}

criterion_group!(benches, bench_ssim, bench_touch_up_and_encode);
criterion_main!(benches);
