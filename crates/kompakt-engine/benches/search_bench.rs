// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for kompakt-engine: the criticality heuristic on a
// rendered page and a small end-to-end ladder search.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, RgbImage};

use kompakt_core::config::{AnalysisConfig, EngineConfig, LadderConfig};
use kompakt_core::types::SearchPolicy;
use kompakt_document::{EncodedPage, PageGeometry, PdfAssembler};
use kompakt_engine::{SearchController, analyze_image};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn scanned_page(index: u32) -> RgbImage {
    RgbImage::from_fn(180, 240, |x, y| {
        let ink = (24..216).contains(&y) && (y - 24) % 12 < 5 && (x + index * 7) % 31 < 25;
        if ink {
            image::Rgb([40, 40, 45])
        } else {
            let paper = 226.0 + 10.0 * (x as f32 / 9.0).sin() + 7.0 * (y as f32 / 13.0).cos();
            let v = paper as u8;
            image::Rgb([v, v, v.saturating_sub(5)])
        }
    })
}

fn scanned_document(pages: u32) -> Vec<u8> {
    let geometry = PageGeometry {
        width_pt: 180.0,
        height_pt: 240.0,
        rotate: 0,
    };
    let mut assembler = PdfAssembler::new();
    for index in 0..pages {
        let page = DynamicImage::ImageRgb8(scanned_page(index));
        assembler
            .push_page(EncodedPage::lossless(&page, geometry))
            .expect("push page");
    }
    assembler.finish().expect("assemble")
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_analyze(c: &mut Criterion) {
    let page = DynamicImage::ImageRgb8(scanned_page(0));
    let config = AnalysisConfig::default();
    c.bench_function("analyze_image (180x240)", |b| {
        b.iter(|| black_box(analyze_image(black_box(&page), &config)));
    });
}

fn bench_search(c: &mut Criterion) {
    let document = scanned_document(3);
    let config = EngineConfig {
        ladder: LadderConfig {
            scales: vec![1.0, 2.0],
            qualities: vec![55, 85],
        },
        ..Default::default()
    };
    let controller = SearchController::new(config).expect("controller");

    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    group.bench_function("exhaustive, 3 pages x 4 rungs", |b| {
        b.iter(|| black_box(controller.compress_with(black_box(&document), &SearchPolicy::Exhaustive)));
    });
    group.finish();
}

criterion_group!(benches, bench_analyze, bench_search);
criterion_main!(benches);
