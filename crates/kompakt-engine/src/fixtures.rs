// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic documents shared by the engine tests. Pages are 180 x 240 pt with
// a raster of one pixel per point.

use image::{DynamicImage, RgbImage};
use kompakt_document::{EncodedPage, ImageProcessor, PageGeometry, PdfAssembler};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

pub const PAGE_WIDTH: u32 = 180;
pub const PAGE_HEIGHT: u32 = 240;

pub fn geometry() -> PageGeometry {
    PageGeometry {
        width_pt: PAGE_WIDTH as f32,
        height_pt: PAGE_HEIGHT as f32,
        rotate: 0,
    }
}

/// Slowly varying off-white paper tone.
fn paper(x: u32, y: u32, index: u32) -> f32 {
    let (x, y) = (x as f32, y as f32 + index as f32 * 17.0);
    226.0 + 10.0 * (x / 9.0).sin() + 7.0 * (y / 13.0).cos() + 4.0 * ((x + y) / 23.0).sin()
}

fn gray(value: f32) -> image::Rgb<u8> {
    let v = value.round().clamp(0.0, 255.0) as u8;
    image::Rgb([v, v, v.saturating_sub(5)])
}

/// Paper texture only.
pub fn neutral_page(index: u32) -> RgbImage {
    RgbImage::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| gray(paper(x, y, index)))
}

/// Paper with a saturated blue band across the top quarter.
pub fn letterhead_page(index: u32) -> RgbImage {
    RgbImage::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| {
        if y < 60 {
            image::Rgb([30, 70, 190])
        } else {
            gray(paper(x, y, index))
        }
    })
}

/// A scanned text page: paper texture with soft-edged dark text lines.
pub fn text_scan_page(index: u32) -> RgbImage {
    RgbImage::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| {
        let base = paper(x, y, index);
        if !(20..160).contains(&x) || !(24..216).contains(&y) {
            return gray(base);
        }
        // 5 px tall strokes every 12 px, broken into "words".
        let line_phase = (y - 24) % 12;
        let word = (x + index * 7 + (y / 12) * 13) % 31;
        let ink = match (line_phase, word) {
            (1 | 5, 0..=24) => 0.45,
            (2..=4, 0..=24) => 1.0,
            _ => 0.0,
        };
        gray(base - ink * 175.0)
    })
}

/// Photo-like page: broad colour gradients and soft blobs.
pub fn photo_page(index: u32) -> RgbImage {
    RgbImage::from_fn(PAGE_WIDTH, PAGE_HEIGHT, |x, y| {
        let (fx, fy) = (x as f32, y as f32 + index as f32 * 11.0);
        let r = 128.0 + 90.0 * (fx / 31.0).sin() * (fy / 47.0).cos();
        let g = 120.0 + 70.0 * (fy / 29.0).sin();
        let b = 110.0 + 80.0 * ((fx + fy) / 37.0).cos();
        image::Rgb([r as u8, g as u8, b as u8])
    })
}

/// Losslessly stored pages, the large "original" of most scenarios.
pub fn lossless_pdf(pages: u32, page: fn(u32) -> RgbImage) -> Vec<u8> {
    let mut assembler = PdfAssembler::new();
    for index in 0..pages {
        let image = DynamicImage::ImageRgb8(page(index));
        assembler
            .push_page(EncodedPage::lossless(&image, geometry()))
            .expect("push page");
    }
    assembler.finish().expect("assemble")
}

/// JPEG pages whose raster is `1 / downscale` of the media box.
pub fn jpeg_pdf(pages: u32, page: fn(u32) -> RgbImage, downscale: u32, quality: u8) -> Vec<u8> {
    let mut assembler = PdfAssembler::new();
    for index in 0..pages {
        let processor = ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(page(index)))
            .resize_exact(PAGE_WIDTH / downscale, PAGE_HEIGHT / downscale);
        let jpeg = processor.to_jpeg_bytes(quality).expect("encode");
        assembler
            .push_page(EncodedPage::jpeg(
                jpeg,
                processor.width(),
                processor.height(),
                false,
                geometry(),
            ))
            .expect("push page");
    }
    assembler.finish().expect("assemble")
}

/// A single vector-only page: parses fine, has nothing to rasterize.
pub fn pdf_without_raster_layer() -> Vec<u8> {
    single_page_pdf(Vec::new(), b"0 0 m 100 100 l S")
}

/// A header image over the top quarter and a line of real text below it.
pub fn pdf_with_text_over_image() -> Vec<u8> {
    let header = letterhead_page(0);
    let header = image::imageops::crop_imm(&header, 0, 0, PAGE_WIDTH, 60).to_image();
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => PAGE_WIDTH as i64,
            "Height" => 60,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        header.into_raw(),
    );
    single_page_pdf(
        vec![("Im1", stream)],
        b"q 180 0 0 60 0 180 cm /Im1 Do Q BT /F1 12 Tf 20 120 Td (CONTRACT TERMS) Tj ET",
    )
}

fn single_page_pdf(xobjects: Vec<(&str, Stream)>, content: &[u8]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut names = Dictionary::new();
    for (name, stream) in xobjects {
        names.set(name, doc.add_object(stream));
    }
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 180.into(), 240.into()],
        "Resources" => dictionary! { "XObject" => names },
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut data = Vec::new();
    doc.save_to(&mut data).expect("save");
    data
}
