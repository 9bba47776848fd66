// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image-layer renderer: rasterizes scanned pages by replaying the image
// placements of their content stream onto a page-sized canvas.

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use kompakt_core::error::{KompaktError, Result};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::{debug, instrument};

use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{PdfSource, as_number, resolve};
use crate::render::PageRenderer;

/// Refuse to allocate rasters beyond this many pixels (about 400 MB of RGBA).
const MAX_RENDER_PIXELS: u64 = 100_000_000;

/// Nested `q` deeper than this is treated as a malformed stream.
const MAX_STATE_DEPTH: usize = 64;

/// Operators that paint glyphs. Any of them makes a page unrenderable here.
const TEXT_OPERATORS: &[&str] = &["BT", "Tj", "TJ", "'", "\"", "d0", "d1"];

/// Operators that stroke, fill or shade a path.
const PAINT_OPERATORS: &[&str] = &["S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "sh"];

/// Renderer for image-layer documents (scans, photo PDFs, previous Kompakt
/// output).
///
/// Only image XObjects are drawn, each at the position its transformation
/// matrix gives it, over a white page. A page that paints text, vector paths,
/// forms or inline images, or carries an image this renderer cannot decode
/// faithfully, is a `Render` error rather than a lossy approximation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageLayerRenderer;

impl ImageLayerRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl PageRenderer for ImageLayerRenderer {
    #[instrument(skip(self, source))]
    fn render_page(&self, source: &PdfSource, index: usize, scale: f32) -> Result<DynamicImage> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(KompaktError::Render(format!("invalid render scale {scale}")));
        }

        let geometry = source.page_geometry(index)?;
        let (width, height) = geometry.pixel_size(scale);
        if u64::from(width) * u64::from(height) > MAX_RENDER_PIXELS {
            return Err(KompaktError::Render(format!(
                "page {index} at scale {scale} would be {width}x{height} pixels"
            )));
        }

        let content = source.page_content(index)?;
        let resources = source.page_resources(index)?;
        let placements = image_placements(source.document(), resources, &content)?;
        if placements.is_empty() {
            return Err(KompaktError::Render(format!("page {index} has no raster layer")));
        }

        // User space to canvas pixels: origin at the media box corner, y down.
        let (x0, y0) = source.media_origin(index)?;
        let device = Matrix([
            width as f32 / geometry.width_pt,
            0.0,
            0.0,
            -(height as f32 / geometry.height_pt),
            -x0 * width as f32 / geometry.width_pt,
            (geometry.height_pt + y0) * height as f32 / geometry.height_pt,
        ]);

        let mut layers = Vec::with_capacity(placements.len());
        for (stream, ctm) in placements {
            let decoded = decode_image(source.document(), stream)?;
            let (w, h) = (decoded.width() as f32, decoded.height() as f32);
            // Image pixels to the unit square (row 0 at the top), then onward.
            let to_canvas = Matrix([1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0])
                .then(ctm)
                .then(device);
            layers.push((decoded, to_canvas));
        }
        debug!(images = layers.len(), width, height, "Page images placed");

        compose(width, height, layers)
    }
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `self` followed by `next`.
    fn then(self, next: Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [na, nb, nc, nd, ne, nf] = next.0;
        Matrix([
            a * na + b * nc,
            a * nb + b * nd,
            c * na + d * nc,
            c * nb + d * nd,
            e * na + f * nc + ne,
            e * nb + f * nd + nf,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn invert(&self) -> Option<Matrix> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * d - b * c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        Some(Matrix([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            (b * e - a * f) / det,
        ]))
    }

    fn is_axis_aligned(&self) -> bool {
        let [_, b, c, _, _, _] = self.0;
        b.abs() < 1e-6 && c.abs() < 1e-6
    }
}

/// Replay the content stream and collect every painted image together with
/// the CTM in force when it was painted.
fn image_placements<'a>(
    document: &'a Document,
    resources: Option<&'a Dictionary>,
    content: &[u8],
) -> Result<Vec<(&'a Stream, Matrix)>> {
    let content = Content::decode(content)
        .map_err(|err| KompaktError::Render(format!("content stream does not parse: {err}")))?;
    let xobjects = resources
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| resolve(document, xobjects).as_dict().ok());

    let mut ctm = Matrix::IDENTITY;
    let mut saved = Vec::new();
    let mut placements = Vec::new();

    for operation in &content.operations {
        let operator = operation.operator.as_str();
        match operator {
            "q" => {
                if saved.len() >= MAX_STATE_DEPTH {
                    return Err(KompaktError::Render("graphics state nested too deeply".into()));
                }
                saved.push(ctm);
            }
            "Q" => ctm = saved.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => {
                let values: Vec<f32> = operation
                    .operands
                    .iter()
                    .filter_map(|operand| as_number(resolve(document, operand)))
                    .collect();
                let values: [f32; 6] = values
                    .try_into()
                    .map_err(|_| KompaktError::Render("malformed cm operator".into()))?;
                ctm = Matrix(values).then(ctm);
            }
            "Do" => {
                let name = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                    .ok_or_else(|| KompaktError::Render("Do without a resource name".into()))?;
                let stream = xobjects
                    .and_then(|xobjects| xobjects.get(name).ok())
                    .and_then(|object| resolve(document, object).as_stream().ok())
                    .ok_or_else(|| {
                        KompaktError::Render(format!(
                            "unknown XObject {}",
                            String::from_utf8_lossy(name)
                        ))
                    })?;
                check_drawable(document, stream)?;
                placements.push((stream, ctm));
            }
            "BI" | "ID" | "EI" => {
                return Err(KompaktError::Render("inline images are not drawn".into()));
            }
            op if TEXT_OPERATORS.contains(&op) => {
                return Err(KompaktError::Render("page paints text".into()));
            }
            op if PAINT_OPERATORS.contains(&op) => {
                return Err(KompaktError::Render(format!(
                    "page paints vector content ({op})"
                )));
            }
            _ => {}
        }
    }
    Ok(placements)
}

/// Reject XObjects whose appearance depends on something this renderer does
/// not model.
fn check_drawable(document: &Document, stream: &Stream) -> Result<()> {
    let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name).ok();
    if subtype != Some(b"Image".as_slice()) {
        return Err(KompaktError::Render("form XObjects are not drawn".into()));
    }
    let flag = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .ok()
            .and_then(|value| resolve(document, value).as_bool().ok())
            .unwrap_or(false)
    };
    if flag(b"ImageMask") {
        return Err(KompaktError::Render("stencil masks are not drawn".into()));
    }
    if stream.dict.has(b"SMask") || stream.dict.has(b"Mask") {
        return Err(KompaktError::Render("masked images are not drawn".into()));
    }
    if let Ok(decode) = stream.dict.get(b"Decode") {
        let identity = resolve(document, decode).as_array().is_ok_and(|values| {
            values.iter().enumerate().all(|(i, value)| {
                as_number(resolve(document, value)) == Some(if i % 2 == 0 { 0.0 } else { 1.0 })
            })
        });
        if !identity {
            return Err(KompaktError::Render("non-default /Decode arrays are not supported".into()));
        }
    }
    Ok(())
}

/// Paint `layers` in order over a white canvas. The canvas is gray when every
/// layer is.
fn compose(width: u32, height: u32, layers: Vec<(DynamicImage, Matrix)>) -> Result<DynamicImage> {
    let gray = layers.iter().all(|(image, _)| !image.color().has_color());
    let mut canvas = if gray {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, image::Luma([255])))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])))
    };

    for (image, to_canvas) in layers {
        let (w, h) = (image.width() as f32, image.height() as f32);
        if to_canvas.is_axis_aligned() {
            let (left, top) = to_canvas.apply(0.0, 0.0);
            let (right, bottom) = to_canvas.apply(w, h);
            let (x_min, x_max) = (left.min(right).round(), left.max(right).round());
            let (y_min, y_max) = (top.min(bottom).round(), top.max(bottom).round());
            let (rect_w, rect_h) = ((x_max - x_min) as u32, (y_max - y_min) as u32);
            if rect_w == 0 || rect_h == 0 {
                continue;
            }
            if u64::from(rect_w) * u64::from(rect_h) > MAX_RENDER_PIXELS {
                return Err(KompaktError::Render(format!(
                    "image placed at {rect_w}x{rect_h} pixels is too large"
                )));
            }

            let mut placed = ImageProcessor::from_dynamic(image)
                .resize_exact(rect_w, rect_h)
                .into_dynamic();
            if right < left {
                placed = placed.fliph();
            }
            if bottom < top {
                placed = placed.flipv();
            }
            if (x_min, y_min) == (0.0, 0.0) && (rect_w, rect_h) == (width, height) {
                canvas = if gray {
                    DynamicImage::ImageLuma8(placed.to_luma8())
                } else {
                    DynamicImage::ImageRgb8(placed.to_rgb8())
                };
                continue;
            }
            paste(&mut canvas, &placed, x_min as i64, y_min as i64);
        } else if let Some(to_image) = to_canvas.invert() {
            paint_transformed(&mut canvas, &image, to_image);
        }
    }
    Ok(canvas)
}

fn paste(canvas: &mut DynamicImage, layer: &DynamicImage, x: i64, y: i64) {
    match canvas {
        DynamicImage::ImageLuma8(target) => image::imageops::overlay(target, &layer.to_luma8(), x, y),
        DynamicImage::ImageRgb8(target) => image::imageops::overlay(target, &layer.to_rgb8(), x, y),
        _ => {}
    }
}

/// Nearest-sample painting for rotated or skewed placements.
fn paint_transformed(canvas: &mut DynamicImage, image: &DynamicImage, to_image: Matrix) {
    let (w, h) = (image.width(), image.height());
    let inside = |px: u32, py: u32| {
        let (ix, iy) = to_image.apply(px as f32 + 0.5, py as f32 + 0.5);
        (ix >= 0.0 && iy >= 0.0 && ix < w as f32 && iy < h as f32).then_some((ix as u32, iy as u32))
    };
    match canvas {
        DynamicImage::ImageLuma8(target) => {
            let source = image.to_luma8();
            for (px, py, pixel) in target.enumerate_pixels_mut() {
                if let Some((ix, iy)) = inside(px, py) {
                    *pixel = *source.get_pixel(ix, iy);
                }
            }
        }
        DynamicImage::ImageRgb8(target) => {
            let source = image.to_rgb8();
            for (px, py, pixel) in target.enumerate_pixels_mut() {
                if let Some((ix, iy)) = inside(px, py) {
                    *pixel = *source.get_pixel(ix, iy);
                }
            }
        }
        _ => {}
    }
}

fn dict_int(document: &Document, stream: &Stream, key: &[u8]) -> Option<i64> {
    let value = stream.dict.get(key).ok()?;
    resolve(document, value).as_i64().ok()
}

/// Names listed in the stream's `/Filter` entry, outermost first.
fn filters(document: &Document, stream: &Stream) -> Vec<Vec<u8>> {
    let Ok(filter) = stream.dict.get(b"Filter") else {
        return Vec::new();
    };
    match resolve(document, filter) {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| resolve(document, item).as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_image(document: &Document, stream: &Stream) -> Result<DynamicImage> {
    let filters = filters(document, stream);
    match filters.as_slice() {
        [only] if only == b"DCTDecode" => {
            image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|err| KompaktError::Render(format!("failed to decode JPEG layer: {}", err)))
        }
        [only] if only == b"FlateDecode" => {
            if has_predictor(document, stream) {
                return Err(KompaktError::Render(
                    "predictor-coded image layers are not supported".into(),
                ));
            }
            let mut samples = Vec::new();
            ZlibDecoder::new(stream.content.as_slice())
                .read_to_end(&mut samples)
                .map_err(|err| {
                    KompaktError::Render(format!("failed to inflate image layer: {}", err))
                })?;
            raw_samples_to_image(document, stream, samples)
        }
        [] => raw_samples_to_image(document, stream, stream.content.clone()),
        other => Err(KompaktError::Render(format!(
            "unsupported image filter chain: {}",
            other
                .iter()
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Whether `/DecodeParms` asks for a PNG or TIFF predictor.
fn has_predictor(document: &Document, stream: &Stream) -> bool {
    let Ok(params) = stream.dict.get(b"DecodeParms") else {
        return false;
    };
    resolve(document, params)
        .as_dict()
        .ok()
        .and_then(|params| params.get(b"Predictor").ok())
        .and_then(|predictor| resolve(document, predictor).as_i64().ok())
        .is_some_and(|predictor| predictor > 1)
}

/// Interpret uncompressed samples according to `/ColorSpace` and
/// `/BitsPerComponent`.
fn raw_samples_to_image(
    document: &Document,
    stream: &Stream,
    samples: Vec<u8>,
) -> Result<DynamicImage> {
    let dimension = |key: &[u8]| {
        dict_int(document, stream, key)
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value > 0)
    };
    let (Some(width), Some(height)) = (dimension(b"Width"), dimension(b"Height")) else {
        return Err(KompaktError::Render("image layer has no usable dimensions".into()));
    };
    if u64::from(width) * u64::from(height) > MAX_RENDER_PIXELS {
        return Err(KompaktError::Render(format!(
            "image layer of {width}x{height} pixels is too large"
        )));
    }

    let bits = dict_int(document, stream, b"BitsPerComponent").unwrap_or(8);
    let components = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|space| component_count(document, space))
        .ok_or_else(|| KompaktError::Render("unsupported image colour space".into()))?;

    let pixels = width as usize * height as usize;
    match (bits, components) {
        (8, 1) => {
            let data = take_exact(samples, pixels)?;
            GrayImage::from_raw(width, height, data)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| KompaktError::Render("gray sample buffer mismatch".into()))
        }
        (8, 3) => {
            let data = take_exact(samples, pixels * 3)?;
            RgbImage::from_raw(width, height, data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| KompaktError::Render("RGB sample buffer mismatch".into()))
        }
        (8, 4) => {
            let data = take_exact(samples, pixels * 4)?;
            let rgb = data.chunks_exact(4).flat_map(cmyk_to_rgb).collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| KompaktError::Render("CMYK sample buffer mismatch".into()))
        }
        (1, 1) => unpack_bilevel(width, height, &samples).map(DynamicImage::ImageLuma8),
        _ => Err(KompaktError::Render(format!(
            "unsupported sample layout: {bits} bits x {components} components"
        ))),
    }
}

/// Number of colour components, or `None` for spaces this renderer cannot draw
/// (Indexed, Separation, DeviceN, Lab).
fn component_count(document: &Document, space: &Object) -> Option<usize> {
    match resolve(document, space) {
        Object::Name(name) => named_components(name),
        Object::Array(items) => {
            let family = resolve(document, items.first()?).as_name().ok()?;
            match family {
                b"ICCBased" => {
                    let profile = resolve(document, items.get(1)?).as_stream().ok()?;
                    let n = dict_int(document, profile, b"N")?;
                    matches!(n, 1 | 3 | 4).then_some(n as usize)
                }
                other => named_components(other),
            }
        }
        _ => None,
    }
}

fn named_components(name: &[u8]) -> Option<usize> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Some(1),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(3),
        b"DeviceCMYK" | b"CMYK" => Some(4),
        _ => None,
    }
}

fn take_exact(mut samples: Vec<u8>, expected: usize) -> Result<Vec<u8>> {
    if samples.len() < expected {
        return Err(KompaktError::Render(format!(
            "image layer truncated: {} of {} bytes",
            samples.len(),
            expected
        )));
    }
    samples.truncate(expected);
    Ok(samples)
}

fn cmyk_to_rgb(sample: &[u8]) -> [u8; 3] {
    let k = 255 - u16::from(sample[3]);
    let channel = |value: u8| ((255 - u16::from(value)) * k / 255) as u8;
    [channel(sample[0]), channel(sample[1]), channel(sample[2])]
}

/// Expand 1-bit samples (rows padded to a byte, 0 = black) to 8-bit gray.
fn unpack_bilevel(width: u32, height: u32, samples: &[u8]) -> Result<GrayImage> {
    let row_bytes = (width as usize).div_ceil(8);
    if samples.len() < row_bytes * height as usize {
        return Err(KompaktError::Render("bilevel image layer truncated".into()));
    }
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let byte = samples[y as usize * row_bytes + x as usize / 8];
        let bit = (byte >> (7 - (x % 8))) & 1;
        image::Luma([if bit == 1 { 255 } else { 0 }])
    }))
}
