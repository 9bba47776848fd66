// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF assembler: builds image-only documents, one full-bleed raster per page,
// directly with `lopdf`.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::DynamicImage;
use kompakt_core::error::{KompaktError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, instrument};

use crate::pdf::reader::PageGeometry;

/// Resource name of the page image inside each page's `/XObject` dictionary.
const IMAGE_NAME: &str = "Im0";

/// How the image stream of a page is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEncoding {
    /// Baseline JPEG bytes (`/DCTDecode`).
    Jpeg,
    /// Raw samples, Flate-compressed on assembly.
    Raw,
}

/// A single page ready for assembly: encoded raster plus the geometry of the
/// source page it replaces.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    data: Vec<u8>,
    encoding: StreamEncoding,
    pixel_width: u32,
    pixel_height: u32,
    gray: bool,
    geometry: PageGeometry,
}

impl EncodedPage {
    /// Wrap JPEG bytes produced by [`crate::ImageProcessor::to_jpeg_bytes`].
    pub fn jpeg(
        data: Vec<u8>,
        pixel_width: u32,
        pixel_height: u32,
        gray: bool,
        geometry: PageGeometry,
    ) -> Self {
        Self {
            data,
            encoding: StreamEncoding::Jpeg,
            pixel_width,
            pixel_height,
            gray,
            geometry,
        }
    }

    /// Store `image` losslessly (8-bit RGB or gray samples, Flate-compressed).
    pub fn lossless(image: &DynamicImage, geometry: PageGeometry) -> Self {
        let gray = !image.color().has_color();
        let data = if gray {
            image.to_luma8().into_raw()
        } else {
            image.to_rgb8().into_raw()
        };
        Self {
            data,
            encoding: StreamEncoding::Raw,
            pixel_width: image.width(),
            pixel_height: image.height(),
            gray,
            geometry,
        }
    }
}

/// Incrementally builds an image-only PDF.
///
/// Each page carries exactly one image XObject painted over the whole media
/// box, the source page's `/MediaBox` dimensions and its `/Rotate`. Nothing
/// else from the source survives.
pub struct PdfAssembler {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfAssembler {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Self {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append a page.
    pub fn push_page(&mut self, page: EncodedPage) -> Result<()> {
        let EncodedPage {
            data,
            encoding,
            pixel_width,
            pixel_height,
            gray,
            geometry,
        } = page;

        if pixel_width == 0 || pixel_height == 0 {
            return Err(KompaktError::Encode("page image has zero area".into()));
        }

        let color_space = if gray { "DeviceGray" } else { "DeviceRGB" };
        let image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => pixel_width as i64,
            "Height" => pixel_height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
        };

        let image_stream = match encoding {
            StreamEncoding::Jpeg => {
                let mut stream = Stream::new(image_dict, data);
                stream.dict.set("Filter", "DCTDecode");
                // Already entropy coded.
                stream.allows_compression = false;
                stream
            }
            StreamEncoding::Raw => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(&data).map_err(|err| {
                    KompaktError::Encode(format!("failed to deflate page image: {}", err))
                })?;
                let deflated = encoder.finish().map_err(|err| {
                    KompaktError::Encode(format!("failed to finish deflate stream: {}", err))
                })?;
                let mut stream = Stream::new(image_dict, deflated);
                stream.dict.set("Filter", "FlateDecode");
                stream.allows_compression = false;
                stream
            }
        };
        let image_id = self.document.add_object(image_stream);

        let (width, height) = (geometry.width_pt, geometry.height_pt);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(|err| {
            KompaktError::Encode(format!("failed to encode page content: {}", err))
        })?;
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, encoded));

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
            },
        };
        if geometry.rotate != 0 {
            page_dict.set("Rotate", geometry.rotate);
        }

        let page_id = self.document.add_object(page_dict);
        self.kids.push(page_id.into());
        Ok(())
    }

    /// Finish the page tree and serialise the document.
    #[instrument(skip(self), fields(pages = self.kids.len()))]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.kids.is_empty() {
            return Err(KompaktError::Validation(
                "assembled document has zero pages".into(),
            ));
        }

        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.document
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            KompaktError::Encode(format!("failed to serialise assembled PDF: {}", err))
        })?;

        debug!(output_bytes = output.len(), "Document assembled");
        Ok(output)
    }
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::processor::ImageProcessor;
    use crate::pdf::reader::PdfSource;
    use image::{GrayImage, RgbImage};

    fn geometry() -> PageGeometry {
        PageGeometry {
            width_pt: 120.0,
            height_pt: 160.0,
            rotate: 0,
        }
    }

    #[test]
    fn zero_pages_is_rejected() {
        let err = PdfAssembler::new().finish().err().expect("must fail");
        assert!(matches!(err, KompaktError::Validation(_)));
    }

    #[test]
    fn jpeg_pages_round_trip_through_the_reader() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(60, 80, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 3) as u8, 128])
        }));
        let processor = ImageProcessor::from_dynamic(image);
        let jpeg = processor.to_jpeg_bytes(80).expect("encode");

        let mut assembler = PdfAssembler::new();
        for rotate in [0, 180] {
            let geometry = PageGeometry { rotate, ..geometry() };
            assembler
                .push_page(EncodedPage::jpeg(jpeg.clone(), 60, 80, false, geometry))
                .expect("push");
        }
        assert_eq!(assembler.page_count(), 2);
        let data = assembler.finish().expect("finish");

        assert!(data.starts_with(b"%PDF"));
        let source = PdfSource::from_bytes(&data).expect("parse");
        assert_eq!(source.page_count(), 2);
        assert_eq!(source.page_geometry(0).expect("geometry").rotate, 0);
        let second = source.page_geometry(1).expect("geometry");
        assert_eq!(second.rotate, 180);
        assert_eq!((second.width_pt, second.height_pt), (120.0, 160.0));
    }

    #[test]
    fn lossless_gray_page_keeps_single_channel() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, image::Luma([90])));
        let page = EncodedPage::lossless(&image, geometry());
        assert_eq!(page.data.len(), 100);
        assert!(page.gray);
    }

    #[test]
    fn zero_area_page_is_an_encode_error() {
        let mut assembler = PdfAssembler::new();
        let err = assembler
            .push_page(EncodedPage::jpeg(vec![0xFF, 0xD8], 0, 10, true, geometry()))
            .err()
            .expect("must fail");
        assert!(matches!(err, KompaktError::Encode(_)));
    }
}
