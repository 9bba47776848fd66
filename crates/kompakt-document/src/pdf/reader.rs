// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF source: a parsed, read-only view of an input document using `lopdf`.

use kompakt_core::error::{KompaktError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument};

/// US Letter in points, used when a page tree carries no `/MediaBox` at all.
const DEFAULT_MEDIA_BOX: (f32, f32) = (612.0, 792.0);

/// Guard against cyclic `/Parent` chains in malformed page trees.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Physical page layout carried over to every compressed candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Media box width in PDF points.
    pub width_pt: f32,
    /// Media box height in PDF points.
    pub height_pt: f32,
    /// `/Rotate` value, normalised to 0, 90, 180 or 270.
    pub rotate: i64,
}

impl PageGeometry {
    /// Pixel dimensions of a raster of this page at `scale` pixels per point.
    pub fn pixel_size(&self, scale: f32) -> (u32, u32) {
        let width = (self.width_pt * scale).round().max(1.0) as u32;
        let height = (self.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// A parsed document, loaded once per invocation and shared read-only by the
/// analyzer, reference extractor and executors.
pub struct PdfSource {
    document: Document,
    /// Page object ids in page order (index 0 is the first page).
    page_ids: Vec<ObjectId>,
}

impl PdfSource {
    /// Parse a document buffer. Anything `lopdf` cannot load, or a document
    /// without pages, is a `Decode` error.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| KompaktError::Decode(format!("failed to parse PDF: {}", err)))?;

        // get_pages() is keyed by 1-indexed page number in ascending order.
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(KompaktError::Decode("document has no pages".into()));
        }

        debug!(pages = page_ids.len(), "PDF source loaded");
        Ok(Self { document, page_ids })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Borrow the underlying lopdf document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Object id of the page at `index` (0-based).
    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        self.page_ids.get(index).copied().ok_or_else(|| {
            KompaktError::Render(format!(
                "page {} out of range (document has {} pages)",
                index,
                self.page_ids.len()
            ))
        })
    }

    /// Media box and rotation of the page at `index`, following `/Parent`
    /// inheritance.
    pub fn page_geometry(&self, index: usize) -> Result<PageGeometry> {
        let page_id = self.page_id(index)?;

        let (width_pt, height_pt) = self
            .inherited(page_id, b"MediaBox")
            .and_then(|object| media_box_size(&self.document, object))
            .unwrap_or(DEFAULT_MEDIA_BOX);

        let rotate = self
            .inherited(page_id, b"Rotate")
            .and_then(|object| as_number(resolve(&self.document, object)))
            .map(|value| (value as i64).rem_euclid(360) / 90 * 90)
            .unwrap_or(0);

        Ok(PageGeometry {
            width_pt,
            height_pt,
            rotate,
        })
    }

    /// Lower-left corner of the page's media box in user space.
    pub fn media_origin(&self, index: usize) -> Result<(f32, f32)> {
        let page_id = self.page_id(index)?;
        Ok(self
            .inherited(page_id, b"MediaBox")
            .and_then(|object| media_box_coords(&self.document, object))
            .map(|[x0, y0, x1, y1]| (x0.min(x1), y0.min(y1)))
            .unwrap_or((0.0, 0.0)))
    }

    /// Decoded content stream of the page at `index`, all `/Contents` parts
    /// concatenated.
    pub fn page_content(&self, index: usize) -> Result<Vec<u8>> {
        let page_id = self.page_id(index)?;
        self.document
            .get_page_content(page_id)
            .map_err(|err| KompaktError::Render(format!("page {index} content unreadable: {err}")))
    }

    /// The page's resource dictionary, following `/Parent` inheritance.
    pub fn page_resources(&self, index: usize) -> Result<Option<&Dictionary>> {
        let page_id = self.page_id(index)?;
        Ok(self
            .inherited(page_id, b"Resources")
            .and_then(|object| resolve(&self.document, object).as_dict().ok()))
    }

    /// Look up `key` on the page dictionary, walking up the page tree when the
    /// page itself does not define it.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(value) = current.get(key) {
                return Some(value);
            }
            let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
            current = self.document.get_dictionary(parent_id).ok()?;
        }
        None
    }

    // -- Validation -----------------------------------------------------------

    /// Check that `data` is a loadable document with exactly `expected_pages`
    /// pages. Used on every candidate before it may be scored.
    #[instrument(skip(data), fields(bytes_len = data.len()))]
    pub fn validate(data: &[u8], expected_pages: usize) -> Result<()> {
        let document = Document::load_mem(data).map_err(|err| {
            KompaktError::Validation(format!("candidate does not parse: {}", err))
        })?;
        let pages = document.get_pages().len();
        if pages == 0 {
            return Err(KompaktError::Validation("candidate has zero pages".into()));
        }
        if pages != expected_pages {
            return Err(KompaktError::Validation(format!(
                "candidate has {} pages, expected {}",
                pages, expected_pages
            )));
        }
        Ok(())
    }
}

/// Follow indirect references until a direct object is reached.
pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        match current {
            Object::Reference(id) => match document.get_object(*id) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Numeric value of an integer or real object.
pub(crate) fn as_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

fn media_box_coords(document: &Document, object: &Object) -> Option<[f32; 4]> {
    let values = resolve(document, object).as_array().ok()?;
    if values.len() != 4 {
        return None;
    }
    let coords: Vec<f32> = values
        .iter()
        .filter_map(|value| as_number(resolve(document, value)))
        .collect();
    coords.try_into().ok()
}

fn media_box_size(document: &Document, object: &Object) -> Option<(f32, f32)> {
    let [x0, y0, x1, y1] = media_box_coords(document, object)?;
    let width = (x1 - x0).abs();
    let height = (y1 - y0).abs();
    (width > 0.0 && height > 0.0).then_some((width, height))
}
