// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: parsing source documents and assembling image-only candidates.

pub mod reader;
pub mod writer;

pub use reader::{PageGeometry, PdfSource};
pub use writer::{EncodedPage, PdfAssembler};
