// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan cleanup — the page raster type, watermark suppression, and the text
// enhancement chain with its filter kernels.

pub mod enhance;
pub mod filters;
pub mod page;
pub mod watermark;

pub use enhance::TextEnhancer;
pub use page::{Page, Raster};
pub use watermark::WatermarkSuppressor;
