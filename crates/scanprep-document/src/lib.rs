// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanprep-document — Document processing for the Scanprep pipeline.
//
// Provides page ordering and PDF concatenation, the page raster type, and the
// two per-page cleanup transforms (watermark suppression, text enhancement).

pub mod pdf;
pub mod scan;

// Re-export the primary structs so callers can use `scanprep_document::PageMerger` etc.
pub use pdf::merge::{MergeSummary, PageMerger};
pub use pdf::order::{PageOrderer, page_ordinal};
pub use scan::enhance::{EnhancementStage, STAGE_ORDER, TextEnhancer, enhanced_file_name};
pub use scan::page::{Page, Raster};
pub use scan::watermark::{
    ChannelRangeClassifier, PixelClassifier, SuppressionStats, WatermarkSuppressor,
};
