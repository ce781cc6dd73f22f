// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanprep.

use thiserror::Error;

/// Top-level error type for all Scanprep operations.
#[derive(Debug, Error)]
pub enum ScanprepError {
    // -- Input errors --
    #[error("no input documents to merge")]
    EmptyInput,

    #[error("input not found: {0}")]
    InputNotFound(String),

    // -- Document errors --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    /// The raster's shape can never be processed (zero area, wrong channel
    /// layout). Retrying will not change the outcome.
    #[error("unsupported raster: {0}")]
    UnsupportedRaster(String),

    #[error("enhancement stage '{stage}' failed: {detail}")]
    Stage { stage: &'static str, detail: String },

    // -- Collaborators --
    #[error("rasterization failed: {0}")]
    Rasterize(String),

    #[error("blob store error: {0}")]
    Store(String),

    // -- Batch execution --
    #[error("page task panicked: {0}")]
    TaskPanicked(String),

    #[error("worker pool unavailable: {0}")]
    PoolClosed(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanprepError>;
