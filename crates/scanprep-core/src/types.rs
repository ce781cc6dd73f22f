// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanprep pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one end-to-end pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Decode hiccups, stage failures and flaky stores. Safe to retry.
    Transient,
    /// Missing input, structural mismatch or bad configuration. Retrying
    /// cannot change the outcome.
    Permanent,
}

/// How a batch of pages is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One page at a time on the calling thread.
    Sequential,
    /// Pages fan out across a bounded worker pool.
    #[default]
    Parallel,
}

/// Shape of a morphological structuring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelShape {
    Rect,
    Cross,
    Ellipse,
}

/// Pixel layout of a page raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Three 8-bit channels.
    Rgb8,
    /// One 8-bit channel.
    Gray8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Gray8 => 1,
        }
    }
}

/// Image file extensions accepted as stage input.
pub const PAGE_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// MIME type for a stored artifact, inferred from its extension.
pub fn mime_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
