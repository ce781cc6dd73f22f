// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// Every section has a `Default` matching the tuned values the pipeline was
// built around, so a config file only needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanprepError};
use crate::types::{DispatchMode, KernelShape};

/// Largest structuring element side the morphology stage accepts.
pub const MAX_MORPH_SIZE: u32 = 511;

/// Tuning for the text enhancement chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementParameters {
    /// Gamma value; the lookup table applies `v^(1/gamma)`.
    pub gamma: f64,
    /// Non-local-means filter strength.
    pub denoise_h: f32,
    /// Side of the square patch compared by non-local means (odd).
    pub denoise_template: u32,
    /// Side of the square search area around each pixel (odd).
    pub denoise_search: u32,
    /// CLAHE clip limit, relative to the mean histogram bin height.
    pub clahe_clip: f32,
    /// CLAHE tile grid as (columns, rows).
    pub clahe_tiles: (u32, u32),
    /// Weights `(alpha, beta, gamma)` in `alpha*src + beta*blur + gamma`.
    pub sharpen_weights: (f32, f32, f32),
    /// Gaussian sigma of the unsharp-mask blur.
    pub sharpen_sigma: f32,
    /// Adaptive threshold neighbourhood side (odd).
    pub threshold_block: u32,
    /// Constant subtracted from the neighbourhood mean.
    pub threshold_c: i32,
    pub morph_shape: KernelShape,
    /// Structuring element side (odd).
    pub morph_size: u32,
    pub morph_close_iters: u32,
    pub morph_dilate_iters: u32,
    /// Median filter side (odd).
    pub median_kernel: u32,
}

impl Default for EnhancementParameters {
    fn default() -> Self {
        Self {
            gamma: 0.6,
            denoise_h: 10.0,
            denoise_template: 11,
            denoise_search: 25,
            clahe_clip: 4.0,
            clahe_tiles: (16, 16),
            sharpen_weights: (2.2, -1.2, 0.0),
            sharpen_sigma: 3.0,
            threshold_block: 43,
            threshold_c: 8,
            morph_shape: KernelShape::Ellipse,
            morph_size: 3,
            morph_close_iters: 3,
            morph_dilate_iters: 1,
            median_kernel: 5,
        }
    }
}

impl EnhancementParameters {
    /// Reject parameter combinations the filters cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0) {
            return Err(invalid(format!("gamma must be positive, got {}", self.gamma)));
        }
        if !(self.denoise_h > 0.0) {
            return Err(invalid(format!(
                "denoise_h must be positive, got {}",
                self.denoise_h
            )));
        }
        require_odd("denoise_template", self.denoise_template)?;
        require_odd("denoise_search", self.denoise_search)?;
        if self.denoise_search < self.denoise_template {
            return Err(invalid(format!(
                "denoise_search ({}) must not be smaller than denoise_template ({})",
                self.denoise_search, self.denoise_template
            )));
        }
        if !(self.clahe_clip > 0.0) {
            return Err(invalid(format!(
                "clahe_clip must be positive, got {}",
                self.clahe_clip
            )));
        }
        if self.clahe_tiles.0 == 0 || self.clahe_tiles.1 == 0 {
            return Err(invalid("clahe_tiles must be non-zero".to_string()));
        }
        if !(self.sharpen_sigma > 0.0) {
            return Err(invalid(format!(
                "sharpen_sigma must be positive, got {}",
                self.sharpen_sigma
            )));
        }
        require_odd("threshold_block", self.threshold_block)?;
        if self.threshold_block < 3 {
            return Err(invalid("threshold_block must be at least 3".to_string()));
        }
        require_odd("morph_size", self.morph_size)?;
        if self.morph_size > MAX_MORPH_SIZE {
            return Err(invalid(format!(
                "morph_size must be at most {MAX_MORPH_SIZE}, got {}",
                self.morph_size
            )));
        }
        require_odd("median_kernel", self.median_kernel)?;
        Ok(())
    }
}

/// Channel range that marks a pixel as watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Inclusive lower bound per channel (R, G, B).
    pub min: [u8; 3],
    /// Inclusive upper bound per channel (R, G, B).
    pub max: [u8; 3],
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            min: [150, 150, 150],
            max: [255, 255, 255],
        }
    }
}

/// Per-page retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per page, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Batch dispatch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BatchSettings {
    pub mode: DispatchMode,
    /// Worker pool size; `None` means half the available parallelism.
    pub workers: Option<usize>,
}

/// Logical folder names used when handing artifacts to the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderNames {
    pub converted: String,
    pub watermark_removed: String,
    pub text_enhanced: String,
    pub merged: String,
}

impl Default for FolderNames {
    fn default() -> Self {
        Self {
            converted: "Converted_Images_600DPI".to_string(),
            watermark_removed: "Watermark_Removed_Images".to_string(),
            text_enhanced: "Text_Enhanced_Images".to_string(),
            merged: "Merged_PDFs".to_string(),
        }
    }
}

/// Complete pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enhancement: EnhancementParameters,
    pub watermark: WatermarkConfig,
    pub retry: RetrySettings,
    pub batch: BatchSettings,
    /// Rasterization resolution.
    pub dpi: u32,
    /// File name of the merged output, excluded from merge input.
    pub merge_sentinel: String,
    pub folders: FolderNames,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enhancement: EnhancementParameters::default(),
            watermark: WatermarkConfig::default(),
            retry: RetrySettings::default(),
            batch: BatchSettings::default(),
            dpi: 600,
            merge_sentinel: "percentage.pdf".to_string(),
            folders: FolderNames::default(),
        }
    }
}

impl PipelineConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScanprepError::InputNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.enhancement.validate()?;
        for channel in 0..3 {
            if self.watermark.min[channel] > self.watermark.max[channel] {
                return Err(invalid(format!(
                    "watermark channel {} has min {} above max {}",
                    channel, self.watermark.min[channel], self.watermark.max[channel]
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if self.batch.workers == Some(0) {
            return Err(invalid("batch.workers must be at least 1".to_string()));
        }
        if self.dpi == 0 {
            return Err(invalid("dpi must be positive".to_string()));
        }
        if self.merge_sentinel.is_empty() {
            return Err(invalid("merge_sentinel must not be empty".to_string()));
        }
        Ok(())
    }
}

fn invalid(detail: String) -> ScanprepError {
    ScanprepError::Config(detail)
}

fn require_odd(name: &str, value: u32) -> Result<()> {
    if value % 2 == 1 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be odd, got {value}")))
    }
}
