// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text enhancement — a fixed chain of grayscale filters that turns a noisy,
// unevenly lit scan into clean black text on a white page.

use std::fmt;
use std::path::Path;

use image::GrayImage;
use scanprep_core::config::EnhancementParameters;
use scanprep_core::error::{Result, ScanprepError};
use tracing::{debug, error, instrument};

use crate::scan::filters::{self, StructuringElement};
use crate::scan::page::{Page, Raster};

/// One step of the enhancement chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnhancementStage {
    /// Gamma lookup table.
    Gamma,
    /// Non-local means.
    Denoise,
    /// Tile-based contrast equalisation.
    Clahe,
    /// Unsharp mask.
    Sharpen,
    /// Inverted adaptive mean threshold; ink becomes 255.
    Threshold,
    /// Closing followed by dilation.
    Morphology,
    /// Median blur and inversion back to dark-on-light.
    Finish,
}

/// The order stages always run in.
pub const STAGE_ORDER: [EnhancementStage; 7] = [
    EnhancementStage::Gamma,
    EnhancementStage::Denoise,
    EnhancementStage::Clahe,
    EnhancementStage::Sharpen,
    EnhancementStage::Threshold,
    EnhancementStage::Morphology,
    EnhancementStage::Finish,
];

impl EnhancementStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gamma => "gamma",
            Self::Denoise => "denoise",
            Self::Clahe => "clahe",
            Self::Sharpen => "sharpen",
            Self::Threshold => "threshold",
            Self::Morphology => "morphology",
            Self::Finish => "finish",
        }
    }
}

impl fmt::Display for EnhancementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies the enhancement chain with a fixed set of parameters.
///
/// Construction precomputes the gamma table and structuring element, so one
/// enhancer can be shared across worker threads.
#[derive(Debug, Clone)]
pub struct TextEnhancer {
    params: EnhancementParameters,
    gamma_lut: [u8; 256],
    element: StructuringElement,
}

impl Default for TextEnhancer {
    fn default() -> Self {
        Self::build(EnhancementParameters::default())
    }
}

impl TextEnhancer {
    /// Create an enhancer, rejecting parameters the filters cannot run with.
    pub fn new(params: EnhancementParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: EnhancementParameters) -> Self {
        Self {
            gamma_lut: filters::gamma_lut(params.gamma),
            element: StructuringElement::new(params.morph_shape, params.morph_size),
            params,
        }
    }

    pub fn params(&self) -> &EnhancementParameters {
        &self.params
    }

    /// Enhance one page. Colour pages are reduced to grayscale first; the
    /// result is always a grayscale page with the same identity.
    #[instrument(skip_all, fields(page = page.name(), width = page.width(), height = page.height()))]
    pub fn enhance(&self, page: &Page) -> Result<Page> {
        page.ensure_processable()?;
        let gray = page.to_grayscale();
        let out = self.enhance_gray(&gray)?;
        Ok(page.with_raster(Raster::Gray(out)))
    }

    /// Run every stage in [`STAGE_ORDER`] over a grayscale raster.
    pub fn enhance_gray(&self, image: &GrayImage) -> Result<GrayImage> {
        let mut current = image.clone();
        for stage in STAGE_ORDER {
            current = self.apply_stage(stage, &current).inspect_err(|err| {
                error!(%stage, error = %err, "Enhancement stage failed");
            })?;
            debug!(%stage, "Stage complete");
        }
        Ok(current)
    }

    /// Apply a single stage. Every stage must keep the raster's dimensions.
    pub fn apply_stage(&self, stage: EnhancementStage, image: &GrayImage) -> Result<GrayImage> {
        let p = &self.params;
        let out = match stage {
            EnhancementStage::Gamma => filters::apply_lut(image, &self.gamma_lut),
            EnhancementStage::Denoise => {
                filters::denoise_nl_means(image, p.denoise_h, p.denoise_template, p.denoise_search)
            }
            EnhancementStage::Clahe => filters::equalize_clahe(image, p.clahe_clip, p.clahe_tiles),
            EnhancementStage::Sharpen => {
                filters::unsharp_mask(image, p.sharpen_sigma, p.sharpen_weights)
            }
            EnhancementStage::Threshold => {
                filters::adaptive_mean_threshold_inv(image, p.threshold_block, p.threshold_c)
            }
            EnhancementStage::Morphology => {
                let closed = filters::close(image, &self.element, p.morph_close_iters);
                filters::dilate(&closed, &self.element, p.morph_dilate_iters)
            }
            EnhancementStage::Finish => {
                filters::invert(&filters::median_blur(image, p.median_kernel))
            }
        };
        if out.dimensions() != image.dimensions() {
            return Err(ScanprepError::Stage {
                stage: stage.name(),
                detail: format!(
                    "output is {:?}, input was {:?}",
                    out.dimensions(),
                    image.dimensions()
                ),
            });
        }
        Ok(out)
    }
}

/// File name an enhanced page is stored under: the source base name with a
/// `.png` extension.
pub fn enhanced_file_name(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    format!("{stem}.png")
}
