// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page raster — one decoded page image plus its identity (ordinal and source
// file name). Transforms never mutate a page; they build a new one.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
use scanprep_core::error::{Result, ScanprepError};
use scanprep_core::types::PixelFormat;
use tracing::{debug, instrument};

/// Pixel storage of a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    Rgb(RgbImage),
    Gray(GrayImage),
}

impl Raster {
    pub fn width(&self) -> u32 {
        match self {
            Self::Rgb(img) => img.width(),
            Self::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Rgb(img) => img.height(),
            Self::Gray(img) => img.height(),
        }
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            Self::Rgb(_) => PixelFormat::Rgb8,
            Self::Gray(_) => PixelFormat::Gray8,
        }
    }

    /// Normalise any decoded image to 8-bit RGB or 8-bit gray. Alpha is
    /// dropped and deeper samples are scaled down.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::Gray(gray),
            DynamicImage::ImageRgb8(rgb) => Self::Rgb(rgb),
            DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
                Self::Gray(image.to_luma8())
            }
            other => Self::Rgb(other.to_rgb8()),
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Rgb(rgb) => DynamicImage::ImageRgb8(rgb),
            Self::Gray(gray) => DynamicImage::ImageLuma8(gray),
        }
    }
}

/// One page of a scanned document.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Ordinal position within its document (1-based when rasterized).
    index: u32,
    /// Source file name, used to key outputs.
    name: String,
    raster: Raster,
}

impl Page {
    // -- Construction ---------------------------------------------------------

    pub fn new(index: u32, name: impl Into<String>, raster: Raster) -> Self {
        Self {
            index,
            name: name.into(),
            raster,
        }
    }

    pub fn from_dynamic(index: u32, name: impl Into<String>, image: DynamicImage) -> Self {
        Self::new(index, name, Raster::from_dynamic(image))
    }

    /// Decode a page from encoded bytes (PNG, JPEG, ...).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(index: u32, name: &str, data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data).map_err(|err| {
            ScanprepError::ImageError(format!("failed to decode {}: {}", name, err))
        })?;
        Ok(Self::from_dynamic(index, name, image))
    }

    /// Load a page from disk, keeping colour if the file has it.
    ///
    /// A missing file is an input error; a file that exists but does not
    /// decode is an image error.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, index: u32) -> Result<Self> {
        let path = path.as_ref();
        let image = decode_file(path)?;
        debug!(width = image.width(), height = image.height(), "Page loaded");
        Ok(Self::from_dynamic(index, file_name(path), image))
    }

    /// Load a page from disk straight into grayscale.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_grayscale(path: impl AsRef<Path>, index: u32) -> Result<Self> {
        let path = path.as_ref();
        let image = decode_file(path)?;
        let gray = luma_from_dynamic(&image);
        Ok(Self::new(index, file_name(path), Raster::Gray(gray)))
    }

    // -- Accessors ------------------------------------------------------------

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn into_raster(self) -> Raster {
        self.raster
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.raster.format()
    }

    /// Build a new page with the same identity and a different raster.
    pub fn with_raster(&self, raster: Raster) -> Self {
        Self {
            index: self.index,
            name: self.name.clone(),
            raster,
        }
    }

    /// Structural check shared by every transform: a raster without pixels
    /// cannot be processed no matter how often it is retried.
    pub fn ensure_processable(&self) -> Result<()> {
        if self.width() == 0 || self.height() == 0 {
            return Err(ScanprepError::UnsupportedRaster(format!(
                "{} has no pixels ({}x{})",
                self.name,
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }

    /// Single-channel copy of the raster. Colour pages are reduced with the
    /// BT.601 luma weights.
    pub fn to_grayscale(&self) -> GrayImage {
        match &self.raster {
            Raster::Gray(gray) => gray.clone(),
            Raster::Rgb(rgb) => luma_from_rgb(rgb),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the page as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.raster
            .clone()
            .into_dynamic()
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| ScanprepError::ImageError(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Write the page to a file. The format is inferred from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let result = match &self.raster {
            Raster::Rgb(rgb) => rgb.save(path),
            Raster::Gray(gray) => gray.save(path),
        };
        result.map_err(|err| {
            ScanprepError::ImageError(format!(
                "failed to save page to {}: {}",
                path.display(),
                err
            ))
        })
    }
}

fn decode_file(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(ScanprepError::InputNotFound(path.display().to_string()));
    }
    image::open(path).map_err(|err| {
        ScanprepError::ImageError(format!("failed to load {}: {}", path.display(), err))
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn luma_from_dynamic(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            image.to_luma8()
        }
        other => luma_from_rgb(&other.to_rgb8()),
    }
}

/// Fixed-point BT.601: `(299 R + 587 G + 114 B) / 1000`, rounded.
fn luma_from_rgb(rgb: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (dst, src) in gray.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let y = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        *dst = Luma([y as u8]);
    }
    gray
}
