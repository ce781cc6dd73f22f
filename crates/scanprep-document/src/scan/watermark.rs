// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Watermark suppression — classify every pixel and rewrite matches to pure
// white. Light, low-saturation watermarks sit well above the intensity of
// printed text, so a per-channel range test separates the two.

use scanprep_core::config::WatermarkConfig;
use serde::Serialize;
use tracing::{info, instrument};

use crate::scan::page::{Page, Raster};

/// Pure predicate over a pixel's (R, G, B) values.
pub trait PixelClassifier: Send + Sync {
    fn is_watermark(&self, rgb: [u8; 3]) -> bool;
}

/// Matches pixels whose every channel lies in an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRangeClassifier {
    min: [u8; 3],
    max: [u8; 3],
}

impl ChannelRangeClassifier {
    pub fn new(min: [u8; 3], max: [u8; 3]) -> Self {
        Self { min, max }
    }
}

impl Default for ChannelRangeClassifier {
    fn default() -> Self {
        WatermarkConfig::default().into()
    }
}

impl From<WatermarkConfig> for ChannelRangeClassifier {
    fn from(config: WatermarkConfig) -> Self {
        Self::new(config.min, config.max)
    }
}

impl PixelClassifier for ChannelRangeClassifier {
    fn is_watermark(&self, rgb: [u8; 3]) -> bool {
        rgb.iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(value, (lo, hi))| (*lo..=*hi).contains(value))
    }
}

/// Diagnostics from one suppression pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuppressionStats {
    /// Pixels the classifier matched.
    pub matched: u64,
    /// Matched pixels that were not already white.
    pub changed: u64,
}

/// Rewrites classified pixels to the background colour.
#[derive(Debug, Clone)]
pub struct WatermarkSuppressor<C = ChannelRangeClassifier> {
    classifier: C,
}

impl Default for WatermarkSuppressor<ChannelRangeClassifier> {
    fn default() -> Self {
        Self::standard()
    }
}

impl WatermarkSuppressor<ChannelRangeClassifier> {
    /// Suppressor using the default `[150, 255]` range on all channels.
    pub fn standard() -> Self {
        Self::new(ChannelRangeClassifier::default())
    }

    pub fn from_config(config: WatermarkConfig) -> Self {
        Self::new(config.into())
    }
}

impl<C: PixelClassifier> WatermarkSuppressor<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Return a copy of `page` with every watermark pixel set to white.
    pub fn suppress(&self, page: &Page) -> Page {
        self.suppress_with_stats(page).0
    }

    /// Like [`suppress`](Self::suppress), also reporting how many pixels were
    /// matched and changed.
    #[instrument(skip_all, fields(page = page.name()))]
    pub fn suppress_with_stats(&self, page: &Page) -> (Page, SuppressionStats) {
        let (raster, stats) = match page.raster() {
            Raster::Rgb(rgb) => {
                let mut out = rgb.clone();
                let stats = self.rewrite(&mut out, 3);
                (Raster::Rgb(out), stats)
            }
            Raster::Gray(gray) => {
                let mut out = gray.clone();
                let stats = self.rewrite(&mut out, 1);
                (Raster::Gray(out), stats)
            }
        };
        info!(
            matched = stats.matched,
            changed = stats.changed,
            "Watermark pixels suppressed"
        );
        (page.with_raster(raster), stats)
    }

    /// Mask the whole buffer first, then assign through the mask. A
    /// single-channel pixel is classified as `[v, v, v]`.
    fn rewrite(&self, samples: &mut [u8], channels: usize) -> SuppressionStats {
        let mask: Vec<bool> = samples
            .chunks_exact(channels)
            .map(|px| {
                let rgb = if channels == 1 {
                    [px[0]; 3]
                } else {
                    [px[0], px[1], px[2]]
                };
                self.classifier.is_watermark(rgb)
            })
            .collect();

        let mut stats = SuppressionStats::default();
        for (px, hit) in samples.chunks_exact_mut(channels).zip(mask) {
            if !hit {
                continue;
            }
            stats.matched += 1;
            if px.iter().any(|v| *v != u8::MAX) {
                stats.changed += 1;
                px.fill(u8::MAX);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn rgb_page(img: RgbImage) -> Page {
        Page::new(1, "page_1.png", Raster::Rgb(img))
    }

    fn rgb_of(page: &Page) -> &RgbImage {
        match page.raster() {
            Raster::Rgb(img) => img,
            Raster::Gray(_) => panic!("expected colour raster"),
        }
    }

    #[test]
    fn light_block_becomes_white_and_rest_is_untouched() {
        let mut img = RgbImage::from_pixel(40, 30, Rgb([0, 0, 0]));
        for y in 10..20 {
            for x in 5..15 {
                img.put_pixel(x, y, Rgb([200, 200, 200]));
            }
        }
        let page = rgb_page(img);
        let (out, stats) = WatermarkSuppressor::standard().suppress_with_stats(&page);
        let out_img = rgb_of(&out);

        assert_eq!(out_img.dimensions(), (40, 30));
        for (x, y, px) in out_img.enumerate_pixels() {
            let inside = (5..15).contains(&x) && (10..20).contains(&y);
            let expected = if inside { [255, 255, 255] } else { [0, 0, 0] };
            assert_eq!(px.0, expected, "pixel ({x}, {y})");
        }
        assert_eq!(stats.matched, 100);
        assert_eq!(stats.changed, 100);
    }

    #[test]
    fn suppression_is_idempotent() {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
        });
        let suppressor = WatermarkSuppressor::standard();
        let once = suppressor.suppress(&rgb_page(img));
        let (twice, stats) = suppressor.suppress_with_stats(&once);
        assert_eq!(once, twice);
        assert_eq!(stats.changed, 0);
    }

    #[test]
    fn pixels_outside_range_are_never_changed() {
        let img = RgbImage::from_fn(32, 32, |x, y| {
            Rgb([(x * 8) as u8, 160, (y * 8) as u8])
        });
        let page = rgb_page(img.clone());
        let classifier = ChannelRangeClassifier::default();
        let out = WatermarkSuppressor::new(classifier).suppress(&page);

        for (before, after) in img.pixels().zip(rgb_of(&out).pixels()) {
            if classifier.is_watermark(before.0) {
                assert_eq!(after.0, [255, 255, 255]);
            } else {
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn boundaries_are_inclusive() {
        let classifier = ChannelRangeClassifier::default();
        assert!(classifier.is_watermark([150, 150, 150]));
        assert!(classifier.is_watermark([255, 255, 255]));
        assert!(!classifier.is_watermark([149, 200, 200]));
        assert!(!classifier.is_watermark([200, 200, 149]));
    }

    #[test]
    fn configured_range_is_honoured() {
        let suppressor = WatermarkSuppressor::from_config(WatermarkConfig {
            min: [100, 0, 0],
            max: [120, 255, 255],
        });
        let page = rgb_page(RgbImage::from_pixel(2, 1, Rgb([110, 5, 5])));
        assert_eq!(rgb_of(&suppressor.suppress(&page)).get_pixel(1, 0).0, [255; 3]);
    }

    #[test]
    fn grayscale_pages_are_classified_per_sample() {
        let mut gray = GrayImage::from_pixel(4, 4, Luma([30]));
        gray.put_pixel(2, 2, Luma([180]));
        let page = Page::new(1, "g.png", Raster::Gray(gray));
        let out = WatermarkSuppressor::standard().suppress(&page);
        let Raster::Gray(out) = out.raster() else {
            panic!("expected gray raster");
        };
        assert_eq!(out.get_pixel(2, 2).0[0], 255);
        assert_eq!(out.get_pixel(0, 0).0[0], 30);
    }

    #[test]
    fn input_page_is_not_aliased() {
        let page = rgb_page(RgbImage::from_pixel(3, 3, Rgb([200, 200, 200])));
        let _ = WatermarkSuppressor::standard().suppress(&page);
        assert_eq!(rgb_of(&page).get_pixel(0, 0).0, [200, 200, 200]);
    }
}
