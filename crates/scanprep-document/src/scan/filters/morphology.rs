// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grayscale morphology over imageproc masks built from a kernel shape.

use image::{GrayImage, Luma};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use scanprep_core::config::MAX_MORPH_SIZE;
use scanprep_core::types::KernelShape;

/// Structuring element of a given shape, anchored at its centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    size: u32,
    offsets: Vec<(i64, i64)>,
    mask: Mask,
}

impl StructuringElement {
    /// Build a `size x size` element of the given shape. Sizes are clamped
    /// to `1..=MAX_MORPH_SIZE`.
    ///
    /// An ellipse is rasterised row by row: row `dy` spans
    /// `round(c * sqrt(1 - dy^2 / r^2))` columns either side of the centre.
    /// At size 3 this is the four-neighbour cross.
    pub fn new(shape: KernelShape, size: u32) -> Self {
        let size = size.clamp(1, MAX_MORPH_SIZE);
        let centre = (size / 2) as i64;
        let mut offsets = Vec::new();
        for row in 0..size as i64 {
            let dy = row - centre;
            let (first, last) = match shape {
                KernelShape::Rect => (0, size as i64),
                KernelShape::Cross if dy == 0 => (0, size as i64),
                KernelShape::Cross => (centre, centre + 1),
                KernelShape::Ellipse => {
                    let r = centre as f64;
                    let span = if r == 0.0 {
                        0
                    } else {
                        let ratio = ((r * r - (dy * dy) as f64) / (r * r)).max(0.0);
                        (centre as f64 * ratio.sqrt()).round() as i64
                    };
                    ((centre - span).max(0), (centre + span + 1).min(size as i64))
                }
            };
            for col in first..last {
                offsets.push((col - centre, dy));
            }
        }

        let mut stencil = GrayImage::new(size, size);
        for (dx, dy) in &offsets {
            stencil.put_pixel((dx + centre) as u32, (dy + centre) as u32, Luma([u8::MAX]));
        }
        // MAX_MORPH_SIZE keeps the centre within u8.
        let anchor = centre as u8;
        let mask = Mask::from_image(&stencil, anchor, anchor);

        Self {
            size,
            offsets,
            mask,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Offsets `(dx, dy)` covered by the element, row by row.
    pub fn offsets(&self) -> &[(i64, i64)] {
        &self.offsets
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }
}

/// Dilate `iterations` times: each pixel takes the maximum over the element.
/// Offsets falling outside the image are ignored.
pub fn dilate(image: &GrayImage, element: &StructuringElement, iterations: u32) -> GrayImage {
    (0..iterations).fold(image.clone(), |img, _| grayscale_dilate(&img, element.mask()))
}

/// Erode `iterations` times: each pixel takes the minimum over the element.
/// Offsets falling outside the image are ignored.
pub fn erode(image: &GrayImage, element: &StructuringElement, iterations: u32) -> GrayImage {
    (0..iterations).fold(image.clone(), |img, _| grayscale_erode(&img, element.mask()))
}

/// Morphological closing: `iterations` dilations followed by as many
/// erosions. Fills gaps and holes narrower than the element.
pub fn close(image: &GrayImage, element: &StructuringElement, iterations: u32) -> GrayImage {
    erode(&dilate(image, element, iterations), element, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut offsets: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
        offsets.sort();
        offsets
    }

    #[test]
    fn size_three_ellipse_is_a_cross() {
        let ellipse = StructuringElement::new(KernelShape::Ellipse, 3);
        let cross = StructuringElement::new(KernelShape::Cross, 3);
        assert_eq!(
            sorted(ellipse.offsets().to_vec()),
            sorted(cross.offsets().to_vec())
        );
        assert_eq!(ellipse.offsets().len(), 5);
        assert_eq!(StructuringElement::new(KernelShape::Rect, 3).offsets().len(), 9);
    }

    #[test]
    fn masks_match_imageproc_builtins() {
        assert_eq!(
            StructuringElement::new(KernelShape::Ellipse, 3).mask(),
            &Mask::diamond(1)
        );
        assert_eq!(
            StructuringElement::new(KernelShape::Rect, 5).mask(),
            &Mask::square(2)
        );
    }

    #[test]
    fn larger_ellipse_is_rounder_than_rect() {
        let ellipse = StructuringElement::new(KernelShape::Ellipse, 5);
        assert!(ellipse.offsets().len() < 25);
        assert!(ellipse.offsets().contains(&(0, -2)));
        assert!(!ellipse.offsets().contains(&(-2, -2)));
    }

    #[test]
    fn oversized_element_is_clamped() {
        let element = StructuringElement::new(KernelShape::Cross, 4_001);
        assert_eq!(element.size(), MAX_MORPH_SIZE);
    }

    #[test]
    fn dilate_grows_a_point_into_the_element() {
        let mut img = GrayImage::new(5, 5);
        img.put_pixel(2, 2, Luma([255]));
        let element = StructuringElement::new(KernelShape::Cross, 3);
        let out = dilate(&img, &element, 1);
        let lit: usize = out.iter().filter(|v| **v == 255).count();
        assert_eq!(lit, 5);
        assert_eq!(out.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn close_fills_a_one_pixel_gap_in_a_stroke() {
        let mut img = GrayImage::new(9, 5);
        for y in 1..=3 {
            for x in (0..9).filter(|x| *x != 4) {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let element = StructuringElement::new(KernelShape::Cross, 3);
        let out = close(&img, &element, 1);
        assert_eq!(out.get_pixel(4, 2).0[0], 255);
        assert_eq!(out.get_pixel(4, 0).0[0], 0);
    }

    #[test]
    fn erode_ignores_outside_pixels() {
        let img = GrayImage::from_pixel(4, 4, Luma([200]));
        let element = StructuringElement::new(KernelShape::Rect, 3);
        assert_eq!(erode(&img, &element, 2), img);
    }

    #[test]
    fn zero_iterations_return_the_input() {
        let img = GrayImage::from_fn(6, 4, |x, y| Luma([(x * 30 + y * 7) as u8]));
        let element = StructuringElement::new(KernelShape::Ellipse, 3);
        assert_eq!(dilate(&img, &element, 0), img);
        assert_eq!(close(&img, &element, 0), img);
    }
}
