// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Point operations and the small neighbourhood filters imageproc already
// provides (Gaussian blur, median).

use image::{GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};

/// Lookup table for `v -> ((v / 255) ^ (1 / gamma)) * 255`, truncated.
///
/// A gamma below 1 darkens mid-tones, which thickens faint strokes.
pub fn gamma_lut(gamma: f64) -> [u8; 256] {
    let exponent = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let mapped = (value as f64 / 255.0).powf(exponent) * 255.0;
        *slot = mapped.clamp(0.0, 255.0) as u8;
    }
    lut
}

pub fn apply_lut(image: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let mut out = image.clone();
    for px in out.iter_mut() {
        *px = lut[*px as usize];
    }
    out
}

/// `alpha * a + beta * b + gamma`, rounded and saturated to `u8`.
pub fn add_weighted(a: &GrayImage, alpha: f32, b: &GrayImage, beta: f32, gamma: f32) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for ((dst, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        let value = alpha * pa.0[0] as f32 + beta * pb.0[0] as f32 + gamma;
        *dst = Luma([saturate(value)]);
    }
    out
}

/// Unsharp mask: weighted difference of the image and its Gaussian blur.
pub fn unsharp_mask(image: &GrayImage, sigma: f32, weights: (f32, f32, f32)) -> GrayImage {
    let blurred = gaussian_blur_f32(image, sigma);
    add_weighted(image, weights.0, &blurred, weights.1, weights.2)
}

/// Median over a `kernel x kernel` window.
pub fn median_blur(image: &GrayImage, kernel: u32) -> GrayImage {
    let radius = kernel / 2;
    if radius == 0 {
        return image.clone();
    }
    median_filter(image, radius, radius)
}

pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    for px in out.iter_mut() {
        *px = u8::MAX - *px;
    }
    out
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
