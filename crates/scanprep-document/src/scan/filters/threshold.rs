// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive (local mean) binarisation.

use image::{GrayImage, Luma};

use super::{box_sum, integral_image, replicate};

/// Binarise against the local mean, inverted: a pixel becomes 255 (ink)
/// when it is darker than `mean - c` over its `block x block`
/// neighbourhood, and 0 otherwise.
///
/// The mean is taken over an edge-replicated border and rounded to an
/// integer before comparing.
pub fn adaptive_mean_threshold_inv(image: &GrayImage, block: u32, c: i32) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }
    let radius = (block / 2) as usize;
    let side = radius * 2 + 1;
    let area = (side * side) as u64;

    let padded_width = width + 2 * radius;
    let padded_height = height + 2 * radius;
    let raw = image.as_raw();
    let mut padded = Vec::with_capacity(padded_width * padded_height);
    for y in 0..padded_height {
        let row = replicate(y as i64 - radius as i64, height as i64) * width;
        for x in 0..padded_width {
            padded.push(raw[row + replicate(x as i64 - radius as i64, width as i64)]);
        }
    }
    let table = integral_image(&padded, padded_width, padded_height);
    let stride = padded_width + 1;

    let mut out = GrayImage::new(image.width(), image.height());
    for y in 0..height {
        for x in 0..width {
            let sum = box_sum(&table, stride, x, y, x + side, y + side);
            let mean = ((sum + area / 2) / area) as i32;
            let value = raw[y * width + x] as i32;
            let ink = value <= mean - c;
            out.put_pixel(x as u32, y as u32, Luma([if ink { 255 } else { 0 }]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_stroke_on_light_page_becomes_ink() {
        let mut img = GrayImage::from_pixel(30, 30, Luma([220]));
        for y in 5..25 {
            img.put_pixel(15, y, Luma([40]));
        }
        let out = adaptive_mean_threshold_inv(&img, 11, 8);
        assert_eq!(out.get_pixel(15, 15).0[0], 255);
        assert_eq!(out.get_pixel(3, 3).0[0], 0);
        assert_eq!(out.get_pixel(20, 15).0[0], 0);
    }

    #[test]
    fn output_is_binary() {
        let img = GrayImage::from_fn(25, 17, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
        let out = adaptive_mean_threshold_inv(&img, 43, 8);
        assert!(out.iter().all(|v| *v == 0 || *v == 255));
        assert_eq!(out.dimensions(), (25, 17));
    }

    #[test]
    fn flat_image_is_background() {
        let img = GrayImage::from_pixel(8, 8, Luma([10]));
        let out = adaptive_mean_threshold_inv(&img, 5, 8);
        assert!(out.iter().all(|v| *v == 0));
    }

    #[test]
    fn negative_constant_flags_flat_regions() {
        let img = GrayImage::from_pixel(8, 8, Luma([10]));
        let out = adaptive_mean_threshold_inv(&img, 5, -1);
        assert!(out.iter().all(|v| *v == 255));
    }
}
