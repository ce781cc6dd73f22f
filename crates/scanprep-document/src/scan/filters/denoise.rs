// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Non-local means denoising for single-channel images.
//
// Each output pixel is a weighted mean of the pixels in its search window,
// weighted by how similar the patch around each candidate is to the patch
// around the pixel itself. Patch distances for one search offset are read
// from a summed-area table of squared differences, so the cost per offset
// is independent of the patch size.

use image::GrayImage;

use super::{box_sum, fill_integral, reflect_101};

/// Largest mean squared patch distance (`255^2`).
const MAX_DISTANCE: usize = 255 * 255;

/// Denoise `image` with filter strength `h`, a `template x template` patch
/// and a `search x search` window. Borders are mirrored (reflect-101).
pub fn denoise_nl_means(image: &GrayImage, h: f32, template: u32, search: u32) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }

    let template_radius = (template / 2) as usize;
    let search_radius = (search / 2) as usize;
    let pad = template_radius + search_radius;
    let padded_width = width + 2 * pad;
    let padded = pad_reflect(image, pad);

    // Region over which patch distances are needed: the image grown by the
    // patch radius.
    let region_width = width + 2 * template_radius;
    let region_height = height + 2 * template_radius;
    let stride = region_width + 1;
    let mut table = vec![0u64; stride * (region_height + 1)];

    let patch = template_radius * 2 + 1;
    let area = (patch * patch) as u64;
    let weights = weight_lut(h);

    let mut acc = vec![0f32; width * height];
    let mut weight_sum = vec![0f32; width * height];
    let sr = search_radius as i64;

    for dy in -sr..=sr {
        for dx in -sr..=sr {
            let shift_y = (sr + dy) as usize;
            let shift_x = (sr + dx) as usize;
            {
                let padded = &padded;
                let diffs = (0..region_height).flat_map(move |y| {
                    (0..region_width).map(move |x| {
                        let a = padded[(y + search_radius) * padded_width + x + search_radius] as i32;
                        let b = padded[(y + shift_y) * padded_width + x + shift_x] as i32;
                        ((a - b) * (a - b)) as u64
                    })
                });
                fill_integral(diffs, region_width, region_height, &mut table);
            }

            for y in 0..height {
                let neighbour_row = (y + template_radius + shift_y) * padded_width;
                for x in 0..width {
                    let ssd = box_sum(&table, stride, x, y, x + patch, y + patch);
                    let distance = ((ssd / area) as usize).min(MAX_DISTANCE);
                    let weight = weights[distance];
                    let neighbour = padded[neighbour_row + x + template_radius + shift_x];
                    let i = y * width + x;
                    acc[i] += weight * neighbour as f32;
                    weight_sum[i] += weight;
                }
            }
        }
    }

    let mut out = GrayImage::new(image.width(), image.height());
    for ((dst, a), w) in out.iter_mut().zip(&acc).zip(&weight_sum) {
        *dst = (a / w).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// `exp(-d / h^2)` for every possible mean squared patch distance `d`.
fn weight_lut(h: f32) -> Vec<f32> {
    let h2 = h * h;
    (0..=MAX_DISTANCE)
        .map(|d| (-(d as f32) / h2).exp())
        .collect()
}

fn pad_reflect(image: &GrayImage, pad: usize) -> Vec<u8> {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let pad = pad as i64;
    let raw = image.as_raw();
    let mut out = Vec::with_capacity(((width + 2 * pad) * (height + 2 * pad)) as usize);
    for y in -pad..height + pad {
        let row = reflect_101(y, height) * width as usize;
        for x in -pad..width + pad {
            out.push(raw[row + reflect_101(x, width)]);
        }
    }
    out
}
