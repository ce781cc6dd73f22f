// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contrast-limited adaptive histogram equalisation (CLAHE).
//
// The image is cut into a grid of tiles. Each tile gets an equalisation
// lookup table built from its clipped histogram, and every pixel is mapped
// through a bilinear blend of the tables of its four nearest tile centres.

use image::{GrayImage, Luma};

use super::reflect_101;

const BINS: usize = 256;

/// Equalise `image` over a `tiles.0 x tiles.1` (columns x rows) grid.
///
/// `clip_limit` is relative to the mean bin height: a tile's bins are
/// capped at `clip_limit * tile_area / 256` and the excess is spread back
/// over all bins.
pub fn equalize_clahe(image: &GrayImage, clip_limit: f32, tiles: (u32, u32)) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let (tiles_x, tiles_y) = (tiles.0.max(1) as usize, tiles.1.max(1) as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }

    // Grow the sampled area to a whole number of tiles when the image does
    // not divide evenly; the extra rows and columns mirror the border.
    let (ext_width, ext_height) = if width % tiles_x == 0 && height % tiles_y == 0 {
        (width, height)
    } else {
        (
            width + tiles_x - width % tiles_x,
            height + tiles_y - height % tiles_y,
        )
    };
    let tile_width = ext_width / tiles_x;
    let tile_height = ext_height / tiles_y;
    let tile_area = tile_width * tile_height;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f32 / BINS as f32) as usize).max(1)
    } else {
        usize::MAX
    };

    let mut luts = vec![[0u8; BINS]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = tile_histogram(image, tx * tile_width, ty * tile_height, tile_width, tile_height);
            clip_histogram(&mut hist, clip);
            luts[ty * tiles_x + tx] = cumulative_lut(&hist, tile_area);
        }
    }

    interpolate(image, &luts, (tiles_x, tiles_y), (tile_width, tile_height))
}

fn tile_histogram(image: &GrayImage, x0: usize, y0: usize, tile_width: usize, tile_height: usize) -> [usize; BINS] {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let raw = image.as_raw();
    let mut hist = [0usize; BINS];
    for y in y0..y0 + tile_height {
        let row = reflect_101(y as i64, height) * width as usize;
        for x in x0..x0 + tile_width {
            hist[raw[row + reflect_101(x as i64, width)] as usize] += 1;
        }
    }
    hist
}

/// Cap every bin at `clip` and hand the excess back evenly; the remainder
/// that does not divide evenly goes to bins spaced across the range.
fn clip_histogram(hist: &mut [usize; BINS], clip: usize) {
    let mut clipped = 0usize;
    for bin in hist.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }
    if clipped == 0 {
        return;
    }

    let batch = clipped / BINS;
    let mut residual = clipped - batch * BINS;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            i += step;
            residual -= 1;
        }
    }
}

fn cumulative_lut(hist: &[usize; BINS], tile_area: usize) -> [u8; BINS] {
    let scale = (BINS - 1) as f32 / tile_area as f32;
    let mut lut = [0u8; BINS];
    let mut sum = 0usize;
    for (slot, count) in lut.iter_mut().zip(hist.iter()) {
        sum += count;
        *slot = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Neighbouring tile indices and the weight of the second one, for one axis.
fn axis_weights(len: usize, tile: usize, tiles: usize) -> Vec<(usize, usize, f32)> {
    let inv = 1.0 / tile as f32;
    (0..len)
        .map(|p| {
            let pos = p as f32 * inv - 0.5;
            let lower = pos.floor();
            let frac = pos - lower;
            let lower = lower as i64;
            let first = lower.max(0) as usize;
            let second = ((lower + 1) as usize).min(tiles - 1);
            (first, second, frac)
        })
        .collect()
}

fn interpolate(
    image: &GrayImage,
    luts: &[[u8; BINS]],
    (tiles_x, tiles_y): (usize, usize),
    (tile_width, tile_height): (usize, usize),
) -> GrayImage {
    let columns = axis_weights(image.width() as usize, tile_width, tiles_x);
    let rows = axis_weights(image.height() as usize, tile_height, tiles_y);

    let mut out = GrayImage::new(image.width(), image.height());
    for (y, (ty1, ty2, ya)) in rows.iter().enumerate() {
        let upper = &luts[ty1 * tiles_x..(ty1 + 1) * tiles_x];
        let lower = &luts[ty2 * tiles_x..(ty2 + 1) * tiles_x];
        for (x, (tx1, tx2, xa)) in columns.iter().enumerate() {
            let v = image.get_pixel(x as u32, y as u32).0[0] as usize;
            let top = upper[*tx1][v] as f32 * (1.0 - xa) + upper[*tx2][v] as f32 * xa;
            let bottom = lower[*tx1][v] as f32 * (1.0 - xa) + lower[*tx2][v] as f32 * xa;
            let value = top * (1.0 - ya) + bottom * ya;
            out.put_pixel(x as u32, y as u32, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}
