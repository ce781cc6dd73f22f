// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grayscale filter kernels used by the text enhancement chain. Every filter
// takes a borrowed `GrayImage` and returns a new one of the same dimensions.

pub mod clahe;
pub mod denoise;
pub mod morphology;
pub mod threshold;
pub mod tone;

pub use clahe::equalize_clahe;
pub use denoise::denoise_nl_means;
pub use morphology::{StructuringElement, close, dilate, erode};
pub use threshold::adaptive_mean_threshold_inv;
pub use tone::{add_weighted, apply_lut, gamma_lut, invert, median_blur, unsharp_mask};

/// Map a possibly out-of-range coordinate back into `0..len` by mirroring
/// about the edge pixels without repeating them (`dcb|abcd|cba`).
pub(crate) fn reflect_101(mut index: i64, len: i64) -> usize {
    if len <= 1 {
        return 0;
    }
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * len - 2 - index;
        } else {
            return index as usize;
        }
    }
}

/// Clamp a coordinate into `0..len` (edge replication).
pub(crate) fn replicate(index: i64, len: i64) -> usize {
    index.clamp(0, len - 1) as usize
}

/// Summed-area table of `values` (row-major, `width` x `height`).
///
/// `table[y * (width+1) + x]` holds the sum of the rectangle `[0, x) x [0, y)`;
/// the table is `(width+1) x (height+1)` with a zero border.
pub(crate) fn integral_image<T: Copy + Into<u64>>(values: &[T], width: usize, height: usize) -> Vec<u64> {
    let stride = width + 1;
    let mut table = vec![0u64; stride * (height + 1)];
    fill_integral(values.iter().map(|v| (*v).into()), width, height, &mut table);
    table
}

/// Fill an existing summed-area table in place, reusing its allocation.
pub(crate) fn fill_integral(
    mut values: impl Iterator<Item = u64>,
    width: usize,
    height: usize,
    table: &mut [u64],
) {
    let stride = width + 1;
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += values.next().unwrap_or(0);
            table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
        }
    }
}

/// Sum of the rectangle `[x0, x1) x [y0, y1)` from a summed-area table.
#[inline]
pub(crate) fn box_sum(table: &[u64], stride: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
    table[y1 * stride + x1] + table[y0 * stride + x0] - table[y0 * stride + x1] - table[y1 * stride + x0]
}
