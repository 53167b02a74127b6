// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forward quantization of a subband's predicted-sample error, encoder side.

use aptx_core::fixed::{clip_intp2, rshift32_clip24, rshift64, rshift64_clip24};

use crate::tables::SubbandTables;

/// One subband's quantizer output for the current sample.
#[derive(Clone, Copy, Default)]
pub(crate) struct Quantize {
    pub(crate) quantized_sample: i32,
    pub(crate) quantized_sample_parity_change: i32,
    pub(crate) error: i32,
}

impl Quantize {
    pub(crate) fn new() -> Self {
        Quantize::default()
    }

    /// Quantizes `sample_difference` (the subband sample minus its
    /// predicted value), recording both the chosen interval and the
    /// adjacent interval that would flip its parity.
    pub(crate) fn quantize_difference(
        &mut self,
        sample_difference: i32,
        dither: i32,
        quantization_factor: i32,
        tables: &SubbandTables,
    ) {
        let intervals = tables.intervals;

        let mut sample_difference_abs = sample_difference.abs();
        if sample_difference_abs > (1 << 23) - 1 {
            sample_difference_abs = (1 << 23) - 1;
        }

        let quantized_sample = bin_search(sample_difference_abs >> 4, quantization_factor, intervals);

        let mut d = rshift32_clip24((((dither as i64) * (dither as i64)) >> 32) as i32, 7) - (1 << 23);
        d = rshift64(d as i64 * tables.quantize_dither_factors[quantized_sample as usize] as i64, 23) as i32;

        let lo = intervals[quantized_sample as usize];
        let hi = intervals[quantized_sample as usize + 1];
        let mean = (hi + lo) / 2;
        let sign_mask = -(i32::from(sample_difference < 0)) | 1;
        let interval = (hi - lo).wrapping_mul(sign_mask);

        let dithered_sample = rshift64_clip24(
            dither as i64 * interval as i64 + ((clip_intp2(mean.wrapping_add(d), 23) as i64) << 32),
            32,
        );
        let error = ((sample_difference_abs as i64) << 20) - dithered_sample as i64 * quantization_factor as i64;
        self.error = rshift64(error, 23) as i32;
        if self.error < 0 {
            self.error = -self.error;
        }

        let mut quantized = quantized_sample;
        let mut parity_change = quantized_sample;
        if error < 0 {
            quantized -= 1;
        }
        else {
            parity_change -= 1;
        }

        let inv = -(i32::from(sample_difference < 0));
        self.quantized_sample = quantized ^ inv;
        self.quantized_sample_parity_change = parity_change ^ inv;
    }
}

/// Finds the largest interval index `idx` such that
/// `factor * intervals[idx] <= value << 24`, via binary search.
fn bin_search(value: i32, factor: i32, intervals: &[i32]) -> i32 {
    let mut idx: i32 = 0;
    let mut step = intervals.len() as i32 >> 1;
    while step > 0 {
        if factor as i64 * intervals[(idx + step) as usize] as i64 <= (value as i64) << 24 {
            idx += step;
        }
        step >>= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::STANDARD;

    #[test]
    fn zero_difference_quantizes_to_the_middle_interval() {
        let mut q = Quantize::new();
        q.quantize_difference(0, 0, 2048 << 11, &STANDARD[0]);
        assert!(q.quantized_sample == 0 || q.quantized_sample == -1);
    }

    #[test]
    fn error_is_never_negative() {
        let mut q = Quantize::new();
        for diff in [-500_000, -1, 1, 500_000, (1 << 23) - 1, -(1 << 23)] {
            q.quantize_difference(diff, 777, 2048 << 11, &STANDARD[0]);
            assert!(q.error >= 0);
        }
    }
}
