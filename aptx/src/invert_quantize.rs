// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inverse quantization: reconstructs a subband difference from a quantized
//! sample and advances the backward-adaptive quantization factor.

use aptx_core::fixed::{clip, rshift32, rshift64_clip24};

use crate::tables::{SubbandTables, QUANTIZATION_FACTORS};

/// Per-subband inverse-quantizer state: the adaptive gain (`factor_select` /
/// `quantization_factor`) and the most recently reconstructed difference.
#[derive(Clone, Copy, Default)]
pub(crate) struct InvertQuantize {
    pub(crate) quantization_factor: i32,
    pub(crate) factor_select: i32,
    pub(crate) reconstructed_difference: i32,
}

impl InvertQuantize {
    pub(crate) fn new() -> Self {
        InvertQuantize::default()
    }

    /// Reconstructs `reconstructed_difference` from `quantized_sample`, then
    /// updates `factor_select`/`quantization_factor` for the next sample.
    pub(crate) fn invert_quantization(
        &mut self,
        quantized_sample: i32,
        dither: i32,
        tables: &SubbandTables,
    ) {
        let idx = (quantized_sample ^ -i32::from(quantized_sample < 0)) + 1;

        let mut qr = tables.intervals[idx as usize] / 2;
        if quantized_sample < 0 {
            qr = -qr;
        }

        let qr = rshift64_clip24(
            ((qr as i64) << 32) + dither as i64 * tables.invert_dither_factors[idx as usize] as i64,
            32,
        );
        self.reconstructed_difference = ((self.quantization_factor as i64 * qr as i64) >> 19) as i32;

        let factor_select = 32620 * self.factor_select;
        let factor_select =
            rshift32(factor_select + tables.factor_select_offset[idx as usize] as i32 * (1 << 15), 15);
        self.factor_select = clip(factor_select, 0, tables.factor_max);

        let idx = (self.factor_select & 0xFF) >> 3;
        let shift = (tables.factor_max - self.factor_select) >> 8;
        self.quantization_factor = ((QUANTIZATION_FACTORS[idx as usize] as i32) << 11) >> shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::STANDARD;

    #[test]
    fn factor_select_stays_in_range_over_many_updates() {
        let tables = &STANDARD[0];
        let mut iq = InvertQuantize::new();
        iq.quantization_factor = (QUANTIZATION_FACTORS[0] as i32) << 11;
        for i in 0..10_000 {
            let q = ((i * 37) % 65) as i32 - 32;
            iq.invert_quantization(q.clamp(-32, 31), (i * 12345) as i32, tables);
            assert!(iq.factor_select >= 0 && iq.factor_select <= tables.factor_max);
        }
    }
}
