// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The backward-adaptive predictor: a two-tap sample predictor adapted by
//! sign correlation, plus an order-N differential predictor, combined to
//! produce each subband's next predicted sample.

use aptx_core::fixed::{clip, clip_intp2, diffsign, rshift32};

use crate::invert_quantize::InvertQuantize;
use crate::tables::SubbandTables;

/// Maximum predictor order across all subbands (the LF subband's order);
/// every subband's history is sized for this so the struct shape matches
/// the reference regardless of which subband it belongs to.
const MAX_ORDER: usize = 24;

/// Per-subband predictor state.
#[derive(Clone, Copy)]
pub(crate) struct Prediction {
    prev_sign: [i32; 2],
    s_weight: [i32; 2],
    d_weight: [i32; MAX_ORDER],
    pos: usize,
    /// Doubled ring of the last `order` reconstructed differences: the
    /// first half mirrors the second so a backward scan of up to `order`
    /// samples never wraps.
    reconstructed_differences: [i32; 2 * MAX_ORDER],
    previous_reconstructed_sample: i32,
    predicted_difference: i32,
    predicted_sample: i32,
}

impl Prediction {
    pub(crate) fn new() -> Self {
        Prediction {
            prev_sign: [1, 1],
            s_weight: [0, 0],
            d_weight: [0; MAX_ORDER],
            pos: 0,
            reconstructed_differences: [0; 2 * MAX_ORDER],
            previous_reconstructed_sample: 0,
            predicted_difference: 0,
            predicted_sample: 0,
        }
    }

    pub(crate) fn predicted_sample(&self) -> i32 {
        self.predicted_sample
    }

    pub(crate) fn previous_reconstructed_sample(&self) -> i32 {
        self.previous_reconstructed_sample
    }

    /// Advances the doubled difference ring by one sample and returns the
    /// index of the slot the new value was written to.
    fn push_reconstructed_difference(&mut self, order: usize, reconstructed_difference: i32) -> usize {
        let p = self.pos;
        self.reconstructed_differences[p] = self.reconstructed_differences[order + p];
        self.pos = (p + 1) % order;
        let new_p = self.pos;
        self.reconstructed_differences[order + new_p] = reconstructed_difference;
        order + new_p
    }

    /// Runs the order-N differential filter, producing the next
    /// `predicted_difference`/`predicted_sample` pair.
    fn filter(&mut self, reconstructed_difference: i32, order: usize) {
        let reconstructed_sample = clip_intp2(reconstructed_difference.wrapping_add(self.predicted_sample), 23);
        let predictor = clip_intp2(
            ((self.s_weight[0] as i64 * self.previous_reconstructed_sample as i64
                + self.s_weight[1] as i64 * reconstructed_sample as i64)
                >> 22) as i32,
            23,
        );
        self.previous_reconstructed_sample = reconstructed_sample;

        let base = self.push_reconstructed_difference(order, reconstructed_difference);
        let srd0 = diffsign(reconstructed_difference, 0).wrapping_mul(1 << 23);
        let mut predicted_difference: i64 = 0;
        for i in 0..order {
            let srd = (self.reconstructed_differences[base - i - 1] >> 31) | 1;
            let d = self.d_weight[i];
            self.d_weight[i] = d.wrapping_sub(rshift32(d.wrapping_sub(srd.wrapping_mul(srd0)), 8));
            predicted_difference += self.reconstructed_differences[base - i] as i64 * self.d_weight[i] as i64;
        }

        self.predicted_difference = clip_intp2((predicted_difference >> 22) as i32, 23);
        self.predicted_sample = clip_intp2(predictor.wrapping_add(self.predicted_difference), 23);
    }

    /// Runs both coupled adaptations (sign-weight update, then the
    /// differential filter) for one reconstructed difference.
    fn adapt(&mut self, reconstructed_difference: i32, order: usize) {
        let sign = diffsign(reconstructed_difference, -self.predicted_difference);
        let same_sign = [sign.wrapping_mul(self.prev_sign[0]), sign.wrapping_mul(self.prev_sign[1])];
        self.prev_sign[0] = self.prev_sign[1];
        self.prev_sign[1] = sign | 1;

        let range = 0x100000;
        let sw1 = rshift32((-same_sign[1]).wrapping_mul(self.s_weight[1]), 1);
        let sw1 = (clip(sw1, -range, range) & !0xF).wrapping_mul(16);

        let range = 0x300000;
        let weight0 =
            254i32.wrapping_mul(self.s_weight[0]).wrapping_add(0x800000i32.wrapping_mul(same_sign[0])).wrapping_add(sw1);
        self.s_weight[0] = clip(rshift32(weight0, 8), -range, range);

        let range = 0x3C0000 - self.s_weight[0];
        let weight1 = 255i32.wrapping_mul(self.s_weight[1]).wrapping_add(0xC00000i32.wrapping_mul(same_sign[1]));
        self.s_weight[1] = clip(rshift32(weight1, 8), -range, range);

        self.filter(reconstructed_difference, order);
    }
}

/// Runs inverse quantization followed by the predictor adaptation for one
/// subband, mirroring `aptx_process_subband` in the reference: these two
/// steps are run identically by the encoder (to keep its predictor state in
/// lockstep with what the decoder will reconstruct) and the decoder.
pub(crate) fn process_subband(
    invert_quantize: &mut InvertQuantize,
    prediction: &mut Prediction,
    quantized_sample: i32,
    dither: i32,
    tables: &SubbandTables,
) {
    invert_quantize.invert_quantization(quantized_sample, dither, tables);
    prediction.adapt(invert_quantize.reconstructed_difference, tables.prediction_order);
}
