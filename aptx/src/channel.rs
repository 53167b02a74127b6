// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-channel codec state: one QMF analysis/synthesis tree, and four
//! subbands' worth of quantizer, inverse-quantizer, and predictor state.

use aptx_core::fixed::clip_intp2;

use crate::dither;
use crate::invert_quantize::InvertQuantize;
use crate::prediction::{self, Prediction};
use crate::qmf::QmfAnalysis;
use crate::quantize::Quantize;
use crate::tables::SubbandTables;

/// All per-channel codec state: the QMF tree plus four subbands' worth of
/// quantizer / inverse-quantizer / predictor records, the dither history
/// register, and the current packet's parity bit.
#[derive(Clone)]
pub(crate) struct Channel {
    pub(crate) codeword_history: i32,
    pub(crate) dither_parity: i32,
    pub(crate) dither: [i32; 4],
    pub(crate) qmf: QmfAnalysis,
    pub(crate) quantize: [Quantize; 4],
    pub(crate) invert_quantize: [InvertQuantize; 4],
    pub(crate) prediction: [Prediction; 4],
}

impl Channel {
    pub(crate) fn new() -> Self {
        Channel {
            codeword_history: 0,
            dither_parity: 0,
            dither: [0; 4],
            qmf: QmfAnalysis::new(),
            quantize: [Quantize::new(); 4],
            invert_quantize: [InvertQuantize::new(); 4],
            prediction: [Prediction::new(); 4],
        }
    }

    /// QMF-analyzes `samples`, regenerates dither from the previous
    /// packet's quantized samples, and quantizes each subband's difference
    /// from its predicted sample. Leaves `quantize` holding this packet's
    /// candidate quantized samples (before any parity fix-up).
    pub(crate) fn encode(&mut self, samples: [i32; 4], tables: &[SubbandTables; 4]) {
        let subband_samples = self.qmf.analyze(samples);

        let previous = [
            self.quantize[0].quantized_sample,
            self.quantize[1].quantized_sample,
            self.quantize[2].quantized_sample,
            self.quantize[3].quantized_sample,
        ];
        let d = dither::generate(&mut self.codeword_history, previous);
        self.dither = d.subbands;
        self.dither_parity = d.parity;

        for subband in 0..4 {
            let diff = clip_intp2(subband_samples[subband].wrapping_sub(self.prediction[subband].predicted_sample()), 23);
            self.quantize[subband].quantize_difference(
                diff,
                self.dither[subband],
                self.invert_quantize[subband].quantization_factor,
                &tables[subband],
            );
        }
    }

    /// Runs inverse quantization and predictor adaptation for every
    /// subband from the (possibly parity-adjusted) `quantize` values.
    pub(crate) fn invert_quantize_and_prediction(&mut self, tables: &[SubbandTables; 4]) {
        for subband in 0..4 {
            prediction::process_subband(
                &mut self.invert_quantize[subband],
                &mut self.prediction[subband],
                self.quantize[subband].quantized_sample,
                self.dither[subband],
                &tables[subband],
            );
        }
    }

    /// Regenerates dither from the previous packet's quantized samples,
    /// ahead of unpacking this packet's codeword (decoder side).
    pub(crate) fn generate_dither(&mut self) {
        let previous = [
            self.quantize[0].quantized_sample,
            self.quantize[1].quantized_sample,
            self.quantize[2].quantized_sample,
            self.quantize[3].quantized_sample,
        ];
        let d = dither::generate(&mut self.codeword_history, previous);
        self.dither = d.subbands;
        self.dither_parity = d.parity;
    }

    /// QMF-synthesizes 4 PCM samples from each subband predictor's most
    /// recently reconstructed sample.
    pub(crate) fn decode_samples(&mut self) -> [i32; 4] {
        let subband_samples = [
            self.prediction[0].previous_reconstructed_sample(),
            self.prediction[1].previous_reconstructed_sample(),
            self.prediction[2].previous_reconstructed_sample(),
            self.prediction[3].previous_reconstructed_sample(),
        ];
        self.qmf.synthesize(subband_samples)
    }
}
