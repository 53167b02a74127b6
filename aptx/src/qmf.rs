// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two-stage QMF analysis/synthesis tree that splits each channel's PCM
//! stream into four subbands (and joins them back on decode).

use aptx_core::fixed::{clip_intp2, rshift64_clip24};

use crate::tables::{QMF_INNER_COEFFS, QMF_OUTER_COEFFS};

const FILTER_TAPS: usize = 16;

/// A single polyphase FIR filter's circular sample history.
///
/// The buffer is doubled (`2 * FILTER_TAPS`) so a tap-length convolution
/// window starting at `pos` never needs to wrap around.
#[derive(Clone)]
struct FilterSignal {
    buffer: [i32; 2 * FILTER_TAPS],
    pos: usize,
}

impl FilterSignal {
    fn new() -> Self {
        FilterSignal { buffer: [0; 2 * FILTER_TAPS], pos: 0 }
    }

    fn push(&mut self, sample: i32) {
        self.buffer[self.pos] = sample;
        self.buffer[self.pos + FILTER_TAPS] = sample;
        self.pos = (self.pos + 1) & (FILTER_TAPS - 1);
    }

    /// Convolves the current window with `coeffs`, reducing to 24 bits via
    /// the supplied right shift.
    fn convolve(&self, coeffs: &[i32; FILTER_TAPS], shift: u32) -> i32 {
        let window = &self.buffer[self.pos..self.pos + FILTER_TAPS];
        let mut acc: i64 = 0;
        for i in 0..FILTER_TAPS {
            acc += window[i] as i64 * coeffs[i] as i64;
        }
        rshift64_clip24(acc, shift)
    }
}

fn polyphase_analysis(
    signal: &mut [FilterSignal; 2],
    coeffs: &[[i32; FILTER_TAPS]; 2],
    shift: u32,
    samples: [i32; 2],
) -> (i32, i32) {
    let mut subbands = [0i32; 2];
    for i in 0..2 {
        signal[i].push(samples[1 - i]);
        subbands[i] = signal[i].convolve(&coeffs[i], shift);
    }
    (clip_intp2(subbands[0] + subbands[1], 23), clip_intp2(subbands[0] - subbands[1], 23))
}

fn polyphase_synthesis(
    signal: &mut [FilterSignal; 2],
    coeffs: &[[i32; FILTER_TAPS]; 2],
    shift: u32,
    low: i32,
    high: i32,
) -> (i32, i32) {
    let subbands = [low + high, low - high];
    let mut samples = [0i32; 2];
    for i in 0..2 {
        signal[i].push(subbands[1 - i]);
        samples[i] = signal[i].convolve(&coeffs[i], shift);
    }
    (samples[0], samples[1])
}

/// Per-channel QMF filter-bank state: one outer stage shared by both halves
/// of the tree, and two inner stages (one per outer output).
#[derive(Clone)]
pub struct QmfAnalysis {
    outer: [FilterSignal; 2],
    inner: [[FilterSignal; 2]; 2],
}

impl QmfAnalysis {
    pub fn new() -> Self {
        QmfAnalysis {
            outer: [FilterSignal::new(), FilterSignal::new()],
            inner: [[FilterSignal::new(), FilterSignal::new()], [FilterSignal::new(), FilterSignal::new()]],
        }
    }

    /// Splits 4 consecutive PCM samples into one sample of each of the 4
    /// subbands (LF, MLF, MHF, HF), downsampling by 4.
    pub fn analyze(&mut self, samples: [i32; 4]) -> [i32; 4] {
        let mut intermediate = [0i32; 4];
        for i in 0..2 {
            let (low, high) =
                polyphase_analysis(&mut self.outer, &QMF_OUTER_COEFFS, 23, [samples[2 * i], samples[2 * i + 1]]);
            intermediate[i] = low;
            intermediate[2 + i] = high;
        }

        let mut subband_samples = [0i32; 4];
        for i in 0..2 {
            let (low, high) = polyphase_analysis(
                &mut self.inner[i],
                &QMF_INNER_COEFFS,
                23,
                [intermediate[2 * i], intermediate[2 * i + 1]],
            );
            subband_samples[2 * i] = low;
            subband_samples[2 * i + 1] = high;
        }
        subband_samples
    }

    /// Joins one sample of each of the 4 subbands back into 4 consecutive
    /// PCM samples, upsampling by 4.
    pub fn synthesize(&mut self, subband_samples: [i32; 4]) -> [i32; 4] {
        let mut intermediate = [0i32; 4];
        for i in 0..2 {
            let (a, b) = polyphase_synthesis(
                &mut self.inner[i],
                &QMF_INNER_COEFFS,
                22,
                subband_samples[2 * i],
                subband_samples[2 * i + 1],
            );
            intermediate[2 * i] = a;
            intermediate[2 * i + 1] = b;
        }

        let mut samples = [0i32; 4];
        for i in 0..2 {
            let (a, b) =
                polyphase_synthesis(&mut self.outer, &QMF_OUTER_COEFFS, 21, intermediate[i], intermediate[2 + i]);
            samples[2 * i] = a;
            samples[2 * i + 1] = b;
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_round_trips_through_the_tree() {
        let mut analysis = QmfAnalysis::new();
        let mut synthesis = QmfAnalysis::new();
        for _ in 0..64 {
            let subbands = analysis.analyze([0, 0, 0, 0]);
            let samples = synthesis.synthesize(subbands);
            assert_eq!(samples, [0, 0, 0, 0]);
        }
    }

    #[test]
    fn analysis_output_stays_in_24_bit_range() {
        let mut analysis = QmfAnalysis::new();
        for k in 0..256 {
            let s = ((k * 104729) % (1 << 24)) - (1 << 23);
            let subbands = analysis.analyze([s, -s, s / 2, -s / 2]);
            for v in subbands {
                assert!((-(1 << 23)..(1 << 23)).contains(&v));
            }
        }
    }
}
