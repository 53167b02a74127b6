// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Backward-adaptive dither generation.
//!
//! Both encoder and decoder derive the same per-subband dither values from
//! a rolling history of recently quantized codewords, so no dither seed
//! ever needs to travel in the bitstream.

/// The four per-subband dither values plus the parity bit derived from the
/// same generator step.
pub struct Dither {
    pub subbands: [i32; 4],
    pub parity: i32,
}

fn update_codeword_history(history: i32, quantized: [i32; 4]) -> i32 {
    let cw = ((quantized[0] & 3) << 0) + ((quantized[1] & 2) << 1) + ((quantized[2] & 1) << 3);
    cw.wrapping_shl(8).wrapping_add((history as u32).wrapping_shl(4) as i32)
}

/// Advances `history` with the most recently quantized samples of subbands
/// 0-2, then derives this step's dither and parity bit from it.
pub fn generate(history: &mut i32, quantized: [i32; 4]) -> Dither {
    *history = update_codeword_history(*history, quantized);

    let m = 5184443i64 * ((*history >> 7) as i64);
    let d = (m.wrapping_mul(4).wrapping_add(m >> 22)) as i32;

    let mut subbands = [0i32; 4];
    for (subband, out) in subbands.iter_mut().enumerate() {
        *out = (d as u32).wrapping_shl(23 - 5 * subband as u32) as i32;
    }

    Dither { subbands, parity: (d >> 25) & 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_deterministic_for_a_given_seed() {
        let mut history_a = 0;
        let mut history_b = 0;
        for q in [[1, -1, 0, 2], [0, 0, 0, 0], [-5, 3, 1, -1]] {
            let a = generate(&mut history_a, q);
            let b = generate(&mut history_b, q);
            assert_eq!(a.subbands, b.subbands);
            assert_eq!(a.parity, b.parity);
        }
    }

    #[test]
    fn parity_is_a_single_bit() {
        let mut history = 12345;
        let d = generate(&mut history, [1, 2, 3, 4]);
        assert!(d.parity == 0 || d.parity == 1);
    }
}
