// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The parity-based inter-packet synchronization scheme: a rolling 1-in-8
//! schedule that the decoder can check to detect byte loss, enforced on
//! encode by perturbing whichever subband's quantized sample is cheapest to
//! flip.

use crate::channel::Channel;

/// XOR of `dither_parity` with the low bit of every subband's quantized
/// sample: the single parity bit this channel contributes to a packet.
pub(crate) fn quantized_parity(channel: &Channel) -> i32 {
    let mut parity = channel.dither_parity;
    for q in &channel.quantize {
        parity ^= q.quantized_sample;
    }
    parity & 1
}

/// Checks the combined parity of both channels against the rolling 1-in-8
/// schedule and advances `sync_idx`. Returns `true` on mismatch.
pub(crate) fn check_parity(channels: &[Channel; 2], sync_idx: &mut u8) -> bool {
    let parity = quantized_parity(&channels[0]) ^ quantized_parity(&channels[1]);
    let eighth = i32::from(*sync_idx == 7);

    *sync_idx = (*sync_idx + 1) & 7;
    (parity ^ eighth) != 0
}

/// Subband scan order used when hunting for the cheapest quantized sample
/// to perturb: {MLF, MHF, LF, HF}.
const SUBBAND_SCAN_ORDER: [usize; 4] = [1, 2, 0, 3];

/// If the current packet's parity does not meet the schedule, perturbs the
/// single subband (across both channels) with the smallest quantization
/// error so the schedule is restored. This is the unique fix-up policy: the
/// decoder can undo it transparently because it does not depend on *which*
/// subband was perturbed, only on the resulting parity.
pub(crate) fn insert_sync(channels: &mut [Channel; 2], sync_idx: &mut u8) {
    if !check_parity(channels, sync_idx) {
        return;
    }

    let mut best_channel = 1;
    let mut best_subband = SUBBAND_SCAN_ORDER[0];
    let mut best_error = channels[1].quantize[SUBBAND_SCAN_ORDER[0]].error;

    for channel in (0..2).rev() {
        for &subband in &SUBBAND_SCAN_ORDER {
            let error = channels[channel].quantize[subband].error;
            if error < best_error {
                best_error = error;
                best_channel = channel;
                best_subband = subband;
            }
        }
    }

    let q = &mut channels[best_channel].quantize[best_subband];
    q.quantized_sample = q.quantized_sample_parity_change;
}
