// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-stream `Context`: owns both channels' state and drives
//! `encode`/`decode`/`decode_sync` over caller-provided byte buffers.

use crate::channel::Channel;
use crate::packet;
use crate::sync;
use crate::Variant;

/// Startup/flush latency, in samples: the QMF tree and predictors need this
/// many samples of history before their output is meaningful.
const LATENCY_SAMPLES: usize = 90;
/// Latency expressed in whole 4-sample packets, rounded up: `(90+3)/4`.
const PREROLL_PACKETS: usize = (LATENCY_SAMPLES + 3) / 4;
/// Bytes of 24-bit stereo PCM produced/consumed by one 4-sample packet:
/// `4 samples * 2 channels * 3 bytes`.
const PCM_BLOCK_BYTES: usize = 3 * 2 * 4;

/// Result of [`Context::encode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeReport {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes written.
    pub written: usize,
}

/// Result of [`Context::encode_finish`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishReport {
    /// Output bytes written by this call.
    pub written: usize,
    /// `true` once the flush has fully drained and the context has been
    /// reset; `false` if the caller must call `encode_finish` again with
    /// more output space.
    pub complete: bool,
}

/// Result of [`Context::decode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeReport {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes written.
    pub written: usize,
    /// `false` if decoding stopped early because a packet failed the
    /// rolling parity check; `true` otherwise (including a clean stop on
    /// buffer exhaustion).
    pub parity_ok: bool,
}

/// Result of [`Context::decode_sync`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes written.
    pub written: usize,
    /// `true` if the stream is currently believed synchronized.
    pub synced: bool,
    /// Bytes dropped (discarded while rescanning for alignment) and
    /// reported back since the last call.
    pub dropped: usize,
}

/// One aptX/aptX-HD stream's full codec state.
///
/// A `Context` is not re-entrant: callers processing multiple streams
/// concurrently must create one `Context` per stream. Construction,
/// mutation, and the eventual drop of the `Box` are the only lifecycle
/// operations; there is no separate release call in Rust.
#[derive(Clone)]
pub struct Context {
    variant: Variant,
    channels: [Channel; 2],
    sync_idx: u8,
    encode_remaining: u8,
    decode_skip_leading: u8,
    decode_sync_packets: usize,
    decode_dropped: usize,
    decode_sync_buffer: [u8; 6],
    decode_sync_buffer_len: u8,
}

impl Context {
    /// Creates a freshly reset context for `variant`.
    pub fn new(variant: Variant) -> Box<Context> {
        let mut ctx = Context {
            variant,
            channels: [Channel::new(), Channel::new()],
            sync_idx: 0,
            encode_remaining: 0,
            decode_skip_leading: 0,
            decode_sync_packets: 0,
            decode_dropped: 0,
            decode_sync_buffer: [0; 6],
            decode_sync_buffer_len: 0,
        };
        ctx.reset();
        Box::new(ctx)
    }

    /// The variant (`Standard` or `Hd`) this context was constructed with.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Zeroes all mutable state: both channels' QMF/quantizer/predictor
    /// state, the parity schedule position, the startup/flush latency
    /// counters, and the `decode_sync` carry buffer and its bookkeeping.
    /// Does not change `variant`. `decode_sync` itself calls this internally
    /// on every resynchronization attempt, saving and restoring its own
    /// carry buffer and counters around the call (see
    /// `reset_decode_sync`) so a mid-stream resync does not lose bytes
    /// already buffered toward the next alignment attempt.
    pub fn reset(&mut self) {
        self.channels = [Channel::new(), Channel::new()];
        self.sync_idx = 0;
        self.encode_remaining = PREROLL_PACKETS as u8;
        self.decode_skip_leading = PREROLL_PACKETS as u8;
        self.decode_sync_packets = 0;
        self.decode_dropped = 0;
        self.decode_sync_buffer = [0; 6];
        self.decode_sync_buffer_len = 0;
    }

    /// Encodes as many complete 4-sample/2-channel packets as fit in both
    /// `input` (24 bytes per packet) and `output` (4 or 6 bytes per
    /// packet). Returns the bytes consumed and written; never fails.
    pub fn encode(&mut self, input: &[u8], output: &mut [u8]) -> EncodeReport {
        let sample_size = self.variant.sample_size();
        let mut ipos = 0;
        let mut opos = 0;

        while ipos + PCM_BLOCK_BYTES <= input.len() && opos + sample_size <= output.len() {
            let mut samples = [[0i32; 4]; 2];
            for sample in 0..4 {
                for channel in 0..2 {
                    let b0 = input[ipos] as u32;
                    let b1 = (input[ipos + 1] as u32) << 8;
                    let b2 = (((input[ipos + 2] as i8) as i32) as u32) << 16;
                    samples[channel][sample] = (b0 | b1 | b2) as i32;
                    ipos += 3;
                }
            }
            self.encode_packet(samples, &mut output[opos..opos + sample_size]);
            opos += sample_size;
        }

        EncodeReport { consumed: ipos, written: opos }
    }

    /// Flushes the startup-latency padding (silence) so the decoder's
    /// 90-sample pre-roll window drains. May need several calls if
    /// `output` is small; returns `complete: true` once drained, at which
    /// point the context has been reset and is ready to encode a new
    /// stream.
    pub fn encode_finish(&mut self, output: &mut [u8]) -> FinishReport {
        let sample_size = self.variant.sample_size();

        if self.encode_remaining == 0 {
            return FinishReport { written: 0, complete: true };
        }

        let mut opos = 0;
        while self.encode_remaining > 0 && opos + sample_size <= output.len() {
            self.encode_packet([[0; 4]; 2], &mut output[opos..opos + sample_size]);
            self.encode_remaining -= 1;
            opos += sample_size;
        }

        if self.encode_remaining > 0 {
            return FinishReport { written: opos, complete: false };
        }

        self.reset();
        FinishReport { written: opos, complete: true }
    }

    /// Decodes as many packets as fit, stopping early (before consuming the
    /// failing packet) if a packet fails the rolling parity check.
    pub fn decode(&mut self, input: &[u8], output: &mut [u8]) -> DecodeReport {
        let sample_size = self.variant.sample_size();
        let mut ipos = 0;
        let mut opos = 0;
        let mut parity_ok = true;

        loop {
            if ipos + sample_size > input.len() {
                break;
            }

            // A packet still inside the pre-roll window (`decode_skip_leading
            // > 1` after this one) writes nothing; the transition packet
            // (`decode_skip_leading == 1`) writes the trailing
            // `LATENCY_SAMPLES % 4` samples; everything after writes a full
            // block. Figure out which case this iteration is before touching
            // any state, so a buffer that is too small leaves the packet
            // fully unconsumed rather than panicking mid-write.
            let required = match self.decode_skip_leading {
                0 => PCM_BLOCK_BYTES,
                1 => (4 - LATENCY_SAMPLES % 4) * 3 * 2,
                _ => 0,
            };
            if opos + required > output.len() {
                break;
            }

            let mut samples = [[0i32; 4]; 2];
            let mismatch = self.decode_packet(&input[ipos..ipos + sample_size], &mut samples);
            if mismatch {
                log::warn!("parity mismatch at sync slot {}, stopping decode", (self.sync_idx + 7) & 7);
                parity_ok = false;
                break;
            }

            let mut sample_start = 0;
            if self.decode_skip_leading > 0 {
                self.decode_skip_leading -= 1;
                if self.decode_skip_leading > 0 {
                    ipos += sample_size;
                    continue;
                }
                sample_start = LATENCY_SAMPLES % 4;
            }

            for sample in sample_start..4 {
                for channel in 0..2 {
                    let su = samples[channel][sample] as u32;
                    output[opos] = (su & 0xFF) as u8;
                    output[opos + 1] = ((su >> 8) & 0xFF) as u8;
                    output[opos + 2] = ((su >> 16) & 0xFF) as u8;
                    opos += 3;
                }
            }
            ipos += sample_size;
        }

        DecodeReport { consumed: ipos, written: opos, parity_ok }
    }

    /// Self-synchronizing decode: on a parity failure, resets state and
    /// rescans one byte at a time until alignment is recovered. Always
    /// consumes all of `input` (trailing bytes too short for a full packet
    /// are held in an internal carry buffer for the next call).
    pub fn decode_sync(&mut self, input: &[u8], output: &mut [u8]) -> SyncReport {
        let sample_size = self.variant.sample_size();
        let mut ipos = 0;
        let mut opos = 0;
        let mut synced = false;
        let mut dropped = 0;

        if self.decode_sync_buffer_len > 0
            && sample_size - 1 - self.decode_sync_buffer_len as usize <= input.len()
        {
            while (self.decode_sync_buffer_len as usize) < sample_size - 1 {
                self.decode_sync_buffer[self.decode_sync_buffer_len as usize] = input[ipos];
                self.decode_sync_buffer_len += 1;
                ipos += 1;
            }
        }

        while self.decode_sync_buffer_len as usize == sample_size - 1
            && ipos < sample_size
            && ipos < input.len()
            && (opos + PCM_BLOCK_BYTES <= output.len()
                || self.decode_skip_leading > 0
                || self.decode_dropped > 0)
        {
            self.decode_sync_buffer[sample_size - 1] = input[ipos];
            ipos += 1;

            let packet_buf = self.decode_sync_buffer;
            let report = self.decode(&packet_buf[..sample_size], &mut output[opos..]);
            opos += report.written;
            let processed_step = report.consumed;

            if self.decode_dropped > 0 && processed_step == sample_size {
                self.decode_dropped += processed_step;
                self.decode_sync_packets += 1;
                if self.decode_sync_packets >= PREROLL_PACKETS {
                    dropped += self.decode_dropped;
                    self.decode_dropped = 0;
                    self.decode_sync_packets = 0;
                }
            }

            if processed_step < sample_size {
                log::debug!("decode_sync: byte dropped while rescanning carry buffer");
                self.reset_decode_sync();
                synced = false;
                self.decode_dropped += 1;
                self.decode_sync_packets = 0;
                for i in 0..sample_size - 1 {
                    self.decode_sync_buffer[i] = self.decode_sync_buffer[i + 1];
                }
            }
            else {
                if self.decode_dropped == 0 {
                    synced = true;
                }
                self.decode_sync_buffer_len = 0;
            }
        }

        if self.decode_sync_buffer_len as usize == sample_size - 1 && ipos == sample_size {
            ipos = 0;
            self.decode_sync_buffer_len = 0;
        }

        while ipos + sample_size <= input.len()
            && (opos + PCM_BLOCK_BYTES <= output.len()
                || self.decode_skip_leading > 0
                || self.decode_dropped > 0)
        {
            let mut input_size_step =
                ((output.len() - opos) / PCM_BLOCK_BYTES + self.decode_skip_leading as usize) * sample_size;
            let available_step = ((input.len() - ipos) / sample_size) * sample_size;
            if input_size_step > available_step {
                input_size_step = available_step;
            }
            if self.decode_dropped > 0 {
                let remaining_preroll = PREROLL_PACKETS.saturating_sub(self.decode_sync_packets);
                if input_size_step > remaining_preroll * sample_size {
                    input_size_step = remaining_preroll * sample_size;
                }
            }

            let report = self.decode(&input[ipos..ipos + input_size_step], &mut output[opos..]);
            let processed_step = report.consumed;
            ipos += processed_step;
            opos += report.written;

            if self.decode_dropped > 0 && processed_step / sample_size > 0 {
                self.decode_dropped += processed_step;
                self.decode_sync_packets += processed_step / sample_size;
                if self.decode_sync_packets >= PREROLL_PACKETS {
                    dropped += self.decode_dropped;
                    self.decode_dropped = 0;
                    self.decode_sync_packets = 0;
                }
            }

            if processed_step < input_size_step {
                log::debug!("decode_sync: entering unsynchronized state, byte dropped at offset {ipos}");
                self.reset_decode_sync();
                synced = false;
                ipos += 1;
                self.decode_dropped += 1;
                self.decode_sync_packets = 0;
            }
            else if self.decode_dropped == 0 {
                synced = true;
            }
        }

        if dropped > 0 {
            log::debug!("decode_sync: resynchronized, reporting {dropped} dropped bytes");
        }

        if ipos + sample_size > input.len() {
            while ipos < input.len() {
                self.decode_sync_buffer[self.decode_sync_buffer_len as usize] = input[ipos];
                self.decode_sync_buffer_len += 1;
                ipos += 1;
            }
        }

        SyncReport { consumed: ipos, written: opos, synced, dropped }
    }

    /// Ends a `decode_sync` session: whatever is still held in the carry
    /// buffer counts as final dropped bytes, and the context is reset.
    pub fn decode_sync_finish(&mut self) -> usize {
        let dropped = self.decode_sync_buffer_len as usize;
        self.reset();
        dropped
    }

    fn encode_packet(&mut self, samples: [[i32; 4]; 2], output: &mut [u8]) {
        let tables = self.variant.tables();

        for channel in 0..2 {
            self.channels[channel].encode(samples[channel], tables);
        }

        sync::insert_sync(&mut self.channels, &mut self.sync_idx);

        let per_channel = output.len() / 2;
        for channel in 0..2 {
            self.channels[channel].invert_quantize_and_prediction(tables);
            packet::pack_codeword(
                &self.channels[channel],
                self.variant,
                &mut output[channel * per_channel..(channel + 1) * per_channel],
            );
        }
    }

    /// Returns `true` on parity mismatch (the packet should not be
    /// considered consumed by the caller).
    fn decode_packet(&mut self, input: &[u8], samples: &mut [[i32; 4]; 2]) -> bool {
        let tables = self.variant.tables();
        let per_channel = input.len() / 2;

        for channel in 0..2 {
            self.channels[channel].generate_dither();
            packet::unpack_codeword(
                &mut self.channels[channel],
                self.variant,
                &input[channel * per_channel..(channel + 1) * per_channel],
            );
            self.channels[channel].invert_quantize_and_prediction(tables);
        }

        let mismatch = sync::check_parity(&self.channels, &mut self.sync_idx);

        for channel in 0..2 {
            samples[channel] = self.channels[channel].decode_samples();
        }

        mismatch
    }

    /// Resets codec state while preserving `decode_sync`'s own bookkeeping
    /// (carry buffer, dropped-byte/resync-packet counters), mirroring the
    /// reference's `aptx_reset_decode_sync`.
    fn reset_decode_sync(&mut self) {
        let dropped = self.decode_dropped;
        let sync_packets = self.decode_sync_packets;
        let buffer = self.decode_sync_buffer;
        let buffer_len = self.decode_sync_buffer_len;

        self.reset();

        self.decode_sync_buffer = buffer;
        self.decode_sync_buffer_len = buffer_len;
        self.decode_sync_packets = sync_packets;
        self.decode_dropped = dropped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variant;

    #[test]
    fn fresh_encoder_emits_the_standard_stream_start_signature() {
        let mut ctx = Context::new(Variant::Standard);
        let input = [0u8; 24];
        let mut output = [0u8; 4];
        let report = ctx.encode(&input, &mut output);
        assert_eq!(report, EncodeReport { consumed: 24, written: 4 });
        assert_eq!(output, [0x4b, 0xbf, 0x4b, 0xbf]);
    }

    #[test]
    fn fresh_encoder_emits_the_hd_stream_start_signature() {
        let mut ctx = Context::new(Variant::Hd);
        let input = [0u8; 24];
        let mut output = [0u8; 6];
        let report = ctx.encode(&input, &mut output);
        assert_eq!(report, EncodeReport { consumed: 24, written: 6 });
        assert_eq!(output, [0x73, 0xbe, 0xff, 0x73, 0xbe, 0xff]);
    }

    #[test]
    fn reset_then_same_input_is_deterministic() {
        let mut ctx = Context::new(Variant::Standard);
        let input = [7u8; 24 * 8];
        let mut out_a = [0u8; 4 * 8];
        ctx.encode(&input, &mut out_a);
        ctx.reset();
        let mut out_b = [0u8; 4 * 8];
        ctx.encode(&input, &mut out_b);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn encode_finish_flushes_exactly_the_preroll_window() {
        let mut ctx = Context::new(Variant::Standard);
        let mut total = 0;
        loop {
            let mut out = [0u8; 1];
            let report = ctx.encode_finish(&mut out);
            total += report.written;
            if report.complete {
                break;
            }
        }
        assert_eq!(total, PREROLL_PACKETS * 4);
    }
}
