// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Black-box round-trip and resynchronization behavior, driven only through
//! the public `Context` API.

use aptx::{Context, Variant};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

const PREROLL_PACKETS: usize = 23;

/// Deterministic pseudo-random PCM byte stream for a given seed, so
/// round-trip tests exercise non-silent input without committing fixture
/// files to the repository.
fn lcg_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}

fn sign_extend_24(sample: u32) -> i32 {
    ((sample << 8) as i32) >> 8
}

#[test]
fn silent_stream_round_trips_near_zero_after_latency_drains() {
    let blocks = 512;
    let mut encoder = Context::new(Variant::Standard);

    let input = vec![0u8; blocks * 24];
    let mut encoded = vec![0u8; blocks * 4];
    let enc_report = encoder.encode(&input, &mut encoded);
    assert_eq!(enc_report.consumed, blocks * 24);
    assert_eq!(enc_report.written, blocks * 4);

    let mut flush = vec![0u8; PREROLL_PACKETS * 4];
    let finish_report = encoder.encode_finish(&mut flush);
    assert!(finish_report.complete);
    assert_eq!(finish_report.written, PREROLL_PACKETS * 4);

    let mut stream = encoded;
    stream.extend_from_slice(&flush[..finish_report.written]);
    assert_eq!(stream.len(), (blocks + PREROLL_PACKETS) * 4);

    let mut decoder = Context::new(Variant::Standard);
    let mut pcm_out = vec![0u8; stream.len() * 6];
    let dec_report = decoder.decode(&stream, &mut pcm_out);

    assert!(dec_report.parity_ok);
    assert_eq!(dec_report.consumed, stream.len());
    // 22 packets are fully absorbed by the pre-roll, the 23rd contributes
    // its trailing two samples, everything after is a full 4-sample block.
    let expected_timesteps = 2 + blocks * 4;
    assert_eq!(dec_report.written, expected_timesteps * 6);

    for chunk in pcm_out[..dec_report.written].chunks_exact(3) {
        let sample = (chunk[0] as u32) | ((chunk[1] as u32) << 8) | ((chunk[2] as u32) << 16);
        let signed = sign_extend_24(sample);
        assert!(signed.abs() <= 8, "expected near-silence, got {signed}");
    }
}

#[test]
fn hd_fresh_stream_starts_with_the_known_signature() {
    let mut encoder = Context::new(Variant::Hd);
    let input = [0u8; 24];
    let mut out = [0u8; 6];
    encoder.encode(&input, &mut out);
    assert_eq!(out, [0x73, 0xbe, 0xff, 0x73, 0xbe, 0xff]);

    let mut decoder = Context::new(Variant::Hd);
    let mut pcm = [0u8; 24];
    let report = decoder.decode(&out, &mut pcm);
    assert!(report.parity_ok);
    assert_eq!(report.consumed, 6);
    assert_eq!(report.written, 0);
}

#[test]
fn decode_stops_before_the_packet_that_fails_parity() {
    let packets = 20;
    let mut encoder = Context::new(Variant::Standard);
    let input = lcg_bytes(packets * 24, 12345);
    let mut encoded = vec![0u8; packets * 4];
    encoder.encode(&input, &mut encoded);

    // Flip the low bit of subband 0's LSB in the 10th packet (index 9),
    // which changes that channel's contribution to the combined parity.
    let corrupt_byte = 9 * 4 + 3;
    encoded[corrupt_byte] ^= 1;

    let mut decoder = Context::new(Variant::Standard);
    let mut pcm_out = vec![0u8; encoded.len() * 6];
    let report = decoder.decode(&encoded, &mut pcm_out);

    assert!(!report.parity_ok);
    assert_eq!(report.consumed, 9 * 4);
}

#[test]
fn decode_sync_recovers_from_a_single_inserted_byte() {
    let packets = 50;
    let mut encoder = Context::new(Variant::Standard);
    let input = lcg_bytes(packets * 24, 999);
    let mut encoded = vec![0u8; packets * 4];
    encoder.encode(&input, &mut encoded);

    let mut corrupted = encoded[..47].to_vec();
    corrupted.push(0xFF);
    corrupted.extend_from_slice(&encoded[47..]);

    let mut decoder = Context::new(Variant::Standard);
    let mut pcm_out = vec![0u8; corrupted.len() * 12];
    let report = decoder.decode_sync(&corrupted, &mut pcm_out);

    assert!(report.consumed > 0);
    assert!(report.consumed <= corrupted.len());

    let finish_dropped = decoder.decode_sync_finish();
    assert!(report.dropped + finish_dropped >= 1);
}

#[test]
fn encode_finish_drains_the_preroll_window_through_a_tiny_buffer() {
    let mut ctx = Context::new(Variant::Hd);
    let mut total = 0;
    loop {
        let mut out = [0u8; 1];
        let report = ctx.encode_finish(&mut out);
        total += report.written;
        if report.complete {
            break;
        }
    }
    assert_eq!(total, PREROLL_PACKETS * 6);
}

#[test]
fn identical_input_produces_byte_identical_streams() {
    let input = lcg_bytes(64 * 24, 42);

    let mut a = Context::new(Variant::Standard);
    let mut out_a = vec![0u8; 64 * 4];
    a.encode(&input, &mut out_a);

    let mut b = Context::new(Variant::Standard);
    let mut out_b = vec![0u8; 64 * 4];
    b.encode(&input, &mut out_b);

    assert_eq!(out_a, out_b);
}

#[test]
fn non_silent_stream_round_trips_without_parity_failures() {
    let blocks = 128;
    let mut encoder = Context::new(Variant::Standard);
    let input = lcg_bytes(blocks * 24, 7);
    let mut encoded = vec![0u8; blocks * 4];
    let enc_report = encoder.encode(&input, &mut encoded);
    assert_eq!(enc_report.consumed, input.len());

    let mut decoder = Context::new(Variant::Standard);
    let mut pcm_out = vec![0u8; encoded.len() * 6];
    let report = decoder.decode(&encoded, &mut pcm_out);

    assert!(report.parity_ok);
    assert_eq!(report.consumed, encoded.len());
}
