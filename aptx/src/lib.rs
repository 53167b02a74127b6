// aptx
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! A pure Rust, bit-exact re-implementation of the aptX and aptX-HD
//! subband audio codecs.
//!
//! [`Context`] is the entire public surface: construct one per stream with
//! [`Context::new`], then drive it with [`Context::encode`] /
//! [`Context::decode`] (or [`Context::decode_sync`] for a stream that may
//! have lost byte alignment). There is no file, socket, or CLI handling
//! here; this crate only ever reads and writes `&[u8]` buffers.
//!
//! All arithmetic saturates by contract (spec-driven, not a missed edge
//! case): no operation here panics or returns an error for any input byte
//! sequence, so the only fallible-looking surface in the reference C API
//! (context allocation) has no Rust analogue either (`Box::new` aborts
//! rather than returning null on allocation failure, same as every other
//! Rust allocation).

mod channel;
mod context;
mod dither;
mod invert_quantize;
mod packet;
mod prediction;
mod qmf;
mod quantize;
mod sync;
pub mod tables;

pub use context::{Context, DecodeReport, EncodeReport, FinishReport, SyncReport};

/// Which of the two codec variants a [`Context`] implements.
///
/// Stands in for the reference's bare `hd: bool` constructor argument:
/// idiomatic Rust prefers a named type at an API boundary where a boolean
/// changes program-wide behavior rather than, say, toggling a single
/// feature flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Standard aptX: 16-bit codewords, 4 bytes per packet.
    Standard,
    /// aptX-HD: 24-bit codewords, 6 bytes per packet.
    Hd,
}

impl Variant {
    /// Bytes of one packed packet (both channels): 4 for `Standard`, 6 for
    /// `Hd`.
    pub(crate) fn sample_size(self) -> usize {
        match self {
            Variant::Standard => 4,
            Variant::Hd => 6,
        }
    }

    pub(crate) fn tables(self) -> &'static [tables::SubbandTables; 4] {
        match self {
            Variant::Standard => &tables::STANDARD,
            Variant::Hd => &tables::HD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_size_matches_variant() {
        assert_eq!(Variant::Standard.sample_size(), 4);
        assert_eq!(Variant::Hd.sample_size(), 6);
    }
}
