// aptx-core
// Copyright (c) 2024 The Aptx-rs Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Fixed-point primitives shared by the aptX/aptX-HD codec implementation.
//!
//! Every function here is bit-exact with the reference `libopenaptx`
//! implementation: the codec's predictor and factor-select loops are
//! feedback systems, so a single rounding discrepancy in any of these
//! primitives diverges the whole stream.

pub mod fixed;
