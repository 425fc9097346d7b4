// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A Free Lossless Audio Codec (FLAC) decoder for Project Partita.
//!
//! The decoder consumes a FLAC bitstream from any [`partita_core::io::ByteSource`] and emits the
//! reconstructed linear PCM, bit-identical to the signal that was encoded, to registered
//! [`PcmProcessor`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::sync::Arc;
//!
//! use partita_core::io::SeekableSource;
//! use partita_flac::{PcmProcessor, StreamDecoder, StreamInfo};
//!
//! struct Sink;
//!
//! impl PcmProcessor for Sink {
//!     fn process_stream_info(&self, info: &StreamInfo) {
//!         println!("{} Hz, {} bits", info.sample_rate, info.bits_per_sample);
//!     }
//!
//!     fn process_pcm(&self, pcm: &[u8]) {
//!         // The borrowed bytes are only valid for the duration of this call.
//!         let _ = pcm.len();
//!     }
//! }
//!
//! let file = File::open("media.flac").unwrap();
//! let mut decoder = StreamDecoder::new(SeekableSource::new(file));
//!
//! decoder.processors().add(Arc::new(Sink));
//! decoder.decode().unwrap();
//! ```

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod channel;
mod decoder;
mod frame;
mod metadata;
mod subframe;

mod driver;

pub use partita_core::errors::{Error, Result};

pub use driver::{
    probe_stream_info, DecoderOptions, DecoderState, PcmProcessor, ProcessorSet, StreamDecoder,
};
pub use frame::{BlockSequence, BlockingStrategy, ChannelAssignment, FrameHeader};
pub use metadata::{
    MetadataBlockHeader, MetadataBlockType, SeekPoint, SeekTable, StreamInfo, VendorApplication,
};
