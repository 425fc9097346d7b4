// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides primitives for describing and staging audio signals.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// A bit mask naming every speaker position present in a signal.
    #[derive(Default)]
    pub struct Channels: u32 {
        /// The front-left speaker, which also carries mono content.
        const FRONT_LEFT   = 0x0000_0001;
        /// The front-right speaker.
        const FRONT_RIGHT  = 0x0000_0002;
        /// The front-centre speaker.
        const FRONT_CENTRE = 0x0000_0004;
        /// The rear-left surround speaker.
        const REAR_LEFT    = 0x0000_0008;
        /// The rear-centre surround speaker.
        const REAR_CENTRE  = 0x0000_0010;
        /// The rear-right surround speaker.
        const REAR_RIGHT   = 0x0000_0020;
        /// The first low-frequency effects channel.
        const LFE1         = 0x0000_0040;
        /// The side-left surround speaker.
        const SIDE_LEFT    = 0x0000_0080;
        /// The side-right surround speaker.
        const SIDE_RIGHT   = 0x0000_0100;
    }
}

impl Channels {
    /// The number of channels set in the mask.
    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#032b}", self.bits())
    }
}

/// `SignalSpec` captures the sampling rate and channel layout of a signal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalSpec {
    /// Sampling rate in Hz.
    pub rate: u32,

    /// The channels present. Mask order doubles as the interleaving order of the samples within
    /// a frame.
    pub channels: Channels,
}

impl SignalSpec {
    pub fn new(rate: u32, channels: Channels) -> Self {
        SignalSpec { rate, channels }
    }
}

/// `PcmBuffer` is a grow-only staging buffer for packed little-endian PCM bytes.
///
/// The buffer is owned by a decoder, filled once per decoded block, and lent to consumers as a
/// borrowed byte slice that is only valid for the duration of the call.
#[derive(Default)]
pub struct PcmBuffer {
    data: Vec<u8>,
}

impl PcmBuffer {
    pub fn new() -> PcmBuffer {
        PcmBuffer { data: Vec::new() }
    }

    /// Clears the buffer of all samples. The underlying allocation is retained.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends a single sample as `bytes_per_sample` little-endian bytes of its two's complement
    /// representation.
    #[inline(always)]
    pub fn put_sample_le(&mut self, sample: i32, bytes_per_sample: usize) {
        debug_assert!(bytes_per_sample >= 1 && bytes_per_sample <= 4);

        for i in 0..bytes_per_sample {
            self.data.push((sample >> (8 * i)) as u8);
        }
    }

    /// The packed bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_channels_count() {
        assert_eq!(Channels::FRONT_LEFT.count(), 1);
        assert_eq!((Channels::FRONT_LEFT | Channels::FRONT_RIGHT).count(), 2);
        assert_eq!(Channels::empty().count(), 0);
    }

    #[test]
    fn verify_pcm_buffer_packing() {
        let mut buf = PcmBuffer::new();

        buf.put_sample_le(0x1234, 2);
        assert_eq!(buf.as_bytes(), &[0x34, 0x12]);

        buf.clear();
        buf.put_sample_le(-2, 2);
        assert_eq!(buf.as_bytes(), &[0xfe, 0xff]);

        buf.clear();
        buf.put_sample_le(-8_388_608, 3);
        assert_eq!(buf.as_bytes(), &[0x00, 0x00, 0x80]);

        buf.clear();
        buf.put_sample_le(-1, 4);
        assert_eq!(buf.as_bytes(), &[0xff, 0xff, 0xff, 0xff]);
    }
}
