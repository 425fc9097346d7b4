// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test support: a bit-level writer and builders for complete FLAC streams.

use partita_core::checksum::{Crc16Ansi, Crc8Ccitt};

/// Packs bits most-significant-bit-first, mirroring the reader's consumption order.
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u8,
    n_bits: u32,
}

impl BitWriter {
    pub fn new() -> BitWriter {
        BitWriter { bytes: Vec::new(), acc: 0, n_bits: 0 }
    }

    pub fn put_bits(&mut self, value: u64, width: u32) {
        for i in (0..width).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u8;
            self.n_bits += 1;

            if self.n_bits == 8 {
                self.bytes.push(self.acc);
                self.acc = 0;
                self.n_bits = 0;
            }
        }
    }

    pub fn put_signed_bits(&mut self, value: i64, width: u32) {
        let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        self.put_bits(value as u64 & mask, width);
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align(&mut self) {
        if self.n_bits > 0 {
            self.put_bits(0, 8 - self.n_bits);
        }
    }

    /// The bytes written so far. The writer must be byte-aligned.
    pub fn aligned_bytes(&self) -> &[u8] {
        assert_eq!(self.n_bits, 0, "writer is not byte aligned");
        &self.bytes
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.align();
        self.bytes
    }
}

/// Encodes a value as the extended UTF-8 coding used for frame sequence numbers.
pub fn put_utf8(bw: &mut BitWriter, value: u64) {
    let n_cont = match value {
        0x00..=0x7f => {
            bw.put_bits(value, 8);
            return;
        }
        0x80..=0x7ff => 1,
        0x800..=0xffff => 2,
        0x1_0000..=0x1f_ffff => 3,
        0x20_0000..=0x3ff_ffff => 4,
        0x400_0000..=0x7fff_ffff => 5,
        _ => 6,
    };

    let prefix = (0xffu32 << (7 - n_cont)) as u8;
    let data_mask = (1u64 << (6 - n_cont)) - 1;

    bw.put_bits(u64::from(prefix) | ((value >> (6 * n_cont)) & data_mask), 8);

    for i in (0..n_cont).rev() {
        bw.put_bits(0x80 | ((value >> (6 * i)) & 0x3f), 8);
    }
}

/// Builds a stream information metadata block, including its block header.
pub fn stream_info_block(
    block_len: u16,
    sample_rate: u32,
    n_channels: u32,
    bits_per_sample: u32,
    is_last: bool,
) -> Vec<u8> {
    let mut bw = BitWriter::new();

    // Block header: last flag, type 0, 34 byte length.
    bw.put_bits(u64::from(is_last), 1);
    bw.put_bits(0, 7);
    bw.put_bits(34, 24);

    // Block lengths must be at least 16 samples, though individual frames may be shorter.
    let coded_block_len = block_len.max(16);

    bw.put_bits(u64::from(coded_block_len), 16);
    bw.put_bits(u64::from(coded_block_len), 16);
    bw.put_bits(0, 24);
    bw.put_bits(0, 24);
    bw.put_bits(u64::from(sample_rate), 20);
    bw.put_bits(u64::from(n_channels - 1), 3);
    bw.put_bits(u64::from(bits_per_sample - 1), 5);
    bw.put_bits(0, 36);

    // No MD5.
    for _ in 0..16 {
        bw.put_bits(0, 8);
    }

    bw.into_bytes()
}

/// Channel layout codes for the frame header.
pub const CHANNELS_MONO: u32 = 0x0;
pub const CHANNELS_STEREO: u32 = 0x1;
pub const CHANNELS_LEFT_SIDE: u32 = 0x8;
pub const CHANNELS_RIGHT_SIDE: u32 = 0x9;
pub const CHANNELS_MID_SIDE: u32 = 0xa;

/// Builds one complete frame: header with CRC-8, the subframes written by `subframes`, padding
/// to byte alignment, and the footer CRC-16.
///
/// The block length is coded as a 16-bit follow-up; the sample rate and bit width defer to the
/// stream information block.
pub fn build_frame(
    frame_number: u64,
    block_len: u16,
    channel_code: u32,
    subframes: impl FnOnce(&mut BitWriter),
) -> Vec<u8> {
    let mut bw = BitWriter::new();

    // Sync code, reserved bit, fixed blocking strategy.
    bw.put_bits(0b11_1111_1111_1110, 14);
    bw.put_bits(0, 1);
    bw.put_bits(0, 1);

    // Block length by 16-bit follow-up; sample rate and sample width from the stream information
    // block; reserved bit.
    bw.put_bits(0x7, 4);
    bw.put_bits(0x0, 4);
    bw.put_bits(u64::from(channel_code), 4);
    bw.put_bits(0x0, 3);
    bw.put_bits(0, 1);

    put_utf8(&mut bw, frame_number);

    bw.put_bits(u64::from(block_len - 1), 16);

    let mut crc8 = Crc8Ccitt::new(0);
    crc8.process_buf_bytes(bw.aligned_bytes());
    bw.put_bits(u64::from(crc8.crc()), 8);

    subframes(&mut bw);

    bw.align();

    let mut crc16 = Crc16Ansi::new(0);
    crc16.process_buf_bytes(bw.aligned_bytes());
    bw.put_bits(u64::from(crc16.crc()), 16);

    bw.into_bytes()
}

pub fn put_constant_subframe(bw: &mut BitWriter, value: i64, bps: u32) {
    bw.put_bits(0x00, 8);
    bw.put_signed_bits(value, bps);
}

pub fn put_verbatim_subframe(bw: &mut BitWriter, values: &[i32], bps: u32) {
    bw.put_bits(0x02, 8);
    for &value in values {
        bw.put_signed_bits(i64::from(value), bps);
    }
}

/// Rice codes a residual as a single partition with the given 4-bit parameter.
pub fn put_rice_residual(bw: &mut BitWriter, residual: &[i32], param: u32) {
    assert!(param < 0xf);

    // Method 0, partition order 0, partition parameter.
    bw.put_bits(0, 2);
    bw.put_bits(0, 4);
    bw.put_bits(u64::from(param), 4);

    for &value in residual {
        let uval =
            if value >= 0 { (value as u32) << 1 } else { (((-(value + 1)) as u32) << 1) | 1 };

        bw.put_bits(1, (uval >> param) + 1);
        bw.put_bits(u64::from(uval) & ((1 << param) - 1), param);
    }
}

pub fn put_fixed_subframe(
    bw: &mut BitWriter,
    order: u32,
    warmup: &[i32],
    residual: &[i32],
    bps: u32,
) {
    assert_eq!(warmup.len(), order as usize);

    bw.put_bits(0, 1);
    bw.put_bits(u64::from(0x08 | order), 6);
    bw.put_bits(0, 1);

    for &value in warmup {
        bw.put_signed_bits(i64::from(value), bps);
    }

    put_rice_residual(bw, residual, 0);
}

pub fn put_lpc_subframe(
    bw: &mut BitWriter,
    warmup: &[i32],
    coeffs: &[i32],
    precision: u32,
    shift: u32,
    residual: &[i32],
    bps: u32,
) {
    let order = coeffs.len() as u32;

    assert_eq!(warmup.len(), coeffs.len());

    bw.put_bits(0, 1);
    bw.put_bits(u64::from(0x20 | (order - 1)), 6);
    bw.put_bits(0, 1);

    for &value in warmup {
        bw.put_signed_bits(i64::from(value), bps);
    }

    bw.put_bits(u64::from(precision - 1), 4);
    bw.put_bits(u64::from(shift), 5);

    for &coeff in coeffs {
        bw.put_signed_bits(i64::from(coeff), precision);
    }

    put_rice_residual(bw, residual, 0);
}

/// Builds a whole stream: the marker, a stream information block, optional extra metadata
/// blocks, and the given frames.
pub fn build_stream(stream_info: Vec<u8>, extra_metadata: &[Vec<u8>], frames: &[Vec<u8>]) -> Vec<u8> {
    let mut stream = b"fLaC".to_vec();

    stream.extend_from_slice(&stream_info);

    for block in extra_metadata {
        stream.extend_from_slice(block);
    }

    for frame in frames {
        stream.extend_from_slice(frame);
    }

    stream
}

/// Packs samples the way the decoder emits them: channel-interleaved little-endian bytes.
pub fn interleave_le(channels: &[&[i32]], bytes_per_sample: usize) -> Vec<u8> {
    let block_len = channels[0].len();
    let mut out = Vec::new();

    for i in 0..block_len {
        for channel in channels {
            for b in 0..bytes_per_sample {
                out.push((channel[i] >> (8 * b)) as u8);
            }
        }
    }

    out
}
