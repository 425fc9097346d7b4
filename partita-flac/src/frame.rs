// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use partita_core::checksum::{Crc16Ansi, Crc8Ccitt};
use partita_core::errors::{lost_sync_error, Error, Result};
use partita_core::io::{BitInputStream, ByteSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStrategy {
    Fixed,
    Variable,
}

/// The position of a frame within the stream: fixed-blocksize streams sequence frames by a frame
/// number, variable-blocksize streams by the sample number of the first sample in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSequence {
    ByFrame(u32),
    BySample(u64),
}

/// `ChannelAssignment` ties each coded subframe to the channel its samples belong to, and
/// selects the decorrelation step, if any, that rebuilds a stereo pair.
///
/// In the `LeftSide` and `RightSide` assignments one channel arrives as-is and its partner as a
/// left-minus-right difference; `MidSide` instead carries an averaged channel alongside the
/// difference, so both output channels must be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// All channels are independently coded and no decorrelation step is required.
    Independent(u32),
    /// Channel 0 is the left channel and channel 1 is the difference channel. The right channel
    /// is restored by subtracting the difference from the left channel.
    LeftSide,
    /// Channel 0 is the mid channel and channel 1 is the difference channel.
    MidSide,
    /// Channel 0 is the difference channel and channel 1 is the right channel. The left channel
    /// is restored by adding the difference to the right channel.
    RightSide,
}

impl ChannelAssignment {
    /// The number of channels coded in a frame with this assignment.
    pub fn n_channels(&self) -> u32 {
        match self {
            ChannelAssignment::Independent(n) => *n,
            _ => 2,
        }
    }
}

/// A fully parsed and validated frame header.
#[derive(Debug)]
pub struct FrameHeader {
    pub blocking_strategy: BlockingStrategy,
    pub block_sequence: BlockSequence,
    /// The number of samples per channel in the frame.
    pub block_len: u16,
    pub channel_assignment: ChannelAssignment,
    /// The sample bit width, if coded in the header. Otherwise it is the stream-wide width from
    /// the stream information block.
    pub bits_per_sample: Option<u32>,
    /// The sample rate, if coded in the header.
    pub sample_rate: Option<u32>,
}

/// Advances the stream to the next frame synchronization code and returns the expanded 16-bit
/// synchronization word (the 14-bit code plus the reserved and blocking strategy bits).
///
/// The scan is bytewise: frame headers always begin on a byte boundary.
pub fn sync_frame<S: ByteSource>(bs: &mut BitInputStream<S>) -> Result<u16> {
    let mut sync = 0u16;

    // The 14-bit sync code `0b11_1111_1111_1110` would be difficult to find on its own. Expand
    // the search to a 16-bit window of `0b1111_1111_1111_10xx` and slide it a byte at a time.
    while (sync & 0xfffc) != 0xfff8 {
        sync = sync.wrapping_shl(8) | bs.read_bits_leq32(8)? as u16;
    }

    Ok(sync)
}

/// Reads and validates a frame header given the synchronization word that introduced it.
///
/// On return the bit reader's running CRC-16 covers the header, seeded from the synchronization
/// bytes, ready to accumulate over the remainder of the frame.
pub fn read_frame_header<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    sync: u16,
) -> Result<FrameHeader> {
    // The header is checksummed with a CRC-8, and the frame as a whole with a CRC-16. Both
    // include the synchronization bytes, which have already been consumed, so seed the running
    // codes with the state reached after processing them.
    let sync_bytes = sync.to_be_bytes();

    let mut crc8 = Crc8Ccitt::new(0);
    crc8.process_buf_bytes(&sync_bytes);
    bs.reset_crc8(crc8.crc());

    let mut crc16 = Crc16Ansi::new(0);
    crc16.process_buf_bytes(&sync_bytes);
    bs.reset_crc16(crc16.crc());

    // Extract the blocking strategy from the expanded synchronization word.
    let blocking_strategy =
        if sync & 0x1 == 0 { BlockingStrategy::Fixed } else { BlockingStrategy::Variable };

    // Read all the standard frame description fields as one 16-bit value and extract them.
    let desc = bs.read_bits_leq32(16)?;

    let block_len_enc = (desc & 0xf000) >> 12;
    let sample_rate_enc = (desc & 0x0f00) >> 8;
    let channels_enc = (desc & 0x00f0) >> 4;
    let bits_per_sample_enc = (desc & 0x000e) >> 1;

    if desc & 0x0001 != 0 {
        return lost_sync_error("frame header reserved bit is not 0", bs.position());
    }

    let block_sequence = match blocking_strategy {
        BlockingStrategy::Fixed => {
            let frame = bs.read_utf8_u32()?;

            // The frame number is encoded in up-to 6 bytes, limiting it to 31 bits. The all-ones
            // sentinel marks a malformed sequence.
            if frame == u32::MAX || frame > 0x7fff_ffff {
                return lost_sync_error("frame sequence number is not valid", bs.position());
            }

            BlockSequence::ByFrame(frame)
        }
        BlockingStrategy::Variable => {
            let sample = bs.read_utf8_u64()?;

            // The sample number is encoded in up-to 7 bytes, limiting it to 36 bits.
            if sample == u64::MAX || sample > 0x000f_ffff_ffff {
                return lost_sync_error("sample sequence number is not valid", bs.position());
            }

            BlockSequence::BySample(sample)
        }
    };

    let block_len = match block_len_enc {
        0x1 => 192,
        0x2..=0x5 => 576 * (1 << (block_len_enc - 2)),
        0x6 => bs.read_bits_leq32(8)? as u16 + 1,
        0x7 => {
            let block_len = bs.read_bits_leq32(16)?;
            if block_len == 0xffff {
                return lost_sync_error("block length exceeds 65535 samples", bs.position());
            }
            block_len as u16 + 1
        }
        0x8..=0xf => 256 * (1 << (block_len_enc - 8)),
        _ => {
            return lost_sync_error("block length set to reserved value", bs.position());
        }
    };

    let sample_rate = match sample_rate_enc {
        // Defer to the stream information block.
        0x0 => None,
        0x1 => Some(88_200),
        0x2 => Some(176_400),
        0x3 => Some(192_000),
        0x4 => Some(8_000),
        0x5 => Some(16_000),
        0x6 => Some(22_050),
        0x7 => Some(24_000),
        0x8 => Some(32_000),
        0x9 => Some(44_100),
        0xa => Some(48_000),
        0xb => Some(96_000),
        0xc => Some(bs.read_bits_leq32(8)? * 1000),
        0xd => Some(bs.read_bits_leq32(16)?),
        0xe => Some(bs.read_bits_leq32(16)? * 10),
        _ => {
            return lost_sync_error("sample rate set to reserved value", bs.position());
        }
    };

    if let Some(rate) = sample_rate {
        if rate < 1 || rate > 655_350 {
            return lost_sync_error("sample rate out of bounds", bs.position());
        }
    }

    let bits_per_sample = match bits_per_sample_enc {
        // Defer to the stream information block.
        0x0 => None,
        0x1 => Some(8),
        0x2 => Some(12),
        0x4 => Some(16),
        0x5 => Some(20),
        0x6 => Some(24),
        _ => {
            return lost_sync_error("bits per sample set to reserved value", bs.position());
        }
    };

    let channel_assignment = match channels_enc {
        0x0..=0x7 => ChannelAssignment::Independent(channels_enc + 1),
        0x8 => ChannelAssignment::LeftSide,
        0x9 => ChannelAssignment::RightSide,
        0xa => ChannelAssignment::MidSide,
        _ => {
            return lost_sync_error("channel assignment set to reserved value", bs.position());
        }
    };

    // The accumulated CRC-8 now covers the synchronization bytes and every header field. Capture
    // it before consuming the stored CRC-8 byte, which is itself covered by the frame CRC-16.
    let crc8_computed = bs.crc8();
    let crc8_expected = bs.read_bits_leq32(8)? as u8;

    if crc8_expected != crc8_computed {
        return Err(Error::BadHeaderCrc {
            expected: crc8_expected,
            computed: crc8_computed,
            pos: bs.position(),
        });
    }

    Ok(FrameHeader {
        blocking_strategy,
        block_sequence,
        block_len,
        channel_assignment,
        bits_per_sample,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use partita_core::io::ReadOnlySource;
    use std::io::Cursor;

    fn make_stream(bytes: &[u8]) -> BitInputStream<ReadOnlySource<Cursor<Vec<u8>>>> {
        BitInputStream::new(ReadOnlySource::new(Cursor::new(bytes.to_vec())))
    }

    /// Appends the stored CRC-8 to a partial header and returns the full header bytes.
    fn with_crc8(partial: &[u8]) -> Vec<u8> {
        let mut crc8 = Crc8Ccitt::new(0);
        crc8.process_buf_bytes(partial);

        let mut header = partial.to_vec();
        header.push(crc8.crc());
        header
    }

    #[test]
    fn verify_sync_frame() {
        // The synchronization code preceded by noise bytes, one of which is 0xff.
        let mut bs = make_stream(&[0x00, 0xff, 0x12, 0xff, 0xf8]);

        assert_eq!(sync_frame(&mut bs).unwrap(), 0xfff8);
    }

    #[test]
    fn verify_read_frame_header() {
        // Fixed blocking strategy, block length code 0xc (4096), sample rate code 0x9
        // (44.1 kHz), stereo, 16 bits per sample, frame number 0.
        let header = with_crc8(&[0xff, 0xf8, 0xc9, 0x18, 0x00]);

        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();
        let parsed = read_frame_header(&mut bs, sync).unwrap();

        assert_eq!(parsed.blocking_strategy, BlockingStrategy::Fixed);
        assert_eq!(parsed.block_sequence, BlockSequence::ByFrame(0));
        assert_eq!(parsed.block_len, 4096);
        assert_eq!(parsed.sample_rate, Some(44_100));
        assert_eq!(parsed.bits_per_sample, Some(16));
        assert_eq!(parsed.channel_assignment, ChannelAssignment::Independent(2));
    }

    #[test]
    fn verify_read_frame_header_follow_ups() {
        // Block length code 0x7 (16-bit follow-up) and sample rate code 0xd (16-bit follow-up in
        // Hz), mid/side stereo, bits per sample deferred to the stream, variable blocking
        // strategy with sample number 163840.
        let mut partial = vec![0xff, 0xf9, 0x7d, 0xa0];

        // 163840 as extended UTF-8.
        partial.extend_from_slice(&[0xf0, 0xa8, 0x80, 0x80]);

        // Block length follow-up: 1152 - 1.
        partial.extend_from_slice(&(1152u16 - 1).to_be_bytes());

        // Sample rate follow-up: 22050 Hz.
        partial.extend_from_slice(&22050u16.to_be_bytes());

        let header = with_crc8(&partial);

        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();
        let parsed = read_frame_header(&mut bs, sync).unwrap();

        assert_eq!(parsed.blocking_strategy, BlockingStrategy::Variable);
        assert_eq!(parsed.block_sequence, BlockSequence::BySample(163_840));
        assert_eq!(parsed.block_len, 1152);
        assert_eq!(parsed.sample_rate, Some(22_050));
        assert_eq!(parsed.bits_per_sample, None);
        assert_eq!(parsed.channel_assignment, ChannelAssignment::MidSide);
    }

    #[test]
    fn verify_frame_header_crc_mismatch() {
        let mut header = with_crc8(&[0xff, 0xf8, 0xc9, 0x18, 0x00]);

        // Corrupt the stored CRC-8.
        *header.last_mut().unwrap() ^= 0x01;

        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();

        match read_frame_header(&mut bs, sync) {
            Err(Error::BadHeaderCrc { .. }) => (),
            _ => panic!("expected a header crc mismatch"),
        }
    }

    #[test]
    fn verify_frame_header_reserved_values() {
        // Reserved block length code 0x0.
        let header = with_crc8(&[0xff, 0xf8, 0x09, 0x18, 0x00]);
        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();
        assert!(matches!(read_frame_header(&mut bs, sync), Err(Error::LostSync { .. })));

        // Reserved sample rate code 0xf.
        let header = with_crc8(&[0xff, 0xf8, 0xcf, 0x18, 0x00]);
        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();
        assert!(matches!(read_frame_header(&mut bs, sync), Err(Error::LostSync { .. })));

        // Reserved channel assignment 0xb.
        let header = with_crc8(&[0xff, 0xf8, 0xc9, 0xb8, 0x00]);
        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();
        assert!(matches!(read_frame_header(&mut bs, sync), Err(Error::LostSync { .. })));

        // The mandatory zero bit is set.
        let header = with_crc8(&[0xff, 0xf8, 0xc9, 0x19, 0x00]);
        let mut bs = make_stream(&header);
        let sync = sync_frame(&mut bs).unwrap();
        assert!(matches!(read_frame_header(&mut bs, sync), Err(Error::LostSync { .. })));
    }
}
