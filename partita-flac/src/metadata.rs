// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use partita_core::audio::Channels;
use partita_core::errors::{bad_metadata_error, Result};
use partita_core::io::{BitInputStream, ByteSource};

/// The supported metadata block types.
#[derive(Debug, PartialEq, Eq)]
pub enum MetadataBlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    Cuesheet,
    Picture,
    Unknown(u8),
}

/// The standard speaker layout implied by a channel count.
fn channel_mask_for_count(n_channels: u32) -> Channels {
    debug_assert!(n_channels > 0 && n_channels < 9);

    match n_channels {
        1 => Channels::FRONT_LEFT,
        2 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        3 => Channels::FRONT_LEFT | Channels::FRONT_RIGHT | Channels::FRONT_CENTRE,
        4 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
        }
        5 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
        }
        6 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::LFE1
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
        }
        7 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::LFE1
                | Channels::REAR_CENTRE
                | Channels::SIDE_LEFT
                | Channels::SIDE_RIGHT
        }
        8 => {
            Channels::FRONT_LEFT
                | Channels::FRONT_RIGHT
                | Channels::FRONT_CENTRE
                | Channels::LFE1
                | Channels::REAR_LEFT
                | Channels::REAR_RIGHT
                | Channels::SIDE_LEFT
                | Channels::SIDE_RIGHT
        }
        _ => unreachable!(),
    }
}

/// The stream information block. Parsed once per stream and immutable afterwards.
#[derive(Debug, Default, Clone)]
pub struct StreamInfo {
    /// Smallest and largest block length, in samples, used anywhere in the stream.
    pub block_len_min: u16,
    pub block_len_max: u16,
    /// Smallest and largest encoded frame size in bytes. A bound of 0 means the encoder did not
    /// record it.
    pub frame_byte_len_min: u32,
    pub frame_byte_len_max: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// The positions of the coded channels.
    pub channels: Channels,
    /// The width of a decoded sample in bits.
    pub bits_per_sample: u32,
    /// The stream length in samples per channel, when the encoder knew it up front.
    pub n_samples: Option<u64>,
    /// MD5 of the raw decoded audio, when the encoder computed one.
    pub md5: Option<[u8; 16]>,
}

impl StreamInfo {
    /// Parse the body of a stream information block.
    pub fn read<S: ByteSource>(bs: &mut BitInputStream<S>) -> Result<StreamInfo> {
        // Every field sits at a fixed offset, so pull the whole block apart before judging any
        // of it.
        let block_len_min = bs.read_bits_leq32(16)? as u16;
        let block_len_max = bs.read_bits_leq32(16)? as u16;
        let frame_byte_len_min = bs.read_bits_leq32(24)?;
        let frame_byte_len_max = bs.read_bits_leq32(24)?;
        let sample_rate = bs.read_bits_leq32(20)?;
        let n_channels = bs.read_bits_leq32(3)? + 1;
        let bits_per_sample = bs.read_bits_leq32(5)? + 1;
        let n_samples = bs.read_bits_leq64(36)?;

        let mut md5 = [0u8; 16];
        bs.read_buf_aligned_no_crc(&mut md5)?;

        // No conforming encoder produces blocks of fewer than 16 samples, and the bounds must be
        // ordered. An ordered pair with a valid minimum makes the maximum valid too.
        if block_len_min < 16 || block_len_max < block_len_min {
            return bad_metadata_error(
                "block length bounds are out of order or below 16 samples",
                bs.position(),
            );
        }

        // The frame byte bounds are only comparable when the encoder recorded both.
        if frame_byte_len_min > 0
            && frame_byte_len_max > 0
            && frame_byte_len_max < frame_byte_len_min
        {
            return bad_metadata_error("frame byte length bounds are out of order", bs.position());
        }

        // The field is 20 bits wide but only rates of 1 through 655350 Hz are meaningful.
        if sample_rate < 1 || sample_rate > 655_350 {
            return bad_metadata_error("sample rate is outside the valid range", bs.position());
        }

        // Coding the width minus one in 5 bits caps it at 32 structurally, so only the floor
        // needs checking.
        if bits_per_sample < 4 {
            return bad_metadata_error("sample width is below 4 bits", bs.position());
        }

        Ok(StreamInfo {
            block_len_min,
            block_len_max,
            frame_byte_len_min,
            frame_byte_len_max,
            sample_rate,
            channels: channel_mask_for_count(n_channels),
            bits_per_sample,
            // A zero sample count stands in for "length unknown", and a zeroed MD5 for "no
            // checksum computed".
            n_samples: match n_samples {
                0 => None,
                n => Some(n),
            },
            md5: if md5 != [0; 16] { Some(md5) } else { None },
        })
    }

    /// True when a block length matches the fixed stream information layout.
    pub fn is_valid_size(size: u32) -> bool {
        const STREAM_INFO_BLOCK_SIZE: u32 = 34;

        size == STREAM_INFO_BLOCK_SIZE
    }

    /// The number of channels in the stream.
    pub fn n_channels(&self) -> u32 {
        self.channels.count() as u32
    }
}

/// A metadata block header.
pub struct MetadataBlockHeader {
    /// True if this is the final metadata block in the stream.
    pub is_last: bool,
    pub block_type: MetadataBlockType,
    /// The length of the block, in bytes, excluding this header.
    pub block_len: u32,
}

impl MetadataBlockHeader {
    /// Parse the four header bytes introducing a metadata block.
    pub fn read<S: ByteSource>(bs: &mut BitInputStream<S>) -> Result<MetadataBlockHeader> {
        // A block header packs a last-block flag, a 7-bit type code, and the 24-bit byte length
        // of the body that follows.
        let is_last = bs.read_bit()?;
        let block_type_id = bs.read_bits_leq32(7)? as u8;

        let block_type = match block_type_id {
            0 => MetadataBlockType::StreamInfo,
            1 => MetadataBlockType::Padding,
            2 => MetadataBlockType::Application,
            3 => MetadataBlockType::SeekTable,
            4 => MetadataBlockType::VorbisComment,
            5 => MetadataBlockType::Cuesheet,
            6 => MetadataBlockType::Picture,
            _ => MetadataBlockType::Unknown(block_type_id),
        };

        let block_len = bs.read_bits_leq32(24)?;

        Ok(MetadataBlockHeader { is_last, block_type, block_len })
    }
}

/// A single entry of a [`SeekTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// The sample number of the first sample in the target frame.
    pub sample: u64,
    /// The byte offset of the target frame from the first frame.
    pub byte_offset: u64,
    /// The number of samples in the target frame.
    pub n_samples: u16,
}

/// A parsed seek table block.
#[derive(Debug, Default)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

/// Parse a seek table block body of the given length.
pub fn read_seek_table_block<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    block_len: u32,
) -> Result<SeekTable> {
    // Seek points are fixed 18-byte records, so the entry count falls out of the block length.
    let count = block_len / 18;

    let mut table = SeekTable::default();

    for _ in 0..count {
        let sample = bs.read_bits_leq64(64)?;

        // An all-ones sample number marks a placeholder entry. Its other two fields carry no
        // meaning but still occupy their 10 bytes.
        if sample != 0xffff_ffff_ffff_ffff {
            table.points.push(SeekPoint {
                sample,
                byte_offset: bs.read_bits_leq64(64)?,
                n_samples: bs.read_bits_leq32(16)? as u16,
            });
        }
        else {
            bs.skip_bits_no_crc(10 * 8)?;
        }
    }

    Ok(table)
}

/// A vendor-specific application block.
pub struct VendorApplication {
    /// The registered application identifier.
    pub ident: [u8; 4],
    /// The application payload.
    pub data: Box<[u8]>,
}

/// Parse an application block body of the given length.
pub fn read_application_block<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    block_len: u32,
) -> Result<VendorApplication> {
    if block_len < 4 {
        return bad_metadata_error("application block shorter than its identifier", bs.position());
    }

    let mut ident = [0u8; 4];
    bs.read_buf_aligned_no_crc(&mut ident)?;

    let mut data = vec![0u8; block_len as usize - 4];
    bs.read_buf_aligned_no_crc(&mut data)?;

    Ok(VendorApplication { ident, data: data.into_boxed_slice() })
}
