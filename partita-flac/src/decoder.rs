// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use partita_core::errors::{unparseable_error, Error, Result};
use partita_core::io::{BitInputStream, ByteSource};

use crate::channel::ChannelData;
use crate::frame::{read_frame_header, ChannelAssignment, FrameHeader};
use crate::subframe::read_subframe;

fn decorrelate_left_side(left: &[i32], side: &mut [i32]) {
    for (s, l) in side.iter_mut().zip(left) {
        *s = *l - *s;
    }
}

fn decorrelate_mid_side(mid: &mut [i32], side: &mut [i32]) {
    for (m, s) in mid.iter_mut().zip(side) {
        // Mid (M) is coded as (L + R) / 2 and side (S) as L - R, so L = M + S/2 and
        // R = M - S/2. Integer division floors S/2, losing the low bit of M whenever S is odd.
        // Doubling M first and re-attaching the low bit of S restores the lost precision:
        //      L = (2*M + (S&1) + S) / 2
        //      R = (2*M + (S&1) - S) / 2
        let mid = (*m << 1) | (*s & 1);
        let side = *s;
        *m = (mid + side) >> 1;
        *s = (mid - side) >> 1;
    }
}

fn decorrelate_right_side(right: &[i32], side: &mut [i32]) {
    for (s, r) in side.iter_mut().zip(right) {
        *s += *r;
    }
}

/// A decoded frame: its header, and the sample bit width the frame was decoded at after falling
/// back to the stream-wide width where the header deferred.
pub(crate) struct DecodedFrame {
    pub header: FrameHeader,
    pub bits_per_sample: u32,
}

/// Decodes one frame: the header, one subframe per channel, and the footer CRC-16.
///
/// On return the reconstructed, decorrelated samples of channel `c` occupy
/// `channels[c].output[..block_len]`.
pub(crate) fn read_frame<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    sync: u16,
    stream_bps: Option<u32>,
    channels: &mut Vec<ChannelData>,
) -> Result<DecodedFrame> {
    let header = read_frame_header(bs, sync)?;

    // Use the bit width stated in the frame header, falling back to the stream information
    // block.
    let bits_per_sample = match header.bits_per_sample.or(stream_bps) {
        Some(bps) => bps,
        None => {
            return unparseable_error(
                "bits per sample not provided by the frame or the stream",
                bs.position(),
            );
        }
    };

    // The side (difference) channel of a decorrelated stereo pair carries one extra bit, which
    // must still fit the 32-bit sample pipeline.
    if !matches!(header.channel_assignment, ChannelAssignment::Independent(_))
        && bits_per_sample + 1 > 32
    {
        return unparseable_error("side channel sample width exceeds 32 bits", bs.position());
    }

    let block_len = usize::from(header.block_len);
    let n_channels = header.channel_assignment.n_channels() as usize;

    if channels.len() < n_channels {
        channels.resize_with(n_channels, ChannelData::new);
    }

    for channel in channels.iter_mut().take(n_channels) {
        channel.ensure_block_len(block_len);
    }

    // Read each subframe based on the channel assignment. For the left/side, mid/side, and
    // right/side configurations, the side (difference) channel requires one extra bit per
    // sample.
    match header.channel_assignment {
        ChannelAssignment::Independent(_) => {
            for channel in channels.iter_mut().take(n_channels) {
                read_subframe(bs, bits_per_sample, block_len, channel)?;
            }
        }
        ChannelAssignment::LeftSide => {
            let (left, side) = channels.split_at_mut(1);

            read_subframe(bs, bits_per_sample, block_len, &mut left[0])?;
            read_subframe(bs, bits_per_sample + 1, block_len, &mut side[0])?;

            decorrelate_left_side(&left[0].output[..block_len], &mut side[0].output[..block_len]);
        }
        ChannelAssignment::MidSide => {
            let (mid, side) = channels.split_at_mut(1);

            read_subframe(bs, bits_per_sample, block_len, &mut mid[0])?;
            read_subframe(bs, bits_per_sample + 1, block_len, &mut side[0])?;

            decorrelate_mid_side(&mut mid[0].output[..block_len], &mut side[0].output[..block_len]);
        }
        ChannelAssignment::RightSide => {
            let (side, right) = channels.split_at_mut(1);

            read_subframe(bs, bits_per_sample + 1, block_len, &mut side[0])?;
            read_subframe(bs, bits_per_sample, block_len, &mut right[0])?;

            decorrelate_right_side(&right[0].output[..block_len], &mut side[0].output[..block_len]);
        }
    }

    // Subframes are not byte-aligned; consume the zero padding up to the next byte boundary so
    // the footer lands on a whole byte and the running CRC-16 covers the entire frame.
    let align = bs.bits_to_byte_alignment();

    if align > 0 {
        bs.read_bits_leq32(align)?;
    }

    // Capture the accumulated CRC-16 before consuming the stored footer.
    let crc16_computed = bs.crc16();
    let crc16_expected = bs.read_bits_leq32(16)? as u16;

    if crc16_expected != crc16_computed {
        return Err(Error::BadFrameCrc {
            expected: crc16_expected,
            computed: crc16_computed,
            pos: bs.position(),
        });
    }

    Ok(DecodedFrame { header, bits_per_sample })
}
