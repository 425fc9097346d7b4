// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::num::Wrapping;

use partita_core::errors::{lost_sync_error, unparseable_error, Result};
use partita_core::io::{BitInputStream, ByteSource};
use partita_core::util::bits::ilog2_ceil;

use crate::channel::ChannelData;

/// The maximum order of the linear predictor.
const MAX_LPC_ORDER: usize = 32;

#[derive(Debug)]
enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u32),
    Lpc(u32),
}

/// Decodes one subframe of `block_len` samples at the given bit width into the channel's output
/// buffer.
///
/// The channel's residual buffer is used as scratch space, and the partitioned Rice parameters of
/// the residual, if any, are left in the channel's Rice contents.
pub(crate) fn read_subframe<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    frame_bps: u32,
    block_len: usize,
    chan: &mut ChannelData,
) -> Result<()> {
    // The first subframe header bit must always be 0.
    if bs.read_bit()? {
        return lost_sync_error("subframe padding is not 0", bs.position());
    }

    // The next 6 bits designate the subframe type.
    let subframe_type_enc = bs.read_bits_leq32(6)?;

    let subframe_type = match subframe_type_enc {
        0x00 => SubframeType::Constant,
        0x01 => SubframeType::Verbatim,
        0x08..=0x0f => {
            let order = subframe_type_enc & 0x07;
            // The fixed predictor only supports orders between 0 and 4.
            if order > 4 {
                return unparseable_error("fixed predictor order is greater than 4", bs.position());
            }
            SubframeType::Fixed(order)
        }
        0x20..=0x3f => SubframeType::Lpc((subframe_type_enc & 0x1f) + 1),
        _ => {
            return unparseable_error("subframe type set to reserved value", bs.position());
        }
    };

    // The final subframe header bit flags dropped (wasted) bits per sample in the audio
    // sub-block. If the flag is set, unary decode the number of dropped bits minus 1.
    let dropped_bps = if bs.read_bit()? { bs.read_unary_zeros()? + 1 } else { 0 };

    if dropped_bps >= frame_bps {
        return unparseable_error("wasted bits exceed the sample bit width", bs.position());
    }

    // The encoder truncates `dropped_bps` low-order bits from every sample in the sub-block when
    // they are all zero. Decode at the reduced width, then shift the samples back up.
    let bps = frame_bps - dropped_bps;

    match subframe_type {
        SubframeType::Constant => decode_constant(bs, bps, &mut chan.output[..block_len])?,
        SubframeType::Verbatim => decode_verbatim(bs, bps, &mut chan.output[..block_len])?,
        SubframeType::Fixed(order) => decode_fixed(bs, bps, order, block_len, chan)?,
        SubframeType::Lpc(order) => decode_lpc(bs, bps, order, block_len, chan)?,
    }

    samples_shl(dropped_bps, &mut chan.output[..block_len]);

    Ok(())
}

#[inline(always)]
fn samples_shl(shift: u32, buf: &mut [i32]) {
    if shift > 0 {
        for sample in buf.iter_mut() {
            *sample = sample.wrapping_shl(shift);
        }
    }
}

fn decode_constant<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    bps: u32,
    buf: &mut [i32],
) -> Result<()> {
    let const_sample = bs.read_bits_leq32_signed(bps)?;

    for sample in buf.iter_mut() {
        *sample = const_sample;
    }

    Ok(())
}

fn decode_verbatim<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    bps: u32,
    buf: &mut [i32],
) -> Result<()> {
    for sample in buf.iter_mut() {
        *sample = bs.read_bits_leq32_signed(bps)?;
    }

    Ok(())
}

fn decode_fixed<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    bps: u32,
    order: u32,
    block_len: usize,
    chan: &mut ChannelData,
) -> Result<()> {
    let order = order as usize;

    if order > block_len {
        return unparseable_error("predictor order exceeds the block length", bs.position());
    }

    // The first `order` samples are coded verbatim to warm up the predictor.
    decode_verbatim(bs, bps, &mut chan.output[..order])?;

    decode_residual(bs, order, block_len, chan)?;

    let ChannelData { output, residual, .. } = chan;

    restore_fixed_signal(&residual[..block_len - order], order, &mut output[..block_len]);

    Ok(())
}

fn decode_lpc<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    bps: u32,
    order: u32,
    block_len: usize,
    chan: &mut ChannelData,
) -> Result<()> {
    debug_assert!(order >= 1 && order as usize <= MAX_LPC_ORDER);

    let order = order as usize;

    if order > block_len {
        return unparseable_error("predictor order exceeds the block length", bs.position());
    }

    // The first `order` samples are coded verbatim to warm up the predictor.
    decode_verbatim(bs, bps, &mut chan.output[..order])?;

    // Quantized linear predictor (QLP) coefficient precision in bits, coded minus 1. The all-ones
    // pattern is reserved.
    let qlp_precision_enc = bs.read_bits_leq32(4)?;

    if qlp_precision_enc == 0xf {
        return lost_sync_error("qlp precision set to reserved value", bs.position());
    }

    let qlp_precision = qlp_precision_enc + 1;

    // The quantization shift applied to the predictor. The format codes it as a signed 5-bit
    // value, but a negative shift has no defined meaning.
    let qlp_shift = bs.read_bits_leq32_signed(5)?;

    if qlp_shift < 0 {
        return unparseable_error("qlp shift is negative", bs.position());
    }

    let mut qlp_coeffs = [0i32; MAX_LPC_ORDER];

    for coeff in qlp_coeffs.iter_mut().take(order) {
        *coeff = bs.read_bits_leq32_signed(qlp_precision)?;
    }

    decode_residual(bs, order, block_len, chan)?;

    let ChannelData { output, residual, .. } = chan;

    // The predicted term sums `order` products of `bps`-bit samples and `qlp_precision`-bit
    // coefficients. When the result can exceed 32 bits the accumulation must be performed at
    // 64 bits.
    let wide = bps + qlp_precision + ilog2_ceil(order as u32) > 32;

    if wide {
        restore_lpc_signal_wide(
            &residual[..block_len - order],
            &qlp_coeffs[..order],
            qlp_shift as u32,
            &mut output[..block_len],
        );
    }
    else {
        restore_lpc_signal(
            &residual[..block_len - order],
            &qlp_coeffs[..order],
            qlp_shift as u32,
            &mut output[..block_len],
        );
    }

    Ok(())
}

/// Decodes a partitioned residual of `block_len - pred_order` samples into the channel's residual
/// buffer, and records the per-partition parameters in the channel's Rice contents.
fn decode_residual<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    pred_order: usize,
    block_len: usize,
    chan: &mut ChannelData,
) -> Result<()> {
    let method_enc = bs.read_bits_leq32(2)?;

    // Two coding methods are defined, differing only in the bit width of the per-partition Rice
    // parameter. Note the width and use one code path for both.
    let param_bit_width = match method_enc {
        0x0 => 4,
        0x1 => 5,
        _ => {
            return unparseable_error("residual method set to reserved value", bs.position());
        }
    };

    let partition_order = bs.read_bits_leq32(4)?;

    // The residual is divided into 2^partition_order partitions of equal length, such that the
    // partition lengths sum to the block length. Since the warm-up samples are coded verbatim,
    // the first partition codes `pred_order` fewer samples.
    let n_partitions = 1usize << partition_order;
    let n_partition_samples = block_len >> partition_order;

    if pred_order > n_partition_samples {
        return unparseable_error(
            "residual partition too small for the predictor order",
            bs.position(),
        );
    }

    if n_partitions * n_partition_samples != block_len {
        return unparseable_error(
            "block length is not divisible into the coded partitions",
            bs.position(),
        );
    }

    let ChannelData { residual, rice, .. } = chan;

    rice.ensure_size(n_partitions);

    let residual = &mut residual[..block_len - pred_order];
    let (first, rest) = residual.split_at_mut(n_partition_samples - pred_order);

    decode_rice_partition(bs, param_bit_width, first, &mut rice.parameters[0], &mut rice.raw_bits[0])?;

    for (i, buf) in rest.chunks_mut(n_partition_samples).enumerate() {
        decode_rice_partition(
            bs,
            param_bit_width,
            buf,
            &mut rice.parameters[i + 1],
            &mut rice.raw_bits[i + 1],
        )?;
    }

    Ok(())
}

fn decode_rice_partition<S: ByteSource>(
    bs: &mut BitInputStream<S>,
    param_bit_width: u32,
    buf: &mut [i32],
    parameter: &mut u32,
    raw_bits: &mut u32,
) -> Result<()> {
    let rice_param = bs.read_bits_leq32(param_bit_width)?;

    *parameter = rice_param;
    *raw_bits = 0;

    // An all-ones parameter escapes the partition out of Rice coding: a 5-bit width follows, and
    // the partition's samples are stored as plain signed binary of that width.
    if rice_param < (1 << param_bit_width) - 1 {
        bs.read_rice_signed_block(buf, rice_param)?;
    }
    else {
        let width = bs.read_bits_leq32(5)?;

        *raw_bits = width;

        for sample in buf.iter_mut() {
            *sample = bs.read_bits_leq32_signed(width)?;
        }
    }

    Ok(())
}

/// Restores the signal from a fixed-order polynomial predictor. The first `order` samples of
/// `out` are the warm-up samples, and `residual` holds the remaining `out.len() - order` terms.
fn restore_fixed_signal(residual: &[i32], order: usize, out: &mut [i32]) {
    debug_assert!(order <= 4);
    debug_assert!(residual.len() + order == out.len());

    // Each fixed predictor is a hard-coded linear predictor with binomial coefficients. The
    // intermediate terms are computed at 64 bits, with the result truncating like every other
    // predictor.
    match order {
        // A 0th order predictor always predicts 0, so the signal is the residual itself.
        0 => out.copy_from_slice(residual),
        // A 1st order predictor repeats the previous sample: s(i) = s(i-1).
        1 => {
            for i in 1..out.len() {
                out[i] = residual[i - 1].wrapping_add(out[i - 1]);
            }
        }
        // A 2nd order predictor extrapolates linearly: s(i) = 2*s(i-1) - s(i-2).
        2 => {
            for i in 2..out.len() {
                let a = Wrapping(2) * Wrapping(i64::from(out[i - 1]));
                let b = Wrapping(-1) * Wrapping(i64::from(out[i - 2]));
                out[i] = (Wrapping(i64::from(residual[i - 2])) + a + b).0 as i32;
            }
        }
        // A 3rd order predictor: s(i) = 3*s(i-1) - 3*s(i-2) + s(i-3).
        3 => {
            for i in 3..out.len() {
                let a = Wrapping(3) * Wrapping(i64::from(out[i - 1]));
                let b = Wrapping(-3) * Wrapping(i64::from(out[i - 2]));
                let c = Wrapping(1) * Wrapping(i64::from(out[i - 3]));
                out[i] = (Wrapping(i64::from(residual[i - 3])) + a + b + c).0 as i32;
            }
        }
        // A 4th order predictor: s(i) = 4*s(i-1) - 6*s(i-2) + 4*s(i-3) - s(i-4).
        4 => {
            for i in 4..out.len() {
                let a = Wrapping(4) * Wrapping(i64::from(out[i - 1]));
                let b = Wrapping(-6) * Wrapping(i64::from(out[i - 2]));
                let c = Wrapping(4) * Wrapping(i64::from(out[i - 3]));
                let d = Wrapping(-1) * Wrapping(i64::from(out[i - 4]));
                out[i] = (Wrapping(i64::from(residual[i - 4])) + a + b + c + d).0 as i32;
            }
        }
        _ => unreachable!(),
    }
}

/// Restores the signal from a linear predictor using 32-bit accumulation. Only valid when the
/// operand widths guarantee the sum of products fits an i32.
fn restore_lpc_signal(residual: &[i32], coeffs: &[i32], shift: u32, out: &mut [i32]) {
    let order = coeffs.len();

    debug_assert!(residual.len() + order == out.len());

    for i in order..out.len() {
        let mut predicted = 0i32;

        for (j, &coeff) in coeffs.iter().enumerate() {
            predicted = predicted.wrapping_add(coeff.wrapping_mul(out[i - 1 - j]));
        }

        out[i] = residual[i - order].wrapping_add(predicted >> shift);
    }
}

/// Restores the signal from a linear predictor using 64-bit accumulation.
fn restore_lpc_signal_wide(residual: &[i32], coeffs: &[i32], shift: u32, out: &mut [i32]) {
    let order = coeffs.len();

    debug_assert!(residual.len() + order == out.len());

    for i in order..out.len() {
        let mut predicted = 0i64;

        for (j, &coeff) in coeffs.iter().enumerate() {
            predicted += i64::from(coeff) * i64::from(out[i - 1 - j]);
        }

        out[i] = residual[i - order].wrapping_add((predicted >> shift) as i32);
    }
}
