// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::min;

use crate::checksum::{Crc16Ansi, Crc8Ccitt};
use crate::errors::{end_of_stream_error, Result};
use crate::io::ByteSource;
use crate::util::bits::{sign_extend_leq32_to_i32, sign_extend_leq64_to_i64};

/// The size of the internal refill buffer.
const BUFFER_CHUNK_SIZE: usize = 1024;

/// Converts a Rice-coded unsigned value into its signed form.
///
/// Input  => 0  1  2  3  4  5 ...
/// Output => 0 -1  1 -2  2 -3 ...
#[inline(always)]
pub fn rice_signed_to_i32(word: u32) -> i32 {
    // For even inputs the result is word / 2. For odd inputs it is -(word / 2) - 1. Build a mask
    // of all-ones for odd inputs and all-zeroes for even inputs from the least-significant bit,
    // then XOR it against the halved input to apply the negation branchlessly.
    let div2 = (word >> 1) as i32;
    let sign = -((word & 0x1) as i32);
    div2 ^ sign
}

/// `BitInputStream` layers bit-granular reads on top of a [`ByteSource`].
///
/// Bits are consumed in most-significant-bit-first order within each byte. The stream maintains
/// running CRC-16 and CRC-8 error detection codes: a byte is folded into both codes at the moment
/// its final bit is consumed, so after reading up to a byte-aligned position the codes cover
/// exactly the consumed bytes. Reads documented as `no_crc` bypass the codes entirely.
///
/// The total number of bits consumed is tracked exactly on every read path and is available
/// through [`BitInputStream::position`].
pub struct BitInputStream<S: ByteSource> {
    source: S,
    buf: Box<[u8]>,
    /// Index one past the last valid byte in `buf`.
    put: usize,
    /// Index of the byte currently being consumed.
    get: usize,
    /// Number of bits of `buf[get]` already consumed, in the range [0, 8).
    bit: u32,
    /// Total number of bits consumed since instantiation.
    total_bits: u64,
    crc16: Crc16Ansi,
    crc8: Crc8Ccitt,
}

impl<S: ByteSource> BitInputStream<S> {
    /// Instantiate a new `BitInputStream` over the given source.
    pub fn new(source: S) -> Self {
        BitInputStream {
            source,
            buf: vec![0u8; BUFFER_CHUNK_SIZE].into_boxed_slice(),
            put: 0,
            get: 0,
            bit: 0,
            total_bits: 0,
            crc16: Crc16Ansi::new(0),
            crc8: Crc8Ccitt::new(0),
        }
    }

    /// The bit offset of the next unconsumed bit, relative to the start of the stream.
    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.total_bits
    }

    /// The total number of bytes read, with a partially consumed byte counting as read.
    pub fn bytes_read(&self) -> u64 {
        (self.total_bits + 7) / 8
    }

    /// Returns true if the consumed bits are at a byte boundary.
    #[inline(always)]
    pub fn is_byte_aligned(&self) -> bool {
        self.bit == 0
    }

    /// The number of bits that must be consumed to reach the next byte boundary. Returns 0 when
    /// already aligned.
    #[inline(always)]
    pub fn bits_to_byte_alignment(&self) -> u32 {
        (8 - self.bit) & 0x7
    }

    /// Reset the running CRC-16 to the given state.
    pub fn reset_crc16(&mut self, seed: u16) {
        self.crc16 = Crc16Ansi::new(seed);
    }

    /// The current state of the running CRC-16.
    pub fn crc16(&self) -> u16 {
        self.crc16.crc()
    }

    /// Reset the running CRC-8 to the given state.
    pub fn reset_crc8(&mut self, seed: u8) {
        self.crc8 = Crc8Ccitt::new(seed);
    }

    /// The current state of the running CRC-8.
    pub fn crc8(&self) -> u8 {
        self.crc8.crc()
    }

    /// Discards all buffered bytes. Call after the underlying source has been repositioned out of
    /// band, e.g. by `mark`/`reset`.
    pub fn reset_buffer(&mut self) {
        self.put = 0;
        self.get = 0;
        self.bit = 0;
    }

    /// The number of unconsumed bits currently buffered.
    #[inline(always)]
    fn bits_avail(&self) -> u64 {
        ((self.put - self.get) as u64) * 8 - u64::from(self.bit)
    }

    /// Pulls more bytes from the source into the internal buffer. Unconsumed bytes, including a
    /// partially consumed one, are first compacted to the front of the buffer.
    fn fetch(&mut self) -> Result<()> {
        if self.get > 0 {
            self.buf.copy_within(self.get..self.put, 0);
            self.put -= self.get;
            self.get = 0;
        }

        let read = self.source.read_buf(&mut self.buf[self.put..])?;

        if read == 0 {
            return end_of_stream_error(self.total_bits);
        }

        self.put += read;

        Ok(())
    }

    /// Consumes `num` bits of the current byte. If this exhausts the byte it is folded into the
    /// running error detection codes.
    #[inline(always)]
    fn consume_in_byte(&mut self, num: u32) {
        debug_assert!(num <= 8 - self.bit);

        self.bit += num;
        self.total_bits += u64::from(num);

        if self.bit == 8 {
            let byte = self.buf[self.get];
            self.crc16.process_byte(byte);
            self.crc8.process_byte(byte);
            self.get += 1;
            self.bit = 0;
        }
    }

    /// Read a single bit.
    #[inline(always)]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits_leq32(1)? != 0)
    }

    /// Reads up to 32 bits and interprets them as an unsigned integer.
    pub fn read_bits_leq32(&mut self, bit_width: u32) -> Result<u32> {
        debug_assert!(bit_width <= u32::BITS);

        let mut bits = 0u64;
        let mut remaining = bit_width;

        while remaining > 0 {
            if self.get == self.put {
                self.fetch()?;
            }

            let take = min(8 - self.bit, remaining);
            let chunk = (u32::from(self.buf[self.get]) >> (8 - self.bit - take)) & ((1 << take) - 1);

            bits = (bits << take) | u64::from(chunk);

            self.consume_in_byte(take);
            remaining -= take;
        }

        Ok(bits as u32)
    }

    /// Reads up to 32 bits and interprets them as a signed two's complement integer.
    #[inline(always)]
    pub fn read_bits_leq32_signed(&mut self, bit_width: u32) -> Result<i32> {
        let value = self.read_bits_leq32(bit_width)?;
        Ok(sign_extend_leq32_to_i32(value, bit_width))
    }

    /// Reads up to 64 bits and interprets them as an unsigned integer.
    pub fn read_bits_leq64(&mut self, bit_width: u32) -> Result<u64> {
        debug_assert!(bit_width <= u64::BITS);

        let mut bits = 0u64;
        let mut remaining = bit_width;

        while remaining > 0 {
            if self.get == self.put {
                self.fetch()?;
            }

            let take = min(8 - self.bit, remaining);
            let chunk = (u32::from(self.buf[self.get]) >> (8 - self.bit - take)) & ((1 << take) - 1);

            bits = (bits << take) | u64::from(chunk);

            self.consume_in_byte(take);
            remaining -= take;
        }

        Ok(bits)
    }

    /// Reads up to 64 bits and interprets them as a signed two's complement integer.
    #[inline(always)]
    pub fn read_bits_leq64_signed(&mut self, bit_width: u32) -> Result<i64> {
        let value = self.read_bits_leq64(bit_width)?;
        Ok(sign_extend_leq64_to_i64(value, bit_width))
    }

    /// Reads and returns a unary zeros encoded integer: the number of 0 bits preceding the next
    /// 1 bit. The terminating 1 bit is consumed.
    pub fn read_unary_zeros(&mut self) -> Result<u32> {
        let mut num = 0u32;

        loop {
            if self.get == self.put {
                self.fetch()?;
            }

            // The unconsumed bits of the current byte, left-aligned.
            let rem = self.buf[self.get] << self.bit;

            if rem == 0 {
                // All remaining bits of this byte are 0.
                num += 8 - self.bit;
                self.consume_in_byte(8 - self.bit);
            }
            else {
                let n_zeros = rem.leading_zeros();
                num += n_zeros;
                self.consume_in_byte(n_zeros + 1);
                return Ok(num);
            }
        }
    }

    /// Peeks at the next 8 bits without consuming them or updating the error detection codes.
    fn peek_bits_8(&mut self) -> Result<u32> {
        while self.bits_avail() < 8 {
            self.fetch()?;
        }

        if self.bit == 0 {
            Ok(u32::from(self.buf[self.get]))
        }
        else {
            let window =
                (u32::from(self.buf[self.get]) << 8) | u32::from(self.buf[self.get + 1]);
            Ok((window >> (8 - self.bit)) & 0xff)
        }
    }

    /// Decodes an extended UTF-8 coded unsigned integer of up to 31 bits (up to 6 total bytes).
    ///
    /// A malformed sequence yields the all-ones sentinel, `u32::MAX`. When a continuation byte is
    /// malformed it is left unconsumed.
    pub fn read_utf8_u32(&mut self) -> Result<u32> {
        let byte0 = self.read_bits_leq32(8)?;

        // The number of leading 1s in the first byte, terminated by a 0, gives the number of
        // continuation bytes in the sequence.
        let (mut value, n_cont) = match byte0 {
            0x00..=0x7f => return Ok(byte0),
            0xc0..=0xdf => (byte0 & 0x1f, 1),
            0xe0..=0xef => (byte0 & 0x0f, 2),
            0xf0..=0xf7 => (byte0 & 0x07, 3),
            0xf8..=0xfb => (byte0 & 0x03, 4),
            0xfc..=0xfd => (byte0 & 0x01, 5),
            _ => return Ok(u32::MAX),
        };

        for _ in 0..n_cont {
            // Each continuation byte must match 0b10xx_xxxx and contributes 6 bits.
            if self.peek_bits_8()? & 0xc0 != 0x80 {
                return Ok(u32::MAX);
            }

            let byte = self.read_bits_leq32(8)?;
            value = (value << 6) | (byte & 0x3f);
        }

        Ok(value)
    }

    /// Decodes an extended UTF-8 coded unsigned integer of up to 36 bits (up to 7 total bytes).
    ///
    /// A malformed sequence yields the all-ones sentinel, `u64::MAX`. When a continuation byte is
    /// malformed it is left unconsumed.
    pub fn read_utf8_u64(&mut self) -> Result<u64> {
        let byte0 = self.read_bits_leq32(8)?;

        let (mut value, n_cont) = match byte0 {
            0x00..=0x7f => return Ok(u64::from(byte0)),
            0xc0..=0xdf => (u64::from(byte0 & 0x1f), 1),
            0xe0..=0xef => (u64::from(byte0 & 0x0f), 2),
            0xf0..=0xf7 => (u64::from(byte0 & 0x07), 3),
            0xf8..=0xfb => (u64::from(byte0 & 0x03), 4),
            0xfc..=0xfd => (u64::from(byte0 & 0x01), 5),
            0xfe => (0, 6),
            _ => return Ok(u64::MAX),
        };

        for _ in 0..n_cont {
            if self.peek_bits_8()? & 0xc0 != 0x80 {
                return Ok(u64::MAX);
            }

            let byte = self.read_bits_leq32(8)?;
            value = (value << 6) | u64::from(byte & 0x3f);
        }

        Ok(value)
    }

    /// Reads bytes into `dst` starting from a byte-aligned position. The bytes are *not* folded
    /// into the running error detection codes.
    pub fn read_buf_aligned_no_crc(&mut self, dst: &mut [u8]) -> Result<()> {
        debug_assert!(self.is_byte_aligned());

        let mut pos = 0;

        while pos < dst.len() {
            if self.get == self.put {
                self.fetch()?;
            }

            let chunk = min(dst.len() - pos, self.put - self.get);

            dst[pos..pos + chunk].copy_from_slice(&self.buf[self.get..self.get + chunk]);

            self.get += chunk;
            self.total_bits += (chunk as u64) * 8;
            pos += chunk;
        }

        Ok(())
    }

    /// Discards whole bytes starting from a byte-aligned position without folding them into the
    /// running error detection codes.
    fn discard_bytes_aligned_no_crc(&mut self, mut count: u64) -> Result<()> {
        debug_assert!(self.is_byte_aligned());

        while count > 0 {
            if self.get == self.put {
                self.fetch()?;
            }

            let chunk = min(count, (self.put - self.get) as u64) as usize;

            self.get += chunk;
            self.total_bits += (chunk as u64) * 8;
            count -= chunk as u64;
        }

        Ok(())
    }

    /// Skips over the given number of bits. Any bits required to reach or leave a byte boundary
    /// are consumed through the normal path and therefore fold into the error detection codes;
    /// whole bytes in between are discarded without touching the codes.
    pub fn skip_bits_no_crc(&mut self, mut num_bits: u64) -> Result<()> {
        if num_bits == 0 {
            return Ok(());
        }

        if self.bit != 0 {
            let take = min(u64::from(8 - self.bit), num_bits);
            self.read_bits_leq32(take as u32)?;
            num_bits -= take;
        }

        let bytes = num_bits / 8;

        if bytes > 0 {
            self.discard_bytes_aligned_no_crc(bytes)?;
            num_bits %= 8;
        }

        if num_bits > 0 {
            self.read_bits_leq32(num_bits as u32)?;
        }

        Ok(())
    }

    /// Decodes a block of Rice-coded signed values with the given parameter into `dst`.
    ///
    /// Each value is an all-zeros unary prefix (the most-significant bits), a terminating 1 bit,
    /// and `param` binary least-significant bits; the folded unsigned value is mapped onto the
    /// signed integers by [`rice_signed_to_i32`].
    pub fn read_rice_signed_block(&mut self, dst: &mut [i32], param: u32) -> Result<()> {
        for sample in dst.iter_mut() {
            let msbs = self.read_unary_zeros()?;
            let lsbs = self.read_bits_leq32(param)?;

            *sample = rice_signed_to_i32((msbs << param) | lsbs);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ReadOnlySource;
    use std::io::Cursor;

    fn make_stream(bytes: &[u8]) -> BitInputStream<ReadOnlySource<Cursor<Vec<u8>>>> {
        BitInputStream::new(ReadOnlySource::new(Cursor::new(bytes.to_vec())))
    }

    /// Packs bits most-significant-bit-first into a byte vector.
    struct BitVecWriter {
        bytes: Vec<u8>,
        acc: u8,
        n_bits: u32,
    }

    impl BitVecWriter {
        fn new() -> Self {
            BitVecWriter { bytes: Vec::new(), acc: 0, n_bits: 0 }
        }

        fn put_bits(&mut self, value: u64, width: u32) {
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

        fn finish(mut self) -> Vec<u8> {
            if self.n_bits > 0 {
                self.bytes.push(self.acc << (8 - self.n_bits));
            }
            self.bytes
        }
    }

    fn utf8_encode(value: u64, out: &mut Vec<u8>) {
        let n_cont = match value {
            0x00..=0x7f => {
                out.push(value as u8);
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

        out.push(prefix | ((value >> (6 * n_cont)) & data_mask) as u8);

        for i in (0..n_cont).rev() {
            out.push(0x80 | ((value >> (6 * i)) & 0x3f) as u8);
        }
    }

    #[test]
    fn verify_read_bits_leq32() {
        let mut bs = make_stream(&[0b1010_1100, 0b0110_0101, 0xff, 0x00]);

        assert_eq!(bs.read_bits_leq32(3).unwrap(), 0b101);
        assert_eq!(bs.read_bits_leq32(0).unwrap(), 0);
        assert_eq!(bs.read_bits_leq32(5).unwrap(), 0b01100);
        assert_eq!(bs.read_bits_leq32(16).unwrap(), 0b0110_0101_1111_1111);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0);

        // The source is exhausted.
        assert!(bs.read_bits_leq32(1).is_err());
    }

    #[test]
    fn verify_read_bits_leq64() {
        let mut bs = make_stream(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);

        assert_eq!(bs.read_bits_leq64(64).unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(bs.read_bits_leq64(8).unwrap(), 0x09);
    }

    #[test]
    fn verify_read_bits_signed() {
        // A set sign bit followed by all zeros is the most negative value of a width.
        for width in 1..=32 {
            let mut bs = make_stream(&[0x80, 0x00, 0x00, 0x00]);

            let expected = -2i64.pow(width - 1);
            assert_eq!(i64::from(bs.read_bits_leq32_signed(width).unwrap()), expected);
        }

        // All ones is -1 at every width.
        for width in 1..=32 {
            let mut bs = make_stream(&[0xff, 0xff, 0xff, 0xff]);
            assert_eq!(bs.read_bits_leq32_signed(width).unwrap(), -1);
        }
    }

    #[test]
    fn verify_read_unary_zeros() {
        let mut bs = make_stream(&[0b0000_0001]);
        assert_eq!(bs.read_unary_zeros().unwrap(), 7);

        // A unary value spanning a byte boundary.
        let mut bs = make_stream(&[0x00, 0b0000_1000]);
        assert_eq!(bs.read_unary_zeros().unwrap(), 12);

        // Consecutive unary values.
        let mut bs = make_stream(&[0b1010_0100, 0b0100_0000]);
        assert_eq!(bs.read_unary_zeros().unwrap(), 0);
        assert_eq!(bs.read_unary_zeros().unwrap(), 1);
        assert_eq!(bs.read_unary_zeros().unwrap(), 2);
        assert_eq!(bs.read_unary_zeros().unwrap(), 3);
    }

    #[test]
    fn verify_read_utf8() {
        let mut encoded = Vec::new();

        let values: &[u64] = &[
            0,
            36,
            127,
            128,
            162,
            2361,
            8364,
            66376,
            0x1f_ffff,
            0x20_0000,
            0x7fff_ffff,
            0x8000_0000,
            0xf_ffff_ffff,
        ];

        for &value in values {
            utf8_encode(value, &mut encoded);
        }

        let mut bs = make_stream(&encoded);

        for &value in values {
            assert_eq!(bs.read_utf8_u64().unwrap(), value);
        }

        // 0xff can never start a sequence. A bad continuation byte yields the sentinel.
        let mut bs = make_stream(&[0xff, 0xc2, 0x00]);
        assert_eq!(bs.read_utf8_u64().unwrap(), u64::MAX);
        assert_eq!(bs.read_utf8_u64().unwrap(), u64::MAX);

        // The 32-bit reader rejects 7-byte sequences.
        let mut encoded = Vec::new();
        utf8_encode(0x8000_0000, &mut encoded);
        let mut bs = make_stream(&encoded);
        assert_eq!(bs.read_utf8_u32().unwrap(), u32::MAX);
    }

    #[test]
    fn verify_utf8_invalid_continuation_is_unconsumed() {
        // The second byte is not a continuation byte, and must remain readable.
        let mut bs = make_stream(&[0xc2, 0x7f]);

        assert_eq!(bs.read_utf8_u32().unwrap(), u32::MAX);
        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0x7f);
    }

    #[test]
    fn verify_read_rice_signed_block() {
        let values: &[i32] = &[0, -1, 1, -2, 2, -14, 33, 0];
        let param = 2;

        let mut bw = BitVecWriter::new();

        for &value in values {
            let uval =
                if value >= 0 { (value as u32) << 1 } else { (((-(value + 1)) as u32) << 1) | 1 };

            // Unary most-significant bits, then `param` binary least-significant bits.
            bw.put_bits(1, (uval >> param) + 1);
            bw.put_bits(u64::from(uval) & ((1 << param) - 1), param);
        }

        let encoded = bw.finish();

        let mut bs = make_stream(&encoded);
        let mut decoded = vec![0i32; values.len()];

        bs.read_rice_signed_block(&mut decoded, param).unwrap();

        assert_eq!(decoded, values);
    }

    #[test]
    fn verify_crc16_folds_on_byte_completion() {
        let bytes = [0xde, 0xad, 0xbe, 0xef];
        let mut bs = make_stream(&bytes);

        bs.reset_crc16(0);

        // A partially consumed byte must not yet be folded into the code.
        bs.read_bits_leq32(4).unwrap();
        assert_eq!(bs.crc16(), 0);

        // Completing the byte folds it.
        bs.read_bits_leq32(4).unwrap();

        let mut expected = Crc16Ansi::new(0);
        expected.process_byte(0xde);
        assert_eq!(bs.crc16(), expected.crc());

        // Reads that straddle byte boundaries fold each byte as it completes.
        bs.read_bits_leq32(12).unwrap();
        expected.process_byte(0xad);
        assert_eq!(bs.crc16(), expected.crc());

        bs.read_bits_leq32(12).unwrap();
        expected.process_byte(0xbe);
        expected.process_byte(0xef);
        assert_eq!(bs.crc16(), expected.crc());
    }

    #[test]
    fn verify_aligned_reads_bypass_crc() {
        let mut bs = make_stream(&[0x01, 0x02, 0x03, 0x04]);

        bs.reset_crc16(0);

        let mut dst = [0u8; 2];
        bs.read_buf_aligned_no_crc(&mut dst).unwrap();
        assert_eq!(dst, [0x01, 0x02]);
        assert_eq!(bs.crc16(), 0);

        bs.skip_bits_no_crc(8).unwrap();
        assert_eq!(bs.crc16(), 0);

        assert_eq!(bs.read_bits_leq32(8).unwrap(), 0x04);
    }

    #[test]
    fn verify_position_accounting() {
        let mut bs = make_stream(&[0x12, 0x34, 0x56, 0x78, 0x9a, 0x21, 0x80, 0x81]);

        assert_eq!(bs.position(), 0);

        bs.read_bits_leq32(3).unwrap();
        assert_eq!(bs.position(), 3);
        assert!(!bs.is_byte_aligned());
        assert_eq!(bs.bits_to_byte_alignment(), 5);

        bs.read_bits_leq32(5).unwrap();
        assert_eq!(bs.position(), 8);
        assert!(bs.is_byte_aligned());
        assert_eq!(bs.bits_to_byte_alignment(), 0);

        bs.skip_bits_no_crc(13).unwrap();
        assert_eq!(bs.position(), 21);

        bs.read_bits_leq64(19).unwrap();
        assert_eq!(bs.position(), 40);

        // Rice decoding must account for every consumed bit: 0x21 0x80 0x81 decodes (param 0) as
        // the unary values 2, 4, 0, 7, and 6, spanning exactly the last three bytes.
        let mut dst = [0i32; 5];
        bs.read_rice_signed_block(&mut dst, 0).unwrap();
        assert_eq!(dst, [1, 2, 0, -4, 3]);
        assert_eq!(bs.position(), 64);
        assert_eq!(bs.bytes_read(), 8);
    }

    #[test]
    fn verify_rice_signed_to_i32() {
        assert_eq!(rice_signed_to_i32(0), 0);
        assert_eq!(rice_signed_to_i32(1), -1);
        assert_eq!(rice_signed_to_i32(2), 1);
        assert_eq!(rice_signed_to_i32(3), -2);
        assert_eq!(rice_signed_to_i32(4), 2);
        assert_eq!(rice_signed_to_i32(5), -3);
        assert_eq!(rice_signed_to_i32(u32::MAX), i32::MIN);
    }

    #[test]
    fn verify_end_of_source() {
        let mut bs = make_stream(&[0xff]);

        bs.read_bits_leq32(8).unwrap();

        match bs.read_bits_leq32(1) {
            Err(crate::errors::Error::UnexpectedEnd { pos }) => assert_eq!(pos, 8),
            _ => panic!("expected end of stream"),
        }
    }
}
