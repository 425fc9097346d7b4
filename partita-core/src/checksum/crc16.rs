// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lazy_static::lazy_static;

lazy_static! {
    static ref CRC16_TABLE: [u16; 256] = {
        let mut table = [0u16; 256];

        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u16) << 8;

            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
            }

            *entry = crc;
        }

        table
    };
}

/// `Crc16Ansi` computes the CRC-16 error detection code using the ANSI generator polynomial
/// of 0x8005 with no bit reflection.
#[derive(Clone)]
pub struct Crc16Ansi {
    crc: u16,
}

impl Crc16Ansi {
    /// Instantiate a new CRC-16 engine seeded with the given initial state.
    pub fn new(seed: u16) -> Crc16Ansi {
        Crc16Ansi { crc: seed }
    }

    #[inline(always)]
    pub fn process_byte(&mut self, byte: u8) {
        self.crc = (self.crc << 8) ^ CRC16_TABLE[usize::from((self.crc >> 8) as u8 ^ byte)];
    }

    pub fn process_buf_bytes(&mut self, buf: &[u8]) {
        for &byte in buf {
            self.process_byte(byte);
        }
    }

    /// Get the current state of the error detection code.
    pub fn crc(&self) -> u16 {
        self.crc
    }
}

#[cfg(test)]
mod tests {
    use super::Crc16Ansi;

    #[test]
    fn verify_crc16_ansi() {
        let mut crc16 = Crc16Ansi::new(0);
        crc16.process_buf_bytes(b"123456789");
        assert_eq!(crc16.crc(), 0xfee8);
    }

    #[test]
    fn verify_crc16_ansi_seeded() {
        // Processing a prefix, reading out the state, then reseeding a fresh engine with it must
        // be indistinguishable from processing the whole buffer at once.
        let mut whole = Crc16Ansi::new(0);
        whole.process_buf_bytes(b"123456789");

        let mut prefix = Crc16Ansi::new(0);
        prefix.process_buf_bytes(b"1234");

        let mut rest = Crc16Ansi::new(prefix.crc());
        rest.process_buf_bytes(b"56789");

        assert_eq!(whole.crc(), rest.crc());
    }
}
