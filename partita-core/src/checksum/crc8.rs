// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use lazy_static::lazy_static;

lazy_static! {
    static ref CRC8_TABLE: [u8; 256] = {
        let mut table = [0u8; 256];

        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u8;

            for _ in 0..8 {
                crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
            }

            *entry = crc;
        }

        table
    };
}

/// `Crc8Ccitt` computes the CRC-8 error detection code using the CCITT generator polynomial
/// of 0x07 with no bit reflection.
#[derive(Clone)]
pub struct Crc8Ccitt {
    crc: u8,
}

impl Crc8Ccitt {
    /// Instantiate a new CRC-8 engine seeded with the given initial state.
    pub fn new(seed: u8) -> Crc8Ccitt {
        Crc8Ccitt { crc: seed }
    }

    #[inline(always)]
    pub fn process_byte(&mut self, byte: u8) {
        self.crc = CRC8_TABLE[usize::from(self.crc ^ byte)];
    }

    pub fn process_buf_bytes(&mut self, buf: &[u8]) {
        for &byte in buf {
            self.process_byte(byte);
        }
    }

    /// Get the current state of the error detection code.
    pub fn crc(&self) -> u8 {
        self.crc
    }
}
