// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the error and result types shared across Partita.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Partita.
///
/// Except for `IoError`, every variant carries the bit offset, relative to the start of the
/// stream, at which the error was detected.
#[derive(Debug)]
pub enum Error {
    /// The byte source ended in the middle of a stream element.
    UnexpectedEnd { pos: u64 },
    /// The stream does not begin with the `fLaC` marker.
    BadMagic { pos: u64 },
    /// A metadata block was structurally malformed. Fatal for the stream.
    BadMetadata { reason: &'static str, pos: u64 },
    /// A reserved bit pattern was encountered where the format forbids one. The stream may be
    /// recovered by resynchronizing to the next frame.
    LostSync { reason: &'static str, pos: u64 },
    /// A reserved subframe or entropy coding was encountered. The current frame cannot be
    /// decoded, but the stream may be recovered by resynchronizing to the next frame.
    Unparseable { reason: &'static str, pos: u64 },
    /// The CRC-8 stored in a frame header does not match the CRC-8 computed over it.
    BadHeaderCrc { expected: u8, computed: u8, pos: u64 },
    /// The CRC-16 stored in a frame footer does not match the CRC-16 computed over the frame.
    BadFrameCrc { expected: u16, computed: u16, pos: u64 },
    /// An IO error occurred while reading the underlying byte source.
    IoError(io::Error),
}

impl Error {
    /// Returns true if the error only damages the current frame and the stream may be recovered
    /// by resynchronizing to the next frame. Metadata and stream-structure errors are fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::LostSync { .. }
                | Error::Unparseable { .. }
                | Error::BadHeaderCrc { .. }
                | Error::BadFrameCrc { .. }
        )
    }

    /// The bit offset at which the error was detected, if known.
    pub fn pos(&self) -> Option<u64> {
        match self {
            Error::UnexpectedEnd { pos } => Some(*pos),
            Error::BadMagic { pos } => Some(*pos),
            Error::BadMetadata { pos, .. } => Some(*pos),
            Error::LostSync { pos, .. } => Some(*pos),
            Error::Unparseable { pos, .. } => Some(*pos),
            Error::BadHeaderCrc { pos, .. } => Some(*pos),
            Error::BadFrameCrc { pos, .. } => Some(*pos),
            Error::IoError(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEnd { pos } => {
                write!(f, "unexpected end of stream at bit {}", pos)
            }
            Error::BadMagic { pos } => {
                write!(f, "stream marker not found at bit {}", pos)
            }
            Error::BadMetadata { reason, pos } => {
                write!(f, "malformed metadata: {} (bit {})", reason, pos)
            }
            Error::LostSync { reason, pos } => {
                write!(f, "lost synchronization: {} (bit {})", reason, pos)
            }
            Error::Unparseable { reason, pos } => {
                write!(f, "unparseable stream: {} (bit {})", reason, pos)
            }
            Error::BadHeaderCrc { expected, computed, pos } => {
                write!(
                    f,
                    "frame header crc mismatch: expected {:#04x}, computed {:#04x} (bit {})",
                    expected, computed, pos
                )
            }
            Error::BadFrameCrc { expected, computed, pos } => {
                write!(
                    f,
                    "frame crc mismatch: expected {:#06x}, computed {:#06x} (bit {})",
                    expected, computed, pos
                )
            }
            Error::IoError(err) => {
                write!(f, "io error: {}", err)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience constructor for a malformed metadata error.
pub fn bad_metadata_error<T>(reason: &'static str, pos: u64) -> Result<T> {
    Err(Error::BadMetadata { reason, pos })
}

/// Convenience constructor for a lost synchronization error.
pub fn lost_sync_error<T>(reason: &'static str, pos: u64) -> Result<T> {
    Err(Error::LostSync { reason, pos })
}

/// Convenience constructor for an unparseable stream error.
pub fn unparseable_error<T>(reason: &'static str, pos: u64) -> Result<T> {
    Err(Error::Unparseable { reason, pos })
}

/// Convenience constructor for an end-of-stream error.
pub fn end_of_stream_error<T>(pos: u64) -> Result<T> {
    Err(Error::UnexpectedEnd { pos })
}
