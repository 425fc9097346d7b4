// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements byte sources and bit-level reading.
//!
//! A [`ByteSource`] is a pull-style producer of bytes. The [`BitInputStream`] layers bit-granular
//! reads with most-significant-bit-first order on top of any `ByteSource`, and maintains the
//! running error detection codes required to validate frame-structured streams.

use std::io;
use std::io::{Read, Seek, SeekFrom};

mod bit;

pub use bit::BitInputStream;

/// `ByteSource` is a pull-style byte producer.
///
/// Sources may optionally support marking a position and later resetting to it; this capability
/// is only required by consumers that probe the head of a stream without consuming it.
pub trait ByteSource: Send {
    /// Reads up-to the number of bytes required to fill `buf`, returning the number of bytes
    /// read. A return value of 0 indicates the end of the source.
    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discards the specified number of bytes from the source.
    fn skip_bytes(&mut self, mut count: u64) -> io::Result<()> {
        let mut scratch = [0u8; 1024];

        while count > 0 {
            let len = count.min(scratch.len() as u64) as usize;
            let read = self.read_buf(&mut scratch[..len])?;

            if read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "skip past end of source"));
            }

            count -= read as u64;
        }

        Ok(())
    }

    /// Returns true if the source supports `mark` and `reset`.
    fn is_markable(&self) -> bool {
        false
    }

    /// Records the current position so that a later `reset` returns to it.
    fn mark(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support marking"))
    }

    /// Repositions the source to the most recently marked position.
    fn reset(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support marking"))
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    #[inline(always)]
    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (*self).read_buf(buf)
    }

    fn skip_bytes(&mut self, count: u64) -> io::Result<()> {
        (*self).skip_bytes(count)
    }

    fn is_markable(&self) -> bool {
        (**self).is_markable()
    }

    fn mark(&mut self) -> io::Result<()> {
        (*self).mark()
    }

    fn reset(&mut self) -> io::Result<()> {
        (*self).reset()
    }
}

/// `SeekableSource` adapts any reader implementing [`std::io::Read`] and [`std::io::Seek`] into
/// a markable [`ByteSource`]. Skips are implemented as seeks.
pub struct SeekableSource<R: Read + Seek> {
    inner: R,
    mark_pos: Option<u64>,
}

impl<R: Read + Seek + Send> SeekableSource<R> {
    /// Wraps the provided reader, taking ownership of it.
    pub fn new(inner: R) -> Self {
        SeekableSource { inner, mark_pos: None }
    }

    /// A shared reference to the wrapped reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consumes the adapter and returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek + Send> ByteSource for SeekableSource<R> {
    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn skip_bytes(&mut self, count: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Current(count as i64))?;
        Ok(())
    }

    fn is_markable(&self) -> bool {
        true
    }

    fn mark(&mut self) -> io::Result<()> {
        self.mark_pos = Some(self.inner.stream_position()?);
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        match self.mark_pos {
            Some(pos) => {
                self.inner.seek(SeekFrom::Start(pos))?;
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "no position marked")),
        }
    }
}

/// `ReadOnlySource` wraps any source implementing [`std::io::Read`] in an unmarkable
/// [`ByteSource`].
pub struct ReadOnlySource<R: Read> {
    inner: R,
}

impl<R: Read + Send> ReadOnlySource<R> {
    /// Wraps the provided reader, taking ownership of it.
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    /// A shared reference to the wrapped reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Consumes the adapter and returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Send> ByteSource for ReadOnlySource<R> {
    fn read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
