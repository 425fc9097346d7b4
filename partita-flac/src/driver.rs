// Partita
// Copyright (c) 2026 The Project Partita Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use partita_core::audio::PcmBuffer;
use partita_core::errors::{bad_metadata_error, Error, Result};
use partita_core::io::{BitInputStream, ByteSource};

use log::{debug, info, warn};

use crate::channel::ChannelData;
use crate::decoder::read_frame;
use crate::frame::sync_frame;
use crate::metadata::{
    read_application_block, read_seek_table_block, MetadataBlockHeader, MetadataBlockType,
    SeekTable, StreamInfo, VendorApplication,
};

/// The marker that opens every FLAC stream, "fLaC" in ASCII.
const FLAC_STREAM_MARKER: [u8; 4] = *b"fLaC";

/// `DecoderOptions` carries the caller-tunable decoding policies.
#[derive(Copy, Clone, Debug, Default)]
pub struct DecoderOptions {
    /// Abort decoding when a frame is damaged (a checksum mismatch or a reserved bit pattern),
    /// instead of discarding the frame and resynchronizing to the next one.
    pub abort_on_bad_frame: bool,
}

/// The state of a [`StreamDecoder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// Searching for the start of stream marker.
    SearchForMetadata,
    /// Reading metadata blocks.
    ReadMetadata,
    /// Searching for the synchronization code of the next frame.
    SearchForFrameSync,
    /// Decoding a frame.
    ReadFrame,
    /// The byte source is exhausted.
    EndOfStream,
    /// Decoding was aborted by a consumer.
    Aborted,
}

/// A consumer of decoded stream events.
///
/// Both callbacks are invoked synchronously on the decoding thread. Borrowed arguments are only
/// valid for the duration of the call.
pub trait PcmProcessor: Send + Sync {
    /// Called once per stream with the parsed stream information block.
    fn process_stream_info(&self, info: &StreamInfo);

    /// Called once per decoded frame with the reconstructed samples, channel-interleaved and
    /// packed as little-endian bytes at the stream's sample width rounded up to whole bytes.
    fn process_pcm(&self, pcm: &[u8]);
}

#[derive(Default)]
struct ProcessorSetInner {
    processors: Mutex<Vec<Arc<dyn PcmProcessor>>>,
    abort: AtomicBool,
}

/// A shared registry of [`PcmProcessor`]s.
///
/// The registry may be cloned and used from any thread: additions and removals take effect for
/// the next dispatch. Dispatch itself snapshots the registered processors and then releases the
/// registry, so a processor may freely register or unregister processors, or request an abort,
/// from within a callback. The dispatch order across processors is unspecified.
#[derive(Clone, Default)]
pub struct ProcessorSet {
    inner: Arc<ProcessorSetInner>,
}

impl ProcessorSet {
    pub fn new() -> ProcessorSet {
        Default::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn PcmProcessor>>> {
        match self.inner.processors.lock() {
            Ok(guard) => guard,
            // A processor panicked during a previous dispatch. The registry itself is still
            // consistent, so continue with the poisoned contents.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a processor to the registry.
    pub fn add(&self, processor: Arc<dyn PcmProcessor>) {
        self.lock().push(processor);
    }

    /// Remove a previously added processor from the registry.
    pub fn remove(&self, processor: &Arc<dyn PcmProcessor>) {
        self.lock().retain(|other| !Arc::ptr_eq(other, processor));
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Request that the decoder stop at the next frame boundary.
    pub fn request_abort(&self) {
        self.inner.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.inner.abort.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Vec<Arc<dyn PcmProcessor>> {
        self.lock().clone()
    }

    pub(crate) fn dispatch_stream_info(&self, info: &StreamInfo) {
        for processor in self.snapshot() {
            processor.process_stream_info(info);
        }
    }

    pub(crate) fn dispatch_pcm(&self, pcm: &[u8]) {
        for processor in self.snapshot() {
            processor.process_pcm(pcm);
        }
    }
}

/// A FLAC stream decoder.
///
/// The decoder drives the full pipeline over a [`ByteSource`]: locating the stream marker,
/// parsing metadata, then decoding frames and fanning the reconstructed PCM out to the registered
/// [`PcmProcessor`]s until the source is exhausted or a consumer aborts.
pub struct StreamDecoder<S: ByteSource> {
    bs: BitInputStream<S>,
    opts: DecoderOptions,
    state: DecoderState,
    processors: ProcessorSet,
    stream_info: Option<StreamInfo>,
    seek_table: Option<SeekTable>,
    applications: Vec<VendorApplication>,
    channels: Vec<ChannelData>,
    pcm: PcmBuffer,
    pending_sync: u16,
    frames_decoded: u64,
    samples_decoded: u64,
    bad_frames: u64,
}

impl<S: ByteSource> StreamDecoder<S> {
    /// Instantiate a decoder over the given source with default options.
    pub fn new(source: S) -> StreamDecoder<S> {
        StreamDecoder::with_options(source, Default::default())
    }

    /// Instantiate a decoder over the given source.
    pub fn with_options(source: S, opts: DecoderOptions) -> StreamDecoder<S> {
        StreamDecoder {
            bs: BitInputStream::new(source),
            opts,
            state: DecoderState::SearchForMetadata,
            processors: ProcessorSet::new(),
            stream_info: None,
            seek_table: None,
            applications: Vec::new(),
            channels: Vec::new(),
            pcm: PcmBuffer::new(),
            pending_sync: 0,
            frames_decoded: 0,
            samples_decoded: 0,
            bad_frames: 0,
        }
    }

    /// The registry of PCM processors. The returned handle may be cloned and used from any
    /// thread.
    pub fn processors(&self) -> ProcessorSet {
        self.processors.clone()
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The stream information block, available once metadata has been read.
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// The seek table, if the stream carried one.
    pub fn seek_table(&self) -> Option<&SeekTable> {
        self.seek_table.as_ref()
    }

    /// The vendor application blocks carried by the stream.
    pub fn applications(&self) -> &[VendorApplication] {
        &self.applications
    }

    /// The number of frames decoded successfully so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// The number of samples per channel decoded successfully so far.
    pub fn samples_decoded(&self) -> u64 {
        self.samples_decoded
    }

    /// The number of damaged frames discarded so far.
    pub fn bad_frames(&self) -> u64 {
        self.bad_frames
    }

    /// The number of bytes consumed from the source, counting a partially read byte as consumed.
    pub fn bytes_read(&self) -> u64 {
        self.bs.bytes_read()
    }

    /// Runs the decoder until the end of the stream, a fatal error, or an abort request.
    pub fn decode(&mut self) -> Result<()> {
        loop {
            match self.state {
                DecoderState::SearchForMetadata => self.read_stream_marker()?,
                DecoderState::ReadMetadata => self.read_metadata_blocks()?,
                DecoderState::SearchForFrameSync => self.find_frame_sync()?,
                DecoderState::ReadFrame => self.read_next_frame()?,
                DecoderState::EndOfStream | DecoderState::Aborted => return Ok(()),
            }
        }
    }

    fn read_stream_marker(&mut self) -> Result<()> {
        let mut marker = [0u8; 4];
        self.bs.read_buf_aligned_no_crc(&mut marker)?;

        if marker != FLAC_STREAM_MARKER {
            return Err(Error::BadMagic { pos: self.bs.position() });
        }

        debug!("found stream marker");

        self.state = DecoderState::ReadMetadata;

        Ok(())
    }

    fn read_metadata_blocks(&mut self) -> Result<()> {
        loop {
            let header = MetadataBlockHeader::read(&mut self.bs)?;
            let start = self.bs.position();

            // The stream information block is mandatory and must come first.
            if self.stream_info.is_none() && header.block_type != MetadataBlockType::StreamInfo {
                return bad_metadata_error("the first metadata block must be stream info", start);
            }

            match header.block_type {
                MetadataBlockType::StreamInfo => {
                    if self.stream_info.is_some() {
                        return bad_metadata_error("found more than one stream info block", start);
                    }

                    if !StreamInfo::is_valid_size(header.block_len) {
                        return bad_metadata_error("stream info block length is invalid", start);
                    }

                    let stream_info = StreamInfo::read(&mut self.bs)?;

                    debug!(
                        "stream: {} Hz, {} channels, {} bits per sample",
                        stream_info.sample_rate,
                        stream_info.n_channels(),
                        stream_info.bits_per_sample,
                    );

                    self.stream_info = Some(stream_info);
                }
                MetadataBlockType::SeekTable => {
                    if self.seek_table.is_some() {
                        return bad_metadata_error("found more than one seek table block", start);
                    }

                    self.seek_table = Some(read_seek_table_block(&mut self.bs, header.block_len)?);
                }
                MetadataBlockType::Application => {
                    self.applications.push(read_application_block(&mut self.bs, header.block_len)?);
                }
                _ => {
                    info!(
                        "skipping {} byte metadata block of type {:?}",
                        header.block_len, header.block_type
                    );
                }
            }

            // Skip whatever the block parser did not consume. A parser reading past the stated
            // block length indicates a corrupt stream.
            let consumed = self.bs.position() - start;
            let stated = u64::from(header.block_len) * 8;

            if consumed > stated {
                return bad_metadata_error("metadata block overran its length", self.bs.position());
            }

            self.bs.skip_bits_no_crc(stated - consumed)?;

            if header.is_last {
                break;
            }
        }

        // Unwrap-free by construction: the first iteration either parses a stream information
        // block or errors out.
        if let Some(stream_info) = &self.stream_info {
            // Grow the channel buffers up front to the largest block the stream will produce.
            let n_channels = stream_info.n_channels() as usize;
            let block_len_max = usize::from(stream_info.block_len_max);

            self.channels.resize_with(n_channels, ChannelData::new);

            for channel in self.channels.iter_mut() {
                channel.ensure_block_len(block_len_max);
            }

            self.processors.dispatch_stream_info(stream_info);
        }

        self.state = DecoderState::SearchForFrameSync;

        Ok(())
    }

    fn find_frame_sync(&mut self) -> Result<()> {
        match sync_frame(&mut self.bs) {
            Ok(sync) => {
                self.pending_sync = sync;
                self.state = DecoderState::ReadFrame;
                Ok(())
            }
            // Running out of bytes between frames is the expected end of the stream.
            Err(Error::UnexpectedEnd { .. }) => {
                self.state = DecoderState::EndOfStream;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn read_next_frame(&mut self) -> Result<()> {
        let stream_bps = self.stream_info.as_ref().map(|info| info.bits_per_sample);

        match read_frame(&mut self.bs, self.pending_sync, stream_bps, &mut self.channels) {
            Ok(frame) => {
                self.frames_decoded += 1;
                self.samples_decoded += u64::from(frame.header.block_len);

                self.emit_pcm(
                    usize::from(frame.header.block_len),
                    frame.bits_per_sample,
                    frame.header.channel_assignment.n_channels() as usize,
                );

                self.state = if self.processors.is_abort_requested() {
                    DecoderState::Aborted
                }
                else {
                    DecoderState::SearchForFrameSync
                };

                Ok(())
            }
            Err(err) if err.is_recoverable() && !self.opts.abort_on_bad_frame => {
                warn!("dropping damaged frame: {}", err);

                self.bad_frames += 1;
                self.state = DecoderState::SearchForFrameSync;

                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Interleaves the decoded channel samples and dispatches them to the processors as packed
    /// little-endian bytes at the frame's sample width rounded up to whole bytes.
    fn emit_pcm(&mut self, block_len: usize, bits_per_sample: u32, n_channels: usize) {
        let bytes_per_sample = ((bits_per_sample + 7) / 8) as usize;

        self.pcm.clear();

        for i in 0..block_len {
            for channel in self.channels.iter().take(n_channels) {
                self.pcm.put_sample_le(channel.output[i], bytes_per_sample);
            }
        }

        self.processors.dispatch_pcm(self.pcm.as_bytes());
    }
}

/// Reads the stream information block at the head of a stream without consuming the stream.
///
/// The source must support marking: its position is marked before probing and restored
/// afterwards, whether or not probing succeeded.
pub fn probe_stream_info<S: ByteSource>(source: &mut S) -> Result<StreamInfo> {
    source.mark()?;

    let result = probe_stream_info_inner(&mut *source);

    // Restore the source even when probing failed.
    let restored = source.reset();

    let stream_info = result?;
    restored?;

    Ok(stream_info)
}

fn probe_stream_info_inner<S: ByteSource>(source: S) -> Result<StreamInfo> {
    let mut bs = BitInputStream::new(source);

    let mut marker = [0u8; 4];
    bs.read_buf_aligned_no_crc(&mut marker)?;

    if marker != FLAC_STREAM_MARKER {
        return Err(Error::BadMagic { pos: bs.position() });
    }

    let header = MetadataBlockHeader::read(&mut bs)?;

    if header.block_type != MetadataBlockType::StreamInfo
        || !StreamInfo::is_valid_size(header.block_len)
    {
        return bad_metadata_error("the first metadata block must be stream info", bs.position());
    }

    StreamInfo::read(&mut bs)
}
