// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Prefetched stream playback.
//!
//! A streamed voice never touches its decoder from the output callback. Frames
//! are decoded on a shared rayon pool into a per-stream buffer indexed by
//! absolute frame; the callback only reads that buffer and asks for a refill
//! when it runs low. Seeks from the owning thread decode their warmup
//! synchronously. A loop rewind from the callback is handed to the pool.
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rayon::ThreadPoolBuilder;
use tracing::warn;

use super::decode::StreamDecoder;
use super::EngineError;

/// Frames kept ahead of the playback cursor.
const BUFFER_FRAMES: usize = 16384;

/// A refill is requested once fewer frames than this remain.
const REFILL_THRESHOLD_FRAMES: usize = BUFFER_FRAMES / 2;

/// Frames decoded between two buffer updates.
const FILL_BATCH_FRAMES: usize = 1024;

/// Shared pool used by every stream to decode ahead of playback.
pub struct BufferFillPool {
    pool: rayon::ThreadPool,
}

impl BufferFillPool {
    /// Creates a new pool with the given number of worker threads.
    pub fn new(num_threads: usize) -> Result<Self, EngineError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("modaudio-stream-fill-{i}"))
            .build()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        Ok(Self { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

/// What the buffer holds at a given frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamFrame {
    Ready((f32, f32)),
    /// Not decoded yet.
    Pending,
    /// Past the end of the file.
    End,
}

pub struct StreamBuffer {
    /// Stereo frames starting at `start`.
    frames: VecDeque<(f32, f32)>,
    start: u64,
    finished: bool,
    /// Bumped by every seek. Frames decoded for an older epoch are discarded.
    epoch: u64,
    /// A rewind requested from the output callback, performed by the next fill.
    pending_seek: Option<u64>,
    refill_in_progress: bool,
    length_frames: u64,
}

impl StreamBuffer {
    pub fn frame(&self, frame: u64) -> StreamFrame {
        if frame < self.start {
            return StreamFrame::Pending;
        }
        match usize::try_from(frame - self.start)
            .ok()
            .and_then(|offset| self.frames.get(offset))
        {
            Some(frame) => StreamFrame::Ready(*frame),
            None if self.finished => StreamFrame::End,
            None => StreamFrame::Pending,
        }
    }

    /// Drops frames before `frame`; playback never reads them again.
    pub fn release_before(&mut self, frame: u64) {
        while self.start < frame && self.frames.pop_front().is_some() {
            self.start += 1;
        }
    }

    /// Restarts at frame 0 without touching the decoder.
    pub fn request_rewind(&mut self) {
        self.reset(0);
        self.pending_seek = Some(0);
    }

    fn reset(&mut self, frame: u64) {
        self.frames.clear();
        self.start = frame;
        self.finished = false;
        self.pending_seek = None;
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn next_frame(&self) -> u64 {
        self.start + self.frames.len() as u64
    }
}

/// A stream decoder paired with the buffer the output callback reads.
pub struct BufferedStream {
    decoder: Arc<Mutex<StreamDecoder>>,
    buffer: Arc<Mutex<StreamBuffer>>,
    pool: Arc<BufferFillPool>,
    sample_rate: u32,
}

impl BufferedStream {
    /// Wraps an opened decoder and decodes the first buffer before returning.
    pub fn new(decoder: StreamDecoder, pool: Arc<BufferFillPool>) -> BufferedStream {
        let sample_rate = decoder.sample_rate();
        let length_frames = decoder.length_frames();
        let stream = BufferedStream {
            decoder: Arc::new(Mutex::new(decoder)),
            buffer: Arc::new(Mutex::new(StreamBuffer {
                frames: VecDeque::with_capacity(BUFFER_FRAMES),
                start: 0,
                finished: false,
                epoch: 0,
                pending_seek: None,
                refill_in_progress: false,
                length_frames,
            })),
            pool,
            sample_rate,
        };
        fill(&stream.decoder, &stream.buffer);
        stream
    }

    /// Opens an independent stream over the same file.
    pub fn reopen(&self) -> Result<BufferedStream, EngineError> {
        let decoder = self.decoder.lock().reopen()?;
        Ok(BufferedStream::new(decoder, self.pool.clone()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn length_frames(&self) -> u64 {
        self.buffer.lock().length_frames
    }

    /// Buffer access for one render pass.
    pub fn buffer(&self) -> MutexGuard<'_, StreamBuffer> {
        self.buffer.lock()
    }

    /// Repositions the stream and decodes ahead of the new position. Blocks on
    /// file I/O, so it is only called from the thread that owns the sound.
    pub fn seek(&self, frame: u64) {
        self.buffer.lock().reset(frame);
        {
            let mut decoder = self.decoder.lock();
            if let Err(e) = decoder.seek(frame) {
                warn!(err = %e, frame, "Unable to seek stream");
                self.buffer.lock().finished = true;
                return;
            }
        }
        fill(&self.decoder, &self.buffer);
    }

    /// Hands a refill to the pool when the buffer runs low or a rewind is pending.
    pub fn request_refill(&self) {
        {
            let mut buffer = self.buffer.lock();
            let low = buffer.frames.len() <= REFILL_THRESHOLD_FRAMES && !buffer.finished;
            if buffer.refill_in_progress || !(low || buffer.pending_seek.is_some()) {
                return;
            }
            buffer.refill_in_progress = true;
        }

        let decoder = self.decoder.clone();
        let buffer = self.buffer.clone();
        self.pool.spawn(move || {
            fill(&decoder, &buffer);
            buffer.lock().refill_in_progress = false;
        });
    }
}

/// Decodes until the buffer is full, the file ends, or a seek supersedes the work.
/// The buffer lock is never held while decoding.
fn fill(decoder: &Mutex<StreamDecoder>, buffer: &Mutex<StreamBuffer>) {
    let mut decoder = decoder.lock();
    let (epoch, seek) = {
        let mut buffer = buffer.lock();
        (buffer.epoch, buffer.pending_seek.take())
    };
    if let Some(frame) = seek {
        if let Err(e) = decoder.seek(frame) {
            warn!(err = %e, frame, "Unable to rewind stream");
            let mut buffer = buffer.lock();
            if buffer.epoch == epoch {
                buffer.finished = true;
            }
            return;
        }
    }

    let mut batch = Vec::with_capacity(FILL_BATCH_FRAMES);
    loop {
        let mut next = {
            let buffer = buffer.lock();
            if buffer.epoch != epoch || buffer.finished || buffer.frames.len() >= BUFFER_FRAMES {
                return;
            }
            buffer.next_frame()
        };

        let mut finished = false;
        while batch.len() < FILL_BATCH_FRAMES {
            match decoder.stereo_frame(next) {
                Ok(Some(frame)) => {
                    batch.push(frame);
                    next += 1;
                }
                Ok(None) => {
                    finished = true;
                    break;
                }
                Err(e) => {
                    warn!(err = %e, "Stream decode failed, ending stream");
                    finished = true;
                    break;
                }
            }
        }

        let mut buffer = buffer.lock();
        if buffer.epoch != epoch {
            return;
        }
        buffer.frames.extend(batch.drain(..));
        if finished {
            buffer.finished = true;
            buffer.length_frames = match decoder.length_frames() {
                0 => next,
                length => length,
            };
            return;
        }
    }
}
