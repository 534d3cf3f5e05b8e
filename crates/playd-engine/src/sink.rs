//! Audio sink: pull-mode output fed from the engine's ring buffer.
//!
//! The hardware side is an [`OutputBackend`] that knows how to start and
//! stop a device stream and, from its real-time callback, call
//! [`SinkFeed::pull`]. Everything the callback touches lives in the
//! [`SinkFeed`]: the ring buffer plus a handful of atomics. The control side
//! holds an [`AudioSink`] wrapping the same feed.
//!
//! ## Real-time constraints
//! `pull` never allocates, never logs, and only takes the ring buffer's short
//! critical section.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::Result;
use crate::ring_buffer::RingBuffer;
use crate::source::SourceFormat;

/// State shared between the control thread and the output callback.
pub struct SinkFeed {
    ring: RingBuffer<u8>,
    bytes_per_frame: usize,
    /// Set by the engine once the ring holds enough data to start consuming.
    input_ready: AtomicBool,
    /// Mirrors whether the backend stream is started.
    running: AtomicBool,
    /// The source has nothing more to give; an empty ring now means the end.
    source_out: AtomicBool,
    /// The callback found the ring empty after `source_out` was set.
    at_end: AtomicBool,
    /// Frames consumed by the device since the last reposition.
    played_frames: AtomicU64,
    /// Callbacks that found no data while running and input-ready.
    underrun_events: AtomicU64,
}

impl SinkFeed {
    pub fn new(format: &SourceFormat, capacity_frames: usize) -> Self {
        let bytes_per_frame = format.bytes_per_frame();
        Self {
            ring: RingBuffer::new(capacity_frames.max(1) * bytes_per_frame),
            bytes_per_frame,
            input_ready: AtomicBool::new(false),
            running: AtomicBool::new(false),
            source_out: AtomicBool::new(false),
            at_end: AtomicBool::new(false),
            played_frames: AtomicU64::new(0),
            underrun_events: AtomicU64::new(0),
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Fill `dest` for the device; called from the audio callback.
    ///
    /// `dest` is zeroed first, then overwritten with as many whole buffered
    /// frames as are available. Returns the number of bytes taken from the
    /// ring. Silence is produced, and the position does not move, while the
    /// sink is stopped or input is not ready.
    pub fn pull(&self, dest: &mut [u8]) -> usize {
        dest.fill(0);
        if !self.running.load(Ordering::Acquire) || !self.input_ready.load(Ordering::Acquire) {
            return 0;
        }

        let whole = dest.len() - dest.len() % self.bytes_per_frame;
        // Counters move under the ring lock, so a reposition either sees this
        // read fully accounted or not at all.
        self.ring.read_and(&mut dest[..whole], |read| {
            if read == 0 {
                if self.source_out.load(Ordering::Acquire) {
                    self.at_end.store(true, Ordering::Release);
                } else {
                    self.underrun_events.fetch_add(1, Ordering::Relaxed);
                }
            } else {
                self.played_frames
                    .fetch_add((read / self.bytes_per_frame) as u64, Ordering::AcqRel);
            }
            read
        })
    }

    /// Frames played since the last reposition.
    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Acquire)
    }

    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Device-specific half of a sink: a stream that can be started and stopped.
///
/// Implementations call [`SinkFeed::pull`] from their callback. Failures to
/// start or stop are reported through logging; the feed's flags remain the
/// source of truth for what gets played.
pub trait OutputBackend {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Builds an [`OutputBackend`] for a stream format.
pub trait OutputFactory {
    fn open(&self, format: &SourceFormat, feed: Arc<SinkFeed>) -> Result<Box<dyn OutputBackend>>;
}

/// Control-side handle of a sink.
pub struct AudioSink {
    feed: Arc<SinkFeed>,
    backend: Box<dyn OutputBackend>,
}

impl AudioSink {
    /// Allocate a feed sized for `capacity_frames` and open the backend on it.
    pub fn open(
        factory: &dyn OutputFactory,
        format: &SourceFormat,
        capacity_frames: usize,
    ) -> Result<Self> {
        let feed = Arc::new(SinkFeed::new(format, capacity_frames));
        let backend = factory.open(format, feed.clone())?;
        Ok(Self { feed, backend })
    }

    pub fn start(&mut self) {
        if self.feed.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.backend.start();
    }

    pub fn stop(&mut self) {
        if !self.feed.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.backend.stop();
    }

    pub fn is_running(&self) -> bool {
        self.feed.is_running()
    }

    pub fn set_input_ready(&self, ready: bool) {
        self.feed.input_ready.store(ready, Ordering::Release);
    }

    pub fn is_input_ready(&self) -> bool {
        self.feed.input_ready.load(Ordering::Acquire)
    }

    /// Mark that the source is exhausted; whatever is buffered is the remainder.
    pub fn source_out(&self) {
        self.feed.source_out.store(true, Ordering::Release);
    }

    /// The device has consumed everything after the source ran out.
    pub fn is_at_end(&self) -> bool {
        self.feed.at_end.load(Ordering::Acquire)
    }

    /// Frames played since the last [`AudioSink::reposition`].
    pub fn position(&self) -> u64 {
        self.feed.played_frames()
    }

    /// Callbacks that found the ring empty before the source ran out.
    pub fn underruns(&self) -> u64 {
        self.feed.underrun_events()
    }

    /// Drop buffered audio and restart the position counter.
    ///
    /// Input is marked not-ready so the callback plays silence until the
    /// engine has refilled the buffer.
    pub fn reposition(&self) {
        self.feed.input_ready.store(false, Ordering::Release);
        let feed = &self.feed;
        feed.ring.clear_and(|| {
            feed.source_out.store(false, Ordering::Release);
            feed.at_end.store(false, Ordering::Release);
            feed.played_frames.store(0, Ordering::Release);
        });
    }

    /// Copy as many whole frames of `bytes` as fit into the ring.
    pub fn transfer(&self, bytes: &[u8]) -> usize {
        let free = self.feed.ring.free();
        let count = bytes.len().min(free);
        let count = count - count % self.feed.bytes_per_frame;
        if count == 0 {
            return 0;
        }
        self.feed.ring.write(&bytes[..count])
    }

    /// Whole frames currently buffered.
    pub fn buffered_frames(&self) -> usize {
        self.feed.ring.occupied() / self.feed.bytes_per_frame
    }

    /// Whole frames of free space in the ring.
    pub fn free_frames(&self) -> usize {
        self.feed.ring.free() / self.feed.bytes_per_frame
    }

    pub fn feed(&self) -> &Arc<SinkFeed> {
        &self.feed
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.stop();
    }
}
