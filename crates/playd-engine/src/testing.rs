//! Test doubles: a synthetic source, a headless output, a recording response sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{PlaydError, Result};
use crate::response::{Response, ResponseSink};
use crate::sink::{OutputBackend, OutputFactory, SinkFeed};
use crate::source::{
    AudioSource, SampleEncoding, SourceFormat, SourceOpener, check_seek_range,
};

pub(crate) fn s16_mono(rate: u32) -> SourceFormat {
    SourceFormat {
        sample_rate: rate,
        channels: 1,
        encoding: SampleEncoding::S16,
    }
}

/// Deterministic 16-bit mono ramp at 1kHz with a fixed duration.
pub(crate) struct ToneSource {
    path: String,
    format: SourceFormat,
    total_frames: u64,
    cursor: u64,
    duration_us: u64,
}

impl AudioSource for ToneSource {
    fn path(&self) -> &str {
        &self.path
    }

    fn format(&self) -> SourceFormat {
        self.format
    }

    fn duration(&self) -> Option<u64> {
        Some(self.duration_us)
    }

    fn read_samples(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let frames = (max_bytes / self.format.bytes_per_frame()) as u64;
        let frames = frames.min(self.total_frames - self.cursor);
        let mut out = Vec::with_capacity(frames as usize * 2);
        for i in self.cursor..self.cursor + frames {
            out.extend_from_slice(&((i % 1000) as i16).to_ne_bytes());
        }
        self.cursor += frames;
        Ok(out)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        check_seek_range(position, Some(self.duration_us))?;
        self.cursor = self.format.micros_to_frames(position);
        Ok(())
    }
}

/// Opens [`ToneSource`]s for registered paths; anything else is a file error.
#[derive(Default)]
pub(crate) struct ToneOpener {
    files: HashMap<String, u64>,
}

impl ToneOpener {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(mut self, path: &str, duration_us: u64) -> Self {
        self.files.insert(path.to_string(), duration_us);
        self
    }
}

impl SourceOpener for ToneOpener {
    fn open(&self, path: &str) -> Result<Box<dyn AudioSource>> {
        let duration_us = *self
            .files
            .get(path)
            .ok_or_else(|| PlaydError::file(format!("unknown file: {path}")))?;
        let format = s16_mono(1_000);
        Ok(Box::new(ToneSource {
            path: path.to_string(),
            format,
            total_frames: format.micros_to_frames(duration_us),
            cursor: 0,
            duration_us,
        }))
    }
}

#[derive(Default)]
struct HeadlessState {
    feed: Option<Arc<SinkFeed>>,
    opened: usize,
    /// Backends currently alive, and the most ever alive at once.
    live: usize,
    peak_live: usize,
    fail_next: bool,
    starts: usize,
    stops: usize,
}

/// Output with no device behind it; tests play the hardware by calling [`HeadlessOutput::pull`].
#[derive(Clone, Default)]
pub(crate) struct HeadlessOutput {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessOutput {
    /// Simulate one device callback against the most recently opened sink.
    pub(crate) fn pull(&self, dest: &mut [u8]) -> usize {
        let feed = self.state.lock().unwrap().feed.clone();
        feed.map(|f| f.pull(dest)).unwrap_or(0)
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub(crate) fn peak_open(&self) -> usize {
        self.state.lock().unwrap().peak_live
    }

    /// Make the next `open` fail as a busy device would.
    pub(crate) fn fail_next_open(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    pub(crate) fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub(crate) fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

struct HeadlessBackend {
    state: Arc<Mutex<HeadlessState>>,
}

impl OutputBackend for HeadlessBackend {
    fn start(&mut self) {
        self.state.lock().unwrap().starts += 1;
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stops += 1;
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        self.state.lock().unwrap().live -= 1;
    }
}

impl OutputFactory for HeadlessOutput {
    fn open(&self, _format: &SourceFormat, feed: Arc<SinkFeed>) -> Result<Box<dyn OutputBackend>> {
        let mut g = self.state.lock().unwrap();
        if std::mem::take(&mut g.fail_next) {
            return Err(PlaydError::file("output device is busy"));
        }
        g.feed = Some(feed);
        g.opened += 1;
        g.live += 1;
        g.peak_live = g.peak_live.max(g.live);
        Ok(Box::new(HeadlessBackend {
            state: self.state.clone(),
        }))
    }
}

/// Collects every response handed to it.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    responses: Arc<Mutex<Vec<Response>>>,
}

impl RecordingSink {
    /// Remove and return everything recorded so far.
    pub(crate) fn take(&self) -> Vec<Response> {
        std::mem::take(&mut *self.responses.lock().unwrap())
    }
}

impl ResponseSink for RecordingSink {
    fn respond(&self, response: Response) {
        self.responses.lock().unwrap().push(response);
    }
}
