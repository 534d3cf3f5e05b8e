//! Per-file playback pipeline: one source, one sink, one ring buffer.
//!
//! An [`AudioEngine`] is built whole on load and dropped whole on eject, quit
//! or the next load; it never switches files in place. Decoding happens
//! synchronously inside [`AudioEngine::update`], which the player calls from
//! its periodic tick. The output callback only ever sees the ring buffer.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::sink::{AudioSink, OutputFactory};
use crate::source::{AudioSource, SourceFormat, SourceOpener};

pub struct AudioEngine {
    source: Box<dyn AudioSource>,
    sink: AudioSink,
    format: SourceFormat,
    chunk_bytes: usize,
    prime_frames: usize,
    /// Decoded bytes the ring had no room for yet.
    pending: Vec<u8>,
    pending_pos: usize,
    /// Position of the last reposition, in microseconds.
    base_us: u64,
    /// The source is exhausted; only the buffered remainder is left.
    draining: bool,
}

impl AudioEngine {
    /// Open `path` and wire a sink matching its format.
    ///
    /// Either every part is constructed or an error is returned; nothing is
    /// left half-open.
    pub fn open(
        path: &str,
        sources: &dyn SourceOpener,
        outputs: &dyn OutputFactory,
        config: &EngineConfig,
    ) -> Result<Self> {
        Self::with_source(sources.open(path)?, outputs, config)
    }

    /// Wire a sink for an already opened source.
    pub fn with_source(
        source: Box<dyn AudioSource>,
        outputs: &dyn OutputFactory,
        config: &EngineConfig,
    ) -> Result<Self> {
        let format = source.format();
        let sink = AudioSink::open(outputs, &format, config.ring_frames())?;
        let path = source.path();

        tracing::info!(
            path,
            rate_hz = format.sample_rate,
            channels = format.channels,
            duration_us = ?source.duration(),
            ring_frames = config.ring_frames(),
            "engine ready"
        );

        Ok(Self {
            source,
            sink,
            format,
            chunk_bytes: format.frames_to_bytes(config.chunk_frames.max(1)),
            prime_frames: config.prime_frames(),
            pending: Vec::new(),
            pending_pos: 0,
            base_us: 0,
            draining: false,
        })
    }

    pub fn path(&self) -> &str {
        self.source.path()
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Total length in microseconds, if known.
    pub fn duration(&self) -> Option<u64> {
        self.source.duration()
    }

    pub fn start(&mut self) {
        self.sink.start();
    }

    pub fn stop(&mut self) {
        self.sink.stop();
    }

    /// Whether output is stopped or has nothing left to play.
    pub fn is_stopped(&self) -> bool {
        !self.sink.is_running() || self.is_drained()
    }

    /// The source ran out and the sink has consumed everything buffered.
    pub fn is_drained(&self) -> bool {
        self.draining && self.sink.is_at_end()
    }

    /// Device callbacks that found nothing to play mid-file.
    pub fn underruns(&self) -> u64 {
        self.sink.underruns()
    }

    /// Current playback position in microseconds.
    pub fn position(&self) -> u64 {
        self.base_us
            .saturating_add(self.format.frames_to_micros(self.sink.position()))
    }

    /// Move decoded audio into the ring until it is full or the source is out.
    pub fn update(&mut self) {
        while !self.draining {
            if self.pending_pos >= self.pending.len() {
                let free = self.sink.free_frames();
                if free == 0 {
                    break;
                }
                let want = self.chunk_bytes.min(self.format.frames_to_bytes(free));
                match self.source.read_samples(want) {
                    Ok(bytes) if !bytes.is_empty() => {
                        self.pending = bytes;
                        self.pending_pos = 0;
                    }
                    Ok(_) => self.start_draining(),
                    Err(e) => {
                        tracing::warn!(path = %self.path(), "decode failed, ending file: {e}");
                        self.start_draining();
                    }
                }
                continue;
            }

            let n = self.sink.transfer(&self.pending[self.pending_pos..]);
            self.pending_pos += n;
            if n == 0 {
                break;
            }
        }

        if !self.sink.is_input_ready()
            && (self.draining || self.sink.buffered_frames() >= self.prime_frames)
        {
            self.sink.set_input_ready(true);
        }
    }

    /// Jump to `position_us`.
    ///
    /// On success buffered audio is discarded and the sink plays silence
    /// until the next update refills it. On failure nothing changes.
    pub fn seek_to(&mut self, position_us: u64) -> Result<()> {
        self.source.seek(position_us)?;
        self.sink.reposition();
        self.pending.clear();
        self.pending_pos = 0;
        self.base_us = position_us;
        self.draining = false;
        tracing::debug!(path = %self.path(), position_us, "engine repositioned");
        Ok(())
    }

    fn start_draining(&mut self) {
        self.draining = true;
        self.sink.source_out();
        tracing::debug!(path = %self.path(), "source exhausted, draining");
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> &AudioSink {
        &self.sink
    }
}
