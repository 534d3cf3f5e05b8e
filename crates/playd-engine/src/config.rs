/// Engine tuning parameters shared by the decode pump and the output sink.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Frames decoded per pump step, and the expected callback chunk size.
    pub chunk_frames: usize,
    /// Ring buffer capacity, in multiples of `chunk_frames`.
    pub ring_chunks: usize,
}

impl Default for EngineConfig {
    /// Defaults give roughly 370ms of buffered audio at 44.1kHz.
    fn default() -> Self {
        Self {
            chunk_frames: 2048,
            ring_chunks: 8,
        }
    }
}

impl EngineConfig {
    /// Ring buffer capacity in frames (never zero).
    pub fn ring_frames(&self) -> usize {
        self.chunk_frames
            .max(1)
            .saturating_mul(self.ring_chunks.max(2))
    }

    /// Buffered frames required before the sink may start consuming.
    ///
    /// Half of the ring, so a freshly seeked stream starts without an
    /// immediate underrun.
    pub fn prime_frames(&self) -> usize {
        self.ring_frames() / 2
    }
}
