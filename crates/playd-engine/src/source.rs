//! Audio source capability.
//!
//! A source turns one file into a finite stream of interleaved PCM bytes. The
//! stream format is fixed when the source is opened, so byte offsets, frame
//! counts and microsecond positions can be converted without further I/O.

use crate::error::Result;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// On-the-wire encoding of a single PCM sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEncoding {
    U8,
    S8,
    S16,
    S32,
    F32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
        }
    }

    /// Decode one native-endian sample from `bytes` into `[-1.0, 1.0]`.
    ///
    /// `bytes` must hold at least [`Self::bytes_per_sample`] bytes.
    pub fn to_f32(self, bytes: &[u8]) -> f32 {
        match self {
            Self::U8 => (f32::from(bytes[0]) - 128.0) / 128.0,
            Self::S8 => f32::from(bytes[0] as i8) / 128.0,
            Self::S16 => f32::from(i16::from_ne_bytes([bytes[0], bytes[1]])) / 32_768.0,
            Self::S32 => {
                i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            Self::F32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Stream parameters reported by a source and used to configure its sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl SourceFormat {
    /// Bytes in one frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.bytes_per_sample() * usize::from(self.channels.max(1))
    }

    pub fn bytes_to_frames(&self, bytes: usize) -> u64 {
        (bytes / self.bytes_per_frame()) as u64
    }

    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames.saturating_mul(self.bytes_per_frame())
    }

    pub fn frames_to_micros(&self, frames: u64) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let micros = u128::from(frames) * u128::from(MICROS_PER_SECOND)
            / u128::from(self.sample_rate);
        u64::try_from(micros).unwrap_or(u64::MAX)
    }

    pub fn micros_to_frames(&self, micros: u64) -> u64 {
        let frames =
            u128::from(micros) * u128::from(self.sample_rate) / u128::from(MICROS_PER_SECOND);
        u64::try_from(frames).unwrap_or(u64::MAX)
    }
}

/// A decoded, seekable audio stream for one file.
pub trait AudioSource {
    /// Path the source was opened from.
    fn path(&self) -> &str;

    fn format(&self) -> SourceFormat;

    /// Total duration in microseconds, when the container reports one.
    fn duration(&self) -> Option<u64>;

    /// Decode up to `max_bytes` of whole frames.
    ///
    /// Returns fewer bytes than requested when a packet boundary is reached
    /// and an empty vector at end of stream.
    fn read_samples(&mut self, max_bytes: usize) -> Result<Vec<u8>>;

    /// Reposition the decode cursor to `position` microseconds.
    ///
    /// Fails with a seek error if the position is outside `[0, duration)` or
    /// the underlying stream cannot reposition. On failure the source stays
    /// where it was as far as the container allows.
    fn seek(&mut self, position: u64) -> Result<()>;

    fn sample_rate(&self) -> u32 {
        self.format().sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.format().channels
    }
}

/// Factory turning a path into an opened [`AudioSource`].
pub trait SourceOpener {
    fn open(&self, path: &str) -> Result<Box<dyn AudioSource>>;
}

/// Reject a seek target that lies outside a known duration.
pub(crate) fn check_seek_range(position: u64, duration: Option<u64>) -> Result<()> {
    match duration {
        Some(len) if position >= len => Err(crate::error::PlaydError::seek(format!(
            "position {position}us is beyond the end of the file ({len}us)"
        ))),
        _ => Ok(()),
    }
}
