//! Symphonia-backed [`AudioSource`].
//!
//! Probes the container, picks the default track and decodes packets on
//! demand into interleaved native-endian `f32` bytes. Decoding runs on the
//! caller's thread: the engine pulls from it during each update tick.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{PlaydError, Result};
use crate::source::{AudioSource, SampleEncoding, SourceFormat, SourceOpener, check_seek_range};

/// Opens files through Symphonia's default probe and codec registry.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaOpener;

impl SourceOpener for SymphoniaOpener {
    fn open(&self, path: &str) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(SymphoniaSource::open(path)?))
    }
}

/// A file being decoded by Symphonia.
pub struct SymphoniaSource {
    path: String,
    format: SourceFormat,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    duration_us: Option<u64>,
    /// Decoded bytes not yet handed out by `read_samples`.
    pending: Vec<u8>,
    pending_pos: usize,
    /// Frames still to drop after an accurate seek landed early.
    skip_frames: u64,
    eof: bool,
}

impl SymphoniaSource {
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| PlaydError::file(format!("open {path}: {e}")))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| PlaydError::file(format!("{path}: not a recognised audio file: {e}")))?;
        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| PlaydError::file(format!("{path}: no default audio track")))?;
        let codec_params: CodecParameters = track.codec_params.clone();
        let track_id = track.id;

        let channels = codec_params
            .channels
            .ok_or_else(|| PlaydError::file(format!("{path}: unknown channel layout")))?
            .count();
        let sample_rate = codec_params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| PlaydError::file(format!("{path}: unsupported or invalid sample rate")))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| PlaydError::file(format!("{path}: no decoder for codec: {e}")))?;

        let format = SourceFormat {
            sample_rate,
            channels: u16::try_from(channels)
                .map_err(|_| PlaydError::file(format!("{path}: too many channels")))?,
            encoding: SampleEncoding::F32,
        };

        tracing::debug!(
            path,
            rate_hz = sample_rate,
            channels,
            "opened source"
        );

        Ok(Self {
            path: path.to_string(),
            format,
            reader,
            decoder,
            track_id,
            time_base: codec_params.time_base,
            duration_us: duration_us_from_codec_params(&codec_params),
            pending: Vec::new(),
            pending_pos: 0,
            skip_frames: 0,
            eof: false,
        })
    }

    /// Decode the next packet of the selected track into `pending`.
    ///
    /// Returns `false` once the stream is exhausted.
    fn decode_next(&mut self) -> bool {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return false;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %self.path, "read error, ending stream: {e}");
                    return false;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(path = %self.path, "skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %self.path, "decoder error, ending stream: {e}");
                    return false;
                }
            };

            let mut sample_buf =
                SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            sample_buf.copy_interleaved_ref(decoded);

            let channels = usize::from(self.format.channels.max(1));
            let mut samples = sample_buf.samples();
            if self.skip_frames > 0 {
                let frames = (samples.len() / channels) as u64;
                let drop = self.skip_frames.min(frames);
                self.skip_frames -= drop;
                samples = &samples[drop as usize * channels..];
            }

            self.pending.clear();
            self.pending_pos = 0;
            self.pending.reserve(samples.len() * 4);
            for s in samples {
                self.pending.extend_from_slice(&s.to_ne_bytes());
            }
            if !self.pending.is_empty() {
                return true;
            }
        }
    }

    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let t = tb.calc_time(ts);
                let rate = u64::from(self.format.sample_rate);
                t.seconds.saturating_mul(rate) + (t.frac * rate as f64).round() as u64
            }
            None => ts,
        }
    }
}

impl AudioSource for SymphoniaSource {
    fn path(&self) -> &str {
        &self.path
    }

    fn format(&self) -> SourceFormat {
        self.format
    }

    fn duration(&self) -> Option<u64> {
        self.duration_us
    }

    fn read_samples(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let frame = self.format.bytes_per_frame();
        let want = max_bytes - max_bytes % frame;
        if want == 0 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(want);
        while out.len() < want {
            if self.pending_pos >= self.pending.len() {
                if self.eof || !self.decode_next() {
                    self.eof = true;
                    break;
                }
            }
            let take = (want - out.len()).min(self.pending.len() - self.pending_pos);
            out.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
            self.pending_pos += take;
        }
        Ok(out)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        check_seek_range(position, self.duration_us)?;

        let time = Time::new(position / 1_000_000, (position % 1_000_000) as f64 / 1e6);
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| PlaydError::seek(format!("seek to {position}us failed: {e}")))?;

        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.eof = false;
        self.skip_frames = self
            .ts_to_frames(seeked.required_ts)
            .saturating_sub(self.ts_to_frames(seeked.actual_ts));
        Ok(())
    }
}

/// Best-effort duration in microseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_us_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = u64::from(codec_params.sample_rate?);
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1_000_000) / rate)
}
