//! CPAL output backend.
//!
//! Builds a CPAL output stream whose real-time callback pulls source-format
//! bytes from a [`SinkFeed`] and writes them to the device. The callback:
//! - pulls whole source frames into a scratch buffer allocated up front
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts samples to the device sample format
//!
//! ## Real-time constraints
//! The callback never allocates and never logs. Stream errors are reported
//! from CPAL's error callback.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::device::{device_name, pick_buffer_size, pick_output_config};
use crate::error::{PlaydError, Result};
use crate::sink::{OutputBackend, OutputFactory, SinkFeed};
use crate::source::{SampleEncoding, SourceFormat};

/// Largest device request the callback handles in one pull.
const SCRATCH_FRAMES: usize = 16_384;

/// Opens CPAL output streams on one device.
pub struct CpalOutput {
    device: cpal::Device,
    name: String,
    /// Preferred callback size in frames.
    buffer_frames: u32,
}

impl CpalOutput {
    pub fn new(device: cpal::Device, buffer_frames: usize) -> Self {
        let name = device_name(&device).unwrap_or_else(|| "<unnamed>".to_string());
        Self {
            device,
            name,
            buffer_frames: u32::try_from(buffer_frames).unwrap_or(u32::MAX),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl OutputFactory for CpalOutput {
    fn open(&self, format: &SourceFormat, feed: Arc<SinkFeed>) -> Result<Box<dyn OutputBackend>> {
        let supported = pick_output_config(&self.device, format.sample_rate, format.channels)?;
        let mut config: cpal::StreamConfig = supported.config();
        if let Some(size) = pick_buffer_size(&supported, self.buffer_frames) {
            config.buffer_size = size;
        }

        let stream = build_output_stream(&self.device, &config, supported.sample_format(), format, feed)?;
        // Some hosts start streams as soon as they are built.
        if let Err(e) = stream.pause() {
            tracing::debug!("pause after build failed: {e}");
        }

        tracing::info!(
            device = %self.name,
            rate_hz = config.sample_rate,
            channels = config.channels,
            sample_format = ?supported.sample_format(),
            buffer = ?config.buffer_size,
            "output stream ready"
        );
        Ok(Box::new(CpalBackend { stream }))
    }
}

struct CpalBackend {
    stream: cpal::Stream,
}

impl OutputBackend for CpalBackend {
    fn start(&mut self) {
        if let Err(e) = self.stream.play() {
            tracing::warn!("failed to start output stream: {e}");
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("failed to pause output stream: {e}");
        }
    }
}

/// Build a CPAL output stream for the device's sample format.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    source: &SourceFormat,
    feed: Arc<SinkFeed>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, source, feed),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, source, feed),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, source, feed),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, source, feed),
        other => Err(PlaydError::file(format!("unsupported output sample format: {other:?}"))),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    source: &SourceFormat,
    feed: Arc<SinkFeed>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = usize::from(config.channels.max(1));
    let mapper = ChannelMapper {
        encoding: source.encoding,
        src_channels: usize::from(source.channels.max(1)),
        dst_channels: channels_out,
    };
    let bytes_per_frame = source.bytes_per_frame();
    let mut scratch = vec![0u8; SCRATCH_FRAMES * bytes_per_frame];

    let err_fn = |err| tracing::warn!("stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let frames_out = data.len() / channels_out;
                let mut done = 0;
                while done < frames_out {
                    let frames = (frames_out - done).min(SCRATCH_FRAMES);
                    let bytes = &mut scratch[..frames * bytes_per_frame];
                    let got = feed.pull(bytes) / bytes_per_frame;

                    for f in 0..frames {
                        let out = &mut data[(done + f) * channels_out..][..channels_out];
                        if f >= got {
                            out.fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                            continue;
                        }
                        let frame = &bytes[f * bytes_per_frame..][..bytes_per_frame];
                        for (ch, slot) in out.iter_mut().enumerate() {
                            *slot = <T as cpal::Sample>::from_sample::<f32>(mapper.sample(frame, ch));
                        }
                    }
                    done += frames;
                }
                data[frames_out * channels_out..].fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
            },
            err_fn,
            None,
        )
        .map_err(|e| PlaydError::file(format!("cannot open output stream: {e}")))
}

/// Maps one source frame onto a destination channel.
///
/// Mapping rules:
/// - mono → anything: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: best-effort "clamp to available channels"
#[derive(Clone, Copy)]
struct ChannelMapper {
    encoding: SampleEncoding,
    src_channels: usize,
    dst_channels: usize,
}

impl ChannelMapper {
    fn sample(&self, frame: &[u8], dst_ch: usize) -> f32 {
        match (self.src_channels, self.dst_channels) {
            (2, 1) => 0.5 * (self.source_sample(frame, 0) + self.source_sample(frame, 1)),
            (1, _) => self.source_sample(frame, 0),
            (src, _) => self.source_sample(frame, dst_ch.min(src - 1)),
        }
    }

    fn source_sample(&self, frame: &[u8], ch: usize) -> f32 {
        let width = self.encoding.bytes_per_sample();
        frame
            .get(ch * width..(ch + 1) * width)
            .map(|bytes| self.encoding.to_f32(bytes))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_frame(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
    }

    fn mapper(src: usize, dst: usize) -> ChannelMapper {
        ChannelMapper {
            encoding: SampleEncoding::F32,
            src_channels: src,
            dst_channels: dst,
        }
    }

    #[test]
    fn mono_duplicates_to_stereo() {
        let frame = f32_frame(&[0.25]);
        let m = mapper(1, 2);
        assert_eq!(m.sample(&frame, 0), 0.25);
        assert_eq!(m.sample(&frame, 1), 0.25);
    }

    #[test]
    fn stereo_averages_to_mono() {
        let frame = f32_frame(&[0.5, -0.25]);
        assert_eq!(mapper(2, 1).sample(&frame, 0), 0.125);
    }

    #[test]
    fn stereo_passes_through() {
        let frame = f32_frame(&[0.5, -0.25]);
        let m = mapper(2, 2);
        assert_eq!(m.sample(&frame, 0), 0.5);
        assert_eq!(m.sample(&frame, 1), -0.25);
    }

    #[test]
    fn extra_destination_channels_clamp_to_last_source() {
        let frame = f32_frame(&[0.1, 0.2]);
        assert_eq!(mapper(2, 6).sample(&frame, 5), 0.2);
    }

    #[test]
    fn integer_sources_are_normalised() {
        let m = ChannelMapper {
            encoding: SampleEncoding::S16,
            src_channels: 1,
            dst_channels: 1,
        };
        let frame = i16::MIN.to_ne_bytes();
        assert_eq!(m.sample(&frame, 0), -1.0);
    }

    #[test]
    fn short_frame_reads_silence() {
        let frame = f32_frame(&[0.5]);
        assert_eq!(mapper(2, 2).source_sample(&frame, 1), 0.0);
    }
}
