//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting the default device, a device by index, or a device by name substring
//! - choosing a stream config that plays a source's format without resampling

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{PlaydError, Result};

/// Pick a CPAL output device.
///
/// `selector` may be an index as printed by [`list_devices`], or a
/// case-insensitive substring of the device name. With no selector the host
/// default output device is used.
pub fn pick_device(host: &cpal::Host, selector: Option<&str>) -> Result<cpal::Device> {
    let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
        return host
            .default_output_device()
            .ok_or_else(|| PlaydError::config("no default output device"));
    };

    let mut devices = host
        .output_devices()
        .map_err(|e| PlaydError::config(format!("cannot enumerate output devices: {e}")))?;

    if let Ok(index) = selector.parse::<usize>() {
        return devices
            .nth(index)
            .ok_or_else(|| PlaydError::config(format!("no output device #{index}")));
    }

    devices
        .find(|d| {
            device_name(d)
                .map(|name| matches_device_name(&name, selector))
                .unwrap_or(false)
        })
        .ok_or_else(|| PlaydError::config(format!("no output device matched: {selector}")))
}

/// Names of all output devices, in index order.
pub fn device_names(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host
        .output_devices()
        .map_err(|e| PlaydError::config(format!("cannot enumerate output devices: {e}")))?;
    Ok(devices
        .map(|d| device_name(&d).unwrap_or_else(|| "<unnamed>".to_string()))
        .collect())
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    for (i, name) in device_names(host)?.into_iter().enumerate() {
        println!("#{i}: {name}");
    }
    Ok(())
}

pub fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.to_string())
}

/// Pick an output config that runs at exactly `rate` Hz.
///
/// Among ranges covering the rate, prefers the source's channel count, then
/// stereo, then the sample format ranking. A device that cannot run at the
/// source rate cannot play the file, so that is a file error.
pub fn pick_output_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| PlaydError::file(format!("cannot query output device: {e}")))?;

    let mut best: Option<((u8, u8), cpal::SupportedStreamConfigRange)> = None;
    for range in ranges {
        let Some(rank) = rank_range(
            range.min_sample_rate(),
            range.max_sample_rate(),
            range.channels(),
            range.sample_format(),
            rate,
            channels,
        ) else {
            continue;
        };
        if best.as_ref().is_none_or(|(b, _)| rank < *b) {
            best = Some((rank, range));
        }
    }

    best.map(|(_, range)| range.with_sample_rate(rate))
        .ok_or_else(|| PlaydError::file(format!("output device cannot play {rate} Hz audio")))
}

/// Pick a stream buffer size near `preferred_frames`.
///
/// The preference is clamped to the device's advertised range. If the range
/// is `Unknown`, return `None` so CPAL uses the device default.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    preferred_frames: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            clamp_buffer_frames(*min, *max, preferred_frames),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn clamp_buffer_frames(min: u32, max: u32, preferred: u32) -> u32 {
    preferred.clamp(min, max.max(min))
}

/// Lower is better; `None` if the range cannot run at `rate`.
fn rank_range(
    min_rate: u32,
    max_rate: u32,
    range_channels: u16,
    format: cpal::SampleFormat,
    rate: u32,
    channels: u16,
) -> Option<(u8, u8)> {
    if rate < min_rate || rate > max_rate {
        return None;
    }
    let channel_rank = if range_channels == channels {
        0
    } else if range_channels == 2 {
        1
    } else {
        2
    };
    Some((channel_rank, sample_format_rank(format)))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", ""));
    }

    #[test]
    fn rank_range_requires_exact_rate() {
        let f32 = cpal::SampleFormat::F32;
        assert!(rank_range(44_100, 96_000, 2, f32, 48_000, 2).is_some());
        assert!(rank_range(44_100, 96_000, 2, f32, 22_050, 2).is_none());
        assert!(rank_range(44_100, 48_000, 2, f32, 96_000, 2).is_none());
    }

    #[test]
    fn rank_range_prefers_matching_channels_then_stereo() {
        let f32 = cpal::SampleFormat::F32;
        let exact = rank_range(48_000, 48_000, 1, f32, 48_000, 1).unwrap();
        let stereo = rank_range(48_000, 48_000, 2, f32, 48_000, 1).unwrap();
        let other = rank_range(48_000, 48_000, 6, f32, 48_000, 1).unwrap();
        assert!(exact < stereo);
        assert!(stereo < other);
    }

    #[test]
    fn rank_range_breaks_ties_on_format() {
        let float = rank_range(48_000, 48_000, 2, cpal::SampleFormat::F32, 48_000, 2).unwrap();
        let int = rank_range(48_000, 48_000, 2, cpal::SampleFormat::I16, 48_000, 2).unwrap();
        assert!(float < int);
    }

    #[test]
    fn clamp_buffer_frames_stays_in_range() {
        assert_eq!(clamp_buffer_frames(64, 4096, 2048), 2048);
        assert_eq!(clamp_buffer_frames(64, 1024, 2048), 1024);
        assert_eq!(clamp_buffer_frames(4096, 8192, 2048), 4096);
        assert_eq!(clamp_buffer_frames(512, 256, 2048), 512);
    }
}
