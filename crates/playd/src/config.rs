//! Configuration loading and resolution.
//!
//! Every setting comes from, in order of precedence: a CLI flag, the TOML
//! config file, a built-in default. Resolution validates the result; any
//! problem is a configuration error and fatal at startup.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use playd_engine::config::EngineConfig;
use playd_engine::player::DEFAULT_POSITION_PERIOD_US;
use playd_engine::{PlaydError, Result};
use serde::Deserialize;

use crate::cli::Args;

pub const DEFAULT_BIND: &str = "0.0.0.0:1350";
pub const DEFAULT_TICK_MS: u64 = 10;

/// Config file schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Output device index or name substring.
    pub device: Option<String>,
    pub position_period_us: Option<u64>,
    pub chunk_frames: Option<usize>,
    pub ring_chunks: Option<usize>,
    pub tick_ms: Option<u64>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PlaydError::config(format!("read config {}: {e}", path.display())))?;
        Self::parse(&raw)
            .map_err(|e| PlaydError::config(format!("{}: {}", path.display(), e.message())))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PlaydError::config(format!("parse config: {e}")))
    }
}

/// Fully resolved daemon settings.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub bind: SocketAddr,
    pub device: Option<String>,
    pub position_period_us: u64,
    pub engine: EngineConfig,
    pub tick: Duration,
}

impl DaemonConfig {
    pub fn resolve(args: &Args, file: &FileConfig) -> Result<Self> {
        let defaults = EngineConfig::default();

        let bind = args
            .bind
            .as_deref()
            .or(file.bind.as_deref())
            .unwrap_or(DEFAULT_BIND);
        let bind: SocketAddr = bind
            .trim()
            .parse()
            .map_err(|e| PlaydError::config(format!("parse bind {bind}: {e}")))?;

        let position_period_us = non_zero(
            "position_period_us",
            args.position_period_us
                .or(file.position_period_us)
                .unwrap_or(DEFAULT_POSITION_PERIOD_US),
        )?;
        let chunk_frames = non_zero(
            "chunk_frames",
            args.chunk_frames
                .or(file.chunk_frames)
                .unwrap_or(defaults.chunk_frames),
        )?;
        let ring_chunks = args
            .ring_chunks
            .or(file.ring_chunks)
            .unwrap_or(defaults.ring_chunks);
        if ring_chunks < 2 {
            return Err(PlaydError::config(format!(
                "ring_chunks must be at least 2, got {ring_chunks}"
            )));
        }
        let tick_ms = non_zero(
            "tick_ms",
            args.tick_ms.or(file.tick_ms).unwrap_or(DEFAULT_TICK_MS),
        )?;

        Ok(Self {
            bind,
            device: normalize_device_name(args.device.clone().or_else(|| file.device.clone())),
            position_period_us,
            engine: EngineConfig {
                chunk_frames,
                ring_chunks,
            },
            tick: Duration::from_millis(tick_ms),
        })
    }
}

fn non_zero<T: PartialEq + Default>(key: &str, value: T) -> Result<T> {
    if value == T::default() {
        return Err(PlaydError::config(format!("{key} must be greater than zero")));
    }
    Ok(value)
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["playd"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let cfg = DaemonConfig::resolve(&args(&[]), &FileConfig::default()).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:1350".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.bind.port(), 1350);
        assert_eq!(cfg.position_period_us, 500_000);
        assert_eq!(cfg.engine.chunk_frames, 2048);
        assert_eq!(cfg.engine.ring_chunks, 8);
        assert_eq!(cfg.tick, Duration::from_millis(10));
        assert!(cfg.device.is_none());
    }

    #[test]
    fn file_overrides_defaults_and_flags_override_file() {
        let file = FileConfig::parse(
            r#"
            bind = "127.0.0.1:2000"
            device = "usb"
            position_period_us = 100000
            tick_ms = 20
            "#,
        )
        .unwrap();

        let cfg = DaemonConfig::resolve(&args(&["--tick-ms", "5"]), &file).unwrap();
        assert_eq!(cfg.bind.port(), 2000);
        assert_eq!(cfg.device.as_deref(), Some("usb"));
        assert_eq!(cfg.position_period_us, 100_000);
        assert_eq!(cfg.tick, Duration::from_millis(5));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = FileConfig::parse("volume = 11").unwrap_err();
        assert!(matches!(err, PlaydError::Config(_)));
    }

    #[test]
    fn bad_bind_is_config_error() {
        let err = DaemonConfig::resolve(&args(&["--bind", "not-an-addr"]), &FileConfig::default())
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, PlaydError::Config(_)));
    }

    #[test]
    fn zero_values_are_rejected() {
        for flag in ["--position-period-us", "--chunk-frames", "--tick-ms"] {
            let err = DaemonConfig::resolve(&args(&[flag, "0"]), &FileConfig::default());
            assert!(matches!(err, Err(PlaydError::Config(_))), "{flag}");
        }
        let err = DaemonConfig::resolve(&args(&["--ring-chunks", "1"]), &FileConfig::default());
        assert!(matches!(err, Err(PlaydError::Config(_))));
    }

    #[test]
    fn blank_device_means_default() {
        let cfg = DaemonConfig::resolve(&args(&["--device", "  "]), &FileConfig::default()).unwrap();
        assert!(cfg.device.is_none());
        let cfg = DaemonConfig::resolve(&args(&["--device", " USB  DAC "]), &FileConfig::default())
            .unwrap();
        assert_eq!(cfg.device.as_deref(), Some("USB  DAC"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = FileConfig::load(Path::new("/definitely/not/playd.toml")).unwrap_err();
        assert!(matches!(err, PlaydError::Config(_)));
    }
}
