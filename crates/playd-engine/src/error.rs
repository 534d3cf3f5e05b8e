//! Error taxonomy shared by every layer of the engine.
//!
//! The set of kinds is closed. Callers at a dispatch boundary match on the
//! variant to decide whether to recover (file and seek errors) or to give up
//! (configuration and internal errors).

use thiserror::Error;

/// Errors raised by the playback engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlaydError {
    /// Bad startup configuration (device, bind address, tuning values).
    #[error("config error: {0}")]
    Config(String),
    /// A file could not be opened, probed or decoded. Scoped to one load.
    #[error("file error: {0}")]
    File(String),
    /// A seek target was out of range or the stream could not reposition.
    #[error("seek error: {0}")]
    Seek(String),
    /// A broken invariant; indicates a programming defect.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlaydError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn file(msg: impl Into<String>) -> Self {
        Self::File(msg.into())
    }

    pub fn seek(msg: impl Into<String>) -> Self {
        Self::Seek(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must terminate the process rather than a single command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Internal(_))
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(msg) | Self::File(msg) | Self::Seek(msg) | Self::Internal(msg) => msg,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaydError>;
