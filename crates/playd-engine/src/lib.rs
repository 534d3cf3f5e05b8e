//! playd engine: a network-controllable audio player's core.
//!
//! ## Pipeline
//! 1. **Decode**: [`decode::SymphoniaSource`] turns a file into interleaved PCM bytes.
//! 2. **Buffer**: [`engine::AudioEngine::update`] pumps decoded bytes into a
//!    bounded [`ring_buffer::RingBuffer`] on the control thread.
//! 3. **Playback**: the CPAL callback in [`output`] drains the ring through a
//!    [`sink::SinkFeed`] without blocking, playing silence on underrun.
//!
//! The [`player::Player`] state machine owns the engine; [`command::dispatch`]
//! turns text command lines into player operations.

pub mod command;
pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod output;
pub mod player;
pub mod response;
pub mod ring_buffer;
pub mod sink;
pub mod source;
pub mod time;

#[cfg(test)]
mod testing;

pub use error::{PlaydError, Result};
