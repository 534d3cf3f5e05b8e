//! The player state machine.
//!
//! A [`Player`] owns at most one [`AudioEngine`] and is the only authority on
//! playback state. Commands and the periodic [`Player::update`] tick run on a
//! single control thread, one at a time. Every command either completes or
//! leaves the player exactly as it found it.

use std::fmt;

use crate::command::{CommandResult, recover};
use crate::config::EngineConfig;
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::response::{Response, ResponseSink};
use crate::sink::OutputFactory;
use crate::source::SourceOpener;

/// Default cadence of position reports while playing, in microseconds.
pub const DEFAULT_POSITION_PERIOD_US: u64 = 500_000;

pub(crate) const MSG_NEEDS_LOADED: &str = "Command requires a loaded file";
pub(crate) const MSG_EMPTY_PATH: &str = "Empty file path given";
pub(crate) const MSG_QUITTING: &str = "Player is shutting down";
pub(crate) const MSG_FILE_ENDED: &str = "File has ended: seek or load first";

/// Externally visible player state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Empty,
    Stopped,
    Playing,
    Quitting,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Empty => "Empty",
            PlayerState::Stopped => "Stopped",
            PlayerState::Playing => "Playing",
            PlayerState::Quitting => "Quitting",
        };
        f.write_str(name)
    }
}

struct Loaded {
    engine: AudioEngine,
    playing: bool,
    /// Played through to the end; cleared by a successful seek.
    ended: bool,
}

/// What the player holds. A playing player always has an engine.
enum Deck {
    Empty,
    Loaded(Box<Loaded>),
    Quitting,
}

pub struct Player {
    sources: Box<dyn SourceOpener>,
    outputs: Box<dyn OutputFactory>,
    listeners: Box<dyn ResponseSink>,
    engine_config: EngineConfig,
    position_period: u64,
    /// Position at or beyond which the next periodic report is due.
    next_report_at: u64,
    deck: Deck,
}

impl Player {
    pub fn new(
        sources: Box<dyn SourceOpener>,
        outputs: Box<dyn OutputFactory>,
        listeners: Box<dyn ResponseSink>,
    ) -> Self {
        Self {
            sources,
            outputs,
            listeners,
            engine_config: EngineConfig::default(),
            position_period: DEFAULT_POSITION_PERIOD_US,
            next_report_at: 0,
            deck: Deck::Empty,
        }
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Set the position report period in microseconds (minimum 1).
    pub fn with_position_period(mut self, period_us: u64) -> Self {
        self.position_period = period_us.max(1);
        self
    }

    pub fn state(&self) -> PlayerState {
        match &self.deck {
            Deck::Empty => PlayerState::Empty,
            Deck::Loaded(loaded) if loaded.playing => PlayerState::Playing,
            Deck::Loaded(_) => PlayerState::Stopped,
            Deck::Quitting => PlayerState::Quitting,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match &self.deck {
            Deck::Loaded(loaded) => Some(loaded.engine.path()),
            _ => None,
        }
    }

    /// Current position in microseconds, if a file is loaded.
    pub fn position(&self) -> Option<u64> {
        match &self.deck {
            Deck::Loaded(loaded) => Some(loaded.engine.position()),
            _ => None,
        }
    }

    pub fn length(&self) -> Option<u64> {
        match &self.deck {
            Deck::Loaded(loaded) => loaded.engine.duration(),
            _ => None,
        }
    }

    /// The responses that describe the player right now.
    pub fn snapshot(&self) -> Vec<Response> {
        let mut out = vec![
            Response::File(self.file().map(str::to_string)),
            Response::State(self.state()),
        ];
        if let Some(pos) = self.position() {
            out.push(Response::Position(pos));
        }
        if let Some(len) = self.length() {
            out.push(Response::Length(len));
        }
        out
    }

    /// Replace the loaded file with `path`.
    ///
    /// A file that fails to open leaves the current one loaded and
    /// untouched. Once the new file is open the current engine is released
    /// before the output is opened, so both never hold the device at once;
    /// if the output then fails the player is left empty.
    pub fn load(&mut self, path: &str) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        if path.is_empty() {
            return Ok(CommandResult::invalid(MSG_EMPTY_PATH));
        }

        let source = match self.sources.open(path) {
            Ok(source) => source,
            Err(e) => return recover(e),
        };

        let released = matches!(self.deck, Deck::Loaded(_));
        self.deck = Deck::Empty;
        let engine = match AudioEngine::with_source(
            source,
            self.outputs.as_ref(),
            &self.engine_config,
        ) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(path, released, "opening output failed: {e}");
                if released {
                    self.emit(Response::File(None));
                    self.announce();
                }
                return recover(e);
            }
        };

        self.deck = Deck::Loaded(Box::new(Loaded {
            engine,
            playing: false,
            ended: false,
        }));
        self.next_report_at = 0;
        tracing::info!(path, "loaded");

        self.emit(Response::File(Some(path.to_string())));
        if let Some(len) = self.length() {
            self.emit(Response::Length(len));
        }
        self.announce();
        Ok(CommandResult::success())
    }

    pub fn play(&mut self) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        let Deck::Loaded(loaded) = &mut self.deck else {
            return Ok(CommandResult::failure(MSG_NEEDS_LOADED));
        };
        if loaded.playing {
            return Ok(CommandResult::success());
        }
        if loaded.ended {
            return Ok(CommandResult::failure(MSG_FILE_ENDED));
        }

        loaded.engine.update();
        loaded.engine.start();
        loaded.playing = true;
        tracing::info!(path = %loaded.engine.path(), "playing");
        self.announce();
        Ok(CommandResult::success())
    }

    /// Stop output. Repeated stops succeed without emitting anything.
    pub fn stop(&mut self) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        let Deck::Loaded(loaded) = &mut self.deck else {
            return Ok(CommandResult::failure(MSG_NEEDS_LOADED));
        };
        if !loaded.playing {
            return Ok(CommandResult::success());
        }

        loaded.engine.stop();
        loaded.playing = false;
        tracing::info!(
            path = %loaded.engine.path(),
            underruns = loaded.engine.underruns(),
            "stopped"
        );
        self.announce();
        Ok(CommandResult::success())
    }

    /// Move to `position_us`, keeping the current play/stop state.
    ///
    /// Succeeds with the resolved position in microseconds.
    pub fn seek(&mut self, position_us: u64) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        let Deck::Loaded(loaded) = &mut self.deck else {
            return Ok(CommandResult::failure(MSG_NEEDS_LOADED));
        };

        if let Err(e) = loaded.engine.seek_to(position_us) {
            return recover(e);
        }
        loaded.ended = false;
        // Refill right away so a playing file resumes on the next callback.
        loaded.engine.update();
        tracing::info!(path = %loaded.engine.path(), position_us, "seeked");

        self.next_report_at = self.next_period_after(position_us);
        self.emit(Response::Position(position_us));
        Ok(CommandResult::success_with(position_us.to_string()))
    }

    /// Unload the current file, if any.
    pub fn eject(&mut self) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        if matches!(self.deck, Deck::Empty) {
            return Ok(CommandResult::success());
        }

        self.deck = Deck::Empty;
        tracing::info!("ejected");
        self.emit(Response::File(None));
        self.announce();
        Ok(CommandResult::success())
    }

    /// Re-broadcast the full player snapshot.
    pub fn dump(&mut self) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        for response in self.snapshot() {
            self.emit(response);
        }
        Ok(CommandResult::success())
    }

    /// Release the engine and enter the terminal state.
    pub fn quit(&mut self) -> Result<CommandResult> {
        if let Some(rejected) = self.reject_if_quitting() {
            return Ok(rejected);
        }
        self.deck = Deck::Quitting;
        tracing::info!("quitting");
        self.announce();
        Ok(CommandResult::success())
    }

    /// Periodic tick: pump audio, detect end of file, report position.
    ///
    /// Returns `false` once the player has quit; the host loop should stop
    /// ticking and shut down.
    pub fn update(&mut self) -> bool {
        let period = self.position_period;
        let loaded = match &mut self.deck {
            Deck::Loaded(loaded) => loaded,
            Deck::Empty => return true,
            Deck::Quitting => return false,
        };

        loaded.engine.update();
        if !loaded.playing {
            return true;
        }

        if loaded.engine.is_drained() {
            loaded.engine.stop();
            loaded.playing = false;
            loaded.ended = true;
            tracing::info!(
                path = %loaded.engine.path(),
                underruns = loaded.engine.underruns(),
                "reached end of file"
            );
            self.emit(Response::End);
            self.announce();
            return true;
        }

        let pos = loaded.engine.position();
        if pos >= self.next_report_at {
            self.next_report_at = (pos / period + 1).saturating_mul(period);
            tracing::debug!(position_us = pos, "position report");
            self.emit(Response::Position(pos));
        }
        true
    }

    fn reject_if_quitting(&self) -> Option<CommandResult> {
        matches!(self.deck, Deck::Quitting).then(|| CommandResult::invalid(MSG_QUITTING))
    }

    fn next_period_after(&self, pos: u64) -> u64 {
        (pos / self.position_period + 1).saturating_mul(self.position_period)
    }

    /// Broadcast the state, plus the position when a file is loaded.
    fn announce(&self) {
        self.emit(Response::State(self.state()));
        if let Some(pos) = self.position() {
            self.emit(Response::Position(pos));
        }
    }

    fn emit(&self, response: Response) {
        self.listeners.respond(response);
    }
}
