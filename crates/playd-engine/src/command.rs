//! Command lines: tokenising, validation and dispatch onto the [`Player`].
//!
//! Outcomes are split three ways. A line the dispatcher cannot make sense of
//! (unknown verb, wrong arity, malformed argument) is `Invalid`. A well-formed
//! command the player cannot carry out right now is `Failure`. Everything
//! else is `Success`. Only fatal errors escape as `Err`.

use thiserror::Error;

use crate::error::{PlaydError, Result};
use crate::player::Player;
use crate::response::pack_line;
use crate::time::parse_micros;

pub(crate) const MSG_BAD_COMMAND: &str = "Bad command or file name";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokeniseError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("backslash at end of line")]
    TrailingEscape,
}

/// Split a line into words.
///
/// Whitespace separates words. `'...'` groups its contents literally.
/// `"..."` groups its contents but still honours backslash escapes, as does
/// unquoted text. Quotes can be adjacent to other text within one word, and
/// `''` or `""` on its own is an empty word.
pub fn tokenise(line: &str) -> std::result::Result<Vec<String>, TokeniseError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut escaping = false;

    for c in line.chars() {
        if escaping {
            word.push(c);
            escaping = false;
            continue;
        }
        match (quote, c) {
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            (Quote::Single, _) => word.push(c),
            (_, '\\') => {
                escaping = true;
                in_word = true;
            }
            (Quote::Double, _) => word.push(c),
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_word = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_word = true;
            }
            (Quote::None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            (Quote::None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if escaping {
        return Err(TokeniseError::TrailingEscape);
    }
    if quote != Quote::None {
        return Err(TokeniseError::UnterminatedQuote);
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

/// A validated command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Load(String),
    Play,
    Stop,
    /// Target position in microseconds.
    Seek(u64),
    Eject,
    Dump,
    Quit,
}

impl Command {
    /// Validate a tokenised line. The error is the message for an `Invalid` result.
    pub fn parse(words: &[String]) -> std::result::Result<Self, String> {
        let Some((verb, args)) = words.split_first() else {
            return Err(MSG_BAD_COMMAND.to_string());
        };

        let command = match (verb.as_str(), args) {
            ("load", [path]) => Command::Load(path.clone()),
            ("seek", [time]) => Command::Seek(parse_micros(time).map_err(|e| e.to_string())?),
            ("play", []) => Command::Play,
            ("stop", []) => Command::Stop,
            ("eject", []) => Command::Eject,
            ("dump", []) => Command::Dump,
            ("quit", []) => Command::Quit,
            ("load" | "seek", _) => return Err(format!("{verb} takes exactly one argument")),
            ("play" | "stop" | "eject" | "dump" | "quit", _) => {
                return Err(format!("{verb} takes no arguments"));
            }
            _ => return Err(MSG_BAD_COMMAND.to_string()),
        };
        Ok(command)
    }

    /// Run this command against `player`.
    pub fn apply(self, player: &mut Player) -> Result<CommandResult> {
        match self {
            Command::Load(path) => player.load(&path),
            Command::Play => player.play(),
            Command::Stop => player.stop(),
            Command::Seek(position_us) => player.seek(position_us),
            Command::Eject => player.eject(),
            Command::Dump => player.dump(),
            Command::Quit => player.quit(),
        }
    }
}

/// Outcome of one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Done, optionally with a value for the client.
    Success(Option<String>),
    /// The command itself was malformed or unknown.
    Invalid(String),
    /// A valid command that could not be carried out in the current state.
    Failure(String),
}

impl CommandResult {
    pub fn success() -> Self {
        Self::Success(None)
    }

    pub fn success_with(value: impl Into<String>) -> Self {
        Self::Success(Some(value.into()))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure(msg.into())
    }

    /// Encode as a reply line. Successes echo the command words back.
    pub fn pack(&self, words: &[String]) -> String {
        match self {
            CommandResult::Success(None) => pack_line("OK", words),
            CommandResult::Success(Some(value)) => {
                let mut args = words.to_vec();
                args.push(value.clone());
                pack_line("OK", &args)
            }
            CommandResult::Invalid(msg) => pack_line("WHAT", &[msg]),
            CommandResult::Failure(msg) => pack_line("FAIL", &[msg]),
        }
    }
}

/// Turn a recoverable error into a `Failure`; pass fatal ones through.
pub(crate) fn recover(err: PlaydError) -> Result<CommandResult> {
    match err {
        PlaydError::File(msg) | PlaydError::Seek(msg) => {
            tracing::warn!("command failed: {msg}");
            Ok(CommandResult::Failure(msg))
        }
        fatal @ (PlaydError::Config(_) | PlaydError::Internal(_)) => Err(fatal),
    }
}

/// A dispatched line and what came of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatched {
    pub words: Vec<String>,
    pub result: CommandResult,
}

impl Dispatched {
    /// The reply line for the issuing client.
    pub fn pack(&self) -> String {
        self.result.pack(&self.words)
    }
}

/// Tokenise, validate and execute one command line.
pub fn dispatch(player: &mut Player, line: &str) -> Result<Dispatched> {
    let words = match tokenise(line) {
        Ok(words) => words,
        Err(e) => {
            return Ok(Dispatched {
                words: Vec::new(),
                result: CommandResult::invalid(e.to_string()),
            });
        }
    };

    let result = match Command::parse(&words) {
        Ok(command) => {
            tracing::debug!(?command, "dispatching");
            command.apply(player)?
        }
        Err(msg) => {
            tracing::debug!(line, "invalid command: {msg}");
            CommandResult::Invalid(msg)
        }
    };
    Ok(Dispatched { words, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::player::{MSG_NEEDS_LOADED, PlayerState};
    use crate::response::Response;
    use crate::testing::{HeadlessOutput, RecordingSink, ToneOpener};

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn player() -> (Player, RecordingSink) {
        let opener = ToneOpener::new()
            .with_file("track.wav", 3_000_000)
            .with_file("my track.wav", 60_000_000);
        let responses = RecordingSink::default();
        let player = Player::new(
            Box::new(opener),
            Box::new(HeadlessOutput::default()),
            Box::new(responses.clone()),
        )
        .with_engine_config(EngineConfig {
            chunk_frames: 100,
            ring_chunks: 4,
        });
        (player, responses)
    }

    #[test]
    fn tokenise_splits_on_whitespace_runs() {
        assert_eq!(tokenise("  load   a.wav \t").unwrap(), words(&["load", "a.wav"]));
        assert!(tokenise("").unwrap().is_empty());
        assert!(tokenise("   ").unwrap().is_empty());
    }

    #[test]
    fn tokenise_groups_quoted_spans() {
        assert_eq!(
            tokenise(r#"load "my track.wav""#).unwrap(),
            words(&["load", "my track.wav"])
        );
        assert_eq!(
            tokenise(r"load 'my \track.wav'").unwrap(),
            words(&["load", r"my \track.wav"])
        );
        assert_eq!(
            tokenise(r#"load pre"fix mid"post"#).unwrap(),
            words(&["load", "prefix midpost"])
        );
        assert_eq!(tokenise(r#"load """#).unwrap(), words(&["load", ""]));
    }

    #[test]
    fn tokenise_honours_escapes() {
        assert_eq!(tokenise(r"load my\ track.wav").unwrap(), words(&["load", "my track.wav"]));
        assert_eq!(tokenise(r#"load "say \"hi\"""#).unwrap(), words(&["load", r#"say "hi""#]));
        assert_eq!(tokenise(r"a 'it'\''s'").unwrap(), words(&["a", "it's"]));
    }

    #[test]
    fn tokenise_rejects_unterminated_input() {
        assert_eq!(tokenise(r#"load "a.wav"#), Err(TokeniseError::UnterminatedQuote));
        assert_eq!(tokenise("load 'a.wav"), Err(TokeniseError::UnterminatedQuote));
        assert_eq!(tokenise(r"load a.wav\"), Err(TokeniseError::TrailingEscape));
    }

    #[test]
    fn parse_known_verbs() {
        assert_eq!(
            Command::parse(&words(&["load", "a.wav"])),
            Ok(Command::Load("a.wav".into()))
        );
        assert_eq!(
            Command::parse(&words(&["seek", "00:00:10"])),
            Ok(Command::Seek(10_000_000))
        );
        assert_eq!(Command::parse(&words(&["seek", "250ms"])), Ok(Command::Seek(250_000)));
        assert_eq!(Command::parse(&words(&["play"])), Ok(Command::Play));
        assert_eq!(Command::parse(&words(&["stop"])), Ok(Command::Stop));
        assert_eq!(Command::parse(&words(&["eject"])), Ok(Command::Eject));
        assert_eq!(Command::parse(&words(&["dump"])), Ok(Command::Dump));
        assert_eq!(Command::parse(&words(&["quit"])), Ok(Command::Quit));
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert_eq!(Command::parse(&[]), Err(MSG_BAD_COMMAND.to_string()));
        assert_eq!(Command::parse(&words(&["bogus"])), Err(MSG_BAD_COMMAND.to_string()));
        assert_eq!(Command::parse(&words(&["PLAY"])), Err(MSG_BAD_COMMAND.to_string()));
        assert!(Command::parse(&words(&["load"])).is_err());
        assert!(Command::parse(&words(&["load", "a", "b"])).is_err());
        assert!(Command::parse(&words(&["play", "now"])).is_err());
        assert!(Command::parse(&words(&["seek", "soon"])).is_err());
        assert!(Command::parse(&words(&["seek", "-1s"])).is_err());
    }

    #[test]
    fn results_pack_to_reply_lines() {
        let cmd = words(&["load", "my track.wav"]);
        assert_eq!(CommandResult::success().pack(&cmd), "OK load 'my track.wav'");
        assert_eq!(
            CommandResult::success_with("42").pack(&words(&["seek", "42"])),
            "OK seek 42 42"
        );
        assert_eq!(
            CommandResult::invalid("Bad command or file name").pack(&cmd),
            "WHAT 'Bad command or file name'"
        );
        assert_eq!(CommandResult::failure("nope").pack(&cmd), "FAIL nope");
    }

    #[test]
    fn recover_matches_on_kind() {
        assert_eq!(
            recover(PlaydError::file("gone")),
            Ok(CommandResult::failure("gone"))
        );
        assert_eq!(
            recover(PlaydError::seek("too far")),
            Ok(CommandResult::failure("too far"))
        );
        assert_eq!(
            recover(PlaydError::internal("broken")),
            Err(PlaydError::internal("broken"))
        );
    }

    #[test]
    fn dispatch_load_quoted_path() {
        let (mut player, responses) = player();
        let out = dispatch(&mut player, r#"load "my track.wav""#).unwrap();
        assert_eq!(out.pack(), "OK load 'my track.wav'");
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(responses.take().contains(&Response::File(Some("my track.wav".into()))));
    }

    #[test]
    fn dispatch_unknown_verb_is_invalid_and_silent() {
        let (mut player, responses) = player();
        player.load("track.wav").unwrap();
        responses.take();

        let out = dispatch(&mut player, "bogus").unwrap();
        assert_eq!(out.result, CommandResult::invalid(MSG_BAD_COMMAND));
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(responses.take().is_empty());
    }

    #[test]
    fn dispatch_empty_line_is_invalid() {
        let (mut player, _) = player();
        let out = dispatch(&mut player, "").unwrap();
        assert!(matches!(out.result, CommandResult::Invalid(_)));
    }

    #[test]
    fn dispatch_unterminated_quote_is_invalid() {
        let (mut player, _) = player();
        let out = dispatch(&mut player, r#"load "track.wav"#).unwrap();
        assert_eq!(out.pack(), "WHAT 'unterminated quote'");
        assert_eq!(player.state(), PlayerState::Empty);
    }

    #[test]
    fn dispatch_distinguishes_failure_from_invalid() {
        let (mut player, _) = player();
        let out = dispatch(&mut player, "seek 00:00:10").unwrap();
        assert_eq!(out.result, CommandResult::failure(MSG_NEEDS_LOADED));

        let out = dispatch(&mut player, "seek whenever").unwrap();
        assert!(matches!(out.result, CommandResult::Invalid(_)));
    }

    #[test]
    fn dispatch_seek_beyond_length_fails() {
        let (mut player, responses) = player();
        dispatch(&mut player, "load track.wav").unwrap();
        dispatch(&mut player, "seek 1s").unwrap();
        responses.take();

        let out = dispatch(&mut player, "seek 01:00:00").unwrap();
        assert!(matches!(out.result, CommandResult::Failure(_)));
        assert!(out.pack().starts_with("FAIL "));
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(player.position(), Some(1_000_000));
        assert!(responses.take().is_empty());
    }

    #[test]
    fn dispatch_seek_reports_resolved_position() {
        let (mut player, _) = player();
        dispatch(&mut player, "load 'my track.wav'").unwrap();
        let out = dispatch(&mut player, "seek 00:00:10").unwrap();
        assert_eq!(out.pack(), "OK seek 00:00:10 10000000");
        assert_eq!(player.position(), Some(10_000_000));
    }

    #[test]
    fn dispatch_quit_then_anything_is_invalid() {
        let (mut player, _) = player();
        dispatch(&mut player, "quit").unwrap();
        let out = dispatch(&mut player, "play").unwrap();
        assert!(matches!(out.result, CommandResult::Invalid(_)));
    }
}
