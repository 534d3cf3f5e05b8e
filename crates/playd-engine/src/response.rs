//! Responses the player broadcasts to listeners, and their line encoding.

use crate::player::PlayerState;

/// A fact about the player, rendered for clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Greeting sent to a newly connected client.
    Ohai { client_id: u64, server: String },
    /// Path of the loaded file, or `None` when nothing is loaded.
    File(Option<String>),
    State(PlayerState),
    /// Playback position in microseconds.
    Position(u64),
    /// Duration of the loaded file in microseconds.
    Length(u64),
    /// The loaded file played through to its end.
    End,
}

impl Response {
    pub fn code(&self) -> &'static str {
        match self {
            Response::Ohai { .. } => "OHAI",
            Response::File(_) => "FILE",
            Response::State(_) => "STATE",
            Response::Position(_) => "POS",
            Response::Length(_) => "LEN",
            Response::End => "END",
        }
    }

    /// Encode as one protocol line, without the trailing newline.
    pub fn pack(&self) -> String {
        let args: Vec<String> = match self {
            Response::Ohai { client_id, server } => vec![client_id.to_string(), server.clone()],
            Response::File(Some(path)) => vec![path.clone()],
            Response::File(None) | Response::End => Vec::new(),
            Response::State(state) => vec![state.to_string()],
            Response::Position(us) | Response::Length(us) => vec![us.to_string()],
        };
        pack_line(self.code(), &args)
    }
}

/// Join a code and its arguments, escaping each argument.
pub fn pack_line<S: AsRef<str>>(code: &str, args: &[S]) -> String {
    let mut line = code.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&escape_arg(arg.as_ref()));
    }
    line
}

/// Single-quote an argument if it contains whitespace, quotes or backslashes.
///
/// Inside the quotes, `'` is written as `'\''`. The empty string is written
/// as `''` so it survives tokenising.
pub fn escape_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if !needs_quotes {
        return arg.to_string();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            out.push_str(r"'\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Where the player sends its responses.
///
/// Delivery is fire-and-forget; implementations decide the fan-out.
pub trait ResponseSink {
    fn respond(&self, response: Response);
}
