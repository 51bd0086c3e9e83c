// Console input parsing
//
// Every line is one update: "<user> <payload>". A payload starting with '/'
// is a command, one starting with '#' is a button press, anything else is a
// plain message.

use thiserror::Error;

/// Update delivered to a conversation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Free text typed by the user
    Message(String),

    /// Data attached to a pressed button
    Callback(String),
}

impl Update {
    /// Text of a plain message, `None` for button presses
    pub fn text(&self) -> Option<&str> {
        match self {
            Update::Message(text) => Some(text),
            Update::Callback(_) => None,
        }
    }
}

/// Commands handled by the router rather than by a flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate,
    Clear,
    Status,
    Unknown(String),
}

impl Command {
    fn parse(name: &str) -> Self {
        match name {
            "generate" => Command::Generate,
            "clear" => Command::Clear,
            "status" => Command::Status,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Command { user: String, command: Command },
    Update { user: String, update: Update },
}

impl Incoming {
    pub fn user(&self) -> &str {
        match self {
            Incoming::Command { user, .. } | Incoming::Update { user, .. } => user,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("empty line")]
    Empty,

    #[error("missing command name after '/'")]
    MissingCommand,
}

/// Parse one console line
pub fn parse_line(line: &str) -> Result<Incoming, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(InputError::Empty);
    }

    let (user, payload) = match line.split_once(char::is_whitespace) {
        Some((user, rest)) => (user.to_string(), rest.trim()),
        None => (line.to_string(), ""),
    };

    if let Some(name) = payload.strip_prefix('/') {
        // Only the first word names the command; arguments are ignored
        let name = name.split_whitespace().next().ok_or(InputError::MissingCommand)?;
        return Ok(Incoming::Command {
            user,
            command: Command::parse(&name.to_lowercase()),
        });
    }

    let update = match payload.strip_prefix('#') {
        Some(data) => Update::Callback(data.trim().to_string()),
        None => Update::Message(payload.to_string()),
    };

    Ok(Incoming::Update { user, update })
}
