//! Out-of-band commands accepted by the sensor host.

use serde_json::{Map, Value};

/// A command decoded from a loosely-typed command map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Report the live generation
    Status,
    /// Poll every source once, right now
    RefreshNow,
    /// Anything else; carries every key of the offending map
    Unknown(Vec<String>),
}

impl Command {
    /// Decode a command by key. `status` takes precedence over `refresh_now`.
    pub fn parse(command: &Map<String, Value>) -> Self {
        if command.contains_key("status") {
            Self::Status
        } else if command.contains_key("refresh_now") {
            Self::RefreshNow
        } else {
            Self::Unknown(command.keys().cloned().collect())
        }
    }
}

/// Build the `{"error": ...}` reply used for rejected commands.
pub fn error_reply(message: impl Into<String>) -> Map<String, Value> {
    let mut reply = Map::new();
    reply.insert("error".into(), Value::String(message.into()));
    reply
}

/// Build the `{"message": ...}` reply used for accepted commands.
pub fn message_reply(message: impl Into<String>) -> Map<String, Value> {
    let mut reply = Map::new();
    reply.insert("message".into(), Value::String(message.into()));
    reply
}
