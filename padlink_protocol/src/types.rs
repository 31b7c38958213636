// Core identifier types for the padlink protocol.
//
// `ParticipantId` and `ConnectionId` are compact integer newtypes assigned by
// the broker. `RoomCode` is the short human-typed room identifier; it is
// always stored upper-case, and every way of constructing one (parsing,
// `TryFrom<String>`, serde) normalizes the input, so two codes compare equal
// iff they name the same room regardless of the case a player typed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broker-assigned participant ID. Unique for the lifetime of the broker
/// process and never reused, even after the participant disconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-assigned connection ID. One per accepted socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Longest room code accepted from the wire. Generated codes are shorter;
/// this only bounds what a client may send.
pub const MAX_ROOM_CODE_LEN: usize = 16;

/// A room code that failed validation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid room code {0:?}: expected 1-16 ASCII letters or digits")]
pub struct InvalidRoomCode(pub String);

/// Upper-case alphanumeric room code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = InvalidRoomCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_ROOM_CODE_LEN
            || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(InvalidRoomCode(s.to_owned()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for RoomCode {
    type Error = InvalidRoomCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
