// Error kinds for broker operations and the blocking client.
//
// `RelayError` covers every way a single request can fail inside the broker.
// None of them is fatal to the process: the dispatcher either turns the error
// into a `{success: false, message}` acknowledgement (when the request asked
// for one) or logs it and drops the request.

use padlink_protocol::{ConnectionId, DecodeError, ParticipantId, RoomCode};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("player {participant} cannot reconnect to room {room}")]
    ReconnectRejected {
        room: RoomCode,
        participant: ParticipantId,
    },

    #[error("{connection} is not allowed to {action} in room {room}")]
    Unauthorized {
        connection: ConnectionId,
        room: RoomCode,
        action: String,
    },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("no free room code after {attempts} attempts")]
    CapacityExhausted { attempts: u32 },

    #[error("{connection} already has a role in room {room}")]
    RoleConflict {
        connection: ConnectionId,
        room: RoomCode,
    },

    #[error("participant ids exhausted")]
    ParticipantIdsExhausted,
}

impl From<DecodeError> for RelayError {
    fn from(e: DecodeError) -> Self {
        RelayError::MalformedRequest(e.to_string())
    }
}

/// Errors surfaced by `NetClient`.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("connection closed by relay")]
    Closed,

    #[error("unexpected acknowledgement: {0}")]
    UnexpectedAck(String),
}
