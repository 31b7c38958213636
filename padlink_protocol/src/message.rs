// Protocol messages for host/participant ↔ broker communication.
//
// Every frame on the wire is an `Envelope`: an event name, an optional
// acknowledgement id, and a JSON `data` payload. Envelopes are deliberately
// loose so that relayed application events (whose names and payloads the
// broker never interprets) share the same shape as the broker's own events.
//
// Typing happens at the edges:
// - `ClientRequest::from_envelope` validates an inbound envelope against the
//   payload struct for its event name and fails with a `DecodeError` instead
//   of letting missing or ill-typed fields through.
// - `ServerEvent` is the vocabulary the broker emits (lifecycle
//   notifications plus pass-through `Relayed` events).
// - `AckResponse` is the reply to a request that carried an `ack` id.
//
// Field names on the wire are camelCase (`roomCode`, `playerId`, ...).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ParticipantId, RoomCode};

/// Event name used for acknowledgement frames.
pub const ACK_EVENT: &str = "ack";

pub const CREATE_ROOM: &str = "createRoom";
pub const MESSAGE_TO_PLAYER: &str = "messageToPlayer";
pub const MESSAGE_TO_ROOM: &str = "messageToRoom";
pub const JOIN_ROOM: &str = "joinRoom";
pub const RECONNECT_PLAYER: &str = "reconnectPlayer";
pub const PLAYER_INPUT: &str = "playerInput";

pub const PLAYER_JOINED: &str = "playerJoined";
pub const OTHER_PLAYER_JOINED: &str = "otherPlayerJoined";
pub const INPUT_RECEIVED: &str = "inputReceived";
pub const PLAYER_DISCONNECTED: &str = "playerDisconnected";
pub const GAME_ENDED: &str = "gameEnded";

/// One frame on the wire, in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            ack: None,
            data,
        }
    }

    /// Build the acknowledgement frame answering request `id`.
    pub fn ack(id: u64, response: &AckResponse) -> Self {
        Self {
            event: ACK_EVENT.into(),
            ack: Some(id),
            data: encode(response),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.event == ACK_EVENT && self.ack.is_some()
    }
}

/// Why an inbound envelope could not be turned into a `ClientRequest`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Host → broker: deliver an application event to one participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageToPlayer {
    pub room_code: RoomCode,
    pub player_id: ParticipantId,
    pub event_name: String,
    #[serde(default)]
    pub payload: Value,
}

/// Host → broker: deliver an application event to every participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageToRoom {
    pub room_code: RoomCode,
    pub event_name: String,
    #[serde(default)]
    pub payload: Value,
}

/// Participant → broker: take a new slot in a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_code: RoomCode,
    #[serde(default)]
    pub player_name: Option<String>,
}

/// Participant → broker: rebind a previously disconnected slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPlayer {
    pub room_code: RoomCode,
    pub player_id: ParticipantId,
}

/// Participant → broker: controller input destined for the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    pub room_code: RoomCode,
    pub player_id: ParticipantId,
    pub input_type: String,
    #[serde(default)]
    pub value: Value,
}

/// A validated inbound request.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientRequest {
    CreateRoom,
    MessageToPlayer(MessageToPlayer),
    MessageToRoom(MessageToRoom),
    JoinRoom(JoinRoom),
    ReconnectPlayer(ReconnectPlayer),
    PlayerInput(PlayerInput),
}

impl ClientRequest {
    /// Validate `envelope.data` against the payload shape of its event.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, DecodeError> {
        let data = &envelope.data;
        let request = match envelope.event.as_str() {
            CREATE_ROOM => Self::CreateRoom,
            MESSAGE_TO_PLAYER => Self::MessageToPlayer(payload(MESSAGE_TO_PLAYER, data)?),
            MESSAGE_TO_ROOM => Self::MessageToRoom(payload(MESSAGE_TO_ROOM, data)?),
            JOIN_ROOM => Self::JoinRoom(payload(JOIN_ROOM, data)?),
            RECONNECT_PLAYER => Self::ReconnectPlayer(payload(RECONNECT_PLAYER, data)?),
            PLAYER_INPUT => Self::PlayerInput(payload(PLAYER_INPUT, data)?),
            other => return Err(DecodeError::UnknownEvent(other.to_owned())),
        };
        Ok(request)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CreateRoom => CREATE_ROOM,
            Self::MessageToPlayer(_) => MESSAGE_TO_PLAYER,
            Self::MessageToRoom(_) => MESSAGE_TO_ROOM,
            Self::JoinRoom(_) => JOIN_ROOM,
            Self::ReconnectPlayer(_) => RECONNECT_PLAYER,
            Self::PlayerInput(_) => PLAYER_INPUT,
        }
    }

    /// Wrap this request in an envelope, optionally asking for an ack.
    pub fn to_envelope(&self, ack: Option<u64>) -> Envelope {
        let data = match self {
            Self::CreateRoom => Value::Null,
            Self::MessageToPlayer(p) => encode(p),
            Self::MessageToRoom(p) => encode(p),
            Self::JoinRoom(p) => encode(p),
            Self::ReconnectPlayer(p) => encode(p),
            Self::PlayerInput(p) => encode(p),
        };
        Envelope {
            event: self.event_name().into(),
            ack,
            data,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &'static str, data: &Value) -> Result<T, DecodeError> {
    serde_json::from_value(data.clone())
        .map_err(|source| DecodeError::InvalidPayload { event, source })
}

// Every type passed here has a derived `Serialize` over strings, integers and
// `Value`, which cannot fail to convert.
fn encode<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Public identity of a participant, as seen by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_id: ParticipantId,
    pub player_name: String,
}

/// Input forwarded to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputReceived {
    pub player_id: ParticipantId,
    pub input_type: String,
    #[serde(default)]
    pub value: Value,
}

/// Events sent by the broker.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// A participant joined or reconnected (host only).
    PlayerJoined(PlayerInfo),
    /// Another participant joined the room (participants only).
    OtherPlayerJoined(PlayerInfo),
    /// Controller input from a participant (host only).
    InputReceived(InputReceived),
    /// A participant's connection dropped (host only).
    PlayerDisconnected(PlayerInfo),
    /// The room was closed.
    GameEnded { reason: String },
    /// An application event passed through from the host untouched.
    Relayed { event_name: String, payload: Value },
}

impl ServerEvent {
    pub fn to_envelope(&self) -> Envelope {
        match self {
            Self::PlayerJoined(info) => Envelope::new(PLAYER_JOINED, encode(info)),
            Self::OtherPlayerJoined(info) => Envelope::new(OTHER_PLAYER_JOINED, encode(info)),
            Self::InputReceived(input) => Envelope::new(INPUT_RECEIVED, encode(input)),
            Self::PlayerDisconnected(info) => Envelope::new(PLAYER_DISCONNECTED, encode(info)),
            Self::GameEnded { reason } => Envelope::new(GAME_ENDED, Value::from(reason.as_str())),
            Self::Relayed {
                event_name,
                payload,
            } => Envelope::new(event_name.as_str(), payload.clone()),
        }
    }

    /// Interpret an outbound envelope. Anything that is not one of the
    /// broker's own events (or does not fit its shape) is a relayed event.
    pub fn from_envelope(envelope: Envelope) -> Self {
        let decoded = match envelope.event.as_str() {
            PLAYER_JOINED => serde_json::from_value(envelope.data.clone())
                .ok()
                .map(Self::PlayerJoined),
            OTHER_PLAYER_JOINED => serde_json::from_value(envelope.data.clone())
                .ok()
                .map(Self::OtherPlayerJoined),
            INPUT_RECEIVED => serde_json::from_value(envelope.data.clone())
                .ok()
                .map(Self::InputReceived),
            PLAYER_DISCONNECTED => serde_json::from_value(envelope.data.clone())
                .ok()
                .map(Self::PlayerDisconnected),
            GAME_ENDED => envelope.data.as_str().map(|reason| Self::GameEnded {
                reason: reason.to_owned(),
            }),
            _ => None,
        };
        decoded.unwrap_or(Self::Relayed {
            event_name: envelope.event,
            payload: envelope.data,
        })
    }
}

/// `{ success: false, message }`: the failure shape shared by every ack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckFailure {
    pub success: bool,
    pub message: String,
}

/// Successful `joinRoom` acknowledgement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAccepted {
    pub success: bool,
    pub player_id: ParticipantId,
    pub room_code: RoomCode,
}

/// Successful `reconnectPlayer` acknowledgement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectAccepted {
    pub success: bool,
    pub player_id: ParticipantId,
    pub player_name: String,
}

/// Acknowledgement payload. Untagged: variants are told apart by shape, so
/// `Failure` (the only one with `message`) is tried before the success forms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AckResponse {
    /// `createRoom` acknowledges with the bare room code string.
    RoomCreated(RoomCode),
    Failure(AckFailure),
    Joined(JoinAccepted),
    Reconnected(ReconnectAccepted),
}

impl AckResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(AckFailure {
            success: false,
            message: message.into(),
        })
    }

    pub fn joined(player_id: ParticipantId, room_code: RoomCode) -> Self {
        Self::Joined(JoinAccepted {
            success: true,
            player_id,
            room_code,
        })
    }

    pub fn reconnected(player_id: ParticipantId, player_name: String) -> Self {
        Self::Reconnected(ReconnectAccepted {
            success: true,
            player_id,
            player_name,
        })
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }
}
