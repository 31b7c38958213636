// padlink_protocol — wire protocol for the padlink room broker.
//
// Shared by the broker (`padlink_relay`) and anything that talks to it: game
// hosts, controller clients, and the integration tests. It has no networking
// or threading of its own.
//
// Module overview:
// - `types.rs`:    ID newtypes (`ParticipantId`, `ConnectionId`) and the
//                  case-normalizing `RoomCode`.
// - `message.rs`:  The `Envelope` frame shape, typed request payloads with
//                  boundary validation, outbound `ServerEvent`s, and
//                  acknowledgement responses.
// - `framing.rs`:  4-byte big-endian length prefix + JSON body over any
//                  `Read`/`Write`.
//
// Design decisions:
// - **One frame shape for everything.** Requests, acks, broker events and
//   relayed application events are all `{event, ack?, data}`. The broker
//   forwards relayed payloads as opaque `serde_json::Value`s.
// - **Validate at the edge.** Payloads are decoded into concrete structs
//   before any room state is touched; a missing or ill-typed field is a
//   `DecodeError`, never a silently defaulted value (optional fields are
//   marked as such explicitly).

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_FRAME_SIZE, read_frame, recv_envelope, send_envelope, write_frame};
pub use message::{
    AckFailure, AckResponse, ClientRequest, DecodeError, Envelope, InputReceived, JoinAccepted,
    JoinRoom, MessageToPlayer, MessageToRoom, PlayerInfo, PlayerInput, ReconnectAccepted,
    ReconnectPlayer, ServerEvent,
};
pub use types::{ConnectionId, InvalidRoomCode, ParticipantId, RoomCode};
