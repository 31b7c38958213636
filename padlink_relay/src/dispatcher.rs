// Connection event dispatcher: the boundary between transport and core.
//
// The transport reports three things: a connection appeared, a connection
// sent a frame, a connection went away. `ConnectionEventDispatcher` turns
// each into calls on the `SessionManager` and the `relay` functions, and
// answers requests that carried an ack id.
//
// Validation happens here, before any state is touched:
// - frames are decoded into a typed `ClientRequest`; a decode failure is a
//   `MalformedRequest`, acked as a failure when possible, otherwise logged;
// - relay requests (`messageToPlayer`, `messageToRoom`) are only honored from
//   the connection hosting the named room;
// - `playerInput` is checked against the sender's bound connection inside
//   `relay::player_input`.
// - a connection that already hosts a room or holds a slot cannot create,
//   join or reconnect; `SessionManager` refuses with `RoleConflict` and the
//   request is acked as a failure.
//
// Requests without an acknowledgement channel never produce a reply; their
// failures are logged at `warn` and dropped.

use padlink_protocol::{
    AckResponse, ClientRequest, ConnectionId, Envelope, JoinRoom, MessageToPlayer, MessageToRoom,
    PlayerInput, ReconnectPlayer, RoomCode,
};

use crate::error::RelayError;
use crate::relay;
use crate::session::{Disconnection, SessionManager};
use crate::transport::Transport;

pub struct ConnectionEventDispatcher<T> {
    sessions: SessionManager,
    transport: T,
}

impl<T: Transport> ConnectionEventDispatcher<T> {
    pub fn new(sessions: SessionManager, transport: T) -> Self {
        Self {
            sessions,
            transport,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn handle_connect(&mut self, connection: ConnectionId) {
        tracing::debug!(%connection, "connection opened");
    }

    /// Handle one inbound frame from `connection`.
    pub fn handle_frame(&mut self, connection: ConnectionId, envelope: Envelope) {
        let ack = envelope.ack;
        let request = match ClientRequest::from_envelope(&envelope) {
            Ok(request) => request,
            Err(e) => {
                let err = RelayError::from(e);
                tracing::warn!(%connection, event = %envelope.event, error = %err, "rejected request");
                self.reply(connection, ack, AckResponse::failure(err.to_string()));
                return;
            }
        };

        match request {
            ClientRequest::CreateRoom => {
                let response = match self.sessions.create_room(connection, &mut self.transport) {
                    Ok(code) => AckResponse::RoomCreated(code),
                    Err(e) => {
                        tracing::warn!(%connection, error = %e, "createRoom failed");
                        AckResponse::failure(e.to_string())
                    }
                };
                self.reply(connection, ack, response);
            }
            ClientRequest::JoinRoom(join) => self.join_room(connection, ack, join),
            ClientRequest::ReconnectPlayer(reconnect) => {
                self.reconnect_player(connection, ack, reconnect);
            }
            ClientRequest::MessageToPlayer(message) => self.message_to_player(connection, message),
            ClientRequest::MessageToRoom(message) => self.message_to_room(connection, message),
            ClientRequest::PlayerInput(input) => self.player_input(connection, input),
        }
    }

    /// Handle teardown of `connection`. The transport forgets the connection
    /// first so nothing is written to a dead socket.
    pub fn handle_disconnect(&mut self, connection: ConnectionId) -> Disconnection {
        self.transport.drop_connection(connection);
        let outcome = self.sessions.mark_disconnected(connection, &mut self.transport);
        if outcome == Disconnection::Unknown {
            tracing::debug!(%connection, "connection closed without a role");
        }
        outcome
    }

    fn join_room(&mut self, connection: ConnectionId, ack: Option<u64>, join: JoinRoom) {
        let JoinRoom {
            room_code,
            player_name,
        } = join;
        let response = match self.sessions.join(
            &room_code,
            player_name.as_deref(),
            connection,
            &mut self.transport,
        ) {
            Ok(info) => AckResponse::joined(info.player_id, room_code),
            Err(e) => {
                tracing::warn!(%connection, room = %room_code, error = %e, "joinRoom failed");
                AckResponse::failure(e.to_string())
            }
        };
        self.reply(connection, ack, response);
    }

    fn reconnect_player(
        &mut self,
        connection: ConnectionId,
        ack: Option<u64>,
        reconnect: ReconnectPlayer,
    ) {
        let response = match self.sessions.reconnect(
            &reconnect.room_code,
            reconnect.player_id,
            connection,
            &mut self.transport,
        ) {
            Ok(info) => AckResponse::reconnected(info.player_id, info.player_name),
            Err(e) => {
                tracing::warn!(
                    %connection,
                    room = %reconnect.room_code,
                    player_id = %reconnect.player_id,
                    error = %e,
                    "reconnectPlayer failed"
                );
                AckResponse::failure(e.to_string())
            }
        };
        self.reply(connection, ack, response);
    }

    fn message_to_player(&mut self, connection: ConnectionId, message: MessageToPlayer) {
        if let Err(e) = self.require_host(connection, &message.room_code, "message players") {
            tracing::warn!(error = %e, "messageToPlayer dropped");
            return;
        }
        relay::to_participant(
            self.sessions.registry(),
            &mut self.transport,
            &message.room_code,
            message.player_id,
            &message.event_name,
            message.payload,
        );
    }

    fn message_to_room(&mut self, connection: ConnectionId, message: MessageToRoom) {
        if let Err(e) = self.require_host(connection, &message.room_code, "message the room") {
            tracing::warn!(error = %e, "messageToRoom dropped");
            return;
        }
        relay::to_room(
            self.sessions.registry(),
            &mut self.transport,
            &message.room_code,
            &message.event_name,
            message.payload,
            true,
        );
    }

    fn player_input(&mut self, connection: ConnectionId, input: PlayerInput) {
        let result = relay::player_input(
            self.sessions.registry(),
            &mut self.transport,
            &input.room_code,
            input.player_id,
            connection,
            input.input_type,
            input.value,
        );
        if let Err(e) = result {
            tracing::warn!(error = %e, "playerInput dropped");
        }
    }

    /// Relay requests must come from the room's host. An unknown room is let
    /// through so the relay can log and drop it like any other miss.
    fn require_host(
        &self,
        connection: ConnectionId,
        code: &RoomCode,
        action: &str,
    ) -> Result<(), RelayError> {
        match self.sessions.registry().get(code) {
            Ok(room) if room.host() != connection => Err(RelayError::Unauthorized {
                connection,
                room: code.clone(),
                action: action.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn reply(&mut self, connection: ConnectionId, ack: Option<u64>, response: AckResponse) {
        match ack {
            Some(id) => self.transport.acknowledge(connection, id, &response),
            None if !response.is_success() => {
                tracing::debug!(%connection, "failure not acknowledged: request had no ack id");
            }
            None => {}
        }
    }
}
