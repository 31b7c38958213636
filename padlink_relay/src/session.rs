// Session manager: participant lifecycle inside rooms.
//
// `SessionManager` owns the `RoomRegistry` and the process-wide participant
// ID counter, and is the only code that mutates participant slots. All
// mutation happens through methods called from the relay's single-threaded
// main loop, so each operation (including the notifications it emits) runs to
// completion before the next one starts. No internal locking.
//
// Slot lifecycle:
//   join ──> connected ──disconnect──> disconnected ──reconnect──> connected ...
// A slot is only discarded when its room closes. There is no explicit leave:
// teardown arrives from the transport as a bare connection ID, and
// `mark_disconnected` decides whether that connection was a participant (slot
// is kept, host is told) or a host (the whole room is closed).
//
// A connection holds at most one role: host of one room, or bound to one
// participant slot. `create_room`, `join` and `reconnect` refuse a connection
// that already has one with `RoleConflict`, so a disconnect always resolves to
// exactly one room.
//
// Notifications (all fire-and-forget through the `Transport`):
// - join:       `otherPlayerJoined` to connected participants, `playerJoined`
//               to the host.
// - reconnect:  `playerJoined` to the host (same shape as a join).
// - disconnect: `playerDisconnected` to the host.
// - close:      `gameEnded` to every member of the room's group.

use padlink_protocol::{ConnectionId, ParticipantId, PlayerInfo, RoomCode, ServerEvent};

use crate::error::RelayError;
use crate::registry::{Participant, RoomRegistry};
use crate::transport::Transport;

/// `gameEnded` reason sent when a room closes because its host went away.
pub const HOST_DISCONNECTED: &str = "Host disconnected";

/// What a connection teardown turned out to mean.
#[derive(Clone, Debug, PartialEq)]
pub enum Disconnection {
    /// A participant's slot was marked disconnected.
    Participant { room: RoomCode, player: PlayerInfo },
    /// A host left and its room was closed.
    Host { room: RoomCode },
    /// The connection held no role (never joined, or already cleaned up).
    Unknown,
}

pub struct SessionManager {
    registry: RoomRegistry,
    next_participant_id: u32,
}

impl SessionManager {
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            registry,
            next_participant_id: 1,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Open a room hosted by `host` and put the host in the room's group.
    pub fn create_room<T: Transport>(
        &mut self,
        host: ConnectionId,
        transport: &mut T,
    ) -> Result<RoomCode, RelayError> {
        self.ensure_unbound(host)?;
        let code = self.registry.create_room(host)?;
        transport.join_group(host, &code);
        tracing::info!(room = %code, %host, "room created");
        Ok(code)
    }

    /// Give `connection` a new participant slot in room `code`.
    ///
    /// The only operation that consumes a participant ID; a failed join
    /// leaves the counter and every room untouched.
    pub fn join<T: Transport>(
        &mut self,
        code: &RoomCode,
        name: Option<&str>,
        connection: ConnectionId,
        transport: &mut T,
    ) -> Result<PlayerInfo, RelayError> {
        self.ensure_unbound(connection)?;
        let room = self.registry.get_mut(code)?;

        let id = ParticipantId(self.next_participant_id);
        let next = self
            .next_participant_id
            .checked_add(1)
            .ok_or(RelayError::ParticipantIdsExhausted)?;
        self.next_participant_id = next;

        let participant = Participant::new(id, display_name(name, id), connection);
        let info = participant.info();
        let host = room.host();

        // Tell the participants already here before the newcomer enters the
        // group, so it does not hear about itself.
        let others = ServerEvent::OtherPlayerJoined(info.clone()).to_envelope();
        transport.emit_to_group(code, &others, &|c| c != host);

        room.insert_participant(participant);
        transport.join_group(connection, code);
        transport.send_event(host, &ServerEvent::PlayerJoined(info.clone()));

        tracing::info!(
            room = %code,
            player_id = %id,
            player_name = %info.player_name,
            %connection,
            "player joined"
        );
        Ok(info)
    }

    /// Rebind a disconnected slot to `connection`.
    ///
    /// Rejected when the slot does not exist or is still connected; a
    /// rejection mutates nothing.
    pub fn reconnect<T: Transport>(
        &mut self,
        code: &RoomCode,
        participant_id: ParticipantId,
        connection: ConnectionId,
        transport: &mut T,
    ) -> Result<PlayerInfo, RelayError> {
        self.ensure_unbound(connection)?;
        let room = self.registry.get_mut(code)?;
        let host = room.host();

        let participant = room
            .participant_mut(participant_id)
            .filter(|p| !p.connected())
            .ok_or_else(|| RelayError::ReconnectRejected {
                room: code.clone(),
                participant: participant_id,
            })?;
        participant.bind(connection);
        let info = participant.info();

        transport.join_group(connection, code);
        transport.send_event(host, &ServerEvent::PlayerJoined(info.clone()));

        tracing::info!(room = %code, player_id = %participant_id, %connection, "player reconnected");
        Ok(info)
    }

    /// Handle the loss of `connection`.
    ///
    /// A connection holds at most one role, so the participant branch and the
    /// host branch are exclusive: a participant match stops the search.
    pub fn mark_disconnected<T: Transport>(
        &mut self,
        connection: ConnectionId,
        transport: &mut T,
    ) -> Disconnection {
        let found = self.registry.rooms_mut().find_map(|room| {
            let code = room.code().clone();
            let host = room.host();
            room.participant_by_connection_mut(connection)
                .map(|participant| {
                    participant.unbind();
                    (code, host, participant.info())
                })
        });

        if let Some((room, host, player)) = found {
            transport.leave_group(connection, &room);
            transport.send_event(host, &ServerEvent::PlayerDisconnected(player.clone()));
            tracing::info!(
                room = %room,
                player_id = %player.player_id,
                %connection,
                "player disconnected"
            );
            return Disconnection::Participant { room, player };
        }

        if let Some(room) = self.registry.find_by_host(connection).cloned() {
            tracing::info!(room = %room, %connection, "host disconnected");
            self.close_room(&room, HOST_DISCONNECTED, transport);
            return Disconnection::Host { room };
        }

        Disconnection::Unknown
    }

    /// Tell every member of the room it ended, then remove it.
    /// Returns false if there was no such room.
    pub fn close_room<T: Transport>(
        &mut self,
        code: &RoomCode,
        reason: &str,
        transport: &mut T,
    ) -> bool {
        if self.registry.get(code).is_err() {
            return false;
        }

        let ended = ServerEvent::GameEnded {
            reason: reason.to_owned(),
        }
        .to_envelope();
        let notified = transport.emit_to_group(code, &ended, &|_| true);
        transport.dissolve_group(code);
        self.registry.remove(code);

        tracing::info!(room = %code, notified, reason, "room closed");
        true
    }

    fn ensure_unbound(&self, connection: ConnectionId) -> Result<(), RelayError> {
        match self.registry.room_of(connection) {
            Some(room) => Err(RelayError::RoleConflict {
                connection,
                room: room.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// The name a participant is shown under: the trimmed requested name, or a
/// placeholder derived from its ID.
fn display_name(requested: Option<&str>, id: ParticipantId) -> String {
    requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Player {id}"))
}
