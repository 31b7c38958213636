// Message relay: routing of application events between host and participants.
//
// Stateless. Each function reads room state from the `RoomRegistry` to pick
// destination connections and hands the envelope to the `Transport`. The
// broker never looks inside relayed payloads.
//
// Delivery to an unknown room, an unknown participant, or a participant that
// is currently disconnected is dropped and logged rather than reported back:
// the host has no synchronous view of participant liveness, so these are
// expected races. Player input is the exception: it is checked against the
// sender's connection and refused as `Unauthorized` on mismatch.

use padlink_protocol::{ConnectionId, InputReceived, ParticipantId, RoomCode, ServerEvent};
use serde_json::Value;

use crate::error::RelayError;
use crate::registry::RoomRegistry;
use crate::transport::Transport;

/// Emit `event_name`/`payload` to one participant. Returns whether it was
/// handed to the transport.
pub fn to_participant<T: Transport>(
    registry: &RoomRegistry,
    transport: &mut T,
    code: &RoomCode,
    participant_id: ParticipantId,
    event_name: &str,
    payload: Value,
) -> bool {
    let target = registry
        .get(code)
        .ok()
        .and_then(|room| room.participant(participant_id))
        .and_then(|participant| participant.connection());

    let Some(connection) = target else {
        tracing::debug!(
            room = %code,
            player_id = %participant_id,
            event = event_name,
            "no live connection for player, message dropped"
        );
        return false;
    };

    let event = ServerEvent::Relayed {
        event_name: event_name.to_owned(),
        payload,
    };
    transport.send_event(connection, &event);
    tracing::debug!(room = %code, player_id = %participant_id, event = event_name, "relayed to player");
    true
}

/// Emit `event_name`/`payload` to every connection in the room's group,
/// leaving out the host when `exclude_host` is set. Returns the number of
/// connections emitted to.
pub fn to_room<T: Transport>(
    registry: &RoomRegistry,
    transport: &mut T,
    code: &RoomCode,
    event_name: &str,
    payload: Value,
    exclude_host: bool,
) -> usize {
    let Ok(room) = registry.get(code) else {
        tracing::debug!(room = %code, event = event_name, "unknown room, broadcast dropped");
        return 0;
    };

    let host = room.host();
    let envelope = ServerEvent::Relayed {
        event_name: event_name.to_owned(),
        payload,
    }
    .to_envelope();
    let delivered = transport.emit_to_group(code, &envelope, &|c| !(exclude_host && c == host));
    tracing::debug!(room = %code, event = event_name, delivered, "relayed to room");
    delivered
}

/// Forward controller input to the host, provided `sender` is the connection
/// currently bound to `participant_id` in that room.
pub fn player_input<T: Transport>(
    registry: &RoomRegistry,
    transport: &mut T,
    code: &RoomCode,
    participant_id: ParticipantId,
    sender: ConnectionId,
    input_type: String,
    value: Value,
) -> Result<(), RelayError> {
    let unauthorized = || RelayError::Unauthorized {
        connection: sender,
        room: code.clone(),
        action: format!("send input as player {participant_id}"),
    };

    let room = registry.get(code).map_err(|_| unauthorized())?;
    let bound = room
        .participant(participant_id)
        .and_then(|participant| participant.connection());
    if bound != Some(sender) {
        return Err(unauthorized());
    }

    let event = ServerEvent::InputReceived(InputReceived {
        player_id: participant_id,
        input_type,
        value,
    });
    transport.send_event(room.host(), &event);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::SessionManager;
    use crate::transport::testing::RecordingTransport;

    const HOST: ConnectionId = ConnectionId(100);
    const ALICE: ConnectionId = ConnectionId(1);
    const BOB: ConnectionId = ConnectionId(2);

    /// Room with Alice (player 1) and Bob (player 2), notifications drained.
    fn setup() -> (SessionManager, RecordingTransport, RoomCode) {
        let mut sessions = SessionManager::new(RoomRegistry::with_seed(11, 64));
        let mut transport = RecordingTransport::default();
        let code = sessions.create_room(HOST, &mut transport).unwrap();
        sessions.join(&code, Some("Alice"), ALICE, &mut transport).unwrap();
        sessions.join(&code, Some("Bob"), BOB, &mut transport).unwrap();
        for c in [HOST, ALICE, BOB] {
            transport.take_events(c);
        }
        (sessions, transport, code)
    }

    fn relayed(name: &str, payload: Value) -> ServerEvent {
        ServerEvent::Relayed {
            event_name: name.into(),
            payload,
        }
    }

    #[test]
    fn to_participant_reaches_only_target() {
        let (sessions, mut transport, code) = setup();
        let sent = to_participant(
            sessions.registry(),
            &mut transport,
            &code,
            ParticipantId(2),
            "yourTurn",
            json!({ "seconds": 30 }),
        );
        assert!(sent);
        assert_eq!(
            transport.take_events(BOB),
            vec![relayed("yourTurn", json!({ "seconds": 30 }))]
        );
        assert!(transport.take_events(ALICE).is_empty());
        assert!(transport.take_events(HOST).is_empty());
    }

    #[test]
    fn to_participant_drops_when_unreachable() {
        let (mut sessions, mut transport, code) = setup();
        sessions.mark_disconnected(BOB, &mut transport);
        transport.take_events(HOST);

        let missing: RoomCode = "NOPE1".parse().unwrap();
        for (room, id) in [
            (&code, ParticipantId(2)),
            (&code, ParticipantId(99)),
            (&missing, ParticipantId(1)),
        ] {
            let registry = sessions.registry();
            assert!(!to_participant(registry, &mut transport, room, id, "x", Value::Null));
        }
        assert_eq!(transport.total_sent(), 0);
    }

    #[test]
    fn to_room_excludes_host_by_request() {
        let (sessions, mut transport, code) = setup();
        let n = to_room(
            sessions.registry(),
            &mut transport,
            &code,
            "roundStart",
            json!(1),
            true,
        );
        assert_eq!(n, 2);
        assert!(transport.take_events(HOST).is_empty());
        assert_eq!(transport.take_events(ALICE), vec![relayed("roundStart", json!(1))]);
        assert_eq!(transport.take_events(BOB), vec![relayed("roundStart", json!(1))]);

        let n = to_room(
            sessions.registry(),
            &mut transport,
            &code,
            "roundStart",
            json!(2),
            false,
        );
        assert_eq!(n, 3);
        assert_eq!(transport.take_events(HOST), vec![relayed("roundStart", json!(2))]);
    }

    #[test]
    fn to_room_skips_disconnected_and_unknown_rooms() {
        let (mut sessions, mut transport, code) = setup();
        sessions.mark_disconnected(ALICE, &mut transport);
        transport.take_events(HOST);

        let n = to_room(sessions.registry(), &mut transport, &code, "tick", Value::Null, true);
        assert_eq!(n, 1);
        assert!(transport.take_events(ALICE).is_empty());

        let missing: RoomCode = "NOPE1".parse().unwrap();
        let n = to_room(sessions.registry(), &mut transport, &missing, "tick", Value::Null, true);
        assert_eq!(n, 0);
    }

    #[test]
    fn input_from_bound_connection_reaches_host() {
        let (sessions, mut transport, code) = setup();
        player_input(
            sessions.registry(),
            &mut transport,
            &code,
            ParticipantId(1),
            ALICE,
            "button".into(),
            json!("A"),
        )
        .unwrap();
        assert_eq!(
            transport.take_events(HOST),
            vec![ServerEvent::InputReceived(InputReceived {
                player_id: ParticipantId(1),
                input_type: "button".into(),
                value: json!("A"),
            })]
        );
    }

    #[test]
    fn spoofed_input_never_reaches_host() {
        let (mut sessions, mut transport, code) = setup();
        let missing: RoomCode = "NOPE1".parse().unwrap();

        // Bob claiming to be Alice, an unknown player, an unknown room.
        let attempts = [
            (&code, ParticipantId(1), BOB),
            (&code, ParticipantId(99), BOB),
            (&missing, ParticipantId(2), BOB),
            (&code, ParticipantId(1), HOST),
        ];
        for (room, id, sender) in attempts {
            let err = player_input(
                sessions.registry(),
                &mut transport,
                room,
                id,
                sender,
                "button".into(),
                Value::Null,
            )
            .unwrap_err();
            assert!(matches!(err, RelayError::Unauthorized { .. }));
        }

        // A disconnected slot cannot be driven by its old connection either.
        sessions.mark_disconnected(ALICE, &mut transport);
        transport.take_events(HOST);
        let err = player_input(
            sessions.registry(),
            &mut transport,
            &code,
            ParticipantId(1),
            ALICE,
            "button".into(),
            Value::Null,
        )
        .unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized { .. }));

        assert!(transport.take_events(HOST).is_empty());
    }
}
