// Room registry: the mapping from room code to room state.
//
// `RoomRegistry` owns every live `Room` and the random source used to mint
// room codes. Codes are `CODE_LENGTH` characters drawn from `CODE_ALPHABET`,
// which leaves out characters that are easy to misread on a TV screen
// (0/O, 1/I/L). Generation retries on collision with a live room, bounded by
// `max_code_attempts`; when the bound is hit, or every code is already taken,
// creation fails with `CapacityExhausted` instead of spinning.
//
// Participant slots live inside their room. The registry only creates and
// removes rooms; slot lifecycle is driven by `session.rs`.

use std::collections::HashMap;

use padlink_protocol::{ConnectionId, ParticipantId, PlayerInfo, RoomCode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::RelayError;

/// Characters room codes are drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of generated room codes.
pub const CODE_LENGTH: usize = 5;

/// One controller slot in a room.
#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    id: ParticipantId,
    name: String,
    /// `Some` exactly while the participant is connected.
    connection: Option<ConnectionId>,
}

impl Participant {
    pub(crate) fn new(id: ParticipantId, name: String, connection: ConnectionId) -> Self {
        Self {
            id,
            name,
            connection: Some(connection),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.id,
            player_name: self.name.clone(),
        }
    }

    pub(crate) fn bind(&mut self, connection: ConnectionId) {
        self.connection = Some(connection);
    }

    pub(crate) fn unbind(&mut self) {
        self.connection = None;
    }
}

/// A live room: one host connection plus participant slots.
#[derive(Clone, Debug)]
pub struct Room {
    code: RoomCode,
    host: ConnectionId,
    participants: HashMap<ParticipantId, Participant>,
}

impl Room {
    fn new(code: RoomCode, host: ConnectionId) -> Self {
        Self {
            code,
            host,
            participants: HashMap::new(),
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn host(&self) -> ConnectionId {
        self.host
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Connections of currently connected participants.
    pub fn connected_participants(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants.values().filter_map(Participant::connection)
    }

    pub(crate) fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    pub(crate) fn participant_by_connection_mut(
        &mut self,
        connection: ConnectionId,
    ) -> Option<&mut Participant> {
        self.participants
            .values_mut()
            .find(|p| p.connection == Some(connection))
    }

    pub(crate) fn insert_participant(&mut self, participant: Participant) {
        self.participants.insert(participant.id, participant);
    }
}

/// Owner of all live rooms.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
    rng: StdRng,
    alphabet: &'static [u8],
    code_length: usize,
    max_code_attempts: u32,
}

impl RoomRegistry {
    /// Registry with an OS-seeded code generator.
    pub fn new(max_code_attempts: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), max_code_attempts)
    }

    /// Registry with a deterministic code generator.
    pub fn with_seed(seed: u64, max_code_attempts: u32) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), max_code_attempts)
    }

    fn with_rng(rng: StdRng, max_code_attempts: u32) -> Self {
        Self {
            rooms: HashMap::new(),
            rng,
            alphabet: CODE_ALPHABET,
            code_length: CODE_LENGTH,
            max_code_attempts: max_code_attempts.max(1),
        }
    }

    /// Shrink the code space so saturation can be exercised.
    #[cfg(test)]
    pub(crate) fn with_code_space(
        alphabet: &'static [u8],
        code_length: usize,
        seed: u64,
        max_code_attempts: u32,
    ) -> Self {
        Self {
            alphabet,
            code_length,
            ..Self::with_seed(seed, max_code_attempts)
        }
    }

    /// Create a room hosted by `host` under a fresh code.
    pub fn create_room(&mut self, host: ConnectionId) -> Result<RoomCode, RelayError> {
        if self.code_space_full() {
            return Err(RelayError::CapacityExhausted { attempts: 0 });
        }
        for _ in 0..self.max_code_attempts {
            let candidate = self.random_code();
            let Ok(code) = candidate.parse::<RoomCode>() else {
                continue;
            };
            if self.rooms.contains_key(&code) {
                continue;
            }
            self.rooms.insert(code.clone(), Room::new(code.clone(), host));
            return Ok(code);
        }
        Err(RelayError::CapacityExhausted {
            attempts: self.max_code_attempts,
        })
    }

    pub fn get(&self, code: &RoomCode) -> Result<&Room, RelayError> {
        self.rooms
            .get(code)
            .ok_or_else(|| RelayError::RoomNotFound(code.clone()))
    }

    pub(crate) fn get_mut(&mut self, code: &RoomCode) -> Result<&mut Room, RelayError> {
        self.rooms
            .get_mut(code)
            .ok_or_else(|| RelayError::RoomNotFound(code.clone()))
    }

    /// Delete a room. Removing an unknown code is a no-op.
    pub fn remove(&mut self, code: &RoomCode) -> Option<Room> {
        self.rooms.remove(code)
    }

    /// Code of the room hosted by `connection`, if any.
    pub fn find_by_host(&self, connection: ConnectionId) -> Option<&RoomCode> {
        self.rooms
            .values()
            .find(|room| room.host == connection)
            .map(|room| &room.code)
    }

    /// Code of the room in which `connection` is the host or is bound to a
    /// participant slot, if any.
    pub fn room_of(&self, connection: ConnectionId) -> Option<&RoomCode> {
        self.rooms
            .values()
            .find(|room| {
                room.host == connection
                    || room.connected_participants().any(|c| c == connection)
            })
            .map(|room| &room.code)
    }

    pub(crate) fn rooms_mut(&mut self) -> impl Iterator<Item = &mut Room> {
        self.rooms.values_mut()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn random_code(&mut self) -> String {
        (0..self.code_length)
            .map(|_| char::from(self.alphabet[self.rng.gen_range(0..self.alphabet.len())]))
            .collect()
    }

    fn code_space_full(&self) -> bool {
        u32::try_from(self.code_length)
            .ok()
            .and_then(|len| self.alphabet.len().checked_pow(len))
            .is_some_and(|space| self.rooms.len() >= space)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn codes_use_alphabet_and_length() {
        let mut registry = RoomRegistry::with_seed(7, 64);
        for host in 0..200 {
            let code = registry.create_room(ConnectionId(host)).unwrap();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = RoomRegistry::with_seed(1, 64);
        let code = registry.create_room(ConnectionId(1)).unwrap();
        let typed: RoomCode = code.as_str().to_ascii_lowercase().parse().unwrap();
        let room = registry.get(&typed).unwrap();
        assert_eq!(room.host(), ConnectionId(1));
        assert_eq!(room.participants().count(), 0);
    }

    #[test]
    fn unknown_code_is_room_not_found() {
        let registry = RoomRegistry::with_seed(1, 64);
        let code: RoomCode = "ZZZZZ".parse().unwrap();
        assert!(matches!(registry.get(&code), Err(RelayError::RoomNotFound(c)) if c == code));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = RoomRegistry::with_seed(1, 64);
        let code = registry.create_room(ConnectionId(1)).unwrap();
        assert!(registry.remove(&code).is_some());
        assert!(registry.remove(&code).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn find_by_host() {
        let mut registry = RoomRegistry::with_seed(3, 64);
        let a = registry.create_room(ConnectionId(10)).unwrap();
        let b = registry.create_room(ConnectionId(20)).unwrap();
        assert_eq!(registry.find_by_host(ConnectionId(10)), Some(&a));
        assert_eq!(registry.find_by_host(ConnectionId(20)), Some(&b));
        assert_eq!(registry.find_by_host(ConnectionId(30)), None);
    }

    #[test]
    fn room_of_covers_hosts_and_bound_participants() {
        let mut registry = RoomRegistry::with_seed(3, 64);
        let code = registry.create_room(ConnectionId(10)).unwrap();
        let room = registry.get_mut(&code).unwrap();
        for (id, conn) in [(1, 11), (2, 12)] {
            let name = format!("P{id}");
            room.insert_participant(Participant::new(ParticipantId(id), name, ConnectionId(conn)));
        }
        room.participant_mut(ParticipantId(2)).unwrap().unbind();

        assert_eq!(registry.room_of(ConnectionId(10)), Some(&code));
        assert_eq!(registry.room_of(ConnectionId(11)), Some(&code));
        // An unbound slot no longer ties its old connection to the room.
        assert_eq!(registry.room_of(ConnectionId(12)), None);
        assert_eq!(registry.room_of(ConnectionId(13)), None);
    }

    #[test]
    fn saturated_space_is_capacity_exhausted() {
        // Two possible codes: "A" and "B".
        let mut registry = RoomRegistry::with_code_space(b"AB", 1, 5, 1000);
        let first = registry.create_room(ConnectionId(1)).unwrap();
        let second = registry.create_room(ConnectionId(2)).unwrap();
        assert_ne!(first, second);

        let err = registry.create_room(ConnectionId(3)).unwrap_err();
        assert!(matches!(err, RelayError::CapacityExhausted { .. }));
        assert_eq!(registry.len(), 2);

        // Freeing a code makes room again.
        registry.remove(&first);
        assert_eq!(registry.create_room(ConnectionId(4)).unwrap(), first);
    }

    #[test]
    fn retry_bound_is_honored() {
        // Four codes and three attempts per call: once some are taken a call
        // may collide on every attempt and must give up rather than spin.
        let mut registry = RoomRegistry::with_code_space(b"ABCD", 1, 9, 3);
        let mut codes = HashSet::new();
        while codes.len() < 3 {
            match registry.create_room(ConnectionId(1)) {
                Ok(code) => {
                    codes.insert(code);
                }
                Err(RelayError::CapacityExhausted { attempts }) => assert_eq!(attempts, 3),
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert_eq!(registry.len(), 3);
    }

    proptest! {
        #[test]
        fn live_codes_are_pairwise_distinct(seed in any::<u64>(), rooms in 1usize..300) {
            let mut registry = RoomRegistry::with_seed(seed, 64);
            let mut seen = HashSet::new();
            for host in 0..rooms {
                let code = registry.create_room(ConnectionId(host as u64)).unwrap();
                prop_assert!(seen.insert(code));
            }
            prop_assert_eq!(registry.len(), rooms);
        }
    }
}
