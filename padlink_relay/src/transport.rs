// The transport seam between the broker core and the network.
//
// The core (session manager, relay, dispatcher) never touches sockets. It
// asks a `Transport` to put connections into named groups (one group per
// room, named by the room code) and to emit envelopes to one connection or to
// a filtered group. Emits are fire-and-forget: a failed write is logged by the
// transport and the reader side of that connection reports the disconnect.
//
// `GroupTable` is the group bookkeeping every transport needs; `TcpTransport`
// is the concrete transport used by `server.rs`, writing length-prefixed JSON
// frames to the write half of each accepted `TcpStream`.

use std::collections::{BTreeSet, HashMap};
use std::io::BufWriter;
use std::net::TcpStream;

use padlink_protocol::framing::send_envelope;
use padlink_protocol::{AckResponse, ConnectionId, Envelope, RoomCode, ServerEvent};

/// Operations the broker core needs from the underlying transport.
pub trait Transport {
    fn join_group(&mut self, connection: ConnectionId, group: &RoomCode);

    fn leave_group(&mut self, connection: ConnectionId, group: &RoomCode);

    /// Remove every member from `group`.
    fn dissolve_group(&mut self, group: &RoomCode);

    /// Current members of `group`, in a stable order.
    fn group_members(&self, group: &RoomCode) -> Vec<ConnectionId>;

    /// Emit one envelope to one connection. Unknown connections are ignored.
    fn emit(&mut self, connection: ConnectionId, envelope: &Envelope);

    /// Forget a connection that went away: drop its writer and its group
    /// memberships.
    fn drop_connection(&mut self, connection: ConnectionId);

    /// Emit to every member of `group` for which `filter` returns true.
    /// Returns the number of connections emitted to.
    fn emit_to_group(
        &mut self,
        group: &RoomCode,
        envelope: &Envelope,
        filter: &dyn Fn(ConnectionId) -> bool,
    ) -> usize {
        let mut delivered = 0;
        for connection in self.group_members(group) {
            if filter(connection) {
                self.emit(connection, envelope);
                delivered += 1;
            }
        }
        delivered
    }

    fn send_event(&mut self, connection: ConnectionId, event: &ServerEvent) {
        self.emit(connection, &event.to_envelope());
    }

    /// Answer request `id` from `connection`.
    fn acknowledge(&mut self, connection: ConnectionId, id: u64, response: &AckResponse) {
        self.emit(connection, &Envelope::ack(id, response));
    }
}

/// Group membership keyed by room code. Empty groups are removed.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: HashMap<RoomCode, BTreeSet<ConnectionId>>,
}

impl GroupTable {
    pub fn join(&mut self, connection: ConnectionId, group: &RoomCode) {
        self.groups
            .entry(group.clone())
            .or_default()
            .insert(connection);
    }

    pub fn leave(&mut self, connection: ConnectionId, group: &RoomCode) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&connection);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }

    pub fn dissolve(&mut self, group: &RoomCode) {
        self.groups.remove(group);
    }

    pub fn members(&self, group: &RoomCode) -> Vec<ConnectionId> {
        self.groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn remove_connection(&mut self, connection: ConnectionId) {
        self.groups.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Transport over accepted TCP connections. Owned by the relay's main loop,
/// which is the only writer to client streams.
#[derive(Default)]
pub struct TcpTransport {
    writers: HashMap<ConnectionId, BufWriter<TcpStream>>,
    groups: GroupTable,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing to `stream` as `connection`.
    pub fn register(&mut self, connection: ConnectionId, stream: TcpStream) {
        self.writers.insert(connection, BufWriter::new(stream));
    }

    pub fn connection_count(&self) -> usize {
        self.writers.len()
    }

    /// Close every connection. Reader threads see EOF and exit.
    pub fn shutdown_all(&mut self) {
        for (_, writer) in self.writers.drain() {
            let _ = writer.get_ref().shutdown(std::net::Shutdown::Both);
        }
        self.groups = GroupTable::default();
    }
}

impl Transport for TcpTransport {
    fn join_group(&mut self, connection: ConnectionId, group: &RoomCode) {
        self.groups.join(connection, group);
    }

    fn leave_group(&mut self, connection: ConnectionId, group: &RoomCode) {
        self.groups.leave(connection, group);
    }

    fn dissolve_group(&mut self, group: &RoomCode) {
        self.groups.dissolve(group);
    }

    fn group_members(&self, group: &RoomCode) -> Vec<ConnectionId> {
        self.groups.members(group)
    }

    fn emit(&mut self, connection: ConnectionId, envelope: &Envelope) {
        let Some(writer) = self.writers.get_mut(&connection) else {
            tracing::debug!(%connection, event = %envelope.event, "emit to unknown connection dropped");
            return;
        };
        if let Err(e) = send_envelope(writer, envelope) {
            // The reader thread sees the broken pipe and reports the disconnect.
            tracing::warn!(%connection, event = %envelope.event, error = %e, "write failed");
        }
    }

    fn drop_connection(&mut self, connection: ConnectionId) {
        if let Some(writer) = self.writers.remove(&connection) {
            let _ = writer.get_ref().shutdown(std::net::Shutdown::Both);
        }
        self.groups.remove_connection(connection);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    fn code(s: &str) -> RoomCode {
        s.parse().unwrap()
    }

    #[test]
    fn group_table_drops_empty_groups() {
        let mut table = GroupTable::default();
        let room = code("ABCDE");
        table.join(ConnectionId(1), &room);
        table.join(ConnectionId(2), &room);
        assert_eq!(table.members(&room), vec![ConnectionId(1), ConnectionId(2)]);

        table.leave(ConnectionId(1), &room);
        assert_eq!(table.members(&room), vec![ConnectionId(2)]);
        table.leave(ConnectionId(2), &room);
        assert_eq!(table.group_count(), 0);
        assert!(table.members(&room).is_empty());
    }

    #[test]
    fn remove_connection_leaves_every_group() {
        let mut table = GroupTable::default();
        table.join(ConnectionId(1), &code("AAAAA"));
        table.join(ConnectionId(1), &code("BBBBB"));
        table.join(ConnectionId(2), &code("BBBBB"));

        table.remove_connection(ConnectionId(1));
        assert_eq!(table.group_count(), 1);
        assert_eq!(table.members(&code("BBBBB")), vec![ConnectionId(2)]);
    }

    #[test]
    fn emit_to_group_applies_filter() {
        let mut transport = RecordingTransport::default();
        let room = code("ROOM1");
        for id in 1..=3 {
            transport.join_group(ConnectionId(id), &room);
        }

        let env = Envelope::new("tick", serde_json::Value::Null);
        let delivered = transport.emit_to_group(&room, &env, &|c| c != ConnectionId(2));
        assert_eq!(delivered, 2);
        assert_eq!(transport.take_events(ConnectionId(1)).len(), 1);
        assert!(transport.take_events(ConnectionId(2)).is_empty());
        assert_eq!(transport.take_events(ConnectionId(3)).len(), 1);
    }
}
