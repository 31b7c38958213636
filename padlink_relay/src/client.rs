// Blocking TCP client for the relay.
//
// Used by hosts and controllers written in Rust, and by the integration
// tests. Architecture:
// - `connect()` opens the TCP stream on the calling thread, then spawns a
//   background reader thread.
// - The reader thread calls `read_frame()` in a loop, decodes each
//   `Envelope`, and pushes it into an `mpsc` channel.
// - The caller holds a `BufWriter<TcpStream>` for sending.
//
// Requests that expect an acknowledgement (`create_room`, `join_room`,
// `reconnect_player`) get a fresh ack id and block until the matching ack
// arrives or `ACK_TIMEOUT` passes. Events that arrive meanwhile are buffered
// and handed out by the next `poll()` / `wait_for()`, so nothing is lost.
// Fire-and-forget requests (`message_to_*`, `send_input`) return as soon as
// the frame is written.

use std::collections::VecDeque;
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use padlink_protocol::framing::{read_frame, send_envelope};
use padlink_protocol::{
    AckResponse, ClientRequest, Envelope, JoinRoom, MessageToPlayer, MessageToRoom,
    ParticipantId, PlayerInfo, PlayerInput, ReconnectPlayer, RoomCode, ServerEvent,
};
use serde_json::Value;

use crate::error::ClientError;

/// How long a request waits for its acknowledgement.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP client for relay communication.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Envelope>,
    buffered: VecDeque<ServerEvent>,
    next_ack: u64,
    closed: bool,
    _reader_thread: JoinHandle<()>,
}

impl NetClient {
    /// Connect to a relay and start the reader thread.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        let reader = BufReader::new(stream.try_clone()?);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Self {
            writer: BufWriter::new(stream),
            inbox: rx,
            buffered: VecDeque::new(),
            next_ack: 1,
            closed: false,
            _reader_thread: reader_thread,
        })
    }

    /// Open a new room with this connection as host.
    pub fn create_room(&mut self) -> Result<RoomCode, ClientError> {
        match self.request(&ClientRequest::CreateRoom)? {
            AckResponse::RoomCreated(code) => Ok(code),
            other => Err(unexpected(other)),
        }
    }

    /// Take a new participant slot. Returns the assigned id.
    pub fn join_room(
        &mut self,
        room_code: &RoomCode,
        player_name: Option<&str>,
    ) -> Result<ParticipantId, ClientError> {
        let request = ClientRequest::JoinRoom(JoinRoom {
            room_code: room_code.clone(),
            player_name: player_name.map(str::to_owned),
        });
        match self.request(&request)? {
            AckResponse::Joined(accepted) => Ok(accepted.player_id),
            other => Err(unexpected(other)),
        }
    }

    /// Rebind a disconnected slot to this connection.
    pub fn reconnect_player(
        &mut self,
        room_code: &RoomCode,
        player_id: ParticipantId,
    ) -> Result<PlayerInfo, ClientError> {
        let request = ClientRequest::ReconnectPlayer(ReconnectPlayer {
            room_code: room_code.clone(),
            player_id,
        });
        match self.request(&request)? {
            AckResponse::Reconnected(accepted) => Ok(PlayerInfo {
                player_id: accepted.player_id,
                player_name: accepted.player_name,
            }),
            other => Err(unexpected(other)),
        }
    }

    /// Host: send an application event to one participant.
    pub fn message_to_player(
        &mut self,
        room_code: &RoomCode,
        player_id: ParticipantId,
        event_name: &str,
        payload: Value,
    ) -> Result<(), ClientError> {
        self.send(&ClientRequest::MessageToPlayer(MessageToPlayer {
            room_code: room_code.clone(),
            player_id,
            event_name: event_name.into(),
            payload,
        }))
    }

    /// Host: send an application event to every participant.
    pub fn message_to_room(
        &mut self,
        room_code: &RoomCode,
        event_name: &str,
        payload: Value,
    ) -> Result<(), ClientError> {
        self.send(&ClientRequest::MessageToRoom(MessageToRoom {
            room_code: room_code.clone(),
            event_name: event_name.into(),
            payload,
        }))
    }

    /// Participant: send controller input to the host.
    pub fn send_input(
        &mut self,
        room_code: &RoomCode,
        player_id: ParticipantId,
        input_type: &str,
        value: Value,
    ) -> Result<(), ClientError> {
        self.send(&ClientRequest::PlayerInput(PlayerInput {
            room_code: room_code.clone(),
            player_id,
            input_type: input_type.into(),
            value,
        }))
    }

    /// Write an arbitrary envelope, bypassing request construction.
    pub fn send_raw(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        send_envelope(&mut self.writer, envelope)?;
        Ok(())
    }

    /// Send `event`/`data` with a fresh ack id and wait for the answer.
    pub fn request_raw(&mut self, event: &str, data: Value) -> Result<AckResponse, ClientError> {
        let id = self.next_ack_id();
        let envelope = Envelope {
            event: event.into(),
            ack: Some(id),
            data,
        };
        self.send_raw(&envelope)?;
        self.await_ack(id)
    }

    /// Drain every event received so far (non-blocking).
    pub fn poll(&mut self) -> Vec<ServerEvent> {
        self.pump(Duration::ZERO);
        self.buffered.drain(..).collect()
    }

    /// Block until an event matching `pred` arrives, buffering the rest.
    /// Returns `None` on timeout or when the relay closed the connection.
    pub fn wait_for(
        &mut self,
        timeout: Duration,
        pred: impl Fn(&ServerEvent) -> bool,
    ) -> Option<ServerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(pos) = self.buffered.iter().position(&pred) {
                return self.buffered.remove(pos);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.closed {
                return None;
            }
            self.pump(remaining);
        }
    }

    /// Whether the relay side of the connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn send(&mut self, request: &ClientRequest) -> Result<(), ClientError> {
        self.send_raw(&request.to_envelope(None))
    }

    fn request(&mut self, request: &ClientRequest) -> Result<AckResponse, ClientError> {
        let id = self.next_ack_id();
        self.send_raw(&request.to_envelope(Some(id)))?;
        match self.await_ack(id)? {
            AckResponse::Failure(failure) => Err(ClientError::Rejected(failure.message)),
            response => Ok(response),
        }
    }

    fn next_ack_id(&mut self) -> u64 {
        let id = self.next_ack;
        self.next_ack += 1;
        id
    }

    fn await_ack(&mut self, id: u64) -> Result<AckResponse, ClientError> {
        let deadline = Instant::now() + ACK_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout("acknowledgement"));
            }
            let envelope = match self.inbox.recv_timeout(remaining) {
                Ok(envelope) => envelope,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    return Err(ClientError::Closed);
                }
            };
            if !envelope.is_ack() {
                self.buffered.push_back(ServerEvent::from_envelope(envelope));
                continue;
            }
            if envelope.ack != Some(id) {
                tracing::debug!(ack = ?envelope.ack, "stale acknowledgement ignored");
                continue;
            }
            return serde_json::from_value(envelope.data)
                .map_err(|e| ClientError::UnexpectedAck(e.to_string()));
        }
    }

    /// Move inbound events into the buffer, waiting up to `wait` for the
    /// first one.
    fn pump(&mut self, wait: Duration) {
        let first = if wait.is_zero() {
            self.inbox.try_recv().map_err(|e| e == mpsc::TryRecvError::Disconnected)
        } else {
            self.inbox
                .recv_timeout(wait)
                .map_err(|e| e == RecvTimeoutError::Disconnected)
        };
        let mut next = first;
        loop {
            match next {
                Ok(envelope) if envelope.is_ack() => {
                    tracing::debug!(ack = ?envelope.ack, "unclaimed acknowledgement ignored");
                }
                Ok(envelope) => self.buffered.push_back(ServerEvent::from_envelope(envelope)),
                Err(disconnected) => {
                    self.closed |= disconnected;
                    return;
                }
            }
            next = self
                .inbox
                .try_recv()
                .map_err(|e| e == mpsc::TryRecvError::Disconnected);
        }
    }
}

impl Drop for NetClient {
    /// Shut the socket down so the relay sees the disconnect even though the
    /// reader thread still holds a clone of the stream.
    fn drop(&mut self) {
        let _ = self.writer.get_ref().shutdown(std::net::Shutdown::Both);
    }
}

fn unexpected(response: AckResponse) -> ClientError {
    ClientError::UnexpectedAck(format!("{response:?}"))
}

/// Reader thread: read framed envelopes in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<Envelope>) {
    while let Ok(bytes) = read_frame(&mut reader) {
        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => {
                if tx.send(envelope).is_err() {
                    break; // Client dropped the receiver.
                }
            }
            Err(e) => tracing::warn!(error = %e, "undecodable frame from relay dropped"),
        }
    }
}
