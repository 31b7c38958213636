// TCP server and main event loop for the relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (non-blocking `accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per connection): call `framing::read_frame()` in
//   a loop, decode each frame into an `Envelope`, and send
//   `InternalEvent::Frame` to the main thread. A frame that is not valid JSON
//   is logged and skipped; a framing error or EOF sends
//   `InternalEvent::Disconnected` and ends the thread.
// - **Main thread**: owns the `ConnectionEventDispatcher` (and through it the
//   session manager, the registry and the `TcpTransport`). Events are handled
//   one at a time, so every room mutation and the notifications it emits
//   complete before the next event is looked at. `recv_timeout` with the
//   configured poll interval lets the loop notice shutdown while idle.
//
// The main thread is the only writer to client streams. Reader threads only
// read from their clone of the stream.
//
// Shutdown: `RelayHandle::stop` clears `keep_running`; the main loop exits,
// closes every connection (unblocking the readers) and returns.

use std::io::{BufReader, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use padlink_protocol::framing::read_frame;
use padlink_protocol::{ConnectionId, Envelope};

use crate::config::RelayConfig;
use crate::dispatcher::ConnectionEventDispatcher;
use crate::session::SessionManager;
use crate::transport::TcpTransport;

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    Frame {
        connection: ConnectionId,
        envelope: Envelope,
    },
    Disconnected {
        connection: ConnectionId,
    },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Whether the main loop is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn join(&mut self) {
        if let Some(Err(_)) = self.thread.take().map(thread::JoinHandle::join) {
            tracing::error!("relay main loop panicked");
        }
    }
}

/// Start the relay on a background thread. Returns a handle for stopping it
/// and the bound address (useful when port 0 lets the OS pick a port).
pub fn start_relay(config: RelayConfig) -> std::io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind(config.socket_addr())?;
    let addr = listener.local_addr()?;
    // Non-blocking so the accept thread can check keep_running periodically.
    listener.set_nonblocking(true)?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_loop = keep_running.clone();
    let thread = thread::Builder::new()
        .name("padlink-relay".into())
        .spawn(move || run_relay(listener, config, keep_running_loop))?;

    tracing::info!(%addr, "relay listening");
    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is cleared.
fn run_relay(listener: TcpListener, config: RelayConfig, keep_running: Arc<AtomicBool>) {
    let sessions = SessionManager::new(config.build_registry());
    let mut dispatcher = ConnectionEventDispatcher::new(sessions, TcpTransport::new());
    let mut next_connection = 1u64;

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    let idle = config.poll_interval;
    thread::spawn(move || accept_loop(listener, tx_listener, keep_running_listener, idle));

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(config.poll_interval) {
            Ok(event) => {
                handle_event(&mut dispatcher, event, &tx, &mut next_connection);
                // Drain whatever arrived while handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut dispatcher, event, &tx, &mut next_connection);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    dispatcher.transport_mut().shutdown_all();
    tracing::info!(
        rooms = dispatcher.sessions().registry().len(),
        "relay stopped"
    );
}

fn accept_loop(
    listener: TcpListener,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
    idle: Duration,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    tracing::warn!(%peer, error = %e, "could not configure stream");
                    continue;
                }
                stream.set_nodelay(true).ok();
                if tx.send(InternalEvent::NewConnection { stream }).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(idle),
            Err(e) => {
                tracing::error!(error = %e, "accept failed, listener stopping");
                break;
            }
        }
    }
}

fn handle_event(
    dispatcher: &mut ConnectionEventDispatcher<TcpTransport>,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    next_connection: &mut u64,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            let connection = ConnectionId(*next_connection);
            *next_connection += 1;
            accept_connection(dispatcher, connection, stream, tx);
        }
        InternalEvent::Frame {
            connection,
            envelope,
        } => dispatcher.handle_frame(connection, envelope),
        InternalEvent::Disconnected { connection } => {
            dispatcher.handle_disconnect(connection);
        }
    }
}

/// Register the write half with the transport and spawn the reader.
fn accept_connection(
    dispatcher: &mut ConnectionEventDispatcher<TcpTransport>,
    connection: ConnectionId,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
) {
    let read_half = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(%connection, error = %e, "could not clone stream, connection dropped");
            return;
        }
    };

    dispatcher.transport_mut().register(connection, stream);
    dispatcher.handle_connect(connection);

    let tx_reader = tx.clone();
    let spawned = thread::Builder::new()
        .name(format!("padlink-{connection}"))
        .spawn(move || reader_loop(BufReader::new(read_half), connection, tx_reader));
    if let Err(e) = spawned {
        tracing::warn!(%connection, error = %e, "could not spawn reader");
        dispatcher.handle_disconnect(connection);
    }
}

/// Reader loop for a single connection. Runs in its own thread until the
/// stream fails or the main loop goes away.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    connection: ConnectionId,
    tx: Sender<InternalEvent>,
) {
    loop {
        let bytes = match read_frame(&mut reader) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != ErrorKind::UnexpectedEof {
                    tracing::debug!(%connection, error = %e, "read failed");
                }
                let _ = tx.send(InternalEvent::Disconnected { connection });
                return;
            }
        };

        let envelope = match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%connection, error = %e, "undecodable frame dropped");
                continue;
            }
        };

        if tx
            .send(InternalEvent::Frame {
                connection,
                envelope,
            })
            .is_err()
        {
            return;
        }
    }
}
