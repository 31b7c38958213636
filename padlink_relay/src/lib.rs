// padlink_relay — room broker pairing a game host with controller devices.
//
// A host (the shared screen) creates a room and gets a short code; players
// join from their own devices by typing that code. The broker routes host
// events to one or all participants and forwards participant input to the
// host. It never interprets game payloads. Rooms live in memory only and
// close when their host disconnects; a participant that drops keeps its slot
// and can reclaim it with `reconnectPlayer`.
//
// Module overview:
// - `registry.rs`:   `RoomRegistry`: live rooms by code, collision-free code
//                    generation with a bounded retry.
// - `session.rs`:    `SessionManager`: join, reconnect, disconnect and room
//                    close, plus the host/participant notifications each emits.
// - `relay.rs`:      Stateless routing: host → participant, host → room,
//                    participant input → host (sender-checked).
// - `dispatcher.rs`: `ConnectionEventDispatcher`: decodes frames, enforces
//                    who may send what, calls the above, answers acks.
// - `transport.rs`:  The `Transport` trait (groups + emit) the core is written
//                    against, and `TcpTransport` over accepted sockets.
// - `server.rs`:     TCP listener, reader threads (one per connection) and the
//                    single-threaded main loop that owns all state.
// - `client.rs`:     `NetClient`, a blocking client for hosts, controllers
//                    and tests.
// - `config.rs`, `error.rs`: `RelayConfig`; `RelayError` / `ClientError`.
//
// The relay runs as a standalone binary (`main.rs`) or embedded through
// `start_relay`.

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod transport;

pub use client::NetClient;
pub use config::RelayConfig;
pub use error::{ClientError, RelayError};
pub use server::{RelayHandle, start_relay};
