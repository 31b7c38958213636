// Relay configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::registry::RoomRegistry;

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: IpAddr,
    /// Port to listen on; 0 lets the OS pick one.
    pub port: u16,
    /// Collision retries per `createRoom` before giving up.
    pub max_code_attempts: u32,
    /// How long the main loop waits for an event before rechecking the
    /// shutdown flag.
    pub poll_interval: Duration,
    /// Fixed seed for room code generation. `None` seeds from the OS.
    pub code_seed: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 7878,
            max_code_attempts: 64,
            poll_interval: Duration::from_millis(50),
            code_seed: None,
        }
    }
}

impl RelayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub(crate) fn build_registry(&self) -> RoomRegistry {
        match self.code_seed {
            Some(seed) => RoomRegistry::with_seed(seed, self.max_code_attempts),
            None => RoomRegistry::new(self.max_code_attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:7878");
        assert_eq!(config.max_code_attempts, 64);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn seeded_registries_agree() {
        let config = RelayConfig {
            code_seed: Some(99),
            ..RelayConfig::default()
        };
        let mut a = config.build_registry();
        let mut b = config.build_registry();
        let host = padlink_protocol::ConnectionId(1);
        assert_eq!(a.create_room(host).unwrap(), b.create_room(host).unwrap());
    }
}
