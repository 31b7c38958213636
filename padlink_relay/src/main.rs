// CLI entry point for the padlink relay.
//
// Starts a standalone broker that hosts and controllers connect to. See
// `server.rs` for the networking architecture and `session.rs` for room
// state.
//
// Usage:
//   padlink-relay [OPTIONS]
//     --bind <ADDR>              Listen address (default: 127.0.0.1)
//     --port <PORT>              Listen port (default: 7878)
//     --max-code-attempts <N>    Room code retries per create (default: 64)
//     --seed <N>                 Fixed room code seed (default: OS entropy)
//     --log-level <FILTER>       Used when RUST_LOG is unset (default: info)

use std::net::IpAddr;
use std::sync::mpsc;

use anyhow::Context;
use clap::Parser;
use padlink_relay::{RelayConfig, start_relay};

#[derive(Parser, Debug)]
#[command(name = "padlink-relay", version, about = "Room broker for host and controller devices")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on (0 picks a free port).
    #[arg(long, default_value_t = 7878)]
    port: u16,

    /// Room code generation attempts before createRoom fails.
    #[arg(long, default_value_t = 64)]
    max_code_attempts: u32,

    /// Seed room code generation for reproducible codes.
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind_addr: self.bind,
            port: self.port,
            max_code_attempts: self.max_code_attempts,
            code_seed: self.seed,
            ..RelayConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log_level))
                .context("invalid --log-level filter")?,
        )
        .init();

    let config = cli.into_config();
    let requested = config.socket_addr();
    let (handle, addr) =
        start_relay(config).with_context(|| format!("failed to start relay on {requested}"))?;
    tracing::info!(%addr, "press Ctrl+C to stop");

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install Ctrl+C handler")?;

    // Either Ctrl+C or the sender being dropped ends the wait.
    let _ = stop_rx.recv();

    tracing::info!("shutting down");
    handle.stop();
    Ok(())
}
