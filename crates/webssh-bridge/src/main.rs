//! webssh-bridge entry point.
//!
//! This binary accepts WebSocket connections from web browsers and bridges
//! each one to an interactive shell on a remote SSH host.  It is the thin
//! translation layer between a browser terminal emulator (discrete frames:
//! keystrokes, resize events, output chunks) and the SSH pseudo-terminal
//! byte stream.
//!
//! # Why a bridge process?
//!
//! Web browsers can only speak HTTP/WebSocket; they cannot open raw TCP
//! sockets, let alone run the SSH protocol.  This bridge terminates the
//! WebSocket on one side and the SSH session on the other, so a plain
//! xterm.js page can drive a real remote shell.
//!
//! # Usage
//!
//! ```text
//! webssh-bridge [OPTIONS]
//!
//! Options:
//!   --ws-port <PORT>              WebSocket listener port [default: 8081]
//!   --ws-bind <ADDR>              WebSocket bind address [default: 0.0.0.0]
//!   --connect-timeout <SECS>      SSH connect timeout in seconds [default: 3]
//!   --flush-interval-ms <MS>      Output flush tick in milliseconds [default: 10]
//!   --insecure-accept-host-keys   Accept unverifiable SSH host keys (DANGEROUS)
//! ```
//!
//! # Environment variable overrides
//!
//! The CLI defaults can also be overridden with environment variables.
//! CLI args take precedence when both are present.
//!
//! | Variable                     | Default   | Description                     |
//! |------------------------------|-----------|---------------------------------|
//! | `WEBSSH_WS_PORT`             | `8081`    | WebSocket listener port         |
//! | `WEBSSH_WS_BIND`             | `0.0.0.0` | WebSocket bind address          |
//! | `WEBSSH_CONNECT_TIMEOUT`     | `3`       | SSH connect timeout (secs)      |
//! | `WEBSSH_FLUSH_INTERVAL_MS`   | `10`      | Output flush tick (ms)          |
//! | `WEBSSH_INSECURE_HOST_KEYS`  | unset     | Accept unverifiable host keys   |
//!
//! # Session parameters
//!
//! Per-session settings travel in the WebSocket URL's query string:
//! `ws://host:8081/?cols=80&rows=24&address=10.0.0.5:22&user=deploy&secret=...`

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use webssh_bridge::domain::BridgeConfig;
use webssh_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket-to-SSH bridge for browser-based terminals.
///
/// The `#[derive(Parser)]` macro from `clap` generates the argument parser
/// automatically from the struct fields and their `#[arg(...)]` attributes.
#[derive(Debug, Parser)]
#[command(
    name = "webssh-bridge",
    about = "Bridges browser WebSocket terminals to interactive SSH shells",
    version
)]
struct Cli {
    /// TCP port for the WebSocket server to listen on.
    ///
    /// Browsers connect to this port via WebSocket (ws://host:PORT).
    #[arg(long, default_value_t = 8081, env = "WEBSSH_WS_PORT")]
    ws_port: u16,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections from any network interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, default_value = "0.0.0.0", env = "WEBSSH_WS_BIND")]
    ws_bind: String,

    /// SSH connect timeout in seconds.
    ///
    /// Bounds TCP connect + SSH handshake per session.  Once a shell is
    /// running there is no per-frame timeout.
    #[arg(long, default_value_t = 3, env = "WEBSSH_CONNECT_TIMEOUT")]
    connect_timeout: u64,

    /// Output flush tick in milliseconds.
    ///
    /// Shell output is batched and sent to the browser once per tick;
    /// smaller values lower latency, larger values batch more per frame.
    #[arg(long, default_value_t = 10, env = "WEBSSH_FLUSH_INTERVAL_MS")]
    flush_interval_ms: u64,

    /// Accept SSH host keys that cannot be verified.
    ///
    /// The bridge has no known-hosts store, so without this flag every SSH
    /// connection is refused.  Enabling it permits man-in-the-middle
    /// interception of SSH credentials; only use it on networks you trust.
    #[arg(long, env = "WEBSSH_INSECURE_HOST_KEYS")]
    insecure_accept_host_keys: bool,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` is not a valid IP address.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.ws_bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid WebSocket bind address: '{}:{}'",
                    self.ws_bind, self.ws_port
                )
            })?;

        Ok(BridgeConfig {
            ws_bind_addr,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            accept_unknown_hosts: self.insecure_accept_host_keys,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// The `#[tokio::main]` attribute sets up the Tokio multi-threaded async
/// runtime.  All async tasks (WebSocket sessions, SSH channels, flush
/// timers) run on this runtime's thread pool.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `EnvFilter::try_from_default_env()` reads the `RUST_LOG` environment
    // variable.  If it is absent or invalid, we fall back to `info` level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // `Cli::parse()` reads from `std::env::args()` and exits with a usage
    // message if required arguments are missing or values are invalid.
    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    info!(
        "webssh bridge starting: ws={}, connect timeout={:?}, flush every {:?}",
        config.ws_bind_addr, config.connect_timeout, config.flush_interval
    );
    if config.accept_unknown_hosts {
        tracing::warn!(
            "running with --insecure-accept-host-keys: SSH host identities are NOT verified"
        );
    }

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    //
    // A Ctrl+C handler clears this shared flag; the accept loop checks it
    // every 200 ms and exits cleanly.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    run_server(config, running).await?;

    info!("webssh bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_produce_correct_ws_port() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["webssh-bridge"]);

        // Assert
        assert_eq!(cli.ws_port, 8081);
    }

    #[test]
    fn test_cli_defaults_produce_correct_connect_timeout() {
        let cli = Cli::parse_from(["webssh-bridge"]);
        assert_eq!(cli.connect_timeout, 3);
    }

    #[test]
    fn test_cli_defaults_produce_correct_flush_interval() {
        let cli = Cli::parse_from(["webssh-bridge"]);
        assert_eq!(cli.flush_interval_ms, 10);
    }

    #[test]
    fn test_cli_defaults_refuse_unknown_host_keys() {
        let cli = Cli::parse_from(["webssh-bridge"]);
        assert!(!cli.insecure_accept_host_keys);
    }

    #[test]
    fn test_cli_ws_port_override() {
        let cli = Cli::parse_from(["webssh-bridge", "--ws-port", "9999"]);
        assert_eq!(cli.ws_port, 9999);
    }

    #[test]
    fn test_cli_host_key_opt_in() {
        let cli = Cli::parse_from(["webssh-bridge", "--insecure-accept-host-keys"]);
        assert!(cli.insecure_accept_host_keys);
    }

    #[test]
    fn test_into_bridge_config_default_ws_port() {
        let cli = Cli::parse_from(["webssh-bridge"]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.ws_bind_addr.port(), 8081);
    }

    #[test]
    fn test_into_bridge_config_custom_timeouts() {
        let cli = Cli::parse_from([
            "webssh-bridge",
            "--connect-timeout",
            "10",
            "--flush-interval-ms",
            "25",
        ]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.flush_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_into_bridge_config_invalid_ws_bind_returns_error() {
        // Arrange: provide an invalid IP address string
        let cli = Cli {
            ws_port: 8081,
            ws_bind: "not.an.ip".to_string(),
            connect_timeout: 3,
            flush_interval_ms: 10,
            insecure_accept_host_keys: false,
        };

        // Act
        let result = cli.into_bridge_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }
}
