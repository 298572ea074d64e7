//! WebSocket server: accept loop and per-session lifecycle.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection to a WebSocket session and extracting the
//!    session parameters from the upgrade request's query string.
//! 4. Establishing the SSH shell session for those parameters.
//! 5. Handing both transports to a [`SessionBridge`] and waiting for it to
//!    finish.
//! 6. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each browser session runs in its own Tokio task.  The accept loop never
//! blocks on a session: it accepts a connection and immediately spawns a new
//! task for it before accepting the next one, so one slow SSH host never
//! delays other users.
//!
//! # Ordering of failures
//!
//! Parameter validation happens after the WebSocket upgrade (the parameters
//! arrive in the upgrade request itself) but strictly before any SSH
//! connection attempt: a malformed `cols` aborts the session without a
//! single packet towards the remote host.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::handshake::server::{Request, Response},
};
use tracing::{error, info, warn};

use crate::domain::config::{BridgeConfig, SessionParams};
use crate::infrastructure::session_bridge::SessionBridge;
use crate::infrastructure::shell_conn::{ConnectOptions, RemoteShell};

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the main WebSocket accept loop until `running` is set to `false`.
///
/// Binds a TCP listener on `config.ws_bind_addr` and accepts incoming
/// connections in a loop.  Each accepted connection is handed off to a
/// dedicated Tokio task.
///
/// # Parameters
///
/// - `config`  – Bridge configuration (bind address, timeouts, host-key policy).
/// - `running` – Shared flag; the loop exits when this is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind WebSocket listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!("webssh bridge listening on {}", config.ws_bind_addr);

    // Shared cheaply across all session tasks.
    let config = Arc::new(config);

    loop {
        // Check the shutdown flag before each accept attempt.
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout on `accept()` lets the loop periodically re-check
        // the `running` flag even when no browsers are connecting.
        let accept_result = timeout(Duration::from_millis(200), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, peer_addr))) => {
                info!("new browser connection from {peer_addr}");
                let cfg = Arc::clone(&config);

                tokio::spawn(async move {
                    handle_session(stream, peer_addr, cfg).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file
                // descriptors).  Log it and continue rather than crashing
                // the whole bridge.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout: no new connection in the last 200 ms.  Loop back
                // to check the `running` flag.
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Top-level handler for a single browser connection.
///
/// Wraps [`run_session`] and logs the outcome.  This function is the entry
/// point for each per-session Tokio task spawned by [`run_server`]; it is
/// public so integration tests can drive a single session without the
/// accept loop.
pub async fn handle_session(raw_stream: TcpStream, peer_addr: SocketAddr, config: Arc<BridgeConfig>) {
    match run_session(raw_stream, peer_addr, config).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of a single browser session.
///
/// 1. Completes the WebSocket HTTP upgrade handshake, capturing the request
///    query string on the way.
/// 2. Parses the session parameters (terminal size, SSH target); a malformed
///    parameter aborts here, before any SSH traffic.
/// 3. Connects, authenticates, and starts the remote shell.
/// 4. Starts the [`SessionBridge`] and waits for its shutdown broadcast.
/// 5. Closes the bridge, releasing both transports.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails, the parameters are
/// invalid, or the SSH session cannot be established.  Errors after the
/// upgrade surface to the browser only as a closed socket; this protocol
/// has no structured error frame.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<BridgeConfig>,
) -> anyhow::Result<()> {
    // Capture the query string during the upgrade: the handshake callback is
    // the only place the HTTP request is visible.
    let mut query: Option<String> = None;
    let ws_stream = accept_hdr_async(raw_stream, |req: &Request, resp: Response| {
        query = req.uri().query().map(str::to_owned);
        Ok(resp)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let params = SessionParams::from_query(query.as_deref())
        .with_context(|| format!("session {peer_addr}: invalid session parameters"))?;

    // Never log the secret.
    info!(
        "session {peer_addr}: connecting to {} as '{}' ({}x{})",
        params.address, params.user, params.cols, params.rows
    );

    let shell = RemoteShell::connect(&params, &connect_options(&config))
        .await
        .with_context(|| {
            format!(
                "session {peer_addr}: failed to establish shell on {}",
                params.address
            )
        })?;

    info!("session {peer_addr}: shell established on {}", params.address);

    let mut bridge = SessionBridge::new(shell, peer_addr.to_string(), config.flush_interval);
    bridge.start(ws_stream);
    bridge.wait_shutdown().await;
    bridge.close().await;

    Ok(())
}

/// Extracts the SSH establishment knobs from the process configuration.
fn connect_options(config: &BridgeConfig) -> ConnectOptions {
    ConnectOptions {
        timeout: config.connect_timeout,
        accept_unknown_hosts: config.accept_unknown_hosts,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_carry_the_configured_timeout() {
        // Arrange
        let config = BridgeConfig {
            connect_timeout: Duration::from_secs(7),
            ..BridgeConfig::default()
        };

        // Act
        let opts = connect_options(&config);

        // Assert
        assert_eq!(opts.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_connect_options_carry_the_host_key_posture() {
        let config = BridgeConfig {
            accept_unknown_hosts: true,
            ..BridgeConfig::default()
        };
        assert!(connect_options(&config).accept_unknown_hosts);
    }

    #[test]
    fn test_connect_options_default_to_refusing_unknown_hosts() {
        let config = BridgeConfig::default();
        assert!(!connect_options(&config).accept_unknown_hosts);
    }
}
