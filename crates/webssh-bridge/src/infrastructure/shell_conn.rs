//! SSH connection management: connect, authenticate, allocate a PTY, start a
//! shell.
//!
//! Each browser WebSocket session gets its own SSH connection to the remote
//! host.  The remote host sees the bridge as an ordinary interactive SSH
//! client.
//!
//! # Establishment stages
//!
//! ```text
//! TCP connect + SSH handshake  →  ConnectError::{Timeout, Handshake}
//! password authentication      →  ConnectError::{Auth, AuthRejected}
//! session channel open         →  ConnectError::OpenChannel
//! PTY request (rows × cols)    →  ConnectError::{Pty, PtyRejected}
//! shell start                  →  ConnectError::{Shell, ShellRejected}
//! ```
//!
//! A failure at any stage aborts the whole establishment; no partially
//! initialised [`RemoteShell`] is ever returned.
//!
//! # Host key policy
//!
//! The bridge carries no known-hosts store, so it cannot actually verify a
//! server key.  By default every key is therefore *refused* and connections
//! fail until the operator opts in to the accept-any posture with
//! `--insecure-accept-host-keys`.  This inverts the original design, which
//! silently accepted any host key; accept-any is a real security trade-off
//! (it permits man-in-the-middle interception of the SSH credentials) and
//! must be a visible decision, not a hidden default.

use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::{ChannelMsg, Pty};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::config::SessionParams;

/// Terminal type requested for the remote PTY.
///
/// `xterm` is the least-common-denominator terminfo entry that every
/// browser terminal emulator can render.
const TERM_TYPE: &str = "xterm";

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors raised while establishing an SSH shell session.
///
/// Every variant tags the establishment stage that failed, so the operator
/// can tell a wrong password apart from a dead host from a server that
/// refuses PTYs.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The `user` session parameter was empty.  Refused before any network
    /// traffic.
    #[error("ssh user must not be empty")]
    EmptyUser,

    /// TCP connect + SSH handshake did not finish within the configured
    /// connect timeout.
    #[error("ssh connect to {address} timed out after {timeout:?}")]
    Timeout {
        /// The `host:port` that was dialled.
        address: String,
        /// The configured bound.
        timeout: Duration,
    },

    /// TCP connect or SSH protocol handshake failed.  Also raised when the
    /// host key was refused because `--insecure-accept-host-keys` is not set.
    #[error("ssh handshake with {address} failed: {source}")]
    Handshake {
        /// The `host:port` that was dialled.
        address: String,
        #[source]
        source: russh::Error,
    },

    /// The authentication exchange itself errored (transport-level).
    #[error("ssh authentication errored: {0}")]
    Auth(#[source] russh::Error),

    /// The server rejected the supplied password.
    #[error("ssh password authentication rejected for user '{user}'")]
    AuthRejected {
        /// The user that failed to authenticate.
        user: String,
    },

    /// Opening the SSH session channel failed.
    #[error("failed to open ssh session channel: {0}")]
    OpenChannel(#[source] russh::Error),

    /// Sending the PTY request failed (transport-level).
    #[error("pty request failed: {0}")]
    Pty(#[source] russh::Error),

    /// The server answered the PTY request with a failure.
    #[error("server refused pty allocation")]
    PtyRejected,

    /// Sending the shell request failed (transport-level).
    #[error("shell request failed: {0}")]
    Shell(#[source] russh::Error),

    /// The server answered the shell request with a failure.
    #[error("server refused to start a shell")]
    ShellRejected,
}

// ── Host key policy handler ───────────────────────────────────────────────────

/// russh client handler implementing the bridge's host-key policy.
struct HostKeyPolicy {
    /// Whether the operator opted in to accepting unverifiable host keys.
    accept_unknown: bool,
}

#[async_trait::async_trait]
impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        if self.accept_unknown {
            warn!("accepting UNVERIFIED ssh host key (--insecure-accept-host-keys is set)");
            Ok(true)
        } else {
            warn!(
                "refusing unverified ssh host key; \
                 pass --insecure-accept-host-keys to opt in to accept-any"
            );
            Ok(false)
        }
    }
}

// ── Connect options ───────────────────────────────────────────────────────────

/// Process-level knobs for session establishment.
///
/// Derived from [`crate::domain::BridgeConfig`]; split out so the connector
/// does not depend on WebSocket-side settings it has no use for.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Bound on TCP connect + SSH handshake.
    pub timeout: Duration,
    /// Opt-in accept-any host key posture.
    pub accept_unknown_hosts: bool,
}

// ── Remote shell ──────────────────────────────────────────────────────────────

/// The SSH session channel carrying shell traffic in both directions.
pub type ShellChannel = russh::Channel<client::Msg>;

/// The authenticated SSH connection, retained so the transport can be torn
/// down on session close.
///
/// Wraps the russh handle so the rest of the crate never touches the
/// handler type or the disconnect reason plumbing.
pub struct SshHandle {
    inner: client::Handle<HostKeyPolicy>,
}

impl SshHandle {
    /// Disconnects the SSH transport.
    ///
    /// Consumes the handle: a disconnected transport has no further use, and
    /// taking it by value is what makes the caller's double-close a
    /// structural impossibility rather than a runtime check.
    ///
    /// # Errors
    ///
    /// Returns the underlying transport error; callers tearing down a
    /// session treat it as informational (the remote may already be gone).
    pub async fn disconnect(self) -> Result<(), russh::Error> {
        self.inner
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
    }
}

/// An authenticated SSH connection with an interactive shell running behind
/// a PTY.
///
/// Owned exclusively by one [`crate::infrastructure::SessionBridge`] for the
/// session's lifetime.  The channel carries both directions of shell traffic;
/// the handle is retained so the transport can be disconnected on teardown.
pub struct RemoteShell {
    /// The authenticated SSH connection.
    handle: client::Handle<HostKeyPolicy>,
    /// The session channel running the shell.
    channel: ShellChannel,
}

impl RemoteShell {
    /// Splits the shell into its connection handle and session channel so
    /// the bridge can give each to its owning task.
    pub fn into_parts(self) -> (SshHandle, ShellChannel) {
        (SshHandle { inner: self.handle }, self.channel)
    }

    /// Connects, authenticates, allocates a PTY of `params.rows` ×
    /// `params.cols`, and starts an interactive shell.
    ///
    /// # Errors
    ///
    /// Returns a stage-tagged [`ConnectError`]; see the module docs for the
    /// stage → variant mapping.
    pub async fn connect(
        params: &SessionParams,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectError> {
        if params.user.is_empty() {
            return Err(ConnectError::EmptyUser);
        }

        let config = Arc::new(client::Config {
            // Application-level keepalive so a silently dead TCP path is
            // eventually detected even while the shell is idle.
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        });

        let handler = HostKeyPolicy {
            accept_unknown: options.accept_unknown_hosts,
        };

        // ── Stage 1: TCP connect + SSH handshake, bounded by the timeout ─────
        let mut handle = timeout(
            options.timeout,
            client::connect(config, params.address.as_str(), handler),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            address: params.address.clone(),
            timeout: options.timeout,
        })?
        .map_err(|e| ConnectError::Handshake {
            address: params.address.clone(),
            source: e,
        })?;

        debug!("ssh handshake with {} complete", params.address);

        // ── Stage 2: password authentication ──────────────────────────────────
        let authenticated = handle
            .authenticate_password(params.user.as_str(), params.secret.as_str())
            .await
            .map_err(ConnectError::Auth)?;

        if !authenticated {
            return Err(ConnectError::AuthRejected {
                user: params.user.clone(),
            });
        }

        debug!("ssh user '{}' authenticated", params.user);

        // ── Stage 3: session channel ──────────────────────────────────────────
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(ConnectError::OpenChannel)?;

        // ── Stage 4: PTY allocation ───────────────────────────────────────────
        //
        // Echo-enabled modes with the conventional 14.4 kbaud line speeds;
        // the speeds are vestigial on modern servers but expected to be
        // present in the mode list.
        channel
            .request_pty(
                true,
                TERM_TYPE,
                params.cols,
                params.rows,
                0,
                0,
                &[
                    (Pty::ECHO, 1),
                    (Pty::TTY_OP_ISPEED, 14400),
                    (Pty::TTY_OP_OSPEED, 14400),
                ],
            )
            .await
            .map_err(ConnectError::Pty)?;

        if !await_request_reply(&mut channel).await {
            return Err(ConnectError::PtyRejected);
        }

        // ── Stage 5: interactive shell ────────────────────────────────────────
        channel
            .request_shell(true)
            .await
            .map_err(ConnectError::Shell)?;

        if !await_request_reply(&mut channel).await {
            return Err(ConnectError::ShellRejected);
        }

        debug!(
            "interactive shell started on {} ({}x{} {TERM_TYPE})",
            params.address, params.cols, params.rows
        );

        Ok(Self { handle, channel })
    }
}

/// Waits for the server's success/failure reply to a `want_reply` channel
/// request.
///
/// Channel ordering guarantees the reply precedes any shell output, but
/// unrelated bookkeeping messages (window adjustments) may arrive first and
/// are skipped.  A closed channel counts as a refusal.
async fn await_request_reply(channel: &mut russh::Channel<client::Msg>) -> bool {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return true,
            Some(ChannelMsg::Failure) | None => return false,
            Some(other) => {
                debug!("ignoring channel message while awaiting request reply: {other:?}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
