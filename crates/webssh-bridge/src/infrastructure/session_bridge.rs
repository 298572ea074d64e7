//! Per-session bridge: three relay tasks and coordinated teardown.
//!
//! One [`SessionBridge`] owns exactly one SSH shell session and exactly one
//! browser WebSocket for the session's lifetime.  Starting the bridge spawns
//! three Tokio tasks:
//!
//! - **Inbound relay**: reads WebSocket frames from the browser, decodes
//!   JSON control messages, and queues the resulting shell actions.  A read
//!   error or Close frame is a terminal condition.
//! - **Output relay**: drains the shared [`OutputBuffer`] on a fixed tick
//!   and ships each non-empty drain to the browser as one Binary frame.
//!   Send failures are logged, never fatal.
//! - **Shell pump**: exclusively owns the SSH channel: applies queued
//!   actions (input writes, window changes) and folds channel events into
//!   the output buffer.  The remote shell exiting is a terminal condition.
//!   This task doubles as the completion watch; it is the only activity
//!   whose termination is driven by the *remote* side.
//!
//! # Why a single owner for the SSH channel?
//!
//! Reading channel events requires exclusive access, and sharing the channel
//! between the inbound relay and a separate completion watcher would need a
//! lock held across awaits.  Funnelling actions through an mpsc queue into
//! the one task that already owns the channel gives the same behaviour with
//! no shared mutable state at all.
//!
//! # Teardown
//!
//! Whichever task first observes a terminal condition fires the shared
//! [`ShutdownSignal`]; the other tasks observe it at their next suspension
//! point (`tokio::select!` makes every blocking read cancellable, so no task
//! can sleep through shutdown).  The bridge's [`SessionBridge::close`] then
//! disconnects the SSH transport exactly once and joins all tasks.
//!
//! # State machine
//!
//! `Created → Running → Closing → Closed`, strictly monotonic.  `close` is
//! idempotent: a second call finds nothing left to release and no state to
//! regress.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use russh::ChannelMsg;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, warn};

use crate::application::control::{action_for_msg, ControlAction};
use crate::application::output_buffer::OutputBuffer;
use crate::application::shutdown::ShutdownSignal;
use crate::domain::messages::ClientMsg;
use crate::infrastructure::shell_conn::{RemoteShell, ShellChannel, SshHandle};

/// How many shell actions may be queued before the inbound relay awaits.
///
/// Keystrokes are tiny and the shell pump drains fast; backpressure here
/// only matters when the remote side has stalled completely.
const ACTION_QUEUE_DEPTH: usize = 32;

/// Bound on the best-effort final flush and close of the browser socket.
///
/// A peer that stopped draining its socket must not keep the session task
/// alive past teardown.
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_millis(250);

// ── Bridge state ──────────────────────────────────────────────────────────────

/// Lifecycle states of a [`SessionBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BridgeState {
    /// Constructed; no tasks running yet.
    Created = 0,
    /// All three relay tasks are running.
    Running = 1,
    /// The shutdown signal has fired; tasks are draining out.
    Closing = 2,
    /// Both transports released; terminal state.
    Closed = 3,
}

impl BridgeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A monotonically advancing state cell.
///
/// `advance` only ever moves the state forward, so racing transitions (two
/// tasks both pushing towards `Closing`, or `close` called twice) resolve to
/// the furthest state with no possibility of regression.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(initial: BridgeState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    /// Advances to `to` if it is further along than the current state.
    fn advance(&self, to: BridgeState) {
        self.0.fetch_max(to as u8, Ordering::SeqCst);
    }

    fn current(&self) -> BridgeState {
        BridgeState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

// ── Session bridge ────────────────────────────────────────────────────────────

/// Binds one SSH shell session to one browser WebSocket.
///
/// # Lifecycle
///
/// ```text
/// let mut bridge = SessionBridge::new(shell, session_id, flush_interval);
/// bridge.start(ws_stream);       // Created → Running, spawns the tasks
/// bridge.wait_shutdown().await;  // returns when any task hit a terminal condition
/// bridge.close().await;          // Closing → Closed, releases both transports
/// ```
pub struct SessionBridge {
    /// Peer-address string used to correlate log lines for this session.
    session_id: String,
    /// Output relay tick period.
    flush_interval: Duration,
    /// The one-shot teardown broadcast shared by all tasks.
    shutdown: Arc<ShutdownSignal>,
    /// Accumulates shell output between flush ticks.
    output: Arc<OutputBuffer>,
    /// Lifecycle state, advanced monotonically.
    state: StateCell,
    /// The shell channel; taken by `start`.
    channel: Option<ShellChannel>,
    /// The SSH connection handle; taken (and disconnected) by `close`.
    ssh: Option<SshHandle>,
    /// Join handles of the spawned relay tasks; drained by `close`.
    tasks: Vec<JoinHandle<()>>,
}

impl SessionBridge {
    /// Creates a bridge in the `Created` state, owning the given shell.
    pub fn new(shell: RemoteShell, session_id: String, flush_interval: Duration) -> Self {
        let (ssh, channel) = shell.into_parts();
        Self {
            session_id,
            flush_interval,
            shutdown: Arc::new(ShutdownSignal::new()),
            output: Arc::new(OutputBuffer::new()),
            state: StateCell::new(BridgeState::Created),
            channel: Some(channel),
            ssh: Some(ssh),
            tasks: Vec::with_capacity(3),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.state.current()
    }

    /// A bridge with no transports attached, for lifecycle tests.
    #[cfg(test)]
    fn detached(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            flush_interval: Duration::from_millis(10),
            shutdown: Arc::new(ShutdownSignal::new()),
            output: Arc::new(OutputBuffer::new()),
            state: StateCell::new(BridgeState::Created),
            channel: None,
            ssh: None,
            tasks: Vec::new(),
        }
    }

    /// Spawns the three relay tasks and transitions to `Running`.
    ///
    /// Calling `start` more than once is a no-op: the shell channel has
    /// already been handed to its task.
    pub fn start(&mut self, ws_stream: WebSocketStream<TcpStream>) {
        let Some(channel) = self.channel.take() else {
            return;
        };

        let (ws_tx, ws_rx) = ws_stream.split();
        let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE_DEPTH);

        self.tasks.push(tokio::spawn(run_inbound_relay(
            ws_rx,
            action_tx,
            Arc::clone(&self.shutdown),
            self.session_id.clone(),
        )));

        self.tasks.push(tokio::spawn(run_output_relay(
            ws_tx,
            Arc::clone(&self.output),
            Arc::clone(&self.shutdown),
            self.flush_interval,
            self.session_id.clone(),
        )));

        self.tasks.push(tokio::spawn(run_shell_pump(
            channel,
            action_rx,
            Arc::clone(&self.output),
            Arc::clone(&self.shutdown),
            self.session_id.clone(),
        )));

        self.state.advance(BridgeState::Running);
    }

    /// Suspends until any task has observed a terminal condition and fired
    /// the shutdown broadcast.  Returns immediately if that already happened.
    pub async fn wait_shutdown(&self) {
        self.shutdown.wait().await;
        self.state.advance(BridgeState::Closing);
    }

    /// Releases both transports and joins the relay tasks.
    ///
    /// Idempotent: the SSH disconnect happens at most once, an already-torn
    /// transport is a logged no-op, and repeated calls find nothing left to
    /// do.  Always leaves the bridge in the `Closed` state.
    pub async fn close(&mut self) {
        // Make sure every task is on its way out even if close was called
        // before any terminal condition occurred.
        self.shutdown.fire();
        self.state.advance(BridgeState::Closing);

        if let Some(ssh) = self.ssh.take() {
            if let Err(e) = ssh.disconnect().await {
                // The transport may already be gone (remote exit); that is
                // exactly the double-release tolerance close promises.
                debug!(
                    "session {}: ssh disconnect during close: {e}",
                    self.session_id
                );
            }
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("session {}: relay task panicked: {e}", self.session_id);
            }
        }

        self.state.advance(BridgeState::Closed);
        debug!("session {}: bridge closed", self.session_id);
    }
}

// ── Inbound relay ─────────────────────────────────────────────────────────────

/// Reads browser frames, decodes control messages, queues shell actions.
///
/// Terminal conditions: WebSocket read error, stream end, Close frame, or
/// the shutdown broadcast.  One malformed frame is logged and skipped; a
/// garbled paste must never kill the session.
async fn run_inbound_relay<R>(
    mut ws_rx: R,
    action_tx: mpsc::Sender<ControlAction>,
    shutdown: Arc<ShutdownSignal>,
    session_id: String,
) where
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        // select! makes the blocking read cancellable: if shutdown fires
        // while no frame is pending, this task still exits immediately
        // instead of sleeping inside `next()` until the peer sends again.
        let frame = tokio::select! {
            _ = shutdown.wait() => break,
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed)) => {
                debug!("session {session_id}: browser websocket closed");
                break;
            }
            Some(Err(WsError::Protocol(e))) => {
                warn!("session {session_id}: browser websocket protocol violation: {e}");
                break;
            }
            Some(Err(e)) => {
                warn!("session {session_id}: browser websocket read error: {e}");
                break;
            }
            None => {
                debug!("session {session_id}: browser stream ended");
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                handle_control_frame(text.as_bytes(), &action_tx, &session_id).await;
            }
            WsMessage::Binary(bytes) => {
                handle_control_frame(&bytes, &action_tx, &session_id).await;
            }
            WsMessage::Close(_) => {
                debug!("session {session_id}: browser sent Close frame");
                break;
            }
            // Protocol-level ping/pong: tungstenite queues the pong reply
            // automatically; nothing for us to do.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Frame(_) => {
                debug!("session {session_id}: raw frame ignored");
            }
        }
    }

    if shutdown.fire() {
        debug!("session {session_id}: inbound relay initiated shutdown");
    }
}

/// Decodes one control frame and queues the resulting action, if any.
///
/// Decode failures are non-fatal by design: log at warn and carry on.
async fn handle_control_frame(
    frame: &[u8],
    action_tx: &mpsc::Sender<ControlAction>,
    session_id: &str,
) {
    let msg: ClientMsg = match serde_json::from_slice(frame) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("session {session_id}: discarding malformed control frame: {e}");
            return;
        }
    };

    let Some(action) = action_for_msg(&msg) else {
        return;
    };

    // A closed queue means the shell pump is gone, which only happens on the
    // way out of the session; the shutdown branch above will end this loop.
    if action_tx.send(action).await.is_err() {
        debug!("session {session_id}: shell task gone; dropping action");
    }
}

// ── Output relay ──────────────────────────────────────────────────────────────

/// Ships buffered shell output to the browser once per flush tick.
///
/// Each non-empty drain becomes exactly one Binary frame.  Binary rather
/// than Text: a tick boundary may fall inside a multi-byte UTF-8 sequence,
/// so frames are not guaranteed to be valid UTF-8 in isolation.  Send
/// failures are logged and the loop continues; the inbound relay owns
/// detection of a dead browser connection.
///
/// Every send races the shutdown broadcast.  A browser that stops reading
/// parks `send` on transport backpressure, and an uncancellable send there
/// would pin the whole teardown behind it.  A frame abandoned by the race is
/// lost; shutdown already implies that.
async fn run_output_relay<S>(
    mut ws_tx: S,
    output: Arc<OutputBuffer>,
    shutdown: Arc<ShutdownSignal>,
    flush_interval: Duration,
    session_id: String,
) where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let mut ticker = interval(flush_interval);

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                let pending = output.take();
                if pending.is_empty() {
                    continue;
                }
                tokio::select! {
                    _ = shutdown.wait() => break,
                    sent = ws_tx.send(WsMessage::Binary(pending)) => {
                        if let Err(e) = sent {
                            warn!("session {session_id}: failed to send output frame: {e}");
                        }
                    }
                }
            }
        }
    }

    // Best-effort: flush whatever the pump buffered after the last tick (a
    // shell's parting "logout") and close so well-behaved clients see a
    // clean end of stream.  Time-bounded for the same backpressure reason
    // as the send race above.
    let farewell = async {
        let pending = output.take();
        if !pending.is_empty() {
            if let Err(e) = ws_tx.send(WsMessage::Binary(pending)).await {
                debug!("session {session_id}: final output frame dropped: {e}");
                return;
            }
        }
        if let Err(e) = ws_tx.close().await {
            debug!("session {session_id}: websocket close: {e}");
        }
    };
    if timeout(FINAL_FLUSH_TIMEOUT, farewell).await.is_err() {
        debug!("session {session_id}: browser not draining; abandoned final flush");
    }
}

// ── Shell pump (completion watch) ─────────────────────────────────────────────

/// Owns the SSH channel: applies queued actions and folds channel events
/// into the output buffer.
///
/// Terminal conditions: the remote shell exiting (exit status or signal),
/// the channel closing, or the shutdown broadcast.  Per-action failures
/// (a keystroke the channel refused, a window change the server
/// rejected) are logged and the session continues.
async fn run_shell_pump(
    mut channel: ShellChannel,
    mut action_rx: mpsc::Receiver<ControlAction>,
    output: Arc<OutputBuffer>,
    shutdown: Arc<ShutdownSignal>,
    session_id: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,

            action = action_rx.recv() => match action {
                Some(ControlAction::Forward(bytes)) => {
                    if let Err(e) = channel.data(&bytes[..]).await {
                        warn!("session {session_id}: input write to shell failed: {e}");
                    }
                }
                Some(ControlAction::Resize { cols, rows }) => {
                    if let Err(e) = channel.window_change(cols, rows, 0, 0).await {
                        warn!("session {session_id}: pty window change failed: {e}");
                    }
                }
                // The inbound relay dropped its sender, which it only does on
                // its way out after broadcasting shutdown; wait for the
                // broadcast instead of spinning on a closed queue.
                None => {
                    shutdown.wait().await;
                    break;
                }
            },

            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => output.write(&data),
                // ext 1 is stderr; merge it with stdout exactly as a local
                // terminal would show it.
                Some(ChannelMsg::ExtendedData { data, .. }) => output.write(&data),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("session {session_id}: remote shell exited with status {exit_status}");
                    break;
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    debug!("session {session_id}: remote shell killed by signal {signal_name:?}");
                    break;
                }
                Some(ChannelMsg::Eof) => {
                    // Output is done but the exit status may still be in
                    // flight; keep pumping until the channel closes.
                    debug!("session {session_id}: shell output reached EOF");
                }
                Some(ChannelMsg::Close) | None => {
                    debug!("session {session_id}: shell channel closed");
                    break;
                }
                Some(other) => {
                    debug!("session {session_id}: ignoring channel message: {other:?}");
                }
            },
        }
    }

    if shutdown.fire() {
        debug!("session {session_id}: completion watch initiated shutdown");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
