//! Control-frame to shell-action translation.
//!
//! This module provides the pure decision logic between the two protocol
//! representations used by the bridge:
//!
//! - **Browser side**: JSON control frames ([`ClientMsg`])
//! - **Shell side**: actions applied to the SSH channel ([`ControlAction`])
//!
//! The functions here have no I/O side effects and no dependencies on async
//! runtimes, sockets, or threads.  This makes them easy to unit test in
//! isolation; the infrastructure layer merely executes the returned action.

use crate::domain::messages::ClientMsg;

// ── Shell actions ─────────────────────────────────────────────────────────────

/// An action the shell task applies to the remote SSH channel.
///
/// Produced by [`action_for_msg`] from a decoded control frame and delivered
/// to the task that owns the channel.  Failure to apply an action is logged
/// and never ends the session; a single dropped keystroke or resize is
/// recoverable, a torn-down session is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Write these bytes to the remote shell's stdin, unmodified.
    Forward(Vec<u8>),
    /// Request a PTY window-size change on the remote session.
    Resize {
        /// New width in character cells (always non-zero).
        cols: u32,
        /// New height in character cells (always non-zero).
        rows: u32,
    },
}

// ── Translation ───────────────────────────────────────────────────────────────

/// Maps a decoded control frame to the shell action it calls for, if any.
///
/// Returns `None` for frames that are valid but require no action:
///
/// - [`ClientMsg::Unknown`] (forward-compatible ignore)
/// - [`ClientMsg::Resize`] with a zero dimension: a zero-sized PTY request
///   is never meaningful, so it is dropped rather than rejected, preserving
///   the protocol's "ignore, don't fail" posture.
///
/// An empty `cmd` payload still maps to a (zero-byte) [`ControlAction::Forward`];
/// writing nothing to the channel is harmless and keeps the translation free
/// of payload-content policy.
pub fn action_for_msg(msg: &ClientMsg) -> Option<ControlAction> {
    match msg {
        ClientMsg::Cmd { cmd } => Some(ControlAction::Forward(cmd.clone().into_bytes())),
        ClientMsg::Resize { cols, rows } if *cols > 0 && *rows > 0 => Some(ControlAction::Resize {
            cols: *cols,
            rows: *rows,
        }),
        ClientMsg::Resize { .. } => None,
        ClientMsg::Unknown => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
