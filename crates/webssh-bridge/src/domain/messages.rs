//! JSON control message types for the browser-facing WebSocket protocol.
//!
//! The SSH side of the bridge is a raw byte stream; the browser side speaks
//! discrete frames.  Frames from the browser are JSON objects carrying either
//! raw keystrokes or a structured control event:
//!
//! ```json
//! {"type":"cmd","cmd":"ls\n"}
//! {"type":"resize","cols":120,"rows":40}
//! ```
//!
//! Frames *to* the browser are raw aggregated shell output with no envelope,
//! so there is no outbound message type to define here.
//!
//! # JSON discriminant
//!
//! Every control message is a JSON object with a `"type"` field that
//! identifies the variant.  Serde's `#[serde(tag = "type")]` attribute
//! handles this automatically.
//!
//! # Forward compatibility
//!
//! A `"type"` value this version does not understand decodes into
//! [`ClientMsg::Unknown`] (via `#[serde(other)]`) rather than failing, so a
//! newer front end talking to an older bridge degrades to a no-op instead of
//! killing the session.  Only structurally malformed JSON is a decode error,
//! and even that is non-fatal to the session (the bridge logs and continues).

use serde::Deserialize;

/// A control frame sent by the browser over the WebSocket.
///
/// # Field defaults
///
/// Missing fields decode as their zero values (`0` / empty string) rather
/// than erroring.  A `resize` without dimensions therefore decodes fine and
/// is then discarded by the zero-dimension guard in the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
// `tag = "type"` means serde will look for a `"type"` field in the JSON object
// to determine which enum variant to use when deserializing.
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMsg {
    /// Raw input for the remote shell's stdin (keystrokes, pasted text).
    ///
    /// The payload is forwarded byte-for-byte; the bridge never inspects or
    /// rewrites it.  Line discipline is the remote PTY's business.
    Cmd {
        /// The input bytes, as a JSON string.
        #[serde(default)]
        cmd: String,
    },

    /// The browser terminal was resized; propagate to the remote PTY.
    Resize {
        /// New terminal width in character cells.
        #[serde(default)]
        cols: u32,
        /// New terminal height in character cells.
        #[serde(default)]
        rows: u32,
    },

    /// Any `"type"` value this bridge version does not recognise.
    ///
    /// Decoded successfully and then ignored.
    #[serde(other)]
    Unknown,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
