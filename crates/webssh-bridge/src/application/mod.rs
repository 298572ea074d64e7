//! Application layer for webssh-bridge.
//!
//! The application layer holds the session-level building blocks that the
//! infrastructure tasks cooperate through: it knows *what* the bridge does,
//! but delegates *how* bytes move to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Translating decoded control frames into shell actions ([`control`])
//! - Accumulating shell output between flush ticks ([`output_buffer`])
//! - Coordinating one-shot session teardown ([`shutdown`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or SSH connections (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)
//! - SSH channel plumbing (handled by russh in the infrastructure layer)

pub mod control;
pub mod output_buffer;
pub mod shutdown;

// Re-export so callers can write `application::OutputBuffer` directly.
pub use control::{action_for_msg, ControlAction};
pub use output_buffer::OutputBuffer;
pub use shutdown::ShutdownSignal;
