//! Infrastructure layer for webssh-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from browsers, opening SSH connections to remote hosts, and running the
//! per-session relay tasks.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener for browser WebSocket connections
//! - Completing the WebSocket upgrade and extracting session parameters
//! - SSH connect, authentication, PTY allocation, and shell start
//! - The per-session bridge: three relay tasks plus coordinated teardown

pub mod session_bridge;
pub mod shell_conn;
pub mod ws_server;

// Re-export the top-level entry points.
pub use session_bridge::{BridgeState, SessionBridge};
pub use shell_conn::{ConnectError, ConnectOptions, RemoteShell};
pub use ws_server::{handle_session, run_server};
