//! Domain layer for webssh-bridge.
//!
//! The domain layer contains pure business-logic types that have no
//! dependencies on I/O, networking, or external frameworks.  This makes them
//! easy to test in isolation and portable to any runtime or platform.
//!
//! # What belongs in the domain layer?
//!
//! - Control message types (the JSON "language" between browser and bridge)
//! - Configuration structures
//! - Session parameter types and their query-string parsing
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, `WebSocket`, or `russh` types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

// Declare the sub-modules that make up the domain layer.
pub mod config;
pub mod messages;

// Re-export the most commonly needed types at the domain module boundary
// so callers can write `domain::BridgeConfig` instead of the longer path.
pub use config::{BridgeConfig, ParamError, SessionParams};
pub use messages::ClientMsg;
