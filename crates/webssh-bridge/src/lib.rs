//! webssh-bridge library crate.
//!
//! This crate provides a WebSocket-to-SSH bridge that lets a browser-based
//! terminal emulator (xterm.js or similar) drive an interactive shell on a
//! remote host.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON control frames + raw output over WebSocket)
//!         ↕
//! [webssh-bridge]
//!   ├── domain/           Pure types: control messages, config, session params
//!   ├── application/      Concurrency primitives: output buffer, shutdown
//!   │                     signal, control-frame → shell-action translation
//!   └── infrastructure/
//!         ├── ws_server/      WebSocket accept loop (tokio-tungstenite)
//!         ├── shell_conn/     SSH connect + PTY + shell (russh)
//!         └── session_bridge/ Per-session relay tasks and teardown
//!         ↕
//! Remote host (SSH, interactive shell behind a PTY)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies beyond serde (no I/O, no async).
//! - `application` depends on `domain`, `tokio` sync primitives, and `tracing`.
//! - `infrastructure` depends on all other layers plus `tokio`, `tungstenite`,
//!   and `russh`.
//!
//! # The hard part
//!
//! The two transports have incompatible shapes: the SSH side is an ordered
//! byte stream behind a pseudo-terminal, while the WebSocket side carries
//! discrete frames that are either raw keystrokes or structured control
//! events (resize).  The bridge runs three cooperating tasks per session
//! (inbound frame relay, periodic output flush, shell completion watch)
//! and coordinates their teardown through a single one-shot shutdown signal
//! so neither transport is ever leaked.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: session concurrency primitives and translation logic.
pub mod application;

/// Infrastructure layer: WebSocket server, SSH connection, session bridge.
pub mod infrastructure;
