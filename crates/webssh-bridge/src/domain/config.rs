//! Bridge configuration and per-session parameters.
//!
//! [`BridgeConfig`] is the single source of truth for all process-level
//! runtime settings.  It can be constructed from CLI arguments (preferred for
//! production) or from sensible defaults (useful for local development and
//! tests).
//!
//! [`SessionParams`] carries the per-connection settings a browser supplies
//! in the WebSocket upgrade request's query string: terminal dimensions and
//! the SSH target.  Parsing lives here because it is pure string handling
//! with no I/O.
//!
//! # Design rationale
//!
//! Keeping configuration as plain structs (no global state, no environment
//! variable reads inside the domain) makes the bridge easy to embed in tests.
//! The infrastructure layer is responsible for populating [`BridgeConfig`]
//! from CLI args and [`SessionParams`] from the upgrade request.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

// ── Process-level configuration ───────────────────────────────────────────────

/// All process-level runtime configuration for the WebSocket bridge.
///
/// Build this struct once at startup (via CLI args or defaults) and then wrap
/// it in an `Arc` so it can be shared cheaply across all session tasks.
///
/// # Example
///
/// ```rust
/// use webssh_bridge::domain::BridgeConfig;
///
/// // Defaults are suitable for local development:
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8081);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The address and port the WebSocket server binds to.
    ///
    /// `0.0.0.0` accepts connections from any network interface (LAN +
    /// localhost).  Set to `127.0.0.1` to accept only local connections for
    /// additional security in production deployments.
    pub ws_bind_addr: SocketAddr,

    /// Maximum time to wait for the SSH TCP connect + handshake.
    ///
    /// Applies only to session establishment.  Once a shell is running there
    /// is no per-frame timeout; a silent remote is detected only when the
    /// transport itself errors.
    pub connect_timeout: Duration,

    /// How often the output relay drains buffered shell output into one
    /// WebSocket frame.
    ///
    /// Shorter intervals lower the visible latency of remote output at the
    /// cost of more (smaller) frames; longer intervals batch more output per
    /// frame.  The update rate is a transport concern, not a correctness one.
    pub flush_interval: Duration,

    /// Whether to accept SSH host keys that cannot be verified.
    ///
    /// The bridge carries no known-hosts store, so every host key is
    /// "unknown".  With this set to `false` (the default) every SSH
    /// connection is refused and the operator must explicitly opt in to the
    /// insecure accept-any posture via `--insecure-accept-host-keys`.
    /// Accepting an unverified key is logged prominently at warn level.
    pub accept_unknown_hosts: bool,
}

impl Default for BridgeConfig {
    /// Returns a `BridgeConfig` suitable for local development without any
    /// external configuration.
    ///
    /// | Field                | Default        |
    /// |----------------------|----------------|
    /// | ws_bind_addr         | `0.0.0.0:8081` |
    /// | connect_timeout      | 3 seconds      |
    /// | flush_interval       | 10 ms          |
    /// | accept_unknown_hosts | `false`        |
    fn default() -> Self {
        Self {
            // The `.parse().unwrap()` call here is safe because this is a
            // compile-time-known valid socket address string.
            ws_bind_addr: "0.0.0.0:8081".parse().unwrap(),
            connect_timeout: Duration::from_secs(3),
            flush_interval: Duration::from_millis(10),
            accept_unknown_hosts: false,
        }
    }
}

// ── Per-session parameters ────────────────────────────────────────────────────

/// Error returned when a WebSocket upgrade request carries malformed
/// session parameters.
///
/// A parameter error aborts the session before any SSH connection attempt
/// is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    /// A numeric query parameter (`cols` or `rows`) did not parse as an
    /// unsigned integer.
    #[error("query parameter '{name}' is not a valid number: '{value}'")]
    InvalidNumber {
        /// Name of the offending parameter.
        name: &'static str,
        /// The raw value as received.
        value: String,
    },
}

/// Per-session settings extracted from the upgrade request query string.
///
/// # Query parameters
///
/// | Parameter | Default        | Meaning                           |
/// |-----------|----------------|-----------------------------------|
/// | `cols`    | `100`          | Initial terminal width (columns)  |
/// | `rows`    | `50`           | Initial terminal height (rows)    |
/// | `address` | `localhost:22` | SSH target `host:port`            |
/// | `user`    | `root`         | SSH login user                    |
/// | `secret`  | `password`     | SSH login password                |
///
/// The `secret` default is a placeholder inherited from the original design
/// and is useless against any real host; it exists only so local test
/// environments that deliberately use it keep working.  Production callers
/// must always supply `secret` explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Initial terminal width in character cells.
    pub cols: u32,
    /// Initial terminal height in character cells.
    pub rows: u32,
    /// SSH target as `host:port`.
    pub address: String,
    /// SSH login user.
    pub user: String,
    /// SSH login password.
    pub secret: String,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            cols: 100,
            rows: 50,
            address: "localhost:22".to_string(),
            user: "root".to_string(),
            secret: "password".to_string(),
        }
    }
}

impl SessionParams {
    /// Parses session parameters from a raw URI query string.
    ///
    /// Absent parameters take their defaults.  Unknown parameters are
    /// ignored.  Values are percent-decoded (and `+` is treated as a space)
    /// so passwords containing reserved characters survive the trip through
    /// a URL.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::InvalidNumber`] if `cols` or `rows` is present
    /// but does not parse as an unsigned integer.  The caller must abort the
    /// session before any SSH connection attempt.
    pub fn from_query(query: Option<&str>) -> Result<Self, ParamError> {
        let mut params = Self::default();

        let Some(query) = query else {
            return Ok(params);
        };

        for pair in query.split('&') {
            // A bare key without '=' carries no value; skip it.
            let Some((key, raw_value)) = pair.split_once('=') else {
                continue;
            };
            let value = percent_decode(raw_value);

            match key {
                "cols" => {
                    params.cols = value.parse().map_err(|_| ParamError::InvalidNumber {
                        name: "cols",
                        value: value.clone(),
                    })?;
                }
                "rows" => {
                    params.rows = value.parse().map_err(|_| ParamError::InvalidNumber {
                        name: "rows",
                        value: value.clone(),
                    })?;
                }
                "address" => params.address = value,
                "user" => params.user = value,
                "secret" => params.secret = value,
                // Forward compatibility: unknown parameters are ignored.
                _ => {}
            }
        }

        Ok(params)
    }
}

// ── Query-string decoding helper ──────────────────────────────────────────────

/// Decodes a percent-encoded query-string value.
///
/// Implements the two rules of `application/x-www-form-urlencoded` value
/// decoding: `+` becomes a space and `%XX` becomes the byte `0xXX`.  Invalid
/// escape sequences are passed through untouched rather than rejected; a
/// garbled password will simply fail SSH authentication downstream.
fn percent_decode(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                // Need two hex digits after the '%'.
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).copied().and_then(hex_digit),
                    bytes.get(i + 2).copied().and_then(hex_digit),
                ) {
                    out.push(hi * 16 + lo);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    // Decoded bytes may not be valid UTF-8 (e.g. "%FF"); replace rather than
    // fail, matching the pass-through policy above.
    String::from_utf8_lossy(&out).into_owned()
}

/// Maps an ASCII hex digit to its numeric value.
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── BridgeConfig ─────────────────────────────────────────────────────────

    #[test]
    fn test_default_ws_port_is_8081() {
        // Arrange / Act
        let cfg = BridgeConfig::default();
        // Assert
        assert_eq!(cfg.ws_bind_addr.port(), 8081);
    }

    #[test]
    fn test_default_connect_timeout_is_3s() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_default_flush_interval_is_10ms() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.flush_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_default_rejects_unknown_host_keys() {
        // The insecure accept-any posture must be opt-in, never the default.
        let cfg = BridgeConfig::default();
        assert!(!cfg.accept_unknown_hosts);
    }

    #[test]
    fn test_config_can_be_cloned() {
        // Cloneability is required so an Arc<BridgeConfig> can be shared
        // across session tasks.
        let cfg = BridgeConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.ws_bind_addr, cloned.ws_bind_addr);
        assert_eq!(cfg.flush_interval, cloned.flush_interval);
    }

    // ── SessionParams parsing ────────────────────────────────────────────────

    #[test]
    fn test_no_query_yields_all_defaults() {
        // Arrange / Act
        let params = SessionParams::from_query(None).unwrap();

        // Assert
        assert_eq!(params.cols, 100);
        assert_eq!(params.rows, 50);
        assert_eq!(params.address, "localhost:22");
        assert_eq!(params.user, "root");
        assert_eq!(params.secret, "password");
    }

    #[test]
    fn test_empty_query_yields_all_defaults() {
        let params = SessionParams::from_query(Some("")).unwrap();
        assert_eq!(params, SessionParams::default());
    }

    #[test]
    fn test_full_query_overrides_everything() {
        // Arrange: the kind of query an xterm.js front end would build
        let query = "cols=80&rows=24&address=10.0.0.5:2222&user=deploy&secret=hunter2";

        // Act
        let params = SessionParams::from_query(Some(query)).unwrap();

        // Assert
        assert_eq!(params.cols, 80);
        assert_eq!(params.rows, 24);
        assert_eq!(params.address, "10.0.0.5:2222");
        assert_eq!(params.user, "deploy");
        assert_eq!(params.secret, "hunter2");
    }

    #[test]
    fn test_partial_query_keeps_defaults_for_absent_params() {
        let params = SessionParams::from_query(Some("user=test")).unwrap();
        assert_eq!(params.user, "test");
        assert_eq!(params.cols, 100);
        assert_eq!(params.address, "localhost:22");
    }

    #[test]
    fn test_malformed_cols_is_rejected() {
        // Act
        let result = SessionParams::from_query(Some("cols=abc"));

        // Assert: a malformed numeric parameter must abort the session
        assert_eq!(
            result,
            Err(ParamError::InvalidNumber {
                name: "cols",
                value: "abc".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_rows_is_rejected() {
        let result = SessionParams::from_query(Some("rows=-1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_parameters_are_ignored() {
        let params = SessionParams::from_query(Some("theme=dark&cols=132")).unwrap();
        assert_eq!(params.cols, 132);
    }

    #[test]
    fn test_bare_key_without_value_is_skipped() {
        let params = SessionParams::from_query(Some("cols")).unwrap();
        assert_eq!(params.cols, 100);
    }

    #[test]
    fn test_percent_encoded_secret_is_decoded() {
        // %40 = '@', '+' = space
        let params = SessionParams::from_query(Some("secret=p%40ss+word")).unwrap();
        assert_eq!(params.secret, "p@ss word");
    }

    #[test]
    fn test_invalid_percent_escape_passes_through() {
        // "%Z" is not a valid escape; the raw characters are kept.
        let params = SessionParams::from_query(Some("secret=a%Zb")).unwrap();
        assert_eq!(params.secret, "a%Zb");
    }

    #[test]
    fn test_trailing_percent_passes_through() {
        let params = SessionParams::from_query(Some("secret=abc%")).unwrap();
        assert_eq!(params.secret, "abc%");
    }

    // ── percent_decode helper ────────────────────────────────────────────────

    #[test]
    fn test_percent_decode_plain_value_unchanged() {
        assert_eq!(percent_decode("hello"), "hello");
    }

    #[test]
    fn test_percent_decode_hex_uppercase_and_lowercase() {
        assert_eq!(percent_decode("%2F%2f"), "//");
    }
}
