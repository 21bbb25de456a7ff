//! Default configuration values and protocol constants.
//!
//! Centralized constants for use across all crates. The timer values in the
//! control hello pack are fixed by the relay protocol and consumed verbatim
//! by remote hosts.

use std::time::Duration;

// ============================================================================
// Protocol Constants
// ============================================================================

/// Magic prefix announcing a server control session.
pub const CONTROL_MAGIC: &[u8; 4] = b"ACTL";
/// Magic signature announcing a server data session.
pub const DATA_MAGIC: &[u8; 24] = b"AZURE_CONNECT_SIGNATURE!";
/// Maximum encoded pack payload size in bytes.
pub const MAX_PACK_SIZE: usize = 10 * 1024;
/// Length of a session id and of the authentication nonce.
pub const SESSION_ID_LEN: usize = 20;

// ============================================================================
// Control Hello Pack Values (milliseconds, protocol-mandated)
// ============================================================================

/// `ControlKeepAlive` advertised to hosts.
pub const CONTROL_KEEPALIVE_MS: u32 = 40_000;
/// `ControlTimeout` advertised to hosts.
pub const CONTROL_TIMEOUT_MS: u32 = 60_000;
/// `DataTimeout` advertised to hosts.
pub const DATA_TIMEOUT_MS: u32 = 40_000;
/// `SslTimeout` advertised to hosts.
pub const SSL_TIMEOUT_MS: u32 = 5_000;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Heartbeat cadence on server control sessions.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Bound on control-channel reads (the advertised `ControlTimeout`).
pub const CONTROL_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// How long a client waits for its host to dial back.
pub const CLIENT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
/// Cadence of the periodic session status log line.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// TLS handshake deadline for accepted connections.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Capacity Defaults
// ============================================================================

/// Buffered capacity of a server command channel. Checked before sending so
/// a send under the session lock can never block.
pub const COMMAND_CHANNEL_CAPACITY: usize = 50;
/// Buffer size for spliced relay copies.
pub const SPLICE_BUFFER_SIZE: usize = 32 * 1024;
/// TCP listener backlog.
pub const CONNECTION_BACKLOG: u32 = 1024;
