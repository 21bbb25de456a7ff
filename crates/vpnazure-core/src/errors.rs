//! Error kind constants for log labeling.
//!
//! These constants provide consistent error classification across all crates.

/// TLS handshake error.
pub const ERROR_TLS_HANDSHAKE: &str = "tls_handshake";
/// Protocol parsing/validation error.
pub const ERROR_PROTOCOL: &str = "protocol";
/// I/O error.
pub const ERROR_IO: &str = "io";
/// Authentication error.
pub const ERROR_AUTH: &str = "auth";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Client rendezvous error (server offline/busy, timeout).
pub const ERROR_RENDEZVOUS: &str = "rendezvous";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
