//! Server error types.

use vpnazure_core::{
    ERROR_AUTH, ERROR_CONFIG, ERROR_IO, ERROR_PROTOCOL, ERROR_RENDEZVOUS, ERROR_TIMEOUT,
    ERROR_TLS_HANDSHAKE,
};
use vpnazure_pack::PackError;

use crate::broker::RendezvousError;

/// Server error type. Every variant is contained at the worker boundary;
/// only configuration failures terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),
    #[error("pack: {0}")]
    Pack(#[from] PackError),
    #[error("{0}")]
    Rendezvous(#[from] RendezvousError),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("config: {0}")]
    Config(String),
    #[error("protocol: {0}")]
    Protocol(&'static str),
    #[error("client hello carries no server name")]
    NoSni,
    #[error("SNI {0} does not match any suffix")]
    UnknownSuffix(String),
    #[error("timed out")]
    Timeout,
}

impl ServerError {
    /// Error kind string for log labeling.
    pub fn error_kind(&self) -> &'static str {
        match self {
            ServerError::Io(_) => ERROR_IO,
            ServerError::Tls(_) | ServerError::NoSni | ServerError::UnknownSuffix(_) => {
                ERROR_TLS_HANDSHAKE
            }
            ServerError::Pack(_) | ServerError::Protocol(_) => ERROR_PROTOCOL,
            ServerError::Rendezvous(_) => ERROR_RENDEZVOUS,
            ServerError::Auth(_) => ERROR_AUTH,
            ServerError::Config(_) => ERROR_CONFIG,
            ServerError::Timeout => ERROR_TIMEOUT,
        }
    }
}
