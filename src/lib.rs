//! # vpnazure-rs
//!
//! A TLS-terminating relay broker for the VPN Azure rendezvous protocol.
//!
//! The broker multiplexes many DNS suffixes over one listening socket,
//! matches transient clients to the VPN hosts registered under those
//! suffixes, and splices their byte streams end to end.
//!
//! ## Crates
//!
//! - [`vpnazure_core`] - Constants and shared I/O primitives
//! - [`vpnazure_pack`] - The typed key-value envelope codec
//! - [`vpnazure_auth`] - Host credential store
//! - [`vpnazure_server`] - The broker itself

pub use vpnazure_auth as auth;
pub use vpnazure_core as core;
pub use vpnazure_pack as pack;
pub use vpnazure_server as server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use vpnazure_auth::{AuthMethod, Credential, CredentialStore};
    pub use vpnazure_pack::{Pack, PackError, recv_pack, send_pack};
    pub use vpnazure_server::{
        CancellationToken, ServerError, SessionBroker, Shared, SuffixStore, run_with_shutdown,
    };
}
