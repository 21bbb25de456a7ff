//! TLS-terminating relay broker.
//!
//! The broker rendezvouses two classes of peers over a single listening
//! socket: long-lived VPN hosts that register under a DNS name on a control
//! channel, and transient clients dialing one of those names. Once a client
//! and its host's dial-back data session are matched, both byte streams are
//! spliced end to end.
//!
//! This crate exposes the broker for the CLI binaries and for integration
//! tests.

pub mod cli;

mod broker;
mod error;
mod handler;
mod logfile;
mod server;
mod suffix;
mod tls;
mod util;

pub use broker::{RendezvousError, ServerArrival, ServerCommand, SessionBroker};
pub use cli::ServerArgs;
pub use error::ServerError;
pub use logfile::LogFile;
pub use server::{Shared, TlsConn, run_with_shutdown};
pub use suffix::{Endpoint, SuffixEntry, SuffixStore};
pub use tokio_util::sync::CancellationToken;
