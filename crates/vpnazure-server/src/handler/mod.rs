//! Per-connection state machines.
//!
//! After TLS classification a worker drives exactly one of three machines:
//! the server control session, the server data session, or the client
//! session. All three meet at the session broker.

mod client;
mod control;
mod data;

pub use client::handle_client;
pub use control::handle_control;
pub use data::handle_data;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{info, warn};
use vpnazure_auth::CredentialStore;
use vpnazure_core::{CONTROL_MAGIC, DATA_MAGIC};

use crate::broker::SessionBroker;
use crate::error::ServerError;
use crate::suffix::SuffixEntry;

/// Addressing facts about one accepted connection, captured before the
/// stream is handed to a generic state machine.
pub struct ConnInfo {
    pub peer: SocketAddr,
    pub local: SocketAddr,
    /// Lowercased CN of the TLS-verified peer certificate, when one was
    /// presented on a control endpoint.
    pub peer_cn: Option<String>,
}

/// Dispatch a server-endpoint connection on its magic prefix.
///
/// The first four bytes decide: the control magic starts a control session
/// right away, leaving anything the host sent after it unread in the socket
/// for the control parser. Any other prefix must complete the 24-byte data
/// signature or the connection is dropped.
pub async fn handle_server<S>(
    num: u64,
    mut stream: S,
    conn: ConnInfo,
    entry: Arc<SuffixEntry>,
    broker: Arc<SessionBroker<S>>,
    creds: Arc<CredentialStore>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).await?;

    if magic == *CONTROL_MAGIC {
        info!(
            session = num,
            peer = %conn.peer,
            suffix = %entry.suffix,
            "starting server control session"
        );
        return handle_control(num, stream, &conn, entry, broker, creds).await;
    }

    let mut rest = [0u8; 20];
    stream.read_exact(&mut rest).await?;
    if magic[..] == DATA_MAGIC[..4] && rest[..] == DATA_MAGIC[4..] {
        info!(
            session = num,
            peer = %conn.peer,
            suffix = %entry.suffix,
            "starting server data session"
        );
        return handle_data(num, stream, &conn, broker).await;
    }

    warn!(session = num, "invalid server connection");
    Ok(())
}
