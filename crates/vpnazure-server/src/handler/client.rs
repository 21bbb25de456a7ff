//! Client session.
//!
//! A client's name resolved to the broker; the worker files a rendezvous
//! request and waits up to ten seconds for the host's data session, then
//! splices server bytes into the client connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, info};
use vpnazure_core::io::splice;
use vpnazure_core::{CLIENT_WAIT_TIMEOUT, SPLICE_BUFFER_SIZE};

use crate::broker::SessionBroker;
use crate::error::ServerError;

/// Drive a client session to completion.
pub async fn handle_client<S>(
    num: u64,
    stream: S,
    peer: SocketAddr,
    hostname: String,
    broker: Arc<SessionBroker<S>>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    info!(session = num, peer = %peer, hostname = %hostname, "new client connection");

    let (client_rd, mut client_wr) = tokio::io::split(stream);
    let (notify_tx, mut notify_rx) = oneshot::channel();
    if let Err(e) = broker.client_request(num, &hostname, client_rd, notify_tx, peer) {
        info!(session = num, error = %e, "connection closed");
        return Ok(());
    }
    debug!(session = num, "waiting for server to connect");

    tokio::select! {
        arrival = &mut notify_rx => {
            match arrival {
                Ok(mut arrival) => {
                    info!(
                        session = num,
                        server = arrival.server_num,
                        "relaying data from server session"
                    );
                    let (bytes, _) =
                        splice(&mut arrival.reader, &mut client_wr, SPLICE_BUFFER_SIZE).await;
                    info!(
                        session = num,
                        bytes, "client session closed: relayed server to client"
                    );
                }
                Err(_) => {
                    // The pending entry was dropped without a match.
                    info!(session = num, "connection closed: request dropped");
                }
            }
        }
        _ = tokio::time::sleep(CLIENT_WAIT_TIMEOUT) => {
            // A match racing this timeout already removed the entry; cancel
            // is then a no-op.
            broker.cancel_request(num);
            info!(session = num, "connection closed: server did not respond");
        }
    }
    Ok(())
}
