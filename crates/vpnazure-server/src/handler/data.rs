//! Server data session.
//!
//! A host dials back with the data signature and a pack naming the session
//! id it was signaled with. On a match the worker acknowledges with `0x01`
//! and splices client bytes into this connection until either side closes.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use vpnazure_core::io::splice;
use vpnazure_core::{SESSION_ID_LEN, SPLICE_BUFFER_SIZE};
use vpnazure_pack::recv_pack;

use crate::broker::SessionBroker;
use crate::error::ServerError;
use crate::handler::ConnInfo;

/// Drive a server data session to completion.
pub async fn handle_data<S>(
    num: u64,
    mut stream: S,
    conn: &ConnInfo,
    broker: Arc<SessionBroker<S>>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let pack = recv_pack(&mut stream, true).await?;

    // Case is preserved: the host echoes the hostname from the signal pack.
    let Some(hostname) = pack.get_str("hostname") else {
        warn!(session = num, "session aborted: no hostname provided by peer");
        return Ok(());
    };
    let hostname = hostname.to_string();
    let Some(session_id) = pack.get_data("session_id") else {
        warn!(session = num, "session aborted: no session id from server");
        return Ok(());
    };
    if session_id.len() != SESSION_ID_LEN {
        warn!(session = num, "session aborted: bad session id length");
        return Ok(());
    }
    let session_id = session_id.to_vec();

    let (server_rd, mut server_wr) = tokio::io::split(stream);
    let Some((client_num, mut client_rd)) =
        broker.server_respond(num, server_rd, conn.peer, &hostname, &session_id)
    else {
        warn!(
            session = num,
            session_id = %hex::encode(&session_id),
            "session aborted: can't find the client session"
        );
        return Ok(());
    };

    let result = async {
        server_wr.write_all(&[1]).await?;
        server_wr.flush().await?;
        info!(session = num, client = client_num, "relaying data from client session");
        let (bytes, _) = splice(&mut client_rd, &mut server_wr, SPLICE_BUFFER_SIZE).await;
        info!(
            session = num,
            bytes, "server session closed: relayed client to server"
        );
        Ok(())
    }
    .await;

    broker.end_relay(client_num);
    result
}
