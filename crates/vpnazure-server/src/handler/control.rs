//! Server control session.
//!
//! A host opens one long-lived control connection per registered name. The
//! broker sends a hello pack with its timer parameters and a 20-byte nonce,
//! authenticates the host, registers it, and then loops: relay commands are
//! forwarded as signal packs, and a heartbeat probes the host every 30
//! seconds.

use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{info, warn};
use vpnazure_auth::{AuthMethod, CredentialStore};
use vpnazure_core::{
    COMMAND_CHANNEL_CAPACITY, CONTROL_KEEPALIVE_MS, CONTROL_READ_TIMEOUT, CONTROL_TIMEOUT_MS,
    DATA_TIMEOUT_MS, HEARTBEAT_INTERVAL, SESSION_ID_LEN, SSL_TIMEOUT_MS,
};
use vpnazure_pack::{Pack, recv_pack, send_pack};

use crate::broker::{ServerCommand, SessionBroker};
use crate::error::ServerError;
use crate::handler::ConnInfo;
use crate::suffix::SuffixEntry;

/// Drive a server control session to completion.
pub async fn handle_control<S>(
    num: u64,
    mut stream: S,
    conn: &ConnInfo,
    entry: Arc<SuffixEntry>,
    broker: Arc<SessionBroker<S>>,
    creds: Arc<CredentialStore>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut nonce = [0u8; SESSION_ID_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut hello = Pack::new();
    hello.insert_u32("ControlKeepAlive", CONTROL_KEEPALIVE_MS);
    hello.insert_u32("ControlTimeout", CONTROL_TIMEOUT_MS);
    hello.insert_u32("DataTimeout", DATA_TIMEOUT_MS);
    hello.insert_u32("SslTimeout", SSL_TIMEOUT_MS);
    hello.insert_data("Random", nonce.to_vec());
    send_pack(&mut stream, &hello, true).await?;

    let reply = recv_pack(&mut stream, true).await?;

    let hostname = match &conn.peer_cn {
        Some(cn) => {
            // The TLS front-end already verified the chain against the
            // credential's CA.
            info!(session = num, "authentication completed with certificate");
            cn.clone()
        }
        None => {
            let Some(name) = reply.get_str("CurrentHostName") else {
                return Err(ServerError::Auth("no hostname provided by peer".into()));
            };
            let hostname = name.to_lowercase();
            let Some(cred) = creds.find(&hostname, &entry.suffix) else {
                return Err(ServerError::Auth(format!("hostname {hostname} is invalid")));
            };
            match cred.method {
                AuthMethod::Anonymous => {
                    info!(session = num, "authentication completed anonymously");
                }
                AuthMethod::Password => {
                    let verified = reply
                        .get_data("PasswordHash")
                        .is_some_and(|hash| cred.check_password(&hostname, &nonce, hash));
                    if verified {
                        info!(session = num, "authentication completed with password");
                    } else {
                        return Err(ServerError::Auth("incorrect password".into()));
                    }
                }
                AuthMethod::Certificate => {
                    // The host should have presented its certificate during
                    // the TLS handshake.
                    return Err(ServerError::Auth(
                        "authentication failed with certificate".into(),
                    ));
                }
            }
            hostname
        }
    };
    info!(session = num, hostname = %hostname, "authenticated");

    stream.write_all(&[1]).await?;
    stream.flush().await?;
    heartbeat(&mut stream).await?;

    let (tx, mut rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    broker.register_server(num, hostname.clone(), conn.peer, tx);

    let mut ticker = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            command = rx.recv() => {
                let Some(command) = command else {
                    // Evicted: displaced by a re-registration or a reload.
                    info!(session = num, "session closed");
                    return Ok(());
                };
                match command {
                    ServerCommand::Relay { client_num, hostname: target, session_id, client_addr } => {
                        match send_relay_signal(
                            &mut stream, &entry, conn, &target, &session_id, client_addr,
                        )
                        .await
                        {
                            Ok(()) => {
                                info!(
                                    session = num,
                                    client = client_num,
                                    "signal sent to the server"
                                );
                            }
                            Err(e) => {
                                warn!(session = num, error = %e, "failed to send signal to server");
                                spawn_unregister(&broker, num, &hostname);
                                return Ok(());
                            }
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = heartbeat(&mut stream).await {
                    warn!(session = num, error = %e, "heartbeat failed");
                    spawn_unregister(&broker, num, &hostname);
                    return Ok(());
                }
            }
        }
    }
}

/// Forward a relay command to the host: a `0x01` prefix followed by the
/// framed signal pack, then a one-byte acknowledgement from the host.
async fn send_relay_signal<C>(
    stream: &mut C,
    entry: &SuffixEntry,
    conn: &ConnInfo,
    hostname: &str,
    session_id: &[u8; SESSION_ID_LEN],
    client_addr: std::net::SocketAddr,
) -> Result<(), ServerError>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let mut signal = Pack::new();
    signal.insert_str("opcode", "relay");
    signal.insert_str("hostname", hostname);
    signal.insert_data("session_id", session_id.to_vec());
    signal.insert_u32("client_port", u32::from(client_addr.port()));
    signal.insert_u32("server_port", u32::from(conn.peer.port()));
    signal.insert_str("relay_address", entry.control_fqdn.clone());
    signal.insert_u32("relay_port", u32::from(conn.local.port()));
    signal.insert_data("cert_hash", entry.cert_sha1.to_vec());
    signal.insert_ip("client_ip", client_addr.ip());
    signal.insert_ip("server_ip", conn.peer.ip());

    stream.write_all(&[1]).await?;
    send_pack(stream, &signal, true).await?;

    let mut ack = [0u8; 1];
    timeout(CONTROL_READ_TIMEOUT, stream.read_exact(&mut ack))
        .await
        .map_err(|_| ServerError::Timeout)??;
    Ok(())
}

/// One heartbeat exchange: send `0x00`, expect `0x00` back within the
/// control read deadline.
async fn heartbeat<C>(stream: &mut C) -> Result<(), ServerError>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[0]).await?;
    stream.flush().await?;
    let mut b = [0u8; 1];
    timeout(CONTROL_READ_TIMEOUT, stream.read_exact(&mut b))
        .await
        .map_err(|_| ServerError::Timeout)??;
    if b[0] != 0 {
        return Err(ServerError::Protocol("invalid heartbeat response"));
    }
    Ok(())
}

/// Deregistration must not run inline from the control loop: eviction and
/// channel close may not occur while this task holds a send claim on the
/// same channel.
fn spawn_unregister<S>(broker: &Arc<SessionBroker<S>>, num: u64, hostname: &str)
where
    S: Send + 'static,
{
    let broker = broker.clone();
    let hostname = hostname.to_string();
    tokio::spawn(async move {
        broker.unregister_server(num, &hostname);
    });
}
