//! Accept loop and TLS dispatch.
//!
//! One worker per accepted connection: the client hello is inspected, the
//! matching suffix's TLS configuration is served, and the connection is
//! classified again on the negotiated server name before the appropriate
//! state machine takes over.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::LazyConfigAcceptor;
use tokio_rustls::rustls;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vpnazure_auth::CredentialStore;
use vpnazure_core::{CONNECTION_BACKLOG, STATUS_INTERVAL, TLS_HANDSHAKE_TIMEOUT};

use crate::broker::SessionBroker;
use crate::error::ServerError;
use crate::handler::{self, ConnInfo};
use crate::suffix::{Endpoint, SuffixStore};
use crate::tls::peer_common_name;
use crate::util::create_listener;

/// The TLS stream type all connection state machines run on.
pub type TlsConn = tokio_rustls::server::TlsStream<TcpStream>;

/// Everything the accept loop shares with its workers.
pub struct Shared {
    pub suffixes: Arc<SuffixStore>,
    pub creds: Arc<CredentialStore>,
    pub broker: Arc<SessionBroker<TlsConn>>,
}

/// Run the broker until the cancellation token fires or the listener dies.
pub async fn run_with_shutdown(
    listen: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = create_listener(listen, CONNECTION_BACKLOG)?;
    info!(address = %listen, "listening");

    let status = {
        let broker = shared.broker.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + STATUS_INTERVAL,
                STATUS_INTERVAL,
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        let (servers, relaying, pending) = broker.status();
                        info!(servers, relaying, pending, "status");
                    }
                }
            }
        })
    };

    let mut num: u64 = 0;
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }

            result = listener.accept() => {
                let (tcp, peer) = result?;
                num += 1;
                let session = num;
                debug!(session, peer = %peer, "new connection");
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(session, tcp, peer, shared).await {
                        warn!(
                            session,
                            peer = %peer,
                            kind = e.error_kind(),
                            error = %e,
                            "connection closed with error"
                        );
                    }
                });
            }
        }
    }

    status.abort();
    Ok(())
}

/// Handshake, classify, and dispatch one accepted connection.
async fn serve_connection(
    num: u64,
    tcp: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), ServerError> {
    tcp.set_nodelay(true)?;
    let local = tcp.local_addr()?;

    let suffixes = &shared.suffixes;
    let handshake = async {
        let acceptor = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), tcp);
        let start = acceptor.await?;
        let Some(sni) = start.client_hello().server_name().map(str::to_string) else {
            return Err(ServerError::NoSni);
        };
        let config = match suffixes.classify(&sni) {
            Endpoint::Unknown => return Err(ServerError::UnknownSuffix(sni)),
            Endpoint::Control(entry) => entry.control_config.clone(),
            Endpoint::Client { entry, .. } => entry.client_config.clone(),
        };
        Ok(start.into_stream(config).await?)
    };
    let stream = timeout(TLS_HANDSHAKE_TIMEOUT, handshake)
        .await
        .map_err(|_| ServerError::Timeout)??;

    // Classify again on the negotiated name: a reload may have swapped the
    // suffix list between the hello and now, and the dispatch must agree
    // with the current configuration.
    let server_name = stream
        .get_ref()
        .1
        .server_name()
        .map(str::to_string)
        .unwrap_or_default();

    match suffixes.classify(&server_name) {
        Endpoint::Unknown => Err(ServerError::UnknownSuffix(server_name)),
        Endpoint::Control(entry) => {
            let peer_cn = stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|certs| certs.first())
                .and_then(peer_common_name);
            info!(session = num, peer = %peer, "new server connection");
            let conn = ConnInfo {
                peer,
                local,
                peer_cn,
            };
            handler::handle_server(
                num,
                stream,
                conn,
                entry,
                shared.broker.clone(),
                shared.creds.clone(),
            )
            .await
        }
        Endpoint::Client { hostname, .. } => {
            handler::handle_client(num, stream, peer, hostname, shared.broker.clone()).await
        }
    }
}
