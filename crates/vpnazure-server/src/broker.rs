//! Session broker: the rendezvous table matching clients to hosts.
//!
//! Three tables live here. `servers` maps a hostname to its registered
//! control session; `pending` holds clients waiting for their host to dial
//! back; `relaying` tracks spliced sessions for status reporting. `servers`
//! and the client tables sit behind separate locks, acquired in the order
//! servers → clients when both are needed.
//!
//! Connections are modeled as owned stream halves. A pending entry owns the
//! client connection's read half; when the matching data session arrives the
//! broker hands that half to the data worker and delivers the server
//! connection's read half to the client worker through a single-shot notify
//! channel. The broker never closes a connection it did not originate — each
//! worker is the sole closer of the stream halves it holds.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::io::ReadHalf;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use vpnazure_core::SESSION_ID_LEN;

/// Rendezvous failures surfaced to client workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RendezvousError {
    #[error("server is offline")]
    ServerOffline,
    #[error("server is busy")]
    ServerBusy,
}

/// Command delivered to a server control session.
#[derive(Debug)]
pub enum ServerCommand {
    /// Tell the host to dial back for a waiting client.
    Relay {
        client_num: u64,
        hostname: String,
        session_id: [u8; SESSION_ID_LEN],
        client_addr: SocketAddr,
    },
}

/// Delivered to a waiting client when its host's data session arrives.
pub struct ServerArrival<S> {
    pub server_num: u64,
    pub reader: ReadHalf<S>,
}

struct PendingSession<S> {
    reader: ReadHalf<S>,
    notify: oneshot::Sender<ServerArrival<S>>,
    hostname: String,
    session_id: [u8; SESSION_ID_LEN],
    client_addr: SocketAddr,
}

struct RelayingSession {
    client_addr: SocketAddr,
    server_addr: SocketAddr,
}

struct ServerSession {
    num: u64,
    addr: SocketAddr,
    commands: mpsc::Sender<ServerCommand>,
}

struct ClientTable<S> {
    pending: HashMap<u64, PendingSession<S>>,
    relaying: HashMap<u64, RelayingSession>,
}

/// The rendezvous table. Generic over the connection stream type so unit
/// tests can drive it with in-memory duplex streams.
pub struct SessionBroker<S> {
    servers: Mutex<HashMap<String, ServerSession>>,
    clients: Mutex<ClientTable<S>>,
}

impl<S> Default for SessionBroker<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SessionBroker<S> {
    pub fn new() -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
            clients: Mutex::new(ClientTable {
                pending: HashMap::new(),
                relaying: HashMap::new(),
            }),
        }
    }

    /// Register a server control session, displacing any existing entry for
    /// the same hostname. Dropping the displaced entry's sender closes its
    /// command channel, which its worker observes as eviction.
    pub fn register_server(
        &self,
        num: u64,
        hostname: String,
        addr: SocketAddr,
        commands: mpsc::Sender<ServerCommand>,
    ) {
        let mut servers = self.servers.lock();
        // The displaced entry's channel closes before the new entry is
        // installed; its worker cannot match requests filed after this
        // point.
        if let Some(old) = servers.remove(&hostname) {
            debug!(
                hostname = %hostname,
                old_session = old.num,
                old_addr = %old.addr,
                new_session = num,
                "displaced existing server registration"
            );
            drop(old);
        }
        servers.insert(hostname, ServerSession { num, addr, commands });
    }

    /// Remove a server registration, but only if it still belongs to session
    /// `num`. A displaced worker deregistering late must not evict its
    /// successor.
    pub fn unregister_server(&self, num: u64, hostname: &str) {
        let mut servers = self.servers.lock();
        if servers.get(hostname).is_some_and(|s| s.num == num) {
            servers.remove(hostname);
        }
    }

    /// File a client request for `hostname` and signal the host to dial
    /// back. On success the pending entry owns `reader` and the caller keeps
    /// the notify receiver.
    ///
    /// The command channel's free capacity is checked under the server lock
    /// before the pending entry is inserted, so the send below can never
    /// block while the locks are held.
    pub fn client_request(
        &self,
        num: u64,
        hostname: &str,
        reader: ReadHalf<S>,
        notify: oneshot::Sender<ServerArrival<S>>,
        client_addr: SocketAddr,
    ) -> Result<(), RendezvousError> {
        let servers = self.servers.lock();
        let server = servers.get(hostname).ok_or(RendezvousError::ServerOffline)?;
        if server.commands.capacity() == 0 {
            return Err(RendezvousError::ServerBusy);
        }

        let mut session_id = [0u8; SESSION_ID_LEN];
        OsRng.fill_bytes(&mut session_id);

        let mut clients = self.clients.lock();
        clients.pending.insert(
            num,
            PendingSession {
                reader,
                notify,
                hostname: hostname.to_string(),
                session_id,
                client_addr,
            },
        );

        let command = ServerCommand::Relay {
            client_num: num,
            hostname: hostname.to_string(),
            session_id,
            client_addr,
        };
        if server.commands.try_send(command).is_err() {
            // The control worker already dropped its receiver.
            clients.pending.remove(&num);
            return Err(RendezvousError::ServerOffline);
        }
        Ok(())
    }

    /// Drop a pending request. A no-op when the request was already matched.
    pub fn cancel_request(&self, num: u64) {
        self.clients.lock().pending.remove(&num);
    }

    /// Match an arriving data session against the pending table.
    ///
    /// On a `(hostname, session_id)` match the pending entry is removed, a
    /// relaying entry is installed under the client's number, and the server
    /// reader is delivered to the waiting client — all under the client
    /// lock, so a client either times out with nothing delivered or receives
    /// exactly one server connection. Returns the client's number and the
    /// client connection's read half.
    pub fn server_respond(
        &self,
        server_num: u64,
        server_reader: ReadHalf<S>,
        server_addr: SocketAddr,
        hostname: &str,
        session_id: &[u8],
    ) -> Option<(u64, ReadHalf<S>)> {
        let mut clients = self.clients.lock();
        let client_num = clients.pending.iter().find_map(|(num, p)| {
            (p.hostname == hostname && p.session_id[..] == *session_id).then_some(*num)
        })?;

        let pending = clients.pending.remove(&client_num)?;
        clients.relaying.insert(
            client_num,
            RelayingSession {
                client_addr: pending.client_addr,
                server_addr,
            },
        );
        // The client may have timed out and dropped its receiver; the entry
        // is gone either way and the data worker will see the client side
        // closed.
        let _ = pending.notify.send(ServerArrival {
            server_num,
            reader: server_reader,
        });
        Some((client_num, pending.reader))
    }

    /// Remove a relaying entry.
    pub fn end_relay(&self, client_num: u64) {
        self.clients.lock().relaying.remove(&client_num);
    }

    /// Drop every server registration, closing all command channels. Used
    /// after a configuration reload so hosts reconnect under the new
    /// configuration. Relaying sessions are unaffected.
    pub fn cleanup_servers(&self) {
        self.servers.lock().clear();
    }

    /// Session counts: `(servers, relaying, pending)`.
    pub fn status(&self) -> (usize, usize, usize) {
        let servers = self.servers.lock();
        let clients = self.clients.lock();
        (
            servers.len(),
            clients.relaying.len(),
            clients.pending.len(),
        )
    }

    /// Remote address of a relaying session's peers, for status reporting.
    pub fn relay_addrs(&self, client_num: u64) -> Option<(SocketAddr, SocketAddr)> {
        let clients = self.clients.lock();
        clients
            .relaying
            .get(&client_num)
            .map(|r| (r.client_addr, r.server_addr))
    }
}
