//! Listeners and per-connection tasks.
//!
//! Each connection runs two halves on the same task: a read loop that feeds lines to the state,
//! and a write loop that drains the connection's message queue onto the socket.  The connection
//! dies when either half fails, or when the state drops the queue.

use crate::client::MessageQueueItem;
use crate::config;
use crate::lines;
use crate::message::MAX_MESSAGE_LENGTH;
use crate::state::{ClientId, State};
use hickory_resolver::TokioAsyncResolver;
use std::net::SocketAddr;
use std::process;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;

/// How long a closed client may keep its socket open while the last replies are flushed, in
/// milliseconds.
const DRAIN_TIMEOUT: u64 = 5_000;

/// Binds `addr`, accepts and handles incoming connections.
///
/// `accepts_links` is set for the link listener; connections accepted there may speak the
/// server-to-server protocol and their PASS carries a link password.
pub async fn listen(addr: SocketAddr, shared: State, accepts_links: bool) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("Failed to listen on {}: {}", addr, err);
            process::exit(1);
        }
    };

    let kind = if accepts_links { "server links" } else { "clients" };
    log::info!("Listening on {} for {}...", addr, kind);

    loop {
        match listener.accept().await {
            Ok((conn, peer_addr)) => {
                tokio::spawn(handle(conn, peer_addr, shared.clone(), accepts_links));
            }
            Err(err) => log::warn!("Failed to accept connection: {}", err),
        }
    }
}

/// Opens the outbound connection to a configured link peer.
///
/// Called for CONNECT commands; the state sends our PASS/SERVER introduction as soon as the
/// connection is registered.
pub fn connect_link(shared: State, link: config::Link) {
    tokio::spawn(async move {
        let conn = match TcpStream::connect((link.host.as_str(), link.port)).await {
            Ok(conn) => conn,
            Err(err) => {
                log::warn!("Failed to connect to {} ({}:{}): {}",
                           link.name, link.host, link.port, err);
                return;
            }
        };
        let (msg_queue, outgoing_msgs) = mpsc::unbounded_channel();
        let id = shared.outbound_link(msg_queue, link).await;
        run_connection(conn, shared, id, outgoing_msgs).await;
    });
}

async fn handle(conn: TcpStream, peer_addr: SocketAddr, shared: State, accepts_links: bool) {
    let (msg_queue, outgoing_msgs) = mpsc::unbounded_channel();
    let id = shared.peer_joined(peer_addr.ip().to_string(), msg_queue, accepts_links).await;
    tokio::spawn(resolve_hostname(shared.clone(), id, peer_addr));
    run_connection(conn, shared, id, outgoing_msgs).await;
}

/// Drives a registered connection until either half of it fails.
async fn run_connection(conn: TcpStream, shared: State, id: ClientId,
                        mut outgoing_msgs: mpsc::UnboundedReceiver<MessageQueueItem>) {
    let (reader, mut writer) = conn.into_split();
    let mut reader = BufReader::new(reader);

    let incoming = async {
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = reader.read_line(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof,
                                          lines::CONNECTION_RESET));
            }
            if MAX_MESSAGE_LENGTH < n {
                return Err(io::Error::new(io::ErrorKind::InvalidData, lines::LINE_TOO_LONG));
            }
            let line = buf.trim_end_matches(|c| c == '\r' || c == '\n');
            log::trace!("{} >> {}", id, line);
            shared.handle_message(id, line).await;
        }
    };

    let outgoing = async {
        while let Some(msg) = outgoing_msgs.recv().await {
            log::trace!("{} << {}", id, msg.as_ref().trim_end());
            writer.write_all(msg.as_ref().as_bytes()).await?;
        }
        // The client is not in the shared state anymore.  Let the last replies flush, then
        // close the connection.
        time::sleep(time::Duration::from_millis(DRAIN_TIMEOUT)).await;
        Err(io::ErrorKind::TimedOut.into())
    };

    let res: io::Result<((), ())> = tokio::try_join!(incoming, outgoing);
    shared.peer_quit(id, res.err()).await;
}

/// Looks up the hostname of the peer and records it in the state.
///
/// The lookup races with registration; if the client registers first, its prefix keeps the
/// peer's IP address.
async fn resolve_hostname(shared: State, id: ClientId, peer_addr: SocketAddr) {
    let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => resolver,
        Err(err) => {
            log::debug!("Cannot read the system DNS configuration: {}", err);
            return;
        }
    };
    match resolver.reverse_lookup(peer_addr.ip()).await {
        Ok(names) => {
            if let Some(name) = names.iter().next() {
                let mut hostname = name.to_utf8();
                if hostname.ends_with('.') {
                    hostname.pop();
                }
                log::debug!("{}: Resolved to {}", id, hostname);
                shared.peer_resolved(id, hostname).await;
            }
        }
        Err(err) => log::debug!("{}: Reverse lookup failed: {}", id, err),
    }
}
