use std::io::{self, Write};
use std::net::SocketAddr;

use anyhow::Context;
use mio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Sent to clients arriving while the connection table is full.
pub const BUSY_MESSAGE: &[u8] = b"Internal server busy";

pub fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr).with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts until the backlog is empty, handing every new socket to
/// `on_accept`. Accept errors drop only the connection being accepted.
pub fn accept_pending<F>(listener: &TcpListener, mut on_accept: F)
where
    F: FnMut(TcpStream, SocketAddr),
{
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                on_accept(stream, peer);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "accept failed");
                return;
            }
        }
    }
}

/// Best-effort refusal: one write, then the socket is dropped.
pub fn reject_busy(mut stream: TcpStream, peer: SocketAddr) {
    warn!(%peer, "connection table full, refusing client");
    if let Err(e) = stream.write(BUSY_MESSAGE) {
        debug!(%peer, error = %e, "failed to send busy notice");
    }
}
