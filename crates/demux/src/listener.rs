//! Channel-backed listener bridging detected connections into axum

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::buf_conn::BufConn;
use crate::detector::ConnHandler;

/// Build the two halves of an HTTP listener shim: a [`ShimHandle`] to hang
/// on a detector, and a [`ListenerShim`] to hand to `axum::serve`.
pub fn listener_shim(addr: SocketAddr, capacity: usize) -> (Arc<ShimHandle>, ListenerShim) {
    let (tx, rx) = mpsc::channel(capacity);
    (Arc::new(ShimHandle { tx }), ListenerShim { rx, addr })
}

/// The detector side of the shim: forwards claimed connections into the
/// listener channel.
pub struct ShimHandle {
    tx: mpsc::Sender<BufConn>,
}

#[async_trait]
impl ConnHandler for ShimHandle {
    async fn serve_connection(&self, conn: BufConn) {
        if self.tx.send(conn).await.is_err() {
            debug!("http listener shim closed, dropping connection");
        }
    }
}

/// The server side of the shim: an `axum::serve::Listener` over the channel
/// of detected connections.
pub struct ListenerShim {
    rx: mpsc::Receiver<BufConn>,
    addr: SocketAddr,
}

impl axum::serve::Listener for ListenerShim {
    type Io = BufConn;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (BufConn, SocketAddr) {
        match self.rx.recv().await {
            Some(conn) => {
                let peer = conn.peer_addr();
                (conn, peer)
            }
            // channel closed: park forever, the serve task gets cancelled
            // from outside
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
