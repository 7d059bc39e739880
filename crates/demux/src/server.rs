//! Accept loop and protocol detection

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::buf_conn::BufConn;
use crate::detector::Detector;

/// Minimum detection read-buffer size
const MIN_PEEK_SIZE: usize = 512;

/// Rounds of waiting for more bytes before giving up on a connection
const MAX_DETECT_ROUNDS: usize = 10;

/// Initial accept-error backoff
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);

/// Accept-error backoff ceiling
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Serves one or more [`Detector`]s on a listening socket. The first
/// detector whose predicate matches a connection's leading bytes wins.
pub struct DemuxServer {
    detectors: Vec<Detector>,
}

impl DemuxServer {
    /// A server trying `detectors` in declared order.
    pub fn new(detectors: Vec<Detector>) -> Self {
        Self { detectors }
    }

    /// Bind `host:port` (empty host = all interfaces) and serve until
    /// cancelled.
    pub async fn listen_and_serve(
        &self,
        host_port: &str,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        let listener = TcpListener::bind(host_port).await?;
        self.serve(listener, cancel).await
    }

    /// Serve an existing listener until cancelled or a non-temporary accept
    /// error occurs. Temporary accept errors back off exponentially from
    /// 5 ms up to 1 s.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
        let mut backoff = None::<Duration>;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        backoff = None;
                        let detectors = self.detectors.clone();
                        tokio::spawn(detect_connection(detectors, stream, peer));
                    }
                    Err(err) if is_temporary(&err) => {
                        let delay = match backoff {
                            None => ACCEPT_BACKOFF_MIN,
                            Some(last) => (last * 2).min(ACCEPT_BACKOFF_MAX),
                        };
                        backoff = Some(delay);
                        warn!(error = %err, delay = ?delay, "accept error, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => return Err(err),
                },
            }
        }
    }
}

/// Classify one connection and hand it to the winning handler.
async fn detect_connection(detectors: Vec<Detector>, mut stream: TcpStream, peer: SocketAddr) {
    let size = detectors
        .iter()
        .map(|det| det.needed)
        .max()
        .unwrap_or(0)
        .max(MIN_PEEK_SIZE);
    let mut buf = BytesMut::with_capacity(size);

    'rounds: for _ in 0..MAX_DETECT_ROUNDS {
        for det in &detectors {
            if buf.len() < det.needed {
                // not enough bytes for this detector yet, wait for more
                match stream.read_buf(&mut buf).await {
                    Ok(0) => {
                        debug!(peer = %peer, "connection closed during protocol detection");
                        return;
                    }
                    Ok(_) => continue 'rounds,
                    Err(err) => {
                        debug!(peer = %peer, error = %err, "read error during protocol detection");
                        return;
                    }
                }
            }
            if (det.test)(&buf) {
                let conn = BufConn::new(stream, buf.freeze(), peer);
                det.handler.serve_connection(conn).await;
                return;
            }
        }
        // every detector had its bytes and none claimed the connection
        break 'rounds;
    }

    debug!(peer = %peer, "no detector wanted the connection");
}

fn is_temporary(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
