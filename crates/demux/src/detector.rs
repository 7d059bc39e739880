//! Detectors: a byte requirement, a predicate and a handler

use std::sync::Arc;

use async_trait::async_trait;

use crate::buf_conn::BufConn;

/// A protocol handler that takes over a detected connection.
#[async_trait]
pub trait ConnHandler: Send + Sync {
    /// Serve the connection to completion. The `BufConn` replays any bytes
    /// consumed during detection.
    async fn serve_connection(&self, conn: BufConn);
}

/// A connection classifier. The first detector whose `test` returns true for
/// the connection's leading bytes wins the connection.
#[derive(Clone)]
pub struct Detector {
    /// How many leading bytes `test` needs to decide
    pub needed: usize,
    /// Predicate over at least `needed` leading bytes
    pub test: fn(&[u8]) -> bool,
    /// Handler given the connection on a match
    pub handler: Arc<dyn ConnHandler>,
}

impl Detector {
    /// A detector deciding on `needed` leading bytes.
    pub fn new(needed: usize, test: fn(&[u8]) -> bool, handler: Arc<dyn ConnHandler>) -> Self {
        Self {
            needed,
            test,
            handler,
        }
    }

    /// A detector that always claims the connection. No bytes are needed for
    /// tautology; place it last.
    pub fn fallthrough(handler: Arc<dyn ConnHandler>) -> Self {
        Self {
            needed: 0,
            test: |_| true,
            handler,
        }
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("needed", &self.needed)
            .finish()
    }
}
