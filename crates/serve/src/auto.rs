//! Auto-protocol server: HTTP and RESP on one endpoint

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use scry_demux::{listener_shim, BufConn, ConnHandler, DemuxServer, Detector};
use scry_resp::is_resp_tag;
use scry_source::DataSources;

use crate::http::{router, Servable};
use crate::redis::serve_resp_connection;

/// Connections whose first byte is a RESP tag get the RESP session machine.
pub fn resp_detector(sources: Arc<DataSources>) -> Detector {
    Detector::new(
        1,
        |bytes| is_resp_tag(bytes[0]),
        Arc::new(RespConnHandler { sources }),
    )
}

struct RespConnHandler {
    sources: Arc<DataSources>,
}

#[async_trait]
impl ConnHandler for RespConnHandler {
    async fn serve_connection(&self, conn: BufConn) {
        serve_resp_connection(conn, Arc::clone(&self.sources)).await;
    }
}

/// Serve both protocols on one listener until cancelled: RESP connections by
/// first-byte detection, everything else through an axum server fed by the
/// listener shim.
pub async fn serve_auto(
    sources: Arc<DataSources>,
    listener: TcpListener,
    servable: Option<Arc<dyn Servable>>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    let (shim_handle, shim_listener) = listener_shim(addr, 64);
    let app = router(Arc::clone(&sources), "", servable);

    // stop means stop accepting; connections already being served run on
    // until their peers go away, so a graceful drain would never finish
    // while a watch stream is attached
    let http_cancel = cancel.child_token();
    let shutdown = http_cancel.clone();
    let http_task = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            served = axum::serve(shim_listener, app) => {
                if let Err(err) = served {
                    warn!(error = %err, "http server error");
                }
            }
        }
    });

    let server = DemuxServer::new(vec![
        resp_detector(sources),
        Detector::fallthrough(shim_handle),
    ]);
    let result = server.serve(listener, cancel).await;

    http_cancel.cancel();
    let _ = http_task.await;
    result
}
