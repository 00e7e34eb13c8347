use std::fmt::{self, Display};

use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

/// Close a stream opened by a peer that wants us to route for it.
///
/// This node only delegates its own requests to relays; it never acts as a
/// relay for others. Nothing is read from or written to the stream.
pub async fn reject_stream<S>(remote: impl Display, mut stream: S)
where
    S: AsyncWrite + Unpin,
{
    error!(%remote, "supernode client received (dropped) a routing message");
    if let Err(err) = stream.shutdown().await {
        debug!(%remote, "closing rejected stream failed: {err}");
    }
}

/// The router entry point for inbound [`crate::net::SNR_ALPN`] connections.
///
/// Every stream the remote opens is closed unread via [`reject_stream`]. The
/// handler returns once the remote closes the connection.
#[derive(Clone, Default)]
pub struct RejectingHandler;

impl fmt::Debug for RejectingHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectingHandler").finish()
    }
}

impl ProtocolHandler for RejectingHandler {
    fn accept(
        &self,
        connection: Connection,
    ) -> impl std::future::Future<Output = Result<(), AcceptError>> + Send {
        async move {
            let remote = connection.remote_id();
            while let Ok((send, recv)) = connection.accept_bi().await {
                // Dropping the receive half stops it without reading.
                drop(recv);
                reject_stream(remote, send).await;
            }
            Ok(())
        }
    }
}
