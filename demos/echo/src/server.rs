//! Echo server: answers every attested client with its own request.

use std::net::SocketAddr;

use attested_channel::core::{DEFAULT_MAX_FRAME_SIZE, Request, Response};
use attested_channel::server::{ServerSession, serve};
use tokio::net::TcpListener;
use tracing::{info, warn};

fn echo(request: Request) -> Response {
    request
}

/// Accept connections on `addr` until the process is stopped.
pub async fn run(
    addr: SocketAddr,
    evidence: Vec<u8>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "echo server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let session = ServerSession::with_evidence(evidence.clone(), echo);

        tokio::spawn(async move {
            match serve(stream, session, DEFAULT_MAX_FRAME_SIZE).await {
                Ok(session) => info!(%peer, served = session.requests_served(), "client done"),
                Err(e) => warn!(%peer, error = %e, "session ended with error"),
            }
        });
    }
}
