//! Echo client: sends each stdin line and checks the echo.

use std::net::SocketAddr;

use attested_channel::SecureChannel;
use attested_channel::attestation::{InsecureAttestationHandler, VerifyingAttestationHandler};
use attested_channel::core::AttestationHandler;
use attested_channel::crypto::NoiseSession;
use attested_channel::transport::StreamTransport;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// Connect to `addr` and echo stdin lines until EOF.
///
/// With `expected_evidence` set, the server must present exactly that
/// evidence; otherwise any peer is accepted.
pub async fn run(
    addr: SocketAddr,
    expected_evidence: Option<Vec<u8>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let stream = TcpStream::connect(addr).await?;
    let attestation: Box<dyn AttestationHandler> = match expected_evidence {
        Some(expected) => Box::new(VerifyingAttestationHandler::new(
            Vec::new(),
            move |evidence: &[u8]| evidence == expected.as_slice(),
        )),
        None => Box::new(InsecureAttestationHandler::new()),
    };
    let channel = SecureChannel::spawn(
        StreamTransport::new(stream),
        NoiseSession::new(),
        attestation,
    );
    eprintln!("Connected to {addr}: enter messages to echo (Ctrl+D to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match channel.write(line.clone().into_bytes()).await {
            Ok(echoed) if echoed == line.as_bytes() => eprintln!("echo matched: {line:?}"),
            Ok(echoed) => eprintln!(
                "echo mismatch: expected {line:?}, got {:?}",
                String::from_utf8_lossy(&echoed)
            ),
            Err(code) => {
                eprintln!("write failed: {code} (channel {:?})", channel.state());
                return Err(code.into());
            }
        }
    }

    Ok(())
}
