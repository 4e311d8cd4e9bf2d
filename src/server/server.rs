//! Serving a [`ServerSession`] over a byte stream.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::session::{RequestHandler, ServerSession};
use crate::core::{Error, SessionResponse};
use crate::transport::{decode_request, encode_response, read_frame, write_frame};

/// Run `session` over `io` until the peer disconnects.
///
/// Frames use the same length-prefixed encoding as
/// [`StreamTransport`](crate::transport::StreamTransport). On a protocol
/// error (an oversized or undecodable frame, or a message the session
/// rejects) the client receives an empty reply, the stream is closed and the
/// error is returned. I/O errors are returned without a reply. On a clean
/// disconnect the session is handed back.
pub async fn serve<IO, H>(
    mut io: IO,
    mut session: ServerSession<H>,
    max_frame_size: usize,
) -> Result<ServerSession<H>, Error>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    H: RequestHandler,
{
    if max_frame_size == 0 {
        return Err(Error::Config("max_frame_size must be non-zero".into()));
    }

    loop {
        let frame = match read_frame(&mut io, max_frame_size).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e @ Error::Frame(_)) => return Err(reject(&mut io, max_frame_size, e).await),
            Err(e) => return Err(e),
        };

        let request = match decode_request(&frame) {
            Ok(request) => request,
            Err(e) => return Err(reject(&mut io, max_frame_size, e.into()).await),
        };
        debug!(kind = request.kind(), "received request");

        match session.handle_request(request) {
            Ok(response) => {
                let bytes = encode_response(&response)?;
                write_frame(&mut io, &bytes, max_frame_size).await?;
            }
            Err(e) => return Err(reject(&mut io, max_frame_size, e).await),
        }
    }

    debug!(served = session.requests_served(), "client disconnected");
    Ok(session)
}

/// Send an empty reply for a protocol error and hand the error back.
async fn reject<W>(io: &mut W, max_frame_size: usize, err: Error) -> Error
where
    W: AsyncWrite + Unpin,
{
    warn!(error = %err, "protocol error, closing session");
    let notified = match encode_response(&SessionResponse::Empty) {
        Ok(bytes) => write_frame(io, &bytes, max_frame_size).await,
        Err(e) => Err(e.into()),
    };
    if let Err(write_err) = notified {
        warn!(error = %write_err, "failed to notify client of protocol error");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{InsecureAttestationHandler, VerifyingAttestationHandler};
    use crate::channel::{ChannelState, SecureChannel};
    use crate::core::{DEFAULT_MAX_FRAME_SIZE, ErrorCode, Request, Response};
    use crate::crypto::NoiseSession;
    use crate::server::SessionState;
    use crate::transport::StreamTransport;

    fn reverse(request: Request) -> Response {
        request.into_iter().rev().collect()
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(
            server_io,
            ServerSession::new(reverse),
            DEFAULT_MAX_FRAME_SIZE,
        ));

        let channel = SecureChannel::spawn(
            StreamTransport::new(client_io),
            NoiseSession::new(),
            InsecureAttestationHandler::new(),
        );

        // Both queued before the handshake completes.
        let first = channel.write(b"abc".to_vec());
        let second = channel.write(Vec::new());
        assert_eq!(first.await, Ok(b"cba".to_vec()));
        assert_eq!(second.await, Ok(Vec::new()));

        let large: Vec<u8> = (0..=255).cycle().take(64 * 1024).collect();
        let expected: Vec<u8> = large.iter().rev().copied().collect();
        assert_eq!(channel.write(large).await, Ok(expected));
        assert_eq!(channel.state(), ChannelState::Established);

        drop(channel);
        let session = server.await.unwrap().unwrap();
        assert_eq!(session.requests_served(), 3);
        assert_eq!(session.state(), SessionState::Established);
    }

    #[tokio::test]
    async fn test_attestation_evidence_checked() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(
            server_io,
            ServerSession::with_evidence(b"measurement-a".to_vec(), reverse),
            DEFAULT_MAX_FRAME_SIZE,
        ));

        let attestation = VerifyingAttestationHandler::new(Vec::new(), |evidence: &[u8]| {
            evidence == b"measurement-b"
        });
        let channel = SecureChannel::spawn(
            StreamTransport::new(client_io),
            NoiseSession::new(),
            attestation,
        );

        assert_eq!(
            channel.write(b"secret".to_vec()).await,
            Err(ErrorCode::AttestationFailed)
        );
        assert_eq!(
            channel.write(b"again".to_vec()).await,
            Err(ErrorCode::GenericError)
        );
        assert_eq!(channel.state(), ChannelState::PermanentFailure);

        drop(channel);
        let session = server.await.unwrap().unwrap();
        assert_eq!(session.requests_served(), 0);
    }

    #[tokio::test]
    async fn test_server_disconnect_fails_channel() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        drop(server_io);

        let channel = SecureChannel::spawn(
            StreamTransport::new(client_io),
            NoiseSession::new(),
            InsecureAttestationHandler::new(),
        );

        assert_eq!(
            channel.write(b"hello".to_vec()).await,
            Err(ErrorCode::AttestationFailed)
        );
    }

    #[tokio::test]
    async fn test_protocol_error_gets_empty_reply() {
        use crate::core::{EncryptedMessage, SessionRequest};
        use crate::transport::decode_response;

        let (mut client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(
            server_io,
            ServerSession::new(reverse),
            DEFAULT_MAX_FRAME_SIZE,
        ));

        let request = crate::transport::encode_request(&SessionRequest::Encrypted(
            EncryptedMessage::default(),
        ))
        .unwrap();
        write_frame(&mut client_io, &request, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        let reply = read_frame(&mut client_io, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(decode_response(&reply).unwrap(), SessionResponse::Empty);
        assert!(matches!(
            server.await.unwrap(),
            Err(Error::UnexpectedMessage { .. })
        ));
    }

    #[tokio::test]
    async fn test_undecodable_frame_gets_empty_reply() {
        use crate::transport::{FrameError, decode_response};

        let (mut client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(
            server_io,
            ServerSession::new(reverse),
            DEFAULT_MAX_FRAME_SIZE,
        ));

        write_frame(&mut client_io, &[0x7F, 0x00], DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        let reply = read_frame(&mut client_io, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(decode_response(&reply).unwrap(), SessionResponse::Empty);
        assert!(matches!(
            server.await.unwrap(),
            Err(Error::Frame(FrameError::InvalidTag(0x7F)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_gets_empty_reply() {
        use tokio::io::AsyncWriteExt;

        use crate::transport::{FrameError, decode_response};

        let (mut client_io, server_io) = tokio::io::duplex(4096);
        let server = tokio::spawn(serve(server_io, ServerSession::new(reverse), 16));

        client_io.write_all(&1024u32.to_be_bytes()).await.unwrap();
        let reply = read_frame(&mut client_io, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(decode_response(&reply).unwrap(), SessionResponse::Empty);
        assert!(matches!(
            server.await.unwrap(),
            Err(Error::Frame(FrameError::FieldTooLarge(1024)))
        ));
    }

    #[tokio::test]
    async fn test_zero_frame_size_rejected() {
        let (_client_io, server_io) = tokio::io::duplex(64);
        let result = serve(server_io, ServerSession::new(reverse), 0).await;

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
