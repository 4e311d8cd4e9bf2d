//! [`Transport`] over an async byte stream.
//!
//! Each message travels as a length-prefixed frame:
//!
//! ```text
//! +--------------------+---------------------------+
//! | Length             | Encoded message           |
//! | 4 bytes (BE32)     | Length bytes              |
//! +--------------------+---------------------------+
//! ```
//!
//! A background task owns the stream and performs one request/response
//! exchange at a time. After any stream-level failure the task stops and
//! every later send fails with [`TransportError::SocketClosed`].

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_RESPONSE_TIMEOUT, Error, LENGTH_PREFIX_SIZE, ResponseCallback,
    SessionRequest, SessionResponse, Transport, TransportError,
};

use super::frame::{FrameError, decode_response, encode_request};

/// Stream transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTransportConfig {
    /// How long to wait for one exchange to complete (`None` waits forever).
    pub response_timeout: Option<Duration>,

    /// Largest frame accepted or sent, in bytes.
    pub max_frame_size: usize,
}

impl Default for StreamTransportConfig {
    fn default() -> Self {
        Self {
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl StreamTransportConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_frame_size == 0 {
            return Err(Error::Config("max_frame_size must be non-zero".into()));
        }
        if self.response_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("response_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for creating a [`StreamTransport`].
#[derive(Debug, Clone, Default)]
pub struct StreamTransportBuilder {
    config: StreamTransportConfig,
}

impl StreamTransportBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-exchange response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = Some(timeout);
        self
    }

    /// Wait for replies indefinitely.
    pub fn no_response_timeout(mut self) -> Self {
        self.config.response_timeout = None;
        self
    }

    /// Set the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Get the configuration built so far.
    pub fn config(&self) -> &StreamTransportConfig {
        &self.config
    }

    /// Start a transport over `io`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build<IO>(self, io: IO) -> Result<StreamTransport, Error>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.config.validate()?;
        Ok(StreamTransport::spawn(io, self.config))
    }
}

struct Exchange {
    request: Vec<u8>,
    callback: ResponseCallback,
}

/// Sends session messages over a framed byte stream (TCP, Unix socket,
/// in-memory duplex).
#[derive(Debug)]
pub struct StreamTransport {
    exchanges: mpsc::UnboundedSender<Exchange>,
    max_frame_size: usize,
}

impl StreamTransport {
    /// Start a transport over `io` with the default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<IO>(io: IO) -> Self
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn(io, StreamTransportConfig::default())
    }

    /// Create a builder.
    pub fn builder() -> StreamTransportBuilder {
        StreamTransportBuilder::new()
    }

    fn spawn<IO>(io: IO, config: StreamTransportConfig) -> Self
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (exchanges, rx) = mpsc::unbounded_channel();
        let max_frame_size = config.max_frame_size;
        tokio::spawn(io_task(io, rx, config));
        Self {
            exchanges,
            max_frame_size,
        }
    }

    /// Whether the I/O task has stopped.
    pub fn is_closed(&self) -> bool {
        self.exchanges.is_closed()
    }
}

impl Transport for StreamTransport {
    fn send(&mut self, request: SessionRequest, callback: ResponseCallback) {
        let bytes = match encode_request(&request) {
            Ok(bytes) if bytes.len() <= self.max_frame_size => bytes,
            Ok(bytes) => {
                warn!(
                    len = bytes.len(),
                    max = self.max_frame_size,
                    "request exceeds max frame size"
                );
                callback(Err(TransportError::SerializationError));
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to encode request");
                callback(Err(TransportError::SerializationError));
                return;
            }
        };

        debug!(kind = request.kind(), len = bytes.len(), "sending request");
        let exchange = Exchange {
            request: bytes,
            callback,
        };
        if let Err(mpsc::error::SendError(exchange)) = self.exchanges.send(exchange) {
            (exchange.callback)(Err(TransportError::SocketClosed));
        }
    }
}

/// Write one length-prefixed frame and flush.
pub(crate) async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_size: usize,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_frame_size {
        return Err(FrameError::FieldTooLarge(payload.len()).into());
    }
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::FieldTooLarge(payload.len()))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` if the stream ends cleanly before a new frame starts.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Vec<u8>>, Error>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut len[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len) as usize;
    if len > max_frame_size {
        return Err(FrameError::FieldTooLarge(len).into());
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

fn map_io_error(err: &io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => TransportError::SocketClosed,
        _ => TransportError::Error,
    }
}

async fn exchange_once<IO>(
    io: &mut IO,
    request: &[u8],
    max_frame_size: usize,
) -> Result<SessionResponse, TransportError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(io, request, max_frame_size)
        .await
        .map_err(|e| match e {
            Error::Io(err) => map_io_error(&err),
            _ => TransportError::SerializationError,
        })?;

    let frame = match read_frame(io, max_frame_size).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return Err(TransportError::SocketClosed),
        Err(Error::Io(err)) => return Err(map_io_error(&err)),
        Err(_) => return Err(TransportError::DeserializationError),
    };

    decode_response(&frame).map_err(|e| {
        warn!(error = %e, "failed to decode response");
        TransportError::DeserializationError
    })
}

async fn io_task<IO>(
    mut io: IO,
    mut exchanges: mpsc::UnboundedReceiver<Exchange>,
    config: StreamTransportConfig,
) where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(Exchange { request, callback }) = exchanges.recv().await {
        let exchange = exchange_once(&mut io, &request, config.max_frame_size);
        let result = match config.response_timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .unwrap_or(Err(TransportError::Error)),
            None => exchange.await,
        };

        match result {
            Ok(response) => {
                debug!(kind = response.kind(), "received response");
                callback(Ok(response));
            }
            Err(err) => {
                warn!(error = %err, "stream transport failed, closing");
                callback(Err(err));
                break;
            }
        }
    }

    exchanges.close();
    while let Some(Exchange { callback, .. }) = exchanges.recv().await {
        callback(Err(TransportError::SocketClosed));
    }
}
