//! Application-facing handle to a secure channel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot, watch};

use super::driver::{ChannelDriver, ChannelState, Event, PendingRequest};
use crate::core::{AttestationHandler, ErrorCode, Request, Response, SecureSession, Transport};

/// Handle for writing requests to an attested, encrypted channel.
///
/// The first write triggers attestation and the Noise handshake; requests
/// written meanwhile are queued and sent one at a time, in order, once the
/// channel is established. Any failure is permanent: construct a new channel
/// to retry.
///
/// Handles are cheap to clone. The [`ChannelDriver`] created alongside does
/// the actual work.
#[derive(Debug, Clone)]
pub struct SecureChannel {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ChannelState>,
}

impl SecureChannel {
    /// Create a channel and the driver that runs it.
    ///
    /// Nothing is sent until the first write.
    pub fn new<T, S, A>(transport: T, session: S, attestation: A) -> (Self, ChannelDriver<T, S, A>)
    where
        T: Transport,
        S: SecureSession,
        A: AttestationHandler,
    {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelState::Uninitialized);

        let driver = ChannelDriver::new(
            transport,
            session,
            attestation,
            events,
            events_tx.clone(),
            state_tx,
        );
        let channel = Self {
            events: events_tx,
            state,
        };
        (channel, driver)
    }

    /// Create a channel whose driver runs as a tokio task.
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// handle is dropped and no reply is outstanding.
    pub fn spawn<T, S, A>(transport: T, session: S, attestation: A) -> Self
    where
        T: Transport,
        S: SecureSession,
        A: AttestationHandler,
    {
        let (channel, driver) = Self::new(transport, session, attestation);
        tokio::spawn(driver.run());
        channel
    }

    /// Write a request; the returned future resolves with the response.
    ///
    /// The request is queued immediately, so calls resolve in call order
    /// whether or not the futures are polled.
    pub fn write(&self, request: Request) -> WriteFuture {
        let (tx, rx) = oneshot::channel();
        self.write_with_callback(request, move |result| {
            let _ = tx.send(result);
        });
        WriteFuture { rx }
    }

    /// Write a request and invoke `callback` with the outcome.
    ///
    /// If the driver is gone, `callback` runs immediately with
    /// [`ErrorCode::Cancelled`].
    pub fn write_with_callback<F>(&self, request: Request, callback: F)
    where
        F: FnOnce(Result<Response, ErrorCode>) + Send + 'static,
    {
        let pending = PendingRequest::new(request, Box::new(callback));
        if let Err(mpsc::error::SendError(Event::Write(pending))) =
            self.events.send(Event::Write(pending))
        {
            pending.complete(Err(ErrorCode::Cancelled));
        }
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Whether the driver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Future returned by [`SecureChannel::write`].
///
/// Resolves with [`ErrorCode::Cancelled`] if the driver is dropped first.
#[derive(Debug)]
pub struct WriteFuture {
    rx: oneshot::Receiver<Result<Response, ErrorCode>>,
}

impl Future for WriteFuture {
    type Output = Result<Response, ErrorCode>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ErrorCode::Cancelled)))
    }
}
