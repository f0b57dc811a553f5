#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::config::ConnectionOptions;
use super::error::WsError;
use super::traits::EventHandler;
use super::transport::{
    CloseFrame, Dialer, Frame, FrameSink, FrameStream, NO_STATUS_RECEIVED, TungsteniteDialer,
};
use crate::Result;
use crate::error::Error;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// The open transport. Each direction has its own lock so a send never waits on a
/// pending read, while two sends (or two reads) never overlap.
struct Session {
    sink: Mutex<Box<dyn FrameSink>>,
    stream: Mutex<Box<dyn FrameStream>>,
    /// Stops the read loop
    cancel: CancellationToken,
}

struct Active {
    session: Arc<Session>,
    reader: JoinHandle<()>,
}

/// A client-side WebSocket session driven through callbacks.
///
/// `connect`, `send_text`, `send_binary` and `close` report failures only through
/// the [`EventHandler`] and the log: a failed connect raises
/// [`EventHandler::on_connect_error`], send errors are logged and dropped. Use
/// [`Connection::send`] to get the error back instead.
///
/// Clones share the same session.
///
/// # Example
///
/// ```no_run
/// use ws_callback_client::{Callbacks, Connection};
///
/// # async fn run() {
/// let connection = Connection::new(
///     "wss://echo.websocket.org",
///     Callbacks::new().text(|message, _| println!("recv: {message}")),
/// );
///
/// connection.connect().await;
/// connection.send_text("hello").await;
/// connection.close().await;
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    url: String,
    options: watch::Sender<ConnectionOptions>,
    state_tx: watch::Sender<ConnectionState>,
    /// Present from a successful connect until `close` (or the next connect)
    active: RwLock<Option<Active>>,
    handler: Box<dyn EventHandler>,
    dialer: Box<dyn Dialer>,
}

impl Connection {
    /// Create a disconnected connection with default options, dialing through
    /// `tokio-tungstenite`.
    pub fn new<U: Into<String>, H: EventHandler>(url: U, handler: H) -> Self {
        Self::with_dialer(url, ConnectionOptions::default(), handler, TungsteniteDialer)
    }

    /// Create a disconnected connection using the given options.
    pub fn with_options<U: Into<String>, H: EventHandler>(
        url: U,
        options: ConnectionOptions,
        handler: H,
    ) -> Self {
        Self::with_dialer(url, options, handler, TungsteniteDialer)
    }

    /// Create a disconnected connection over a custom transport.
    pub fn with_dialer<U, H, D>(url: U, options: ConnectionOptions, handler: H, dialer: D) -> Self
    where
        U: Into<String>,
        H: EventHandler,
        D: Dialer,
    {
        let (options, _) = watch::channel(options);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ConnectionInner {
                url: url.into(),
                options,
                state_tx,
                active: RwLock::new(None),
                handler: Box::new(handler),
                dialer: Box::new(dialer),
            }),
        }
    }

    /// Replace the options used by the next [`connect`](Self::connect).
    pub fn configure(&self, options: ConnectionOptions) {
        self.inner.options.send_replace(options);
    }

    /// The options the next [`connect`](Self::connect) will use.
    #[must_use]
    pub fn options(&self) -> ConnectionOptions {
        self.inner.options.borrow().clone()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Make one connection attempt.
    ///
    /// On failure the state stays disconnected and
    /// [`EventHandler::on_connect_error`] is raised. On success
    /// [`EventHandler::on_connected`] is raised and a read task starts dispatching
    /// inbound frames. There is no retry.
    ///
    /// Calling this while connected logs a warning and does nothing. A transport
    /// left over from a peer close or a read failure is shut down first.
    pub async fn connect(&self) {
        let mut active = self.inner.active.write().await;

        if self.is_connected() {
            warn!(url = %self.inner.url, "connect called while connected, ignoring");
            return;
        }
        if let Some(stale) = active.take() {
            debug!(url = %self.inner.url, "discarding transport from previous session");
            shutdown(stale).await;
        }

        self.inner.state_tx.send_replace(ConnectionState::Connecting);
        let options = self.options();

        let transport = match self.inner.dialer.dial(&self.inner.url, &options).await {
            Ok(transport) => transport,
            Err(e) => {
                self.inner
                    .state_tx
                    .send_replace(ConnectionState::Disconnected);
                drop(active);
                error!(url = %self.inner.url, error = %e, "connect");
                self.inner.handler.on_connect_error(&e, self);
                return;
            }
        };

        let session = Arc::new(Session {
            sink: Mutex::new(transport.sink),
            stream: Mutex::new(transport.stream),
            cancel: CancellationToken::new(),
        });

        self.inner.state_tx.send_replace(ConnectionState::Connected {
            since: Instant::now(),
        });
        debug!(url = %self.inner.url, "connected");
        self.inner.handler.on_connected(self);

        let reader = tokio::spawn(read_loop(self.clone(), Arc::clone(&session)));
        *active = Some(Active { session, reader });
    }

    /// Send a text frame. Errors are logged, not returned.
    pub async fn send_text<S: Into<String>>(&self, message: S) {
        if let Err(e) = self.send(Frame::Text(message.into())).await {
            error!(url = %self.inner.url, error = %e, "write");
        }
    }

    /// Send a binary frame. Errors are logged, not returned.
    pub async fn send_binary<B: Into<Bytes>>(&self, data: B) {
        if let Err(e) = self.send(Frame::Binary(data.into())).await {
            error!(url = %self.inner.url, error = %e, "write");
        }
    }

    /// Write one frame, waiting for any in-flight send to finish first.
    ///
    /// Fails with [`WsError::NotConnected`] when no transport is open.
    ///
    /// A [`Frame::Close`] sent here only starts the closing handshake: the state
    /// stays connected until the peer's close frame arrives, which then raises
    /// [`EventHandler::on_disconnected`]. Use [`close`](Self::close) to tear the
    /// session down right away.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let session = self
            .inner
            .active
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.session))
            .ok_or(WsError::NotConnected)?;

        write_frame(&session, frame).await
    }

    /// Close the connection.
    ///
    /// Stops the read task, sends a normal-closure close frame, closes the
    /// transport, then raises [`EventHandler::on_disconnected`] with the error from
    /// sending the close frame, if any. The callback is skipped when the session
    /// already reported its disconnect (for example after the peer closed first).
    ///
    /// Closing a connection with no open transport logs a warning and does nothing.
    pub async fn close(&self) {
        let Some(active) = self.inner.active.write().await.take() else {
            warn!(url = %self.inner.url, "close called without an open transport");
            return;
        };

        active.session.cancel.cancel();

        // One lock scope, so no queued send lands between the close frame and the close.
        let sent = {
            let mut sink = active.session.sink.lock().await;
            let sent = sink.send(Frame::Close(Some(CloseFrame::normal()))).await;
            if let Err(e) = sink.close().await {
                debug!(error = %e, "closing transport");
            }
            sent
        };
        if let Err(e) = &sent {
            error!(url = %self.inner.url, error = %e, "write close");
        }

        join(active.reader).await;

        if self.mark_disconnected() {
            debug!(url = %self.inner.url, "closed");
            self.inner.handler.on_disconnected(sent.err().as_ref(), self);
        }
    }

    /// Whether the connection is between a successful connect and a disconnect.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Move to `Disconnected`. Returns whether this call made the transition.
    fn mark_disconnected(&self) -> bool {
        self.inner.state_tx.send_if_modified(|state| {
            if state.is_connected() {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        })
    }

    fn disconnected(&self, reason: &Error) {
        if self.mark_disconnected() {
            self.inner.handler.on_disconnected(Some(reason), self);
        }
    }

    fn dispatch(&self, frame: Frame) {
        let handler = &self.inner.handler;

        match frame {
            Frame::Text(text) => {
                trace!(len = text.len(), "recv text");
                handler.on_text(&text, self);
            }
            Frame::Binary(data) => {
                trace!(len = data.len(), "recv binary");
                handler.on_binary(&data, self);
            }
            Frame::Ping(payload) => handler.on_ping(&payload, self),
            Frame::Pong(payload) => handler.on_pong(&payload, self),
            Frame::Close(frame) => {
                let (code, reason) = frame
                    .map_or((NO_STATUS_RECEIVED, String::new()), |f| (f.code, f.reason));
                debug!(url = %self.inner.url, code, %reason, "close frame received");
                self.disconnected(&WsError::ClosedByPeer { code, reason }.into());
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn write_frame(session: &Session, frame: Frame) -> Result<()> {
    let mut sink = session.sink.lock().await;
    sink.send(frame).await
}

/// Stop the read task, close the transport and wait for the task to finish.
async fn shutdown(active: Active) {
    active.session.cancel.cancel();
    close_sink(&active.session).await;
    join(active.reader).await;
}

async fn close_sink(session: &Session) {
    if let Err(e) = session.sink.lock().await.close().await {
        debug!(error = %e, "closing transport");
    }
}

async fn join(reader: JoinHandle<()>) {
    if let Err(e) = reader.await {
        warn!(error = %e, "read loop terminated abnormally");
    }
}

/// Pull frames until the transport fails, ends, or the session is cancelled.
///
/// A read failure, an end of stream without a close frame, or a panicking handler
/// closes the transport and reports the disconnect, unless it was already reported.
async fn read_loop(connection: Connection, session: Arc<Session>) {
    let reason: Error = loop {
        let next = {
            let mut stream = session.stream.lock().await;
            tokio::select! {
                biased;

                () = session.cancel.cancelled() => {
                    trace!("read loop cancelled");
                    return;
                }
                next = stream.next_frame() => next,
            }
        };

        match next {
            Some(Ok(frame)) => {
                if panic::catch_unwind(AssertUnwindSafe(|| connection.dispatch(frame))).is_err() {
                    error!(url = %connection.inner.url, "event handler panicked, dropping session");
                    break WsError::HandlerPanicked.into();
                }
            }
            Some(Err(e)) => {
                error!(url = %connection.inner.url, error = %e, "read");
                break e;
            }
            None => {
                debug!(url = %connection.inner.url, "transport ended");
                break WsError::ConnectionClosed.into();
            }
        }
    };

    close_sink(&session).await;
    connection.disconnected(&reason);
}
