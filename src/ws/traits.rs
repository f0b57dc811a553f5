//! Listener interface for connection events.

use super::connection::Connection;
use crate::error::Error;

/// Receives the events raised by a [`Connection`].
///
/// Every method defaults to a no-op, so implementors only override what they need.
/// Inbound events run on the connection's read task and block further reads until
/// they return; `on_connected` and `on_connect_error` run on the task that called
/// [`Connection::connect`]. Use `tokio::spawn` to do async work (such as replying)
/// from inside a callback.
///
/// # Example
///
/// ```
/// use ws_callback_client::{Connection, EventHandler};
///
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_text(&self, message: &str, _connection: &Connection) {
///         println!("recv: {message}");
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync + 'static {
    /// The handshake succeeded and the read loop is about to start.
    fn on_connected(&self, _connection: &Connection) {}

    /// A text frame arrived.
    fn on_text(&self, _message: &str, _connection: &Connection) {}

    /// A binary frame arrived.
    fn on_binary(&self, _data: &[u8], _connection: &Connection) {}

    /// The single connect attempt failed.
    fn on_connect_error(&self, _error: &Error, _connection: &Connection) {}

    /// The connection left the connected state. Raised at most once per session.
    ///
    /// `reason` is the peer's close reason, the read error, or the error from sending
    /// the close frame on a local [`Connection::close`] (`None` when that succeeded).
    fn on_disconnected(&self, _reason: Option<&Error>, _connection: &Connection) {}

    /// A ping arrived. The transport has already queued the pong.
    fn on_ping(&self, _payload: &[u8], _connection: &Connection) {}

    /// A pong arrived.
    fn on_pong(&self, _payload: &[u8], _connection: &Connection) {}
}

type ConnectionFn = Box<dyn Fn(&Connection) + Send + Sync>;
type TextFn = Box<dyn Fn(&str, &Connection) + Send + Sync>;
type BytesFn = Box<dyn Fn(&[u8], &Connection) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error, &Connection) + Send + Sync>;
type DisconnectFn = Box<dyn Fn(Option<&Error>, &Connection) + Send + Sync>;

/// An [`EventHandler`] assembled from closures.
///
/// ```
/// use ws_callback_client::{Callbacks, Connection};
///
/// let callbacks = Callbacks::new()
///     .text(|message, _| println!("recv: {message}"))
///     .disconnected(|reason, _| println!("disconnected: {reason:?}"));
/// let connection = Connection::new("ws://127.0.0.1:9001", callbacks);
/// assert!(!connection.is_connected());
/// ```
#[derive(Default)]
#[must_use]
pub struct Callbacks {
    connected: Option<ConnectionFn>,
    text: Option<TextFn>,
    binary: Option<BytesFn>,
    connect_error: Option<ErrorFn>,
    disconnected: Option<DisconnectFn>,
    ping: Option<BytesFn>,
    pong: Option<BytesFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.connected = Some(Box::new(callback));
        self
    }

    pub fn text<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Connection) + Send + Sync + 'static,
    {
        self.text = Some(Box::new(callback));
        self
    }

    pub fn binary<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8], &Connection) + Send + Sync + 'static,
    {
        self.binary = Some(Box::new(callback));
        self
    }

    pub fn connect_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Error, &Connection) + Send + Sync + 'static,
    {
        self.connect_error = Some(Box::new(callback));
        self
    }

    pub fn disconnected<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&Error>, &Connection) + Send + Sync + 'static,
    {
        self.disconnected = Some(Box::new(callback));
        self
    }

    pub fn ping<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8], &Connection) + Send + Sync + 'static,
    {
        self.ping = Some(Box::new(callback));
        self
    }

    pub fn pong<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8], &Connection) + Send + Sync + 'static,
    {
        self.pong = Some(Box::new(callback));
        self
    }
}

impl EventHandler for Callbacks {
    fn on_connected(&self, connection: &Connection) {
        if let Some(callback) = &self.connected {
            callback(connection);
        }
    }

    fn on_text(&self, message: &str, connection: &Connection) {
        if let Some(callback) = &self.text {
            callback(message, connection);
        }
    }

    fn on_binary(&self, data: &[u8], connection: &Connection) {
        if let Some(callback) = &self.binary {
            callback(data, connection);
        }
    }

    fn on_connect_error(&self, error: &Error, connection: &Connection) {
        if let Some(callback) = &self.connect_error {
            callback(error, connection);
        }
    }

    fn on_disconnected(&self, reason: Option<&Error>, connection: &Connection) {
        if let Some(callback) = &self.disconnected {
            callback(reason, connection);
        }
    }

    fn on_ping(&self, payload: &[u8], connection: &Connection) {
        if let Some(callback) = &self.ping {
            callback(payload, connection);
        }
    }

    fn on_pong(&self, payload: &[u8], connection: &Connection) {
        if let Some(callback) = &self.pong {
            callback(payload, connection);
        }
    }
}

/// The no-op handler, for connections that are only written to.
impl EventHandler for () {}
