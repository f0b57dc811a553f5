#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The peer sent a close frame
    ClosedByPeer {
        /// Close code carried by the frame (`1005` when the frame had no payload)
        code: u16,
        /// Close reason text
        reason: String,
    },
    /// The transport stream ended without a close frame
    ConnectionClosed,
    /// No transport is open for this connection
    NotConnected,
    /// An [`EventHandler`](super::EventHandler) callback panicked while handling a frame
    HandlerPanicked,
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ClosedByPeer { reason, .. } => f.write_str(reason),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::NotConnected => write!(f, "WebSocket is not connected"),
            Self::HandlerPanicked => write!(f, "event handler panicked"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}
