//! Callback-driven WebSocket connection.
//!
//! # Architecture
//!
//! - [`Connection`]: owns one session, serializes writes and reads independently,
//!   and dispatches inbound frames to an [`EventHandler`]
//! - [`EventHandler`] / [`Callbacks`]: the listener interface, as a trait or as closures
//! - [`Dialer`]: the transport seam, with [`TungsteniteDialer`] as the default
//! - [`ConnectionOptions`]: compression, TLS verification, proxy, subprotocols and headers

pub mod config;
pub mod connection;
pub mod error;
pub mod proxy;
pub(crate) mod tls;
pub mod traits;
pub mod transport;

pub use config::ConnectionOptions;
pub use connection::{Connection, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use proxy::{ProxyFromEnv, ProxyResolver};
pub use traits::*;
pub use transport::{
    CloseFrame, Dialer, Frame, FrameSink, FrameStream, NORMAL_CLOSURE, NO_STATUS_RECEIVED,
    Transport, TungsteniteDialer,
};
