#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::sync::Arc;

use bon::Builder;
use tokio_tungstenite::tungstenite::http::HeaderMap;

use super::proxy::ProxyResolver;

/// Options applied to the transport on the next [`connect`](super::Connection::connect).
///
/// Changing options never affects a transport that is already open.
///
/// ```
/// use ws_callback_client::ConnectionOptions;
///
/// let options = ConnectionOptions::builder()
///     .subprotocols(vec!["chat".to_owned()])
///     .use_compression(true)
///     .build();
/// assert!(!options.accept_invalid_certs);
/// ```
#[non_exhaustive]
#[derive(Clone, Default, Builder)]
pub struct ConnectionOptions {
    /// Ask the transport to negotiate per-message compression
    #[builder(default)]
    pub use_compression: bool,
    /// Skip TLS peer verification for `wss://` addresses
    #[builder(default)]
    pub accept_invalid_certs: bool,
    /// Picks the proxy to tunnel through for a given target, if any
    pub proxy: Option<Arc<dyn ProxyResolver>>,
    /// Subprotocols offered during the handshake, in preference order
    #[builder(default, into)]
    pub subprotocols: Vec<String>,
    /// Extra headers sent with the handshake request
    #[builder(default)]
    pub headers: HeaderMap,
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("use_compression", &self.use_compression)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("proxy", &self.proxy.is_some())
            .field("subprotocols", &self.subprotocols)
            .field("headers", &self.headers)
            .finish()
    }
}
