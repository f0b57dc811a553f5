//! The transport seam: what the connection needs from a duplex frame channel,
//! and the default implementation on top of `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, client_async_tls_with_config, connect_async_tls_with_config,
};
use tracing::{debug, warn};
use url::Url;

use super::config::ConnectionOptions;
use super::{proxy, tls};
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a close frame carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// One unit of data exchanged over the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseFrame>),
}

/// Status code and reason carried by a close frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure with an empty reason.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(NORMAL_CLOSURE, "")
    }
}

/// Write half of an open transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Close the underlying transport. Further sends fail.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open transport.
///
/// Implementations run the protocol's default control-frame handling themselves
/// (answering pings, acknowledging close frames) and then yield the control frame
/// so the connection can notify its handler.
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Wait for the next frame. `None` once the transport has ended.
    ///
    /// Must be cancel safe: the connection races this against its shutdown signal.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// An open transport, split into independently usable halves.
#[non_exhaustive]
pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl Transport {
    #[must_use]
    pub fn new<S: FrameSink, R: FrameStream>(sink: S, stream: R) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}

/// Performs the handshake against an address and hands back an open [`Transport`].
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, url: &str, options: &ConnectionOptions) -> Result<Transport>;
}

/// [`Dialer`] backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteDialer;

#[async_trait]
impl Dialer for TungsteniteDialer {
    async fn dial(&self, url: &str, options: &ConnectionOptions) -> Result<Transport> {
        let target = Url::parse(url)?;
        let request = handshake_request(&target, options)?;

        if options.use_compression {
            warn!(%target, "permessage-deflate is not supported by this transport, connecting uncompressed");
        }

        let connector = tls::connector(options.accept_invalid_certs)?;
        let proxy = match &options.proxy {
            Some(resolver) => resolver.resolve(&target)?,
            None => None,
        };

        let (ws_stream, response) = match proxy {
            Some(proxy_url) => {
                debug!(%target, proxy = %proxy_url, "tunnelling through proxy");
                let tunnel = proxy::tunnel(&proxy_url, &target).await?;
                client_async_tls_with_config(request, tunnel, None, connector).await?
            }
            None => connect_async_tls_with_config(request, None, false, connector).await?,
        };

        debug!(
            %target,
            status = %response.status(),
            subprotocol = ?response.headers().get(SEC_WEBSOCKET_PROTOCOL),
            "handshake complete"
        );

        let (sink, stream) = ws_stream.split();
        Ok(Transport::new(TungsteniteSink(sink), TungsteniteStream(stream)))
    }
}

fn handshake_request(target: &Url, options: &ConnectionOptions) -> Result<Request<()>> {
    let mut request = target.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.extend(options.headers.clone());

    if !options.subprotocols.is_empty() {
        let protocols = HeaderValue::from_str(&options.subprotocols.join(", "))
            .map_err(|e| Error::validation(format!("invalid subprotocol list: {e}")))?;
        headers.insert(SEC_WEBSOCKET_PROTOCOL, protocols);
    }

    Ok(request)
}

struct TungsteniteSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.0.send(frame.into()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

struct TungsteniteStream(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.0.next().await? {
                Ok(message) => {
                    if let Some(frame) = Frame::from_message(message) {
                        return Some(Ok(frame));
                    }
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

impl Frame {
    /// Raw frames only show up when writing, so reading one yields `None`.
    fn from_message(message: Message) -> Option<Self> {
        let frame = match message {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data),
            Message::Ping(payload) => Self::Ping(payload),
            Message::Pong(payload) => Self::Pong(payload),
            Message::Close(frame) => Self::Close(frame.map(|f| CloseFrame {
                code: f.code.into(),
                reason: f.reason.as_str().to_owned(),
            })),
            Message::Frame(_) => return None,
        };
        Some(frame)
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(payload) => Message::Ping(payload),
            Frame::Pong(payload) => Message::Pong(payload),
            Frame::Close(frame) => Message::Close(frame.map(|f| TungsteniteCloseFrame {
                code: f.code.into(),
                reason: f.reason.into(),
            })),
        }
    }
}
