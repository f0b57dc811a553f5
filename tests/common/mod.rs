#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary uses a different subset of these helpers"
)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing_subscriber::EnvFilter;
use ws_callback_client::error::Error;
use ws_callback_client::ws::{Dialer, FrameSink, FrameStream, Transport};
use ws_callback_client::{Connection, ConnectionOptions, EventHandler, Frame};

pub const URL: &str = "ws://mock.invalid/socket";

/// How long a test waits for an event that should happen.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a test waits before concluding that an event did not happen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

pub fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

/// Everything a handler can observe, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Text(String),
    Binary(Vec<u8>),
    ConnectError(String),
    Disconnected(Option<String>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

/// Handler that forwards every callback into a channel.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> (Self, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Events { rx })
    }

    fn record(&self, event: Event) {
        drop(self.tx.send(event));
    }
}

impl EventHandler for Recorder {
    fn on_connected(&self, _connection: &Connection) {
        self.record(Event::Connected);
    }

    fn on_text(&self, message: &str, _connection: &Connection) {
        self.record(Event::Text(message.to_owned()));
    }

    fn on_binary(&self, data: &[u8], _connection: &Connection) {
        self.record(Event::Binary(data.to_vec()));
    }

    fn on_connect_error(&self, error: &Error, _connection: &Connection) {
        self.record(Event::ConnectError(error.to_string()));
    }

    fn on_disconnected(&self, reason: Option<&Error>, _connection: &Connection) {
        self.record(Event::Disconnected(reason.map(ToString::to_string)));
    }

    fn on_ping(&self, payload: &[u8], _connection: &Connection) {
        self.record(Event::Ping(payload.to_vec()));
    }

    fn on_pong(&self, payload: &[u8], _connection: &Connection) {
        self.record(Event::Pong(payload.to_vec()));
    }
}

impl Events {
    /// The next recorded event, or `None` if none arrives in time.
    pub async fn next(&mut self) -> Option<Event> {
        timeout(EVENT_TIMEOUT, self.rx.recv()).await.ok().flatten()
    }

    /// Asserts that nothing else gets recorded for a short while.
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(event)) = timeout(QUIET_PERIOD, self.rx.recv()).await {
            panic!("unexpected event {event:?}");
        }
    }
}

/// What the scripted peer feeds into the read half.
#[derive(Debug)]
pub enum Inbound {
    Frame(Frame),
    Error(String),
    End,
}

/// State shared by the mock dialer, its transports, and the test.
#[derive(Default)]
pub struct Shared {
    /// Frames written by the connection, plus the replies the transport sends by itself
    pub written: Mutex<Vec<Frame>>,
    pub writing: AtomicBool,
    pub overlapping_writes: AtomicUsize,
    pub reading: AtomicBool,
    pub overlapping_reads: AtomicUsize,
    pub closed: AtomicBool,
    pub dials: AtomicUsize,
    pub dialed_options: Mutex<Vec<ConnectionOptions>>,
    peers: Mutex<Vec<mpsc::UnboundedSender<Inbound>>>,
}

impl Shared {
    #[must_use]
    pub fn written(&self) -> Vec<Frame> {
        self.written.lock().unwrap().clone()
    }

    #[must_use]
    pub fn close_frames(&self) -> usize {
        self.written()
            .iter()
            .filter(|frame| matches!(frame, Frame::Close(_)))
            .count()
    }

    #[must_use]
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Feed the read half of the most recently dialed transport.
    pub fn push(&self, inbound: Inbound) {
        let peers = self.peers.lock().unwrap();
        let peer = peers.last().expect("nothing dialed yet");
        drop(peer.send(inbound));
    }

    pub fn push_frame(&self, frame: Frame) {
        self.push(Inbound::Frame(frame));
    }
}

/// Scripted [`Dialer`]. Every dial opens a fresh in-memory transport.
pub struct MockDialer {
    shared: Arc<Shared>,
    fail_with: Option<String>,
    write_delay: Duration,
}

impl MockDialer {
    #[must_use]
    pub fn new() -> (Self, Arc<Shared>) {
        let shared = Arc::new(Shared::default());
        let dialer = Self {
            shared: Arc::clone(&shared),
            fail_with: None,
            write_delay: Duration::ZERO,
        };
        (dialer, shared)
    }

    /// Every dial fails with this message.
    #[must_use]
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_owned());
        self
    }

    /// Each write sleeps this long, so overlapping writes would be noticed.
    #[must_use]
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(
        &self,
        _url: &str,
        options: &ConnectionOptions,
    ) -> ws_callback_client::Result<Transport> {
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        self.shared.dialed_options.lock().unwrap().push(options.clone());

        if let Some(message) = &self.fail_with {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, message.clone()).into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.peers.lock().unwrap().push(tx);
        self.shared.closed.store(false, Ordering::SeqCst);
        self.shared.reading.store(false, Ordering::SeqCst);

        Ok(Transport::new(
            MockSink {
                shared: Arc::clone(&self.shared),
                delay: self.write_delay,
            },
            MockStream {
                shared: Arc::clone(&self.shared),
                rx,
            },
        ))
    }
}

struct MockSink {
    shared: Arc<Shared>,
    delay: Duration,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> ws_callback_client::Result<()> {
        if self.shared.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport closed").into());
        }

        if self.shared.writing.swap(true, Ordering::SeqCst) {
            self.shared.overlapping_writes.fetch_add(1, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.shared.written.lock().unwrap().push(frame);
        self.shared.writing.store(false, Ordering::SeqCst);

        Ok(())
    }

    async fn close(&mut self) -> ws_callback_client::Result<()> {
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockStream {
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<ws_callback_client::Result<Frame>> {
        if self.shared.reading.swap(true, Ordering::SeqCst) {
            self.shared.overlapping_reads.fetch_add(1, Ordering::SeqCst);
        }
        let inbound = self.rx.recv().await;
        self.shared.reading.store(false, Ordering::SeqCst);

        match inbound? {
            Inbound::Frame(frame) => {
                // Default control-frame handling, as a real transport does it.
                match &frame {
                    Frame::Ping(payload) => self
                        .shared
                        .written
                        .lock()
                        .unwrap()
                        .push(Frame::Pong(payload.clone())),
                    Frame::Close(close) => self
                        .shared
                        .written
                        .lock()
                        .unwrap()
                        .push(Frame::Close(close.clone())),
                    _ => {}
                }
                Some(Ok(frame))
            }
            Inbound::Error(message) => Some(Err(io::Error::other(message).into())),
            Inbound::End => None,
        }
    }
}

/// Connection over a [`MockDialer`] that records every callback.
#[must_use]
pub fn mock_connection(dialer: MockDialer) -> (Connection, Events) {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let connection = Connection::with_dialer(URL, ConnectionOptions::default(), recorder, dialer);
    (connection, events)
}

/// Start a WebSocket server on a random port that runs `session` for every client.
pub async fn spawn_server<F, Fut>(session: F) -> SocketAddr
where
    F: Fn(WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let session = Arc::new(session);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            tokio::spawn((*session)(ws_stream));
        }
    });

    addr
}
