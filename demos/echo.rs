//! Echo example: connects, sends a text and a binary frame, then closes.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug,rustls=off cargo run --example echo -- wss://echo.websocket.org
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=echo.log RUST_LOG=debug cargo run --example echo
//! ```

use std::fs::File;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use ws_callback_client::ws::ProxyFromEnv;
use ws_callback_client::{Callbacks, Connection, ConnectionOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wss://echo.websocket.org".to_owned());

    let callbacks = Callbacks::new()
        .connected(|connection| info!(url = connection.url(), "connected"))
        .text(|message, _| info!(message, "recv text"))
        .binary(|data, _| info!(len = data.len(), "recv binary"))
        .ping(|payload, _| info!(len = payload.len(), "recv ping"))
        .connect_error(|error, _| warn!(%error, "connect failed"))
        .disconnected(|reason, _| info!(reason = ?reason.map(ToString::to_string), "disconnected"));

    let options = ConnectionOptions::builder()
        .proxy(std::sync::Arc::new(ProxyFromEnv::default()))
        .build();
    let connection = Connection::with_options(url, options, callbacks);

    connection.connect().await;
    if !connection.is_connected() {
        return Ok(());
    }

    connection.send_text("hello").await;
    connection.send_binary(vec![0x01, 0x02, 0x03]).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    connection.close().await;

    Ok(())
}
