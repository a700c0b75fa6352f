//! Chat Relay Server - Entry Point
//!
//! Starts the Broadcaster actor and the accept loop, and shuts both down on
//! Ctrl-C, SIGTERM, or an `exit` line on standard input.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::shutdown::{wait_for_signal, watch_control_input};
use chat_relay::{Broadcaster, ChatRelay, Shutdown};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let shutdown = Shutdown::new();

    // Start Broadcaster actor
    let (broadcaster, handle) = Broadcaster::new(shutdown.token());
    tokio::spawn(broadcaster.run());

    // Bind failure is fatal
    let relay = ChatRelay::bind(addr.as_str(), handle, shutdown.clone()).await?;
    info!("Chat relay listening on {}", relay.local_addr()?);

    // Ctrl-C / SIGTERM
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        on_signal.trigger();
    });

    // Operator control input; a blocking stdin read can't be cancelled, so it gets its own thread.
    // Never joined: it is left blocked on stdin and dies with the process.
    let on_exit = shutdown.clone();
    std::thread::spawn(move || {
        watch_control_input(std::io::stdin().lock(), &on_exit);
    });

    relay.run().await;
    info!("exit");

    Ok(())
}
